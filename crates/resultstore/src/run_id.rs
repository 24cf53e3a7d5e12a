//! Run identifiers: `<user>-<timestamp>`, e.g. `alice-20170101120000`.
use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, StoreError};

/// Timestamp layout of the run id suffix.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Lower bound that, paired with "now", selects every run.
///
/// The startup cache rebuild lists runs strictly inside that window. A run
/// dated at or before 2000-01-01, or in the future, is still stored and
/// readable with `get`, but is not cached again after a restart.
#[must_use]
pub fn beginning_of_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2000, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(NaiveDateTime::MIN)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunId {
    raw: String,
    user_len: usize,
    timestamp: NaiveDateTime,
}

impl RunId {
    /// Splits at the first `-`; the remainder must parse as
    /// [`TIMESTAMP_FORMAT`].
    pub fn parse(raw: &str) -> Result<Self> {
        let malformed = |reason: String| StoreError::MalformedRunId {
            run_id: raw.to_string(),
            reason,
        };

        let (user, ts) = raw
            .split_once('-')
            .ok_or_else(|| malformed("expected <user>-<timestamp>".into()))?;
        if user.is_empty() {
            return Err(malformed("empty user".into()));
        }
        let timestamp = NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT)
            .map_err(|e| malformed(format!("bad timestamp {:?}: {}", ts, e)))?;

        Ok(Self {
            raw: raw.to_string(),
            user_len: user.len(),
            timestamp,
        })
    }

    /// Builds the id for a run started by `user` at `timestamp`.
    pub fn new(user: &str, timestamp: NaiveDateTime) -> Result<Self> {
        Self::parse(&format!("{}-{}", user, timestamp.format(TIMESTAMP_FORMAT)))
    }

    pub fn user(&self) -> &str {
        &self.raw[..self.user_len]
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// `true` when the timestamp lies strictly between `start` and `end`.
    pub fn is_between(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.timestamp > start && self.timestamp < end
    }
}

impl FromStr for RunId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
