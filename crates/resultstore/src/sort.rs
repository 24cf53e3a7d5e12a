//! Sort keys for a cached run.
//!
//! Every field except rank breaks ties by URL ascending, so the order is
//! total. Rank has no tie-break; the sort is stable, so equal ranks keep
//! their previous order. Descending reverses the whole comparator, tie-break
//! included.
//!
//! Rank "ascending" puts the highest numeric rank first.
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;
use crate::record::{DiffMetrics, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    NumDiffPixels,
    PixelDiffPercent,
    MaxRedDiff,
    MaxGreenDiff,
    MaxBlueDiff,
    Rank,
}

impl SortField {
    pub const ALL: [SortField; 6] = [
        SortField::NumDiffPixels,
        SortField::PixelDiffPercent,
        SortField::MaxRedDiff,
        SortField::MaxGreenDiff,
        SortField::MaxBlueDiff,
        SortField::Rank,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SortField::NumDiffPixels => "numDiffPixels",
            SortField::PixelDiffPercent => "pixelDiffPercent",
            SortField::MaxRedDiff => "maxRedDiff",
            SortField::MaxGreenDiff => "maxGreenDiff",
            SortField::MaxBlueDiff => "maxBlueDiff",
            SortField::Rank => "rank",
        }
    }
}

impl FromStr for SortField {
    type Err = StoreError;

    /// Accepts the camelCase record field names and the hyphenated forms
    /// (`diff-pixel-count`, `diff-percentage`, `max-red-diff`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "numDiffPixels" | "diff-pixel-count" => Ok(SortField::NumDiffPixels),
            "pixelDiffPercent" | "diff-percentage" => Ok(SortField::PixelDiffPercent),
            "maxRedDiff" | "max-red-diff" => Ok(SortField::MaxRedDiff),
            "maxGreenDiff" | "max-green-diff" => Ok(SortField::MaxGreenDiff),
            "maxBlueDiff" | "max-blue-diff" => Ok(SortField::MaxBlueDiff),
            "rank" => Ok(SortField::Rank),
            other => Err(StoreError::UnknownSortField(other.to_string())),
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl FromStr for SortOrder {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ascending" | "asc" => Ok(SortOrder::Ascending),
            "descending" | "desc" => Ok(SortOrder::Descending),
            other => Err(StoreError::UnknownSortOrder(other.to_string())),
        }
    }
}

/// Comparator for `field` in `order`.
pub fn comparator(field: SortField, order: SortOrder) -> impl Fn(&Record, &Record) -> Ordering {
    move |a, b| {
        let ord = compare(field, a, b);
        match order {
            SortOrder::Ascending => ord,
            SortOrder::Descending => ord.reverse(),
        }
    }
}

/// Ascending comparison of two records by `field`.
pub fn compare(field: SortField, a: &Record, b: &Record) -> Ordering {
    let primary = match field {
        SortField::Rank => return b.rank.cmp(&a.rank),
        SortField::NumDiffPixels => by_metric(a, b, |m| m.num_diff_pixels),
        SortField::PixelDiffPercent => match (a.diff_percent(), b.diff_percent()) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (x, y) => x.is_some().cmp(&y.is_some()),
        },
        SortField::MaxRedDiff => by_metric(a, b, |m| m.max_rgb_diffs[0]),
        SortField::MaxGreenDiff => by_metric(a, b, |m| m.max_rgb_diffs[1]),
        SortField::MaxBlueDiff => by_metric(a, b, |m| m.max_rgb_diffs[2]),
    };
    primary.then_with(|| a.url.cmp(&b.url))
}

/// Records without metrics order before records with them.
fn by_metric<K: Ord>(a: &Record, b: &Record, key: impl Fn(&DiffMetrics) -> K) -> Ordering {
    a.diff_metrics
        .as_ref()
        .map(&key)
        .cmp(&b.diff_metrics.as_ref().map(&key))
}
