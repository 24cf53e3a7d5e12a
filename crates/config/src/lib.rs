//! # Config - ResultStore settings
//!
//! A single [`StoreConfig`] carries everything needed to open a store: where
//! the data lives, when the memtable is flushed, whether the WAL is fsynced,
//! when L0 tables are compacted, and how many matches a filtered page holds.
//!
//! Settings come from, in increasing priority:
//!
//! 1. built-in defaults,
//! 2. a JSON file named by `RESULTSTORE_CONFIG` (missing fields keep defaults),
//! 3. individual environment variables:
//!
//! ```text
//! RESULTSTORE_DATA_DIR    data directory               (default: "data")
//! RESULTSTORE_FLUSH_KB    flush threshold in KiB       (default: 1024 = 1 MiB)
//! RESULTSTORE_WAL_SYNC    fsync every WAL append       (default: true)
//! RESULTSTORE_L0_TRIGGER  L0 compaction trigger        (default: 4, 0 = disabled)
//! RESULTSTORE_PAGE_SIZE   matches per filtered page    (default: 20)
//! ```
//!
//! Unparseable values are errors, not silent fallbacks.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const ENV_CONFIG_FILE: &str = "RESULTSTORE_CONFIG";
pub const ENV_DATA_DIR: &str = "RESULTSTORE_DATA_DIR";
pub const ENV_FLUSH_KB: &str = "RESULTSTORE_FLUSH_KB";
pub const ENV_WAL_SYNC: &str = "RESULTSTORE_WAL_SYNC";
pub const ENV_L0_TRIGGER: &str = "RESULTSTORE_L0_TRIGGER";
pub const ENV_PAGE_SIZE: &str = "RESULTSTORE_PAGE_SIZE";

/// Default memtable flush threshold (1 MiB).
pub const DEFAULT_FLUSH_THRESHOLD: usize = 1024 * 1024;
/// Default number of L0 tables that triggers compaction.
pub const DEFAULT_L0_COMPACTION_TRIGGER: usize = 4;
/// Default number of matches returned by one filtered page.
pub const DEFAULT_FILTER_PAGE_SIZE: usize = 20;

const WAL_FILENAME: &str = "wal.log";
const SST_DIRNAME: &str = "sst";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory; the WAL and table directory live beneath it.
    pub data_dir: PathBuf,
    /// Memtable byte size that triggers a flush to a table file.
    pub flush_threshold: usize,
    /// fsync after every WAL append.
    pub wal_sync: bool,
    /// L0 table count that triggers compaction after a flush. 0 disables.
    pub l0_compaction_trigger: usize,
    /// Maximum matches returned by one filtered page.
    pub filter_page_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            wal_sync: true,
            l0_compaction_trigger: DEFAULT_L0_COMPACTION_TRIGGER,
            filter_page_size: DEFAULT_FILTER_PAGE_SIZE,
        }
    }
}

impl StoreConfig {
    /// Defaults rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    pub fn flush_threshold(mut self, bytes: usize) -> Self {
        self.flush_threshold = bytes;
        self
    }

    pub fn wal_sync(mut self, enabled: bool) -> Self {
        self.wal_sync = enabled;
        self
    }

    pub fn l0_compaction_trigger(mut self, trigger: usize) -> Self {
        self.l0_compaction_trigger = trigger;
        self
    }

    pub fn filter_page_size(mut self, size: usize) -> Self {
        self.filter_page_size = size;
        self
    }

    #[must_use]
    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(WAL_FILENAME)
    }

    #[must_use]
    pub fn sst_dir(&self) -> PathBuf {
        self.data_dir.join(SST_DIRNAME)
    }

    /// Reads a JSON config file. Fields absent from the file keep their
    /// defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let cfg: Self = serde_json::from_slice(&bytes)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Builds a config from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable lookup. `from_env` is this
    /// with `std::env::var`; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = match lookup(ENV_CONFIG_FILE) {
            Some(file) => Self::from_json_file(Path::new(&file))?,
            None => Self::default(),
        };

        if let Some(dir) = lookup(ENV_DATA_DIR) {
            cfg.data_dir = PathBuf::from(dir);
        }
        if let Some(kb) = parse_var::<usize, _>(&lookup, ENV_FLUSH_KB)? {
            cfg.flush_threshold = kb
                .checked_mul(1024)
                .with_context(|| format!("{} is too large", ENV_FLUSH_KB))?;
        }
        if let Some(sync) = parse_var(&lookup, ENV_WAL_SYNC)? {
            cfg.wal_sync = sync;
        }
        if let Some(trigger) = parse_var(&lookup, ENV_L0_TRIGGER)? {
            cfg.l0_compaction_trigger = trigger;
        }
        if let Some(size) = parse_var(&lookup, ENV_PAGE_SIZE)? {
            cfg.filter_page_size = size;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.flush_threshold > 0, "flush_threshold must be > 0");
        anyhow::ensure!(self.filter_page_size > 0, "filter_page_size must be > 0");
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid {}={:?}: {}", key, raw, e)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let cfg = StoreConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(cfg, StoreConfig::default());
        assert_eq!(cfg.wal_path(), PathBuf::from("data").join("wal.log"));
        assert_eq!(cfg.sst_dir(), PathBuf::from("data").join("sst"));
    }

    #[test]
    fn env_values_override_defaults() {
        let cfg = StoreConfig::from_lookup(lookup_from(&[
            (ENV_DATA_DIR, "/tmp/results"),
            (ENV_FLUSH_KB, "2"),
            (ENV_WAL_SYNC, "false"),
            (ENV_L0_TRIGGER, "0"),
            (ENV_PAGE_SIZE, "5"),
        ]))
        .unwrap();

        assert_eq!(cfg.data_dir, PathBuf::from("/tmp/results"));
        assert_eq!(cfg.flush_threshold, 2048);
        assert!(!cfg.wal_sync);
        assert_eq!(cfg.l0_compaction_trigger, 0);
        assert_eq!(cfg.filter_page_size, 5);
    }

    #[test]
    fn malformed_value_is_an_error() {
        let err = StoreConfig::from_lookup(lookup_from(&[(ENV_WAL_SYNC, "maybe")])).unwrap_err();
        assert!(err.to_string().contains(ENV_WAL_SYNC));
    }

    #[test]
    fn zero_page_size_is_rejected() {
        assert!(StoreConfig::from_lookup(lookup_from(&[(ENV_PAGE_SIZE, "0")])).is_err());
    }

    #[test]
    fn json_file_then_env_override() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("store.json");
        std::fs::write(&file, r#"{ "data_dir": "/srv/diffs", "filter_page_size": 50 }"#).unwrap();

        let file_str = file.to_str().unwrap().to_string();
        let cfg = StoreConfig::from_lookup(lookup_from(&[
            (ENV_CONFIG_FILE, file_str.as_str()),
            (ENV_PAGE_SIZE, "10"),
        ]))
        .unwrap();

        assert_eq!(cfg.data_dir, PathBuf::from("/srv/diffs"));
        assert_eq!(cfg.filter_page_size, 10);
        assert_eq!(cfg.flush_threshold, DEFAULT_FLUSH_THRESHOLD);
    }

    #[test]
    fn builder_setters_chain() {
        let cfg = StoreConfig::new("/x")
            .flush_threshold(64)
            .wal_sync(false)
            .l0_compaction_trigger(2)
            .filter_page_size(3);
        assert_eq!(cfg.data_dir, PathBuf::from("/x"));
        assert_eq!(cfg.flush_threshold, 64);
        assert!(!cfg.wal_sync);
        assert_eq!(cfg.l0_compaction_trigger, 2);
        assert_eq!(cfg.filter_page_size, 3);
    }
}
