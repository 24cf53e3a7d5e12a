//! # ResultStore - visual-diff result cache and ranking store
//!
//! Ingests per-run diff records, keeps them durable, and serves paging,
//! filtering, sorting and statistics from an in-memory view of each run.
//!
//! ```text
//!            put / remove_run                    range / filter / sort
//!                  |                              urls / stats
//!                  v                                    |
//!   ┌──────────────────────────────┐                    |
//!   │ RecordTable (Mutex)          │                    |
//!   │ engine bucket per run        │                    |
//!   │ url -> JSON record           │                    |
//!   └──────────────┬───────────────┘                    v
//!                  │ eligible records     ┌──────────────────────────┐
//!                  └────────────────────> │ cache (RwLock)           │
//!                                         │ run -> RunCache          │
//!                                         └──────────────────────────┘
//! ```
//!
//! Writes hit the durable table first and reach the cache only once the
//! table accepted them. The table lock is held across the cache update so
//! both layers apply writes in the same order. Lock order is always table,
//! then cache. Queries touch only the cache.
//!
//! A record is cached once it carries diff metrics ([`Record::is_eligible`]).
//! On open the cache is rebuilt from every run in the table; a run that
//! cannot be read is logged and left out.

mod cache;
mod durable;
mod error;
mod record;
mod run_id;
mod sort;
mod stats;
mod urls;

pub use cache::RunCache;
pub use durable::RecordTable;
pub use error::{Result, StoreError};
pub use record::{DiffMetrics, Record};
pub use run_id::{beginning_of_time, RunId, TIMESTAMP_FORMAT};
pub use sort::{comparator, SortField, SortOrder};
pub use stats::{Histogram, ResultStats, HISTOGRAM_BUCKETS};
pub use urls::{normalize_url, UrlEntry};

use chrono::{Local, NaiveDateTime};
use config::StoreConfig;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;

pub struct ResultStore {
    table: Mutex<RecordTable>,
    cache: RwLock<HashMap<String, RunCache>>,
    page_size: usize,
}

impl ResultStore {
    /// Opens the durable table under `cfg.data_dir` and rebuilds the cache.
    pub fn open(cfg: &StoreConfig) -> Result<Self> {
        let table = RecordTable::open(cfg)?;
        Self::with_table(table, cfg.filter_page_size)
    }

    /// Wraps an already opened table. `page_size` bounds one filtered page.
    pub fn with_table(table: RecordTable, page_size: usize) -> Result<Self> {
        let cache = Self::rebuild_cache(&table)?;
        Ok(Self {
            table: Mutex::new(table),
            cache: RwLock::new(cache),
            page_size: page_size.max(1),
        })
    }

    fn rebuild_cache(table: &RecordTable) -> Result<HashMap<String, RunCache>> {
        let run_ids = table.get_run_ids(beginning_of_time(), now())?;
        let mut cache = HashMap::with_capacity(run_ids.len());
        let mut skipped = 0usize;

        for run_id in run_ids {
            match table.get_all(&run_id) {
                Ok(records) => {
                    cache.insert(run_id, RunCache::from_records(records));
                }
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(run = %run_id, error = %e, "skipping unreadable run");
                }
            }
        }

        tracing::info!(
            runs = cache.len(),
            records = cache.values().map(RunCache::len).sum::<usize>(),
            skipped,
            "result cache rebuilt"
        );
        Ok(cache)
    }

    // ------------------------------------------------------------------
    // Durable table
    // ------------------------------------------------------------------

    /// `Ok(None)` for an unknown run or URL.
    pub fn get(&self, run_id: &str, url: &str) -> Result<Option<Record>> {
        self.table.lock().get(run_id, url)
    }

    /// Eligible records straight from the durable table.
    pub fn get_all(&self, run_id: &str) -> Result<Vec<Record>> {
        self.table.lock().get_all(run_id)
    }

    /// Stores `record` at `(run_id, url)`, then updates the cached run: an
    /// eligible record is upserted by URL, an ineligible one evicts any
    /// cached entry for the URL. The cache is untouched if the durable write
    /// fails.
    pub fn put(&self, run_id: &str, url: &str, record: Record) -> Result<()> {
        let mut table = self.table.lock();
        table.put(run_id, url, &record)?;

        let mut cache = self.cache.write();
        let run = cache.entry(run_id.to_string()).or_default();
        if record.is_eligible() {
            run.upsert(record);
        } else {
            run.remove(url);
        }
        Ok(())
    }

    /// Deletes the run from the durable table and the cache.
    ///
    /// # Errors
    ///
    /// [`StoreError::RunNotFound`] when the table has no such run.
    pub fn remove_run(&self, run_id: &str) -> Result<()> {
        let mut table = self.table.lock();
        table.remove_run(run_id)?;
        self.cache.write().remove(run_id);
        tracing::info!(run = %run_id, "run removed");
        Ok(())
    }

    /// Runs whose timestamp lies strictly between `start` and `end`.
    pub fn get_run_ids(&self, start: NaiveDateTime, end: NaiveDateTime) -> Result<Vec<String>> {
        self.table.lock().get_run_ids(start, end)
    }

    pub fn get_all_run_ids(&self) -> Result<Vec<String>> {
        self.get_run_ids(beginning_of_time(), now())
    }

    /// Runs present in the cache, sorted.
    pub fn cached_run_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.cache.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    // ------------------------------------------------------------------
    // Cached queries
    // ------------------------------------------------------------------

    /// Cached records `[start, end)`, both clamped to the run length.
    pub fn get_range(&self, run_id: &str, start: usize, end: usize) -> Result<Vec<Record>> {
        self.with_run(run_id, |run| {
            let records = run.records();
            let end = end.min(records.len());
            let start = start.min(end);
            records[start..end].to_vec()
        })
    }

    /// One page of records whose diff percentage is in `[min, max]`,
    /// scanning from `start`. Returns the matches and the index to resume
    /// from; the scan stops after `page_size` matches or at the end of the
    /// run.
    pub fn get_filtered(
        &self,
        run_id: &str,
        start: usize,
        min: f64,
        max: f64,
    ) -> Result<(Vec<Record>, usize)> {
        let page_size = self.page_size;
        self.with_run(run_id, |run| {
            let records = run.records();
            let mut matches = Vec::new();
            let mut idx = start.min(records.len());

            while idx < records.len() && matches.len() < page_size {
                let record = &records[idx];
                idx += 1;
                if matches!(record.diff_percent(), Some(p) if p >= min && p <= max) {
                    matches.push(record.clone());
                }
            }
            (matches, idx)
        })
    }

    /// Reorders the cached run in place.
    pub fn sort_run(&self, run_id: &str, field: SortField, order: SortOrder) -> Result<()> {
        let mut cache = self.cache.write();
        let run = cache
            .get_mut(run_id)
            .ok_or_else(|| StoreError::NoCachedResults(run_id.to_string()))?;
        run.sort_by(comparator(field, order));
        tracing::debug!(run = %run_id, %field, ?order, "run sorted");
        Ok(())
    }

    /// Normalized URLs of the cached run, in cache order.
    pub fn get_urls(&self, run_id: &str) -> Result<Vec<UrlEntry>> {
        self.with_run(run_id, |run| {
            run.records().iter().map(|r| normalize_url(&r.url)).collect()
        })
    }

    pub fn get_stats(&self, run_id: &str) -> Result<(ResultStats, Histogram)> {
        self.with_run(run_id, |run| stats::compute(run.records()))
    }

    fn with_run<T>(&self, run_id: &str, f: impl FnOnce(&RunCache) -> T) -> Result<T> {
        let cache = self.cache.read();
        let run = cache
            .get(run_id)
            .ok_or_else(|| StoreError::NoCachedResults(run_id.to_string()))?;
        Ok(f(run))
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Flushes buffered writes to a table file.
    pub fn flush(&self) -> Result<()> {
        self.table.lock().flush()
    }

    pub fn compact(&self) -> Result<()> {
        self.table.lock().compact()
    }

    /// Flushes and releases the store.
    pub fn close(self) -> Result<()> {
        self.table.into_inner().flush()
    }
}

impl std::fmt::Debug for ResultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (runs, records) = {
            let cache = self.cache.read();
            (cache.len(), cache.values().map(RunCache::len).sum::<usize>())
        };
        let mut s = f.debug_struct("ResultStore");
        s.field("cached_runs", &runs)
            .field("cached_records", &records)
            .field("page_size", &self.page_size);
        match self.table.try_lock() {
            Some(table) => s.field("table", &*table),
            None => s.field("table", &"<locked>"),
        };
        s.finish()
    }
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

#[cfg(test)]
mod tests;
