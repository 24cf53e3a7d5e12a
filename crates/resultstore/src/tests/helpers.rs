use crate::*;
use anyhow::Result;
use config::StoreConfig;
use std::path::Path;

pub const RUN_A: &str = "alice-20170101120000";
pub const RUN_B: &str = "bob-20170202000000";

pub fn config(dir: &Path) -> StoreConfig {
    StoreConfig::new(dir)
        .wal_sync(false)
        .l0_compaction_trigger(0)
}

pub fn open_store(dir: &Path) -> Result<ResultStore> {
    Ok(ResultStore::open(&config(dir))?)
}

pub fn open_store_paged(dir: &Path, page_size: usize) -> Result<ResultStore> {
    Ok(ResultStore::open(&config(dir).filter_page_size(page_size))?)
}

/// Record with diff metrics, eligible for the cache.
pub fn diffed(run_id: &str, url: &str, percent: f64) -> Record {
    Record {
        reference_image_id: format!("ref-{}", url),
        patch_image_id: format!("patch-{}", url),
        diff_metrics: Some(DiffMetrics {
            num_diff_pixels: (percent * 100.0) as u64,
            pixel_diff_percent: percent,
            max_rgb_diffs: [0; 3],
            num_static_pixels: 10_000,
            num_dynamic_pixels: 0,
        }),
        ..Record::new(run_id, url)
    }
}

pub fn ranked(run_id: &str, url: &str, rank: i64) -> Record {
    Record {
        rank,
        ..diffed(run_id, url, 1.0)
    }
}

/// Record that has screenshots but no diff yet.
pub fn pending(run_id: &str, url: &str) -> Record {
    Record {
        reference_image_id: format!("ref-{}", url),
        patch_image_id: format!("patch-{}", url),
        ..Record::new(run_id, url)
    }
}

pub fn put_all(store: &ResultStore, records: &[Record]) -> Result<()> {
    for r in records {
        store.put(&r.run_id, &r.url, r.clone())?;
    }
    Ok(())
}

pub fn urls(records: &[Record]) -> Vec<&str> {
    records.iter().map(|r| r.url.as_str()).collect()
}
