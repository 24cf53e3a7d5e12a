/// Compaction: merges every L0 and L1 table into a single L1 table.
///
/// Buckets are resolved one at a time, newest layer first, and streamed
/// straight into the writer. The memtable is not part of compaction and is
/// always newer than any table, so after a full merge no table is left for a
/// drop marker to shadow: markers and the data they hide are both discarded.
use anyhow::{Context, Result};
use memtable::ValueEntry;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::{Engine, SSTableReader, SSTableWriter, TableEntry};

impl Engine {
    /// Compacts all tables into one. A no-op with fewer than two tables.
    ///
    /// Runs automatically when the L0 count reaches `l0_compaction_trigger`
    /// after a flush. When nothing survives the merge, every table file and
    /// manifest entry is removed.
    ///
    /// # Errors
    ///
    /// I/O or corruption while reading inputs, or failure writing the output.
    /// Inputs stay untouched and registered on error.
    pub fn compact(&mut self) -> Result<()> {
        if self.sstable_count() <= 1 {
            return Ok(());
        }

        let old_paths: Vec<PathBuf> = self.tables().map(|t| t.path().to_path_buf()).collect();
        let input_entries: usize = self.tables().map(SSTableReader::len).sum();
        let (name, path) = self.new_table_path()?;

        let mut merge_error: Option<anyhow::Error> = None;
        let mut written = 0usize;
        let write_result = {
            let tables: Vec<&SSTableReader> = self.tables().collect();
            let buckets: BTreeSet<Vec<u8>> = tables
                .iter()
                .flat_map(|t| t.bucket_names().map(<[u8]>::to_vec))
                .collect();
            let mut buckets = buckets.into_iter();
            let mut pending = Vec::new().into_iter();

            let stream = std::iter::from_fn(|| loop {
                if let Some(entry) = pending.next() {
                    written += 1;
                    return Some(entry);
                }
                let bucket = buckets.next()?;
                match resolve_bucket(&tables, &bucket) {
                    Ok(entries) => pending = entries.into_iter(),
                    Err(e) => {
                        merge_error = Some(e);
                        return None;
                    }
                }
            });
            SSTableWriter::write_from_iterator(&path, stream)
        };

        if let Some(e) = merge_error {
            let _ = std::fs::remove_file(path.with_extension("sst.tmp"));
            let _ = std::fs::remove_file(&path);
            return Err(e.context("compaction aborted"));
        }

        // Nothing written: every bucket was dropped.
        let compacted = write_result?.then_some(name);

        self.manifest.replace_all(compacted.clone());
        self.manifest.save()?;

        // Release handles before deleting the files behind them.
        self.l0_sstables.clear();
        self.l1_sstables.clear();
        for p in &old_paths {
            if let Err(e) = std::fs::remove_file(p) {
                tracing::warn!(path = %p.display(), error = %e, "cannot remove compacted table");
            }
        }

        if compacted.is_some() {
            let reader = SSTableReader::open(&path)
                .with_context(|| format!("failed to open compacted table {}", path.display()))?;
            self.l1_sstables.push(reader);
        }

        tracing::info!(
            inputs = old_paths.len(),
            input_entries,
            output_entries = written,
            "compaction finished"
        );
        Ok(())
    }
}

/// Live entries of `bucket` across `tables` (newest first): the newest value
/// of each key wins, and a drop marker stops the walk into older tables.
fn resolve_bucket(tables: &[&SSTableReader], bucket: &[u8]) -> Result<Vec<TableEntry>> {
    let mut merged: BTreeMap<Vec<u8>, ValueEntry> = BTreeMap::new();
    for sst in tables {
        for key in sst.keys(bucket) {
            if merged.contains_key(key) {
                continue;
            }
            let entry = sst.get(bucket, key)?.with_context(|| {
                format!(
                    "index of {} lists a key it cannot read",
                    sst.path().display()
                )
            })?;
            merged.insert(key.to_vec(), entry);
        }
        if sst.dropped_at(bucket).is_some() {
            break;
        }
    }

    Ok(merged
        .into_iter()
        .map(|(key, entry)| TableEntry::Value {
            bucket: bucket.to_vec(),
            key,
            entry,
        })
        .collect())
}
