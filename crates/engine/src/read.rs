/// Read path: `get()`, `scan_bucket()`, `bucket_exists()`, `buckets()`.
///
/// Layers are consulted freshest first: memtable, L0 newest to oldest, then
/// L1. Within a layer a value is always newer than that layer's drop marker,
/// so a layer is checked for the key before its marker ends the search.
use anyhow::Result;
use memtable::{Lookup, ValueEntry};
use std::collections::{BTreeMap, BTreeSet};

use crate::Engine;

impl Engine {
    /// Looks up `key` in `bucket`, returning `Some((seq, value))` when live.
    ///
    /// # Errors
    ///
    /// Table read failures (I/O, CRC mismatch) propagate.
    pub fn get(&self, bucket: &[u8], key: &[u8]) -> Result<Option<(u64, Vec<u8>)>> {
        match self.mem.lookup(bucket, key) {
            Lookup::Found(e) => return Ok(Some((e.seq, e.value.clone()))),
            Lookup::Dropped => return Ok(None),
            Lookup::Absent => {}
        }

        for sst in self.tables() {
            if let Some(entry) = sst.get(bucket, key)? {
                return Ok(Some((entry.seq, entry.value)));
            }
            if sst.dropped_at(bucket).is_some() {
                return Ok(None);
            }
        }
        Ok(None)
    }

    /// Every live `(key, value)` pair of `bucket` in ascending key order.
    /// Empty when the bucket does not exist.
    pub fn scan_bucket(&self, bucket: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut merged: BTreeMap<Vec<u8>, ValueEntry> = BTreeMap::new();

        if let Some(b) = self.mem.bucket(bucket) {
            for (key, entry) in b.iter() {
                merged.insert(key.clone(), entry.clone());
            }
            if b.dropped_at.is_some() {
                return Ok(into_pairs(merged));
            }
        }

        for sst in self.tables() {
            for key in sst.keys(bucket) {
                if merged.contains_key(key) {
                    continue;
                }
                let entry = sst.get(bucket, key)?.ok_or_else(|| {
                    anyhow::anyhow!(
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

        Ok(into_pairs(merged))
    }

    /// `true` when `bucket` holds at least one live key.
    pub fn bucket_exists(&self, bucket: &[u8]) -> Result<bool> {
        if let Some(b) = self.mem.bucket(bucket) {
            if !b.is_empty() {
                return Ok(true);
            }
            if b.dropped_at.is_some() {
                return Ok(false);
            }
        }
        for sst in self.tables() {
            if sst.has_values(bucket) {
                return Ok(true);
            }
            if sst.dropped_at(bucket).is_some() {
                return Ok(false);
            }
        }
        Ok(false)
    }

    /// Names of all live buckets in ascending byte order.
    pub fn buckets(&self) -> Result<Vec<Vec<u8>>> {
        let mut names: BTreeSet<&[u8]> = BTreeSet::new();
        names.extend(self.mem.iter().map(|(name, _)| name.as_slice()));
        for sst in self.tables() {
            names.extend(sst.bucket_names());
        }

        let mut live = Vec::with_capacity(names.len());
        for name in names {
            if self.bucket_exists(name)? {
                live.push(name.to_vec());
            }
        }
        Ok(live)
    }
}

fn into_pairs(merged: BTreeMap<Vec<u8>, ValueEntry>) -> Vec<(Vec<u8>, Vec<u8>)> {
    merged
        .into_iter()
        .map(|(key, entry)| (key, entry.value))
        .collect()
}
