//! Per-run materialized view: the ordered list of eligible records plus a
//! URL -> position index that keeps re-`put`s from duplicating entries.
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::record::Record;

#[derive(Debug, Clone, Default)]
pub struct RunCache {
    records: Vec<Record>,
    positions: HashMap<String, usize>,
}

impl RunCache {
    /// Builds the view in the given order. A repeated URL keeps its first
    /// position and its last value.
    pub fn from_records(records: Vec<Record>) -> Self {
        let mut cache = Self {
            records: Vec::with_capacity(records.len()),
            positions: HashMap::with_capacity(records.len()),
        };
        for record in records {
            cache.upsert(record);
        }
        cache
    }

    /// Replaces the entry with the same URL in place, or appends.
    pub fn upsert(&mut self, record: Record) {
        match self.positions.get(&record.url) {
            Some(&idx) => self.records[idx] = record,
            None => {
                self.positions.insert(record.url.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }

    /// Removes the entry for `url`, keeping the order of the rest.
    pub fn remove(&mut self, url: &str) -> Option<Record> {
        let idx = self.positions.remove(url)?;
        let removed = self.records.remove(idx);
        for pos in self.positions.values_mut() {
            if *pos > idx {
                *pos -= 1;
            }
        }
        Some(removed)
    }

    pub fn get(&self, url: &str) -> Option<&Record> {
        self.positions.get(url).map(|&idx| &self.records[idx])
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Stable in-place sort.
    pub fn sort_by<F>(&mut self, compare: F)
    where
        F: FnMut(&Record, &Record) -> Ordering,
    {
        self.records.sort_by(compare);
        self.reindex();
    }

    fn reindex(&mut self) {
        for (idx, record) in self.records.iter().enumerate() {
            if let Some(pos) = self.positions.get_mut(&record.url) {
                *pos = idx;
            }
        }
    }
}
