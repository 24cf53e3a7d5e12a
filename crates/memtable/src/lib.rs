//! In-memory write buffer for the bucketed engine.
//!
//! Keys live inside named buckets. Every value carries the sequence number of
//! the write that produced it, and a dropped bucket keeps a marker with the
//! sequence number of the drop so that it can shadow older on-disk layers
//! once flushed.
use std::collections::BTreeMap;

/// A live value and the sequence number of the write that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueEntry {
    pub seq: u64,
    pub value: Vec<u8>,
}

/// All memtable state for a single bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketEntry {
    /// Sequence number of the latest drop of this bucket. Anything older in
    /// lower layers is hidden.
    pub dropped_at: Option<u64>,
    entries: BTreeMap<Vec<u8>, ValueEntry>,
}

impl BucketEntry {
    pub fn get(&self, key: &[u8]) -> Option<&ValueEntry> {
        self.entries.get(key)
    }

    /// Entries in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &ValueEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of a point lookup against the memtable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    /// The key has a value here.
    Found(&'a ValueEntry),
    /// The bucket was dropped here and the key was not written since; older
    /// layers must not be consulted.
    Dropped,
    /// Nothing known; fall through to older layers.
    Absent,
}

#[derive(Debug)]
pub struct Memtable {
    buckets: BTreeMap<Vec<u8>, BucketEntry>,
    entry_count: usize,
    approx_size: usize,
}

impl Memtable {
    pub fn new() -> Self {
        Self {
            buckets: BTreeMap::new(),
            entry_count: 0,
            approx_size: 0,
        }
    }

    /// Put `key` into `bucket`. Ignored when an entry with an equal or newer
    /// seq exists, or when the bucket was dropped at an equal or newer seq.
    pub fn put(&mut self, bucket: Vec<u8>, key: Vec<u8>, value: Vec<u8>, seq: u64) {
        let b = self.buckets.entry(bucket).or_default();
        if matches!(b.dropped_at, Some(d) if d >= seq) {
            return;
        }

        match b.entries.get(&key) {
            Some(old) if old.seq >= seq => return,
            Some(old) => {
                self.approx_size = self
                    .approx_size
                    .saturating_sub(key.len() + old.value.len());
            }
            None => self.entry_count += 1,
        }

        self.approx_size += key.len() + value.len();
        b.entries.insert(key, ValueEntry { seq, value });
    }

    /// Drop `bucket` at `seq`: forget its older entries and leave a marker.
    pub fn drop_bucket(&mut self, bucket: Vec<u8>, seq: u64) {
        let marker_size = bucket.len() + 8;
        let b = self.buckets.entry(bucket).or_default();
        match b.dropped_at {
            Some(d) if d >= seq => return,
            Some(_) => {}
            None => self.approx_size += marker_size,
        }

        let mut freed = 0usize;
        let mut removed = 0usize;
        b.entries.retain(|k, e| {
            if e.seq < seq {
                freed += k.len() + e.value.len();
                removed += 1;
                false
            } else {
                true
            }
        });
        b.dropped_at = Some(seq);

        self.approx_size = self.approx_size.saturating_sub(freed);
        self.entry_count -= removed;
    }

    pub fn lookup(&self, bucket: &[u8], key: &[u8]) -> Lookup<'_> {
        match self.buckets.get(bucket) {
            Some(b) => match b.entries.get(key) {
                Some(e) => Lookup::Found(e),
                None if b.dropped_at.is_some() => Lookup::Dropped,
                None => Lookup::Absent,
            },
            None => Lookup::Absent,
        }
    }

    /// Latest live value for `key` in `bucket`, if held here.
    pub fn get(&self, bucket: &[u8], key: &[u8]) -> Option<(u64, Vec<u8>)> {
        match self.lookup(bucket, key) {
            Lookup::Found(e) => Some((e.seq, e.value.clone())),
            _ => None,
        }
    }

    pub fn bucket(&self, bucket: &[u8]) -> Option<&BucketEntry> {
        self.buckets.get(bucket)
    }

    /// Buckets in ascending name order, drop markers included.
    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &BucketEntry)> {
        self.buckets.iter()
    }

    /// Number of live key entries across all buckets.
    pub fn len(&self) -> usize {
        self.entry_count
    }

    pub fn approx_size(&self) -> usize {
        self.approx_size
    }

    /// `true` when there is nothing to flush: no entries and no drop markers.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
        self.entry_count = 0;
        self.approx_size = 0;
    }
}

impl Default for Memtable {
    fn default() -> Self {
        Self::new()
    }
}
