//! # Engine - bucketed storage engine
//!
//! Ties the [`memtable`], [`wal`] and [`sstable`] crates together into a
//! durable key-value store whose keys live in named buckets. The ResultStore
//! keeps one bucket per run, keyed by URL.
//!
//! ## Architecture
//!
//! ```text
//! put(bucket, key, value) / drop_bucket(bucket)
//!     -> WAL append (Put | DropBucket)
//!     -> memtable: BTreeMap<bucket, { entries, dropped_at }>
//!     -> flush() at flush_threshold: one L0 table per flush
//!     -> compact() at l0_compaction_trigger: everything into one L1 table
//!
//! get / scan_bucket / buckets
//!     memtable -> L0 newest..oldest -> L1
//!     stop at the first layer that has the key or a drop marker for the bucket
//! ```
//!
//! | Module         | Purpose                                              |
//! |----------------|------------------------------------------------------|
//! | `lib.rs`       | `Engine` struct, constructors, accessors, `Drop`     |
//! | [`recovery`]   | WAL replay, table loading, tmp file cleanup          |
//! | [`write`]      | `put()`, `drop_bucket()`, `force_flush()`, `flush()` |
//! | [`read`]       | `get()`, `scan_bucket()`, `buckets()`                |
//! | [`compaction`] | `compact()` with per-bucket resolution and marker GC |
//! | [`manifest`]   | Persistent L0/L1 assignment of table files           |
//!
//! ## Buckets and drop markers
//!
//! Dropping a bucket does not touch any file. It writes a `DropBucket`
//! record to the WAL and leaves a marker in the memtable, which is flushed
//! like any other entry. A marker hides every entry of its bucket in older
//! layers; writes after the drop start a fresh bucket. Full compaction has
//! no older layer to hide, so it discards markers together with the data
//! they shadow.
//!
//! ## Crash safety
//!
//! Every mutation reaches the WAL before the memtable. The WAL is truncated
//! only after the flushed table and the manifest are both on disk. Table
//! files and the manifest are written to a temp file and renamed into place.
mod compaction;
mod manifest;
mod read;
mod recovery;
mod write;

use anyhow::Result;
use config::StoreConfig;
use manifest::{Level, Manifest};
use memtable::Memtable;
pub use recovery::replay_wal_and_build;
use sstable::{SSTableReader, SSTableWriter, TableEntry};
use std::path::{Path, PathBuf};
use wal::WalWriter;

/// Maximum bucket name size in bytes (4 KiB).
pub const MAX_BUCKET_SIZE: usize = 4 * 1024;
/// Maximum key size in bytes (64 KiB).
pub const MAX_KEY_SIZE: usize = 64 * 1024;
/// Maximum value size in bytes (10 MiB).
pub const MAX_VALUE_SIZE: usize = 10 * 1024 * 1024;

/// Default number of L0 tables that triggers automatic compaction.
pub const DEFAULT_L0_COMPACTION_TRIGGER: usize = config::DEFAULT_L0_COMPACTION_TRIGGER;

/// Bucketed storage engine over a WAL, a memtable, and two levels of table
/// files.
///
/// # Write path
///
/// 1. Bump the sequence number.
/// 2. Append the record to the WAL.
/// 3. Apply it to the memtable.
/// 4. Flush to a new L0 table once `approx_size >= flush_threshold`.
///
/// # Read path
///
/// Memtable first, then L0 tables newest-first, then L1. The first layer
/// holding the key wins; a layer holding a drop marker for the bucket ends
/// the search.
pub struct Engine {
    pub(crate) mem: Memtable,
    /// Tables produced by flushes, newest first. Key ranges may overlap.
    pub(crate) l0_sstables: Vec<SSTableReader>,
    /// Tables produced by compaction, newest first.
    pub(crate) l1_sstables: Vec<SSTableReader>,
    pub(crate) wal_path: PathBuf,
    pub(crate) sst_dir: PathBuf,
    pub(crate) wal_writer: WalWriter,
    pub(crate) manifest: Manifest,
    pub(crate) seq: u64,
    pub(crate) flush_threshold: usize,
    /// 0 disables auto-compaction.
    pub(crate) l0_compaction_trigger: usize,
    pub(crate) wal_sync: bool,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("seq", &self.seq)
            .field("flush_threshold", &self.flush_threshold)
            .field("wal_sync", &self.wal_sync)
            .field("wal_path", &self.wal_path)
            .field("sst_dir", &self.sst_dir)
            .field("memtable_size", &self.mem.approx_size())
            .field("memtable_entries", &self.mem.len())
            .field("l0_sstable_count", &self.l0_sstables.len())
            .field("l1_sstable_count", &self.l1_sstables.len())
            .field("l0_compaction_trigger", &self.l0_compaction_trigger)
            .finish()
    }
}

impl Engine {
    /// Opens the engine described by `cfg`, creating its directories on first
    /// use.
    pub fn open(cfg: &StoreConfig) -> Result<Self> {
        let mut engine = Self::new(
            cfg.wal_path(),
            cfg.sst_dir(),
            cfg.flush_threshold,
            cfg.wal_sync,
        )?;
        engine.l0_compaction_trigger = cfg.l0_compaction_trigger;
        Ok(engine)
    }

    /// Creates an engine, recovering state from the WAL and the table files
    /// listed in the manifest.
    ///
    /// # Recovery steps
    ///
    /// 1. Create the table directory if missing.
    /// 2. Delete leftover `.sst.tmp` files from interrupted writes.
    /// 3. Replay the WAL into a fresh memtable.
    /// 4. Open the WAL writer in append mode.
    /// 5. Load tables from the manifest, or scan the directory when there is
    ///    no manifest yet.
    /// 6. Resume the sequence number at the highest one seen anywhere.
    pub fn new<P1: AsRef<Path>, P2: AsRef<Path>>(
        wal_path: P1,
        sst_dir: P2,
        flush_threshold: usize,
        wal_sync: bool,
    ) -> Result<Self> {
        let wal_path = wal_path.as_ref().to_path_buf();
        let sst_dir = sst_dir.as_ref().to_path_buf();

        if let Some(parent) = wal_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::create_dir_all(&sst_dir)?;
        Self::cleanup_tmp_files(&sst_dir);

        // Replay before opening the writer so the file is not held twice.
        let mut mem = Memtable::new();
        let wal_seq = replay_wal_and_build(&wal_path, &mut mem)?;
        let wal_writer = WalWriter::create(&wal_path, wal_sync)?;

        let mut manifest = Manifest::load_or_create(&sst_dir)?;
        let (l0_sstables, l1_sstables) = Self::load_tables(&sst_dir, &mut manifest)?;

        let table_seq = l0_sstables
            .iter()
            .chain(l1_sstables.iter())
            .map(SSTableReader::max_seq)
            .max()
            .unwrap_or(0);
        let seq = wal_seq.max(table_seq);

        tracing::info!(
            seq,
            wal_entries = mem.len(),
            l0 = l0_sstables.len(),
            l1 = l1_sstables.len(),
            "engine recovered"
        );

        Ok(Self {
            mem,
            l0_sstables,
            l1_sstables,
            wal_path,
            sst_dir,
            wal_writer,
            manifest,
            seq,
            flush_threshold,
            l0_compaction_trigger: DEFAULT_L0_COMPACTION_TRIGGER,
            wal_sync,
        })
    }

    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    #[must_use]
    pub fn flush_threshold(&self) -> usize {
        self.flush_threshold
    }

    pub fn set_flush_threshold(&mut self, threshold: usize) {
        self.flush_threshold = threshold;
    }

    #[must_use]
    pub fn l0_compaction_trigger(&self) -> usize {
        self.l0_compaction_trigger
    }

    /// Set to `0` to disable auto-compaction.
    pub fn set_l0_compaction_trigger(&mut self, trigger: usize) {
        self.l0_compaction_trigger = trigger;
    }

    /// Live entries buffered in the memtable.
    #[must_use]
    pub fn memtable_len(&self) -> usize {
        self.mem.len()
    }

    #[must_use]
    pub fn sstable_count(&self) -> usize {
        self.l0_sstables.len() + self.l1_sstables.len()
    }

    #[must_use]
    pub fn l0_sstable_count(&self) -> usize {
        self.l0_sstables.len()
    }

    #[must_use]
    pub fn l1_sstable_count(&self) -> usize {
        self.l1_sstables.len()
    }

    /// All tables, newest first: L0 then L1.
    pub(crate) fn tables(&self) -> impl Iterator<Item = &SSTableReader> {
        self.l0_sstables.iter().chain(self.l1_sstables.iter())
    }
}

/// Best-effort flush on drop. A failure leaves the data in the WAL, where the
/// next startup finds it.
impl Drop for Engine {
    fn drop(&mut self) {
        if !self.mem.is_empty() {
            if let Err(e) = self.flush() {
                tracing::warn!(error = %e, "flush on drop failed; data stays in the WAL");
            }
        }
    }
}

#[cfg(test)]
mod tests;
