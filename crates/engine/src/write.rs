/// Write path: `put()`, `drop_bucket()`, `force_flush()`, and the internal
/// `flush()`.
///
/// Every mutation is appended to the WAL before it is applied to the
/// memtable. Crossing the flush threshold persists the memtable as a new L0
/// table.
use anyhow::{ensure, Result};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use wal::{WalRecord, WalWriter};

use crate::{
    Engine, Level, SSTableReader, SSTableWriter, MAX_BUCKET_SIZE, MAX_KEY_SIZE, MAX_VALUE_SIZE,
};

pub(crate) fn validate_bucket(bucket: &[u8]) -> Result<()> {
    ensure!(!bucket.is_empty(), "bucket must not be empty");
    ensure!(
        bucket.len() <= MAX_BUCKET_SIZE,
        "bucket too large: {} bytes (max {})",
        bucket.len(),
        MAX_BUCKET_SIZE
    );
    Ok(())
}

impl Engine {
    /// Stores `value` under `key` in `bucket`, creating the bucket if needed.
    ///
    /// # Errors
    ///
    /// Rejects an empty bucket or key and oversized inputs; propagates WAL
    /// failures. Once the record is in the WAL the write is acknowledged: a
    /// failed threshold flush is logged and retried by the next write.
    pub fn put(&mut self, bucket: Vec<u8>, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        validate_bucket(&bucket)?;
        ensure!(!key.is_empty(), "key must not be empty");
        ensure!(
            key.len() <= MAX_KEY_SIZE,
            "key too large: {} bytes (max {})",
            key.len(),
            MAX_KEY_SIZE
        );
        ensure!(
            value.len() <= MAX_VALUE_SIZE,
            "value too large: {} bytes (max {})",
            value.len(),
            MAX_VALUE_SIZE
        );

        let seq = self.next_seq()?;
        self.wal_writer.append(&WalRecord::Put {
            seq,
            bucket: bucket.clone(),
            key: key.clone(),
            value: value.clone(),
        })?;
        self.mem.put(bucket, key, value, seq);

        self.maybe_flush();
        Ok(())
    }

    /// Removes `bucket` and everything in it.
    ///
    /// Returns `false`, writing nothing, when the bucket holds no live data.
    pub fn drop_bucket(&mut self, bucket: &[u8]) -> Result<bool> {
        validate_bucket(bucket)?;
        if !self.bucket_exists(bucket)? {
            return Ok(false);
        }

        let seq = self.next_seq()?;
        self.wal_writer.append(&WalRecord::DropBucket {
            seq,
            bucket: bucket.to_vec(),
        })?;
        self.mem.drop_bucket(bucket.to_vec(), seq);
        tracing::debug!(seq, bucket = %String::from_utf8_lossy(bucket), "bucket dropped");

        self.maybe_flush();
        Ok(true)
    }

    /// Flushes the memtable now. A no-op when it is empty.
    pub fn force_flush(&mut self) -> Result<()> {
        if self.mem.is_empty() {
            return Ok(());
        }
        self.flush()
    }

    fn next_seq(&mut self) -> Result<u64> {
        self.seq = self
            .seq
            .checked_add(1)
            .ok_or_else(|| anyhow::anyhow!("sequence number overflow (u64::MAX reached)"))?;
        Ok(self.seq)
    }

    /// Flushes once the memtable crosses the threshold. The triggering write
    /// is already in the WAL, so a failure here is reported and left for the
    /// next write to retry.
    fn maybe_flush(&mut self) {
        if self.mem.approx_size() < self.flush_threshold {
            return;
        }
        if let Err(e) = self.flush() {
            tracing::warn!(
                error = %e,
                memtable_size = self.mem.approx_size(),
                "threshold flush failed; records stay in the WAL"
            );
        }
    }

    /// Picks an unused `tbl-{seq}-{millis}.sst` name. The seq is zero-padded
    /// so lexical order matches seq order.
    pub(crate) fn new_table_path(&self) -> Result<(String, PathBuf)> {
        let mut ts = SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis();
        loop {
            let name = format!("tbl-{:020}-{}.sst", self.seq, ts);
            let path = self.sst_dir.join(&name);
            if !path.exists() {
                return Ok((name, path));
            }
            ts += 1;
        }
    }

    /// Writes the memtable to `tbl-{seq}-{millis}.sst`, registers it as L0,
    /// truncates the WAL and resets the memtable. Compacts afterwards when
    /// the L0 count reaches the trigger.
    pub(crate) fn flush(&mut self) -> Result<()> {
        let (name, path) = self.new_table_path()?;
        SSTableWriter::write_from_memtable(&path, &self.mem)?;

        self.manifest.add(name.clone(), Level::L0);
        self.manifest.save()?;

        // Table and manifest are durable; the WAL can go.
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.wal_path)?;
        self.wal_writer = WalWriter::create(&self.wal_path, self.wal_sync)?;

        let flushed = self.mem.len();
        self.mem.clear();

        let reader = SSTableReader::open(&path)?;
        self.l0_sstables.insert(0, reader);
        tracing::info!(
            table = %name,
            entries = flushed,
            l0 = self.l0_sstables.len(),
            "memtable flushed"
        );

        if self.l0_compaction_trigger > 0 && self.l0_sstables.len() >= self.l0_compaction_trigger
        {
            self.compact()?;
        }
        Ok(())
    }
}
