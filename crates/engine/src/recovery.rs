/// Cold-start path: WAL replay, table loading, and manifest bootstrap for a
/// directory that has tables but no manifest.
use anyhow::{Context, Result};
use memtable::Memtable;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use wal::{WalReader, WalRecord};

use crate::{Engine, Level, Manifest, SSTableReader};

/// Replays the WAL at `path` into `mem` and returns the highest sequence
/// number seen. A missing WAL is a fresh start and yields `Ok(0)`.
///
/// A torn record at the tail is cut off, so records appended afterwards
/// follow the last complete one.
///
/// # Errors
///
/// Corrupt records and I/O errors from [`WalReader::replay`], or a failure
/// truncating the torn tail.
pub fn replay_wal_and_build<P: AsRef<Path>>(path: P, mem: &mut Memtable) -> Result<u64> {
    let mut reader = match WalReader::open(path.as_ref()) {
        Ok(reader) => reader,
        Err(wal::WalError::Io(ref e)) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(0);
        }
        Err(e) => return Err(anyhow::anyhow!(e).context("failed to open WAL for replay")),
    };

    let mut max_seq = 0u64;
    let mut replayed = 0usize;
    let valid_len = reader
        .replay(|record| {
            max_seq = max_seq.max(record.seq());
            replayed += 1;
            match record {
                WalRecord::Put {
                    seq,
                    bucket,
                    key,
                    value,
                } => mem.put(bucket, key, value, seq),
                WalRecord::DropBucket { seq, bucket } => mem.drop_bucket(bucket, seq),
            }
        })
        .with_context(|| format!("failed to replay WAL {}", path.as_ref().display()))?;
    drop(reader);

    let file_len = std::fs::metadata(path.as_ref())?.len();
    if file_len > valid_len {
        tracing::warn!(
            path = %path.as_ref().display(),
            valid_len,
            torn_bytes = file_len - valid_len,
            "truncating torn WAL tail"
        );
        let file = OpenOptions::new().write(true).open(path.as_ref())?;
        file.set_len(valid_len)?;
        file.sync_all()?;
    }

    if replayed > 0 {
        tracing::debug!(records = replayed, max_seq, "WAL replayed");
    }
    Ok(max_seq)
}

impl Engine {
    /// Opens the tables listed in `manifest`, returning `(l0, l1)` newest
    /// first. Without a manifest every `.sst` file in `sst_dir` is loaded as
    /// L0 and the manifest is written from what was found.
    pub(crate) fn load_tables(
        sst_dir: &Path,
        manifest: &mut Manifest,
    ) -> Result<(Vec<SSTableReader>, Vec<SSTableReader>)> {
        if !manifest.is_empty() {
            let l0 = Self::open_listed(sst_dir, manifest.filenames(Level::L0))?;
            let l1 = Self::open_listed(sst_dir, manifest.filenames(Level::L1))?;
            return Ok((l0, l1));
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(sst_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "sst").unwrap_or(false))
            .collect();
        // Names embed the zero-padded seq: reverse lexical order is newest first.
        paths.sort();
        paths.reverse();

        let mut l0 = Vec::with_capacity(paths.len());
        for path in &paths {
            l0.push(SSTableReader::open(path)?);
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                manifest.push(name.to_string(), Level::L0);
            }
        }
        if !paths.is_empty() {
            tracing::info!(tables = paths.len(), "manifest rebuilt from directory scan");
            manifest.save()?;
        }
        Ok((l0, Vec::new()))
    }

    fn open_listed(sst_dir: &Path, names: Vec<&str>) -> Result<Vec<SSTableReader>> {
        let mut readers = Vec::with_capacity(names.len());
        for name in names {
            let path = sst_dir.join(name);
            if !path.exists() {
                tracing::warn!(table = name, "manifest lists a missing table; skipping");
                continue;
            }
            readers.push(SSTableReader::open(&path)?);
        }
        Ok(readers)
    }

    /// Deletes `.sst.tmp` files left behind by interrupted writes.
    pub(crate) fn cleanup_tmp_files(sst_dir: &Path) {
        let Ok(entries) = std::fs::read_dir(sst_dir) else {
            return;
        };
        for entry in entries.flatten() {
            let p = entry.path();
            let is_tmp = p
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with(".sst.tmp"))
                .unwrap_or(false);
            if is_tmp {
                match std::fs::remove_file(&p) {
                    Ok(()) => tracing::debug!(path = %p.display(), "removed stale tmp table"),
                    Err(e) => tracing::warn!(path = %p.display(), error = %e, "cannot remove tmp table"),
                }
            }
        }
    }
}
