use anyhow::Result;
use byteorder::{LittleEndian, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use memtable::{Memtable, ValueEntry};
use std::fs::{rename, OpenOptions};
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use crate::format::{write_chunk, Footer, KIND_DROP, KIND_VALUE};

/// One record destined for a table file.
///
/// Writers expect entries grouped by bucket in ascending bucket order; within
/// a bucket the drop marker (if any) comes first, followed by values in
/// ascending key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableEntry {
    Value {
        bucket: Vec<u8>,
        key: Vec<u8>,
        entry: ValueEntry,
    },
    Dropped { bucket: Vec<u8>, seq: u64 },
}

impl TableEntry {
    fn seq(&self) -> u64 {
        match self {
            TableEntry::Value { entry, .. } => entry.seq,
            TableEntry::Dropped { seq, .. } => *seq,
        }
    }
}

/// Stateless writer for immutable table files.
///
/// Data goes to `<path>.sst.tmp`, is fsynced, and is renamed into place, so a
/// crash mid-write leaves only a temp file that recovery deletes.
pub struct SSTableWriter {}

impl SSTableWriter {
    /// Flushes every bucket of `mem` (values and drop markers) to `path`.
    ///
    /// # Errors
    ///
    /// Refuses an empty memtable, and fails on any I/O error.
    pub fn write_from_memtable(path: &Path, mem: &Memtable) -> Result<()> {
        if mem.is_empty() {
            anyhow::bail!("refusing to write an empty table (empty memtable)");
        }
        let iter = mem.iter().flat_map(|(bucket, b)| {
            let marker = b.dropped_at.map(|seq| TableEntry::Dropped {
                bucket: bucket.clone(),
                seq,
            });
            let values = b.iter().map(move |(key, entry)| TableEntry::Value {
                bucket: bucket.clone(),
                key: key.clone(),
                entry: entry.clone(),
            });
            marker.into_iter().chain(values)
        });
        Self::write_from_iterator(path, iter)?;
        Ok(())
    }

    /// Streams `iter` into a new table file at `path`. Used by compaction so
    /// the merged data set never has to sit in a memtable.
    ///
    /// # File layout
    ///
    /// ```text
    /// [DATA]   repeated: crc32(u32) | bucket_len(u32) | bucket | key_len(u32) | key
    ///                    | seq(u64) | kind(u8) | [val_len(u32) | val]
    /// [INDEX]  repeated: bucket_len(u32) | bucket | key_len(u32) | key
    ///                    | kind(u8) | seq(u64) | data_offset(u64)
    /// [FOOTER] max_seq(u64) | index_offset(u64) | entry_count(u64) | magic(u32 = "BKT1")
    /// ```
    ///
    /// The CRC covers the record body after itself.
    ///
    /// Returns `false`, leaving no file behind, when the iterator yields
    /// nothing.
    ///
    /// # Errors
    ///
    /// Any I/O failure.
    pub fn write_from_iterator<I>(path: &Path, iter: I) -> Result<bool>
    where
        I: IntoIterator<Item = TableEntry>,
    {
        let tmp_path = path.with_extension("sst.tmp");
        let raw_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        let mut file = BufWriter::new(raw_file);

        // (bucket, key, kind, seq, offset)
        let mut index: Vec<(Vec<u8>, Vec<u8>, u8, u64, u64)> = Vec::new();
        let mut max_seq = 0u64;
        let mut record_buf: Vec<u8> = Vec::with_capacity(512);

        for item in iter {
            max_seq = max_seq.max(item.seq());

            record_buf.clear();
            let (bucket, key, kind, seq) = match item {
                TableEntry::Value { bucket, key, entry } => {
                    write_chunk(&mut record_buf, &bucket)?;
                    write_chunk(&mut record_buf, &key)?;
                    record_buf.write_u64::<LittleEndian>(entry.seq)?;
                    record_buf.write_u8(KIND_VALUE)?;
                    write_chunk(&mut record_buf, &entry.value)?;
                    (bucket, key, KIND_VALUE, entry.seq)
                }
                TableEntry::Dropped { bucket, seq } => {
                    write_chunk(&mut record_buf, &bucket)?;
                    write_chunk(&mut record_buf, &[])?;
                    record_buf.write_u64::<LittleEndian>(seq)?;
                    record_buf.write_u8(KIND_DROP)?;
                    (bucket, Vec::new(), KIND_DROP, seq)
                }
            };

            let mut hasher = Crc32::new();
            hasher.update(&record_buf);
            let crc = hasher.finalize();

            let offset = file.stream_position()?;
            file.write_u32::<LittleEndian>(crc)?;
            file.write_all(&record_buf)?;

            index.push((bucket, key, kind, seq, offset));
        }

        if index.is_empty() {
            drop(file);
            std::fs::remove_file(&tmp_path)?;
            return Ok(false);
        }

        let index_offset = file.stream_position()?;
        for (bucket, key, kind, seq, data_offset) in &index {
            write_chunk(&mut file, bucket)?;
            write_chunk(&mut file, key)?;
            file.write_u8(*kind)?;
            file.write_u64::<LittleEndian>(*seq)?;
            file.write_u64::<LittleEndian>(*data_offset)?;
        }

        Footer {
            max_seq,
            index_offset,
            entry_count: index.len() as u64,
        }
        .write_to(&mut file)?;

        file.flush()?;
        file.into_inner()?.sync_all()?;

        rename(&tmp_path, path)?;

        // Make the rename itself durable on ext4/XFS.
        if let Some(parent) = path.parent() {
            if let Ok(dir) = std::fs::File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        Ok(true)
    }
}
