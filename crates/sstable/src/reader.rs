use anyhow::{bail, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use crc32fast::Hasher as Crc32;
use memtable::ValueEntry;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::format::{
    read_chunk, Footer, FOOTER_BYTES, KIND_DROP, KIND_VALUE, MAX_BUCKET_BYTES, MAX_KEY_BYTES,
    MAX_VALUE_BYTES,
};

/// Index for one bucket inside a table file.
#[derive(Debug, Default)]
struct TableBucket {
    dropped_at: Option<u64>,
    /// key -> data-section offset of its record
    keys: BTreeMap<Vec<u8>, u64>,
}

/// Read handle for a table file.
///
/// `open` loads the whole index (bucket -> key -> offset, plus drop markers)
/// into memory. Values stay on disk and are fetched with one seek + read
/// through a persistent handle, guarded by a `Mutex` so lookups work through
/// `&self`.
pub struct SSTableReader {
    path: PathBuf,
    buckets: BTreeMap<Vec<u8>, TableBucket>,
    file: Mutex<BufReader<File>>,
    footer: Footer,
}

impl SSTableReader {
    /// Opens a table file and loads its index.
    ///
    /// # Errors
    ///
    /// Fails when the file is too small, the magic is wrong, the index offset
    /// points outside the file, or on any I/O error.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let mut f = File::open(&path_buf)
            .with_context(|| format!("failed to open table {}", path_buf.display()))?;
        let filesize = f.metadata()?.len();

        let footer = Footer::read_from(&mut f)
            .with_context(|| format!("bad footer in {}", path_buf.display()))?;
        let index_end = filesize - FOOTER_BYTES;
        if footer.index_offset > index_end {
            bail!("invalid index_offset in {}", path_buf.display());
        }

        f.seek(SeekFrom::Start(footer.index_offset))?;
        let mut rdr = BufReader::new(f);
        let mut buckets: BTreeMap<Vec<u8>, TableBucket> = BTreeMap::new();
        let mut pos = footer.index_offset;

        for _ in 0..footer.entry_count {
            if pos >= index_end {
                bail!("corrupt index: fewer entries than footer claims");
            }
            let bucket = read_chunk(&mut rdr, MAX_BUCKET_BYTES, "bucket")?;
            let key = read_chunk(&mut rdr, MAX_KEY_BYTES, "key")?;
            let kind = rdr.read_u8()?;
            let seq = rdr.read_u64::<LittleEndian>()?;
            let data_offset = rdr.read_u64::<LittleEndian>()?;
            pos += (4 + bucket.len() + 4 + key.len() + 1 + 8 + 8) as u64;

            let entry = buckets.entry(bucket).or_default();
            match kind {
                KIND_VALUE => {
                    entry.keys.insert(key, data_offset);
                }
                KIND_DROP => entry.dropped_at = Some(seq),
                other => bail!("corrupt index: unknown record kind {}", other),
            }
        }

        let mut f = rdr.into_inner();
        f.seek(SeekFrom::Start(0))?;

        Ok(Self {
            path: path_buf,
            buckets,
            file: Mutex::new(BufReader::new(f)),
            footer,
        })
    }

    /// Point lookup of `key` in `bucket`.
    ///
    /// Returns `Ok(None)` when this table holds no value for the key. A drop
    /// marker is not reported here; see [`dropped_at`](Self::dropped_at).
    ///
    /// # Errors
    ///
    /// I/O failure, CRC mismatch, or an index entry pointing at a different
    /// record.
    pub fn get(&self, bucket: &[u8], key: &[u8]) -> Result<Option<ValueEntry>> {
        let offset = match self.buckets.get(bucket).and_then(|b| b.keys.get(key)) {
            Some(&o) => o,
            None => return Ok(None),
        };

        let mut f = self
            .file
            .lock()
            .map_err(|e| anyhow::anyhow!("lock poisoned: {}", e))?;
        f.seek(SeekFrom::Start(offset))?;

        let stored_crc = f.read_u32::<LittleEndian>()?;
        let bucket_buf = read_chunk(&mut *f, MAX_BUCKET_BYTES, "bucket")?;
        let key_buf = read_chunk(&mut *f, MAX_KEY_BYTES, "key")?;
        if bucket_buf != bucket || key_buf != key {
            bail!("index pointed to mismatching record at offset {}", offset);
        }
        let seq = f.read_u64::<LittleEndian>()?;
        let kind = f.read_u8()?;
        if kind != KIND_VALUE {
            bail!("expected value record at offset {}, found kind {}", offset, kind);
        }
        let value = read_chunk(&mut *f, MAX_VALUE_BYTES, "value")?;

        let mut hasher = Crc32::new();
        hasher.update(&(bucket_buf.len() as u32).to_le_bytes());
        hasher.update(&bucket_buf);
        hasher.update(&(key_buf.len() as u32).to_le_bytes());
        hasher.update(&key_buf);
        hasher.update(&seq.to_le_bytes());
        hasher.update(&[kind]);
        hasher.update(&(value.len() as u32).to_le_bytes());
        hasher.update(&value);
        let actual_crc = hasher.finalize();
        if actual_crc != stored_crc {
            bail!(
                "CRC32 mismatch at offset {} in {}: expected {:#010x}, got {:#010x}",
                offset,
                self.path.display(),
                stored_crc,
                actual_crc
            );
        }

        Ok(Some(ValueEntry { seq, value }))
    }

    /// Sequence number of the drop marker this table holds for `bucket`.
    #[must_use]
    pub fn dropped_at(&self, bucket: &[u8]) -> Option<u64> {
        self.buckets.get(bucket).and_then(|b| b.dropped_at)
    }

    /// `true` when this table holds at least one value in `bucket`.
    #[must_use]
    pub fn has_values(&self, bucket: &[u8]) -> bool {
        self.buckets
            .get(bucket)
            .map(|b| !b.keys.is_empty())
            .unwrap_or(false)
    }

    /// Every bucket mentioned in this table (values or drop markers), sorted.
    pub fn bucket_names(&self) -> impl Iterator<Item = &[u8]> {
        self.buckets.keys().map(|b| b.as_slice())
    }

    /// Keys of `bucket` in ascending order.
    pub fn keys<'a>(&'a self, bucket: &[u8]) -> impl Iterator<Item = &'a [u8]> + 'a {
        self.buckets
            .get(bucket)
            .into_iter()
            .flat_map(|b| b.keys.keys().map(|k| k.as_slice()))
    }

    #[must_use]
    pub fn max_seq(&self) -> u64 {
        self.footer.max_seq
    }

    /// Number of records (values and drop markers).
    #[must_use]
    pub fn len(&self) -> usize {
        self.footer.entry_count as usize
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.footer.entry_count == 0
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for SSTableReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SSTableReader")
            .field("path", &self.path)
            .field("buckets", &self.buckets.len())
            .field("entries", &self.footer.entry_count)
            .field("max_seq", &self.footer.max_seq)
            .finish()
    }
}
