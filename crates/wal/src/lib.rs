//! # WAL - Write-Ahead Log
//!
//! Crash-safe durability for the bucketed storage engine.
//!
//! Every mutation (a `PUT` into a bucket or the removal of a whole bucket) is
//! serialized into a binary record and appended to the WAL **before** the
//! memtable is touched. On restart the WAL is replayed to rebuild the
//! memtable, so no acknowledged write is lost.
//!
//! ## Binary Record Format
//!
//! ```text
//! [record_len: u32 LE][crc32: u32 LE][body ...]
//! ```
//!
//! Body (Put):        `[seq: u64][op=0: u8][bucket_len: u32][bucket][key_len: u32][key][val_len: u32][value]`
//! Body (DropBucket): `[seq: u64][op=1: u8][bucket_len: u32][bucket]`
//!
//! `record_len` includes the 4-byte CRC but **not** itself.
//!
//! ## Example
//!
//! ```rust,no_run
//! use wal::{WalWriter, WalReader, WalRecord};
//!
//! let mut w = WalWriter::create("wal.log", true).unwrap();
//! w.append(&WalRecord::Put {
//!     seq: 1,
//!     bucket: b"alice-20170101120000".to_vec(),
//!     key: b"http://www.example.com".to_vec(),
//!     value: b"{}".to_vec(),
//! }).unwrap();
//! drop(w);
//!
//! let mut r = WalReader::open("wal.log").unwrap();
//! r.replay(|rec| println!("{:?}", rec)).unwrap();
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use thiserror::Error;

const OP_PUT: u8 = 0;
const OP_DROP_BUCKET: u8 = 1;

/// `record_len` plus `crc32`.
const FRAME_HEADER: usize = 8;

/// Upper bound on a single framed record. Anything larger is corruption.
const MAX_RECORD_SIZE: u32 = 64 * 1024 * 1024;

/// A single logged mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalRecord {
    /// Insert or overwrite `key` inside `bucket`.
    Put {
        seq: u64,
        bucket: Vec<u8>,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    /// Remove `bucket` together with every key it holds.
    DropBucket { seq: u64, bucket: Vec<u8> },
}

impl WalRecord {
    /// Sequence number assigned by the engine.
    #[must_use]
    pub fn seq(&self) -> u64 {
        match self {
            WalRecord::Put { seq, .. } | WalRecord::DropBucket { seq, .. } => *seq,
        }
    }

    fn encode_body(&self, out: &mut Vec<u8>) -> io::Result<()> {
        out.write_u64::<LittleEndian>(self.seq())?;
        match self {
            WalRecord::Put {
                bucket, key, value, ..
            } => {
                out.write_u8(OP_PUT)?;
                for field in [bucket, key, value] {
                    write_field(out, field)?;
                }
            }
            WalRecord::DropBucket { bucket, .. } => {
                out.write_u8(OP_DROP_BUCKET)?;
                write_field(out, bucket)?;
            }
        }
        Ok(())
    }

    fn decode_body(mut body: &[u8]) -> Result<Self, WalError> {
        let seq = body.read_u64::<LittleEndian>()?;
        let op = body.read_u8()?;
        let bucket = read_field(&mut body)?;

        let record = match op {
            OP_PUT => WalRecord::Put {
                seq,
                bucket,
                key: read_field(&mut body)?,
                value: read_field(&mut body)?,
            },
            OP_DROP_BUCKET => WalRecord::DropBucket { seq, bucket },
            _ => return Err(WalError::Corrupt),
        };
        if !body.is_empty() {
            return Err(WalError::Corrupt);
        }
        Ok(record)
    }
}

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A record failed CRC validation, had an impossible length, an unknown
    /// op code or trailing bytes.
    #[error("corrupt record")]
    Corrupt,
}

/// Append-only WAL writer.
///
/// A record is framed in a reusable buffer and written with one
/// `write_all`, so a crash leaves at most one partial frame at the tail.
/// With `sync` enabled every append is followed by `sync_all()`.
pub struct WalWriter {
    file: File,
    sync: bool,
    frame: Vec<u8>,
}

impl WalWriter {
    /// Opens (or creates) a WAL file in append mode.
    pub fn create<P: AsRef<Path>>(path: P, sync: bool) -> Result<Self, WalError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file,
            sync,
            frame: Vec::with_capacity(512),
        })
    }

    /// Serializes `record` and appends it to the log.
    pub fn append(&mut self, record: &WalRecord) -> Result<(), WalError> {
        self.frame.clear();
        self.frame.resize(FRAME_HEADER, 0);
        record.encode_body(&mut self.frame)?;

        let body = &self.frame[FRAME_HEADER..];
        let record_len = u32::try_from(body.len() + 4)
            .ok()
            .filter(|len| *len <= MAX_RECORD_SIZE)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "WAL record too large"))?;
        let crc = crc32fast::hash(body);

        self.frame[0..4].copy_from_slice(&record_len.to_le_bytes());
        self.frame[4..8].copy_from_slice(&crc.to_le_bytes());
        self.file.write_all(&self.frame)?;

        if self.sync {
            self.file.sync_all()?;
        }
        Ok(())
    }
}

fn write_field(out: &mut Vec<u8>, bytes: &[u8]) -> io::Result<()> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "WAL field exceeds u32::MAX"))?;
    out.write_u32::<LittleEndian>(len)?;
    out.extend_from_slice(bytes);
    Ok(())
}

fn read_field(body: &mut &[u8]) -> Result<Vec<u8>, WalError> {
    let len = body.read_u32::<LittleEndian>()? as usize;
    if len > body.len() {
        return Err(WalError::Corrupt);
    }
    let (field, tail) = body.split_at(len);
    *body = tail;
    Ok(field.to_vec())
}

/// Maps an EOF in the middle of a frame to `None`: a torn tail write.
fn tolerate_eof<T>(res: io::Result<T>) -> Result<Option<T>, WalError> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(WalError::Io(e)),
    }
}

/// Sequential WAL reader.
///
/// Generic over `Read` so tests can replay in-memory buffers. A truncated
/// tail (crash mid-append) ends the replay cleanly; a CRC mismatch does not.
pub struct WalReader<R: Read> {
    rdr: BufReader<R>,
}

impl WalReader<File> {
    /// Opens an existing WAL file for replay.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<WalReader<File>, WalError> {
        Ok(Self::from_reader(File::open(path)?))
    }
}

impl<R: Read> WalReader<R> {
    pub fn from_reader(reader: R) -> Self {
        WalReader {
            rdr: BufReader::new(reader),
        }
    }

    /// Replays every valid record, calling `apply` for each, and returns the
    /// length in bytes of the valid prefix of the log.
    ///
    /// - clean EOF or truncated tail -> `Ok(valid_len)`
    /// - CRC mismatch, absurd length or unknown op -> `Err(WalError::Corrupt)`
    /// - I/O error -> `Err(WalError::Io(..))`
    ///
    /// A torn tail must be cut back to `valid_len` before new records are
    /// appended, or the next replay reads into them and reports corruption.
    pub fn replay<F>(&mut self, mut apply: F) -> Result<u64, WalError>
    where
        F: FnMut(WalRecord),
    {
        let mut body = Vec::with_capacity(512);
        let mut valid_len = 0u64;

        loop {
            let Some(record_len) = tolerate_eof(self.rdr.read_u32::<LittleEndian>())? else {
                return Ok(valid_len);
            };
            if record_len <= 4 || record_len > MAX_RECORD_SIZE {
                return Err(WalError::Corrupt);
            }
            let Some(crc) = tolerate_eof(self.rdr.read_u32::<LittleEndian>())? else {
                return Ok(valid_len);
            };

            body.clear();
            body.resize((record_len - 4) as usize, 0);
            if tolerate_eof(self.rdr.read_exact(&mut body))?.is_none() {
                return Ok(valid_len);
            }

            if crc32fast::hash(&body) != crc {
                return Err(WalError::Corrupt);
            }
            apply(WalRecord::decode_body(&body)?);
            valid_len += 4 + u64::from(record_len);
        }
    }
}
