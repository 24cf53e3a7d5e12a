//! Table file constants, record kinds and footer read/write helpers.
//!
//! ## Footer (28 bytes) - magic `BKT1` (`0x424B_5431`)
//!
//! ```text
//! [max_seq: u64 LE][index_offset: u64 LE][entry_count: u64 LE][magic: u32 LE]
//! ```
//!
//! The reader checks the magic first and only then trusts the offsets.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Result as IoResult, Seek, SeekFrom, Write};

/// Magic number identifying bucketed table files (ASCII "BKT1").
pub const TABLE_MAGIC: u32 = 0x424B_5431;

/// Footer size: `max_seq` + `index_offset` + `entry_count` + `magic`.
pub const FOOTER_BYTES: u64 = 8 + 8 + 8 + 4;

/// Record kind byte for a bucket drop marker (empty key, no value).
pub const KIND_DROP: u8 = 0;

/// Record kind byte for a live value.
pub const KIND_VALUE: u8 = 1;

/// Upper bound on a bucket name read from disk.
pub const MAX_BUCKET_BYTES: usize = 4 * 1024;
/// Upper bound on a key read from disk.
pub const MAX_KEY_BYTES: usize = 64 * 1024;
/// Upper bound on a value read from disk.
pub const MAX_VALUE_BYTES: usize = 10 * 1024 * 1024;

/// Parsed table footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub max_seq: u64,
    pub index_offset: u64,
    /// Number of records (values and drop markers) in the data section.
    pub entry_count: u64,
}

impl Footer {
    pub fn write_to<W: Write>(&self, w: &mut W) -> IoResult<()> {
        w.write_u64::<LittleEndian>(self.max_seq)?;
        w.write_u64::<LittleEndian>(self.index_offset)?;
        w.write_u64::<LittleEndian>(self.entry_count)?;
        w.write_u32::<LittleEndian>(TABLE_MAGIC)?;
        Ok(())
    }

    /// Reads the footer from the end of `r`. Leaves the cursor at EOF.
    pub fn read_from<R: Read + Seek>(r: &mut R) -> IoResult<Self> {
        let filesize = r.seek(SeekFrom::End(0))?;
        if filesize < FOOTER_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "file too small for table footer",
            ));
        }

        r.seek(SeekFrom::End(-4))?;
        let magic = r.read_u32::<LittleEndian>()?;
        if magic != TABLE_MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown table magic: {:#x}", magic),
            ));
        }

        r.seek(SeekFrom::End(-(FOOTER_BYTES as i64)))?;
        let max_seq = r.read_u64::<LittleEndian>()?;
        let index_offset = r.read_u64::<LittleEndian>()?;
        let entry_count = r.read_u64::<LittleEndian>()?;
        Ok(Self {
            max_seq,
            index_offset,
            entry_count,
        })
    }
}

/// Writes `[len: u32][bytes]`.
pub(crate) fn write_chunk<W: Write>(w: &mut W, bytes: &[u8]) -> IoResult<()> {
    w.write_u32::<LittleEndian>(bytes.len() as u32)?;
    w.write_all(bytes)
}

/// Reads a `[len: u32][bytes]` chunk, refusing lengths above `max`.
pub(crate) fn read_chunk<R: Read>(r: &mut R, max: usize, what: &str) -> IoResult<Vec<u8>> {
    let len = r.read_u32::<LittleEndian>()? as usize;
    if len > max {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("corrupt table: {} length {} exceeds maximum {}", what, len, max),
        ));
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}
