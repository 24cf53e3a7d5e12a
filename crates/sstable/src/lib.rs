//! # SSTable - Sorted, bucketed table files
//!
//! Immutable on-disk files produced when the engine flushes its memtable or
//! compacts older tables. A table is written once and only ever replaced as
//! a whole.
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ DATA SECTION (sorted by bucket, then key)                     │
//! │                                                               │
//! │ crc32 (u32) | bucket_len (u32) | bucket | key_len (u32) | key │
//! │ seq (u64) | kind (u8) | [val_len (u32) | val]                 │
//! │                                                               │
//! │ kind 0 = bucket drop marker (empty key, no value)             │
//! │ kind 1 = value                                                │
//! ├───────────────────────────────────────────────────────────────┤
//! │ INDEX SECTION                                                 │
//! │                                                               │
//! │ bucket_len | bucket | key_len | key | kind | seq | offset     │
//! ├───────────────────────────────────────────────────────────────┤
//! │ FOOTER (last 28 bytes)                                        │
//! │                                                               │
//! │ max_seq | index_offset | entry_count | magic "BKT1"           │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian.
//!
//! A drop marker records that the bucket was removed at `seq`: every value
//! for that bucket in an *older* table is dead. Values in the same table are
//! always newer than its marker.

mod format;
mod reader;
mod writer;

pub use format::{Footer, FOOTER_BYTES, TABLE_MAGIC};
pub use reader::SSTableReader;
pub use writer::{SSTableWriter, TableEntry};
