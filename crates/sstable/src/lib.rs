//! # SSTable — Sorted String Table
//!
//! Immutable on-disk tables for the SiltKV storage engine.
//!
//! When the memtable crosses its size threshold the engine flushes it to
//! disk as a sorted table. Tables are *write-once, read-many*: once
//! created they are never modified, only deleted after compaction folds
//! them into a level file.
//!
//! ## File layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ METADATA HEADER (1 + 3·4 + 2·K bytes)                        │
//! │                                                              │
//! │ is_level (u8: 0x00 raw / 0xFF level) | serial (u32)          │
//! │ pair_count (u32) | filter_size (u32)                         │
//! │ min_key (K bytes, padded) | max_key (K bytes, padded)        │
//! ├──────────────────────────────────────────────────────────────┤
//! │ BLOOM SECTION (filter_size bytes)                            │
//! │                                                              │
//! │ hash_count (u32) | bit_count (u32) | packed bits             │
//! ├──────────────────────────────────────────────────────────────┤
//! │ PAIR SECTION (pair_count × (K + 8) bytes, ascending by key)  │
//! │                                                              │
//! │ padded_key (K bytes) | offset (u32) | size (u32)             │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. `K` is the engine's configured key
//! size, so every pair has the same stride and the search can seek
//! straight to the i-th record. Records with `size == 0` are persisted
//! tombstones.
//!
//! A point lookup runs three increasingly expensive checks: min/max range
//! rejection, bloom filter test, then a binary search that seeks and reads
//! one pair per probe.

mod meta;
mod table;

pub use meta::{pair_stride, TableMeta};
pub use table::SsTable;

#[cfg(test)]
mod tests;
