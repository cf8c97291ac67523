//! # bgzfs-format
//!
//! Seek-index (`.gzi`) parsing and random-access reading for BGZF-style
//! gzip streams, where the compressed file is a series of independently
//! decodable gzip members.
//!
//! This crate provides:
//! - `.gzi` index parsing and serialization ([`GziIndex`])
//! - Checkpoint lookup by uncompressed offset
//! - A seekable decoder over the compressed stream ([`BgzfReader`])
//!
//! ## Example
//!
//! ```ignore
//! use bgzfs_format::{BgzfReader, GziIndex};
//! use std::fs::{self, File};
//! use std::io::Read;
//!
//! let index = GziIndex::from_bytes(&fs::read("data.bin.gz.gzi")?)?;
//! let mut reader = BgzfReader::new(File::open("data.bin.gz")?, index)?;
//!
//! reader.seek_uncompressed(1 << 20)?;
//! let mut buf = vec![0u8; 4096];
//! let n = reader.read(&mut buf)?;
//! ```

mod error;
mod index;
mod reader;

pub use error::{Error, Result};
pub use index::{GziIndex, IndexRecord};
pub use reader::BgzfReader;
