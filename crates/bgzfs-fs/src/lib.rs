//! # bgzfs-fs
//!
//! Overlay filesystem that presents bgzip-compressed, `.gzi`-indexed files
//! as plain uncompressed files, without ever materializing the decompressed
//! bytes on disk.
//!
//! For a logical file `stem`, the underlying directory holds `stem.gz`
//! (the compressed payload) and `stem.gz.gzi` (its seek index). When
//! `stem` itself is absent, the overlay synthesizes it: attribute queries
//! report the true uncompressed length, random-offset reads are serviced
//! by seeking into the indexed compressed stream, and directory listings
//! show the triple as the single name `stem`. Everything else passes
//! through unchanged.
//!
//! This crate provides:
//! - The overlay core: path classification, size resolution, handle
//!   lifecycle and directory rewriting ([`Overlay`])
//! - A FUSE adapter and mount helpers ([`fuse`])
//!
//! ## Example
//!
//! ```ignore
//! use bgzfs_fs::{Overlay, OverlayConfig};
//!
//! let overlay = Overlay::new("/data", OverlayConfig::default());
//!
//! let attrs = overlay.getattr("big.tar")?; // synthesized from big.tar.gz
//! let fh = overlay.open("big.tar")?;
//! let bytes = overlay.read(fh, 1 << 20, 4096)?;
//! overlay.release(fh)?;
//! ```

mod cache;
mod classify;
mod error;
mod handle;
mod list;
mod overlay;
mod size;
mod store;

pub mod fuse;

pub use classify::{stem, Classification};
pub use error::{Error, Result};
pub use list::{OverlayDirEntry, OverlayReadDir};
pub use overlay::{EntryKind, FileAttributes, Overlay, OverlayConfig};
pub use store::FsStats;

// Re-export bgzfs-format types for convenience
pub use bgzfs_format::{BgzfReader, GziIndex, IndexRecord};
