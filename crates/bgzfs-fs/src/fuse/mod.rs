//! FUSE filesystem adapter for the overlay.
//!
//! This module bridges kernel requests to the overlay core, presenting the
//! source directory with every recognized `.gz`/`.gz.gzi` triple rewritten
//! into a single uncompressed-looking file.
//!
//! # Features
//!
//! - **Read-only**: the mount never writes to the underlying store
//! - **Random access**: reads seek the compressed stream via its index
//!   instead of decoding from byte 0
//! - **Passthrough**: everything that is not a recognized triple is served
//!   unchanged
//!
//! # Example
//!
//! ```ignore
//! use bgzfs_fs::fuse::mount;
//! use bgzfs_fs::{Overlay, OverlayConfig};
//!
//! let overlay = Overlay::new("/data", OverlayConfig::default());
//! mount(overlay, "/mnt/data", false)?;
//! ```

mod adapter;

pub use adapter::*;
