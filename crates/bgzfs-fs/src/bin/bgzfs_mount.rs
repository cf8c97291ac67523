//! bgzfs-mount: mount a directory with transparent bgzip decompression.
//!
//! Presents a source directory at a mount point with every recognized
//! `<file>.gz` / `<file>.gz.gzi` pair exposed as the single uncompressed
//! file `<file>`.
//!
//! # Usage
//!
//! ```bash
//! bgzfs-mount /data /mnt/data
//!
//! # Then read the virtual files as if they were never compressed:
//! tail -c 100 /mnt/data/huge.tar
//! ```

use clap::Parser;
use env_logger::Env;
use log::{error, info};
use std::path::PathBuf;
use std::process;

use bgzfs_fs::fuse;
use bgzfs_fs::{Overlay, OverlayConfig};

/// Mount a directory with transparent bgzip decompression.
///
/// Files compressed with `bgzip` that carry a matching `.gzi` index appear
/// at the mount point as plain uncompressed files; everything else is
/// passed through read-only.
#[derive(Parser, Debug)]
#[command(name = "bgzfs-mount")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Source directory holding the compressed files
    #[arg(value_name = "SOURCE")]
    source: PathBuf,

    /// Empty directory to mount the overlay on
    #[arg(value_name = "MOUNTPOINT")]
    mountpoint: PathBuf,

    /// Allow other users to access the mount
    #[arg(short, long)]
    allow_other: bool,

    /// Keep computed uncompressed sizes in memory only
    #[arg(long)]
    no_size_cache: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    if !args.source.is_dir() {
        error!("Source is not a directory: {}", args.source.display());
        process::exit(1);
    }
    if !args.mountpoint.is_dir() {
        error!("Mount point is not a directory: {}", args.mountpoint.display());
        process::exit(1);
    }

    // Path lookups go through std::fs against the source, so mounting the
    // overlay on top of the source directory would loop back into itself.
    let source = args.source.canonicalize().unwrap_or_else(|_| args.source.clone());
    let mountpoint = args
        .mountpoint
        .canonicalize()
        .unwrap_or_else(|_| args.mountpoint.clone());
    if source == mountpoint {
        error!("Mounting over the source directory is not supported; use a separate mount point");
        process::exit(1);
    }

    let size_cache_path = if args.no_size_cache {
        None
    } else {
        dirs::cache_dir().map(|dir| dir.join("bgzfs").join("sizes.json"))
    };
    match &size_cache_path {
        Some(path) => info!("Size cache: {}", path.display()),
        None => info!("Size cache: in memory only"),
    }

    let overlay = Overlay::new(
        &source,
        OverlayConfig { size_cache_path },
    );

    info!(
        "Mounting {} at {} (read-only)",
        source.display(),
        mountpoint.display()
    );

    if let Err(e) = fuse::mount(overlay, &mountpoint, args.allow_other) {
        error!("Mount error: {}", e);
        process::exit(1);
    }
}
