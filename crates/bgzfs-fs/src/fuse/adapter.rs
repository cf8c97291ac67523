//! FUSE adapter implementation for the overlay.
//!
//! This module implements the `fuser::Filesystem` trait for `OverlayFuse`,
//! translating inode-based kernel requests into the overlay's path-based
//! operations.

use crate::overlay::{EntryKind, FileAttributes, Overlay};
use fuser::{
    FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyStatfs, Request, FUSE_ROOT_ID,
};
use libc::{EINVAL, ENOENT};
use log::{debug, error, trace, warn};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::time::Duration;

/// Time-to-live for cached attributes.
const TTL: Duration = Duration::from_secs(1);

/// Block size reported in file attributes.
const BLOCK_SIZE: u32 = 512;

/// Inode to path mapping, grown as the kernel looks paths up.
///
/// Inodes are never reused; the mapping lives for the mount lifetime, in
/// line with the overlay's forever caches.
struct InodeTable {
    paths: HashMap<u64, String>,
    inos: HashMap<String, u64>,
    next: u64,
}

impl InodeTable {
    fn new() -> Self {
        let mut paths = HashMap::new();
        let mut inos = HashMap::new();
        // The empty relative path is the overlay root.
        paths.insert(FUSE_ROOT_ID, String::new());
        inos.insert(String::new(), FUSE_ROOT_ID);
        Self {
            paths,
            inos,
            next: FUSE_ROOT_ID + 1,
        }
    }

    fn path(&self, ino: u64) -> Option<&str> {
        self.paths.get(&ino).map(String::as_str)
    }

    fn assign(&mut self, path: &str) -> u64 {
        if let Some(&ino) = self.inos.get(path) {
            return ino;
        }
        let ino = self.next;
        self.next += 1;
        self.paths.insert(ino, path.to_string());
        self.inos.insert(path.to_string(), ino);
        debug!("assigned inode {} to '{}'", ino, path);
        ino
    }
}

/// FUSE filesystem adapter over an [`Overlay`].
pub struct OverlayFuse {
    overlay: Overlay,
    inodes: InodeTable,
}

impl OverlayFuse {
    pub fn new(overlay: Overlay) -> Self {
        Self {
            overlay,
            inodes: InodeTable::new(),
        }
    }

    fn to_fuse_attr(ino: u64, attrs: &FileAttributes) -> FileAttr {
        FileAttr {
            ino,
            size: attrs.size,
            blocks: (attrs.size + (BLOCK_SIZE as u64) - 1) / (BLOCK_SIZE as u64),
            atime: attrs.atime,
            mtime: attrs.mtime,
            ctime: attrs.ctime,
            crtime: attrs.mtime,
            kind: file_type(attrs.kind),
            perm: attrs.perm,
            nlink: attrs.nlink,
            uid: attrs.uid,
            gid: attrs.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }
}

fn file_type(kind: EntryKind) -> FileType {
    match kind {
        EntryKind::File => FileType::RegularFile,
        EntryKind::Directory => FileType::Directory,
        EntryKind::Symlink => FileType::Symlink,
        // Device nodes and the like are passthrough oddities; a regular
        // file hint is enough since the kernel re-stats on lookup.
        EntryKind::Other => FileType::RegularFile,
    }
}

fn child_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

impl Filesystem for OverlayFuse {
    /// Look up a directory entry by name.
    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let name_str = match name.to_str() {
            Some(s) => s,
            None => {
                debug!("lookup: non-UTF-8 name under inode {}", parent);
                reply.error(ENOENT);
                return;
            }
        };
        trace!("lookup(parent={}, name='{}')", parent, name_str);

        let parent_path = match self.inodes.path(parent) {
            Some(p) => p.to_string(),
            None => {
                warn!("lookup: unknown parent inode {}", parent);
                reply.error(ENOENT);
                return;
            }
        };

        let path = child_path(&parent_path, name_str);
        match self.overlay.getattr(&path) {
            Ok(attrs) => {
                let ino = self.inodes.assign(&path);
                reply.entry(&TTL, &Self::to_fuse_attr(ino, &attrs), 0);
            }
            Err(e) => {
                trace!("lookup [{}]: {}", path, e);
                reply.error(e.errno());
            }
        }
    }

    /// Get file attributes.
    fn getattr(&mut self, _req: &Request, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        trace!("getattr(ino={})", ino);

        let path = match self.inodes.path(ino) {
            Some(p) => p.to_string(),
            None => {
                warn!("getattr: unknown inode {}", ino);
                reply.error(ENOENT);
                return;
            }
        };

        match self.overlay.getattr(&path) {
            Ok(attrs) => reply.attr(&TTL, &Self::to_fuse_attr(ino, &attrs)),
            Err(e) => {
                debug!("getattr [{}]: {}", path, e);
                reply.error(e.errno());
            }
        }
    }

    /// Open a file.
    fn open(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        let path = match self.inodes.path(ino) {
            Some(p) => p.to_string(),
            None => {
                warn!("open: unknown inode {}", ino);
                reply.error(ENOENT);
                return;
            }
        };
        trace!("open(ino={}) [{}]", ino, path);

        match self.overlay.open(&path) {
            Ok(fh) => reply.opened(fh, 0),
            Err(e) => {
                debug!("open [{}]: {}", path, e);
                reply.error(e.errno());
            }
        }
    }

    /// Read file data through the overlay handle.
    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        trace!("read(ino={}, fh={}, offset={}, size={})", ino, fh, offset, size);

        if offset < 0 {
            reply.error(EINVAL);
            return;
        }

        match self.overlay.read(fh, offset as u64, size) {
            Ok(data) => reply.data(&data),
            Err(e) => {
                error!("read fh {} at {}: {}", fh, offset, e);
                reply.error(e.errno());
            }
        }
    }

    /// Release an open file handle.
    fn release(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        trace!("release(fh={})", fh);

        match self.overlay.release(fh) {
            Ok(()) => reply.ok(),
            Err(e) => {
                error!("release fh {}: {}", fh, e);
                reply.error(e.errno());
            }
        }
    }

    /// Read directory entries, applying the triple rewrite rule.
    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        trace!("readdir(ino={}, offset={})", ino, offset);

        let path = match self.inodes.path(ino) {
            Some(p) => p.to_string(),
            None => {
                warn!("readdir: unknown inode {}", ino);
                reply.error(ENOENT);
                return;
            }
        };

        let listing = match self.overlay.read_dir(&path) {
            Ok(listing) => listing,
            Err(e) => {
                debug!("readdir [{}]: {}", path, e);
                reply.error(e.errno());
                return;
            }
        };

        let mut entries: Vec<(u64, FileType, String)> = vec![
            (ino, FileType::Directory, ".".to_string()),
            (FUSE_ROOT_ID, FileType::Directory, "..".to_string()),
        ];
        for entry in listing {
            match entry {
                Ok(entry) => {
                    let name = entry.name.to_string_lossy().into_owned();
                    let child = child_path(&path, &name);
                    let child_ino = self.inodes.assign(&child);
                    entries.push((child_ino, file_type(entry.kind), name));
                }
                Err(e) => {
                    error!("readdir [{}]: enumeration failed: {}", path, e);
                    reply.error(e.raw_os_error().unwrap_or(libc::EIO));
                    return;
                }
            }
        }

        for (i, (ino, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
            // next_offset = i + 1
            let full = reply.add(ino, (i + 1) as i64, kind, &name);
            if full {
                break;
            }
        }

        reply.ok();
    }

    /// Get filesystem statistics, passed through from the source volume.
    fn statfs(&mut self, _req: &Request, _ino: u64, reply: ReplyStatfs) {
        trace!("statfs");

        match self.overlay.statfs() {
            Ok(stats) => reply.statfs(
                stats.blocks,
                stats.blocks_free,
                stats.blocks_available,
                stats.files,
                stats.files_free,
                stats.block_size,
                stats.name_max,
                stats.fragment_size,
            ),
            Err(e) => {
                warn!("statfs: {}", e);
                reply.error(e.errno());
            }
        }
    }
}

fn mount_options(allow_other: bool) -> Vec<MountOption> {
    let mut options = vec![
        MountOption::RO,
        MountOption::FSName("bgzfs".to_string()),
        MountOption::Subtype("bgunzip".to_string()),
        MountOption::DefaultPermissions,
    ];
    if allow_other {
        options.push(MountOption::AllowOther);
    }
    options
}

/// Mount an overlay as a FUSE filesystem.
///
/// This function blocks until the filesystem is unmounted.
///
/// # Errors
///
/// Returns an error if the mount point is invalid or FUSE mounting fails.
pub fn mount<P: AsRef<Path>>(overlay: Overlay, mount_point: P, allow_other: bool) -> io::Result<()> {
    let mount_point = mount_point.as_ref();
    debug!(
        "mounting {} at {}",
        overlay.store().root().display(),
        mount_point.display()
    );

    fuser::mount2(OverlayFuse::new(overlay), mount_point, &mount_options(allow_other))
        .map_err(|e| io::Error::other(format!("FUSE mount failed: {}", e)))
}

/// Mount an overlay in the background and return a session handle.
///
/// The filesystem stays mounted until the returned `BackgroundSession` is
/// dropped or `unmount()` is called on it.
pub fn mount_background<P: AsRef<Path>>(
    overlay: Overlay,
    mount_point: P,
    allow_other: bool,
) -> io::Result<fuser::BackgroundSession> {
    let mount_point = mount_point.as_ref();
    debug!(
        "mounting {} at {} (background)",
        overlay.store().root().display(),
        mount_point.display()
    );

    fuser::spawn_mount2(OverlayFuse::new(overlay), mount_point, &mount_options(allow_other))
        .map_err(|e| io::Error::other(format!("FUSE mount failed: {}", e)))
}
