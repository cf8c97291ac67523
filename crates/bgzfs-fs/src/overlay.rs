//! The overlay core: decides how each path is served and owns the
//! dispatcher-facing surface of attribute queries, handle lifecycle and
//! directory listing.

use crate::cache::SizeCache;
use crate::classify::{Classification, Classifier, GZ_SUFFIX, INDEX_SUFFIX};
use crate::error::{Error, Result};
use crate::handle::{FileHandle, HandleTable};
use crate::list::OverlayReadDir;
use crate::size::SizeResolver;
use crate::store::{FsStats, Store};
use bgzfs_format::{BgzfReader, GziIndex};
use log::{debug, trace, warn};
use std::fs::Metadata;
use std::io::{self, Read};
use std::os::unix::fs::{FileExt, MetadataExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// What kind of node a set of attributes or a listing entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Other,
}

impl From<std::fs::FileType> for EntryKind {
    fn from(ft: std::fs::FileType) -> Self {
        if ft.is_dir() {
            EntryKind::Directory
        } else if ft.is_symlink() {
            EntryKind::Symlink
        } else if ft.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        }
    }
}

/// Attributes served for one path: the real stat for passthrough paths,
/// or the compressed sibling's stat with a synthesized size for virtual
/// ones.
#[derive(Debug, Clone)]
pub struct FileAttributes {
    pub size: u64,
    pub kind: EntryKind,
    pub perm: u16,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
}

/// Overlay construction options.
#[derive(Debug, Clone, Default)]
pub struct OverlayConfig {
    /// Where to persist computed uncompressed sizes across restarts.
    /// `None` keeps the size cache in memory only.
    pub size_cache_path: Option<PathBuf>,
}

/// An overlay over one source directory.
///
/// Presents bgzip-compressed, `.gzi`-indexed files as plain uncompressed
/// files without materializing the decompressed bytes. All operations are
/// synchronous and safe to invoke concurrently for distinct paths and
/// distinct handles; the caller must not issue concurrent operations
/// against one handle.
pub struct Overlay {
    store: Arc<Store>,
    classifier: Classifier,
    resolver: SizeResolver,
    handles: HandleTable,
}

impl Overlay {
    /// Create an overlay rooted at `root`. The caches live until the
    /// overlay is dropped at unmount.
    pub fn new<P: Into<PathBuf>>(root: P, config: OverlayConfig) -> Self {
        let store = Arc::new(Store::new(root));
        let size_cache = match config.size_cache_path {
            Some(path) => SizeCache::with_persistence(path),
            None => SizeCache::new_in_memory(),
        };
        Self {
            classifier: Classifier::new(Arc::clone(&store)),
            resolver: SizeResolver::new(Arc::clone(&store), size_cache),
            handles: HandleTable::new(),
            store,
        }
    }

    /// The underlying store this overlay is layered over.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// How a path would be served. The other operations consult the
    /// classifier internally; this is the direct form of the same query.
    pub fn classification(&self, path: &str) -> Classification {
        self.classifier.classify(path)
    }

    /// Attributes for a path.
    ///
    /// A real entry is reported as-is. An absent path classified virtual
    /// is reported with the compressed sibling's attributes and the
    /// resolved uncompressed size; when the size cannot be determined the
    /// query still succeeds with size 0 rather than failing.
    pub fn getattr(&self, path: &str) -> Result<FileAttributes> {
        match self.store.metadata(path) {
            Ok(md) => {
                trace!("getattr [{}] passthrough size={}", path, md.len());
                Ok(attributes_from(&md, md.len()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if self.classifier.classify(path) == Classification::Virtual {
                    let gz_path = format!("{}{}", path, GZ_SUFFIX);
                    let md = self
                        .store
                        .metadata(&gz_path)
                        .map_err(|e| Error::from_io(path, e))?;
                    let size = self.resolver.resolve(path).unwrap_or(0);
                    debug!("getattr [{}] virtual size={}", path, size);
                    Ok(attributes_from(&md, size))
                } else {
                    Err(Error::NotFound(path.to_string()))
                }
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Open a path for reading and return a handle id.
    ///
    /// A genuinely absent path surfaces NotFound from the raw open.
    pub fn open(&self, path: &str) -> Result<u64> {
        let open_virtual = match self.store.metadata(path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.classifier.classify(path) == Classification::Virtual
            }
            _ => false,
        };

        let handle = if open_virtual {
            self.open_virtual(path)?
        } else {
            FileHandle::Passthrough(self.store.open(path).map_err(|e| Error::from_io(path, e))?)
        };

        let fh = self.handles.insert(handle);
        trace!("open [{}] -> fh {}", path, fh);
        Ok(fh)
    }

    /// Open the compressed sibling and load its index.
    ///
    /// Failures here are reported as NotFound for compatibility with
    /// existing callers even though the path was already classified
    /// virtual; the underlying cause is logged so it stays observable.
    fn open_virtual(&self, path: &str) -> Result<FileHandle> {
        let opened: Result<FileHandle> = (|| {
            let file = self.store.open(&format!("{}{}", path, GZ_SUFFIX))?;
            let index_bytes = self.store.read(&format!("{}{}", path, INDEX_SUFFIX))?;
            let index = GziIndex::from_bytes(&index_bytes)?;
            Ok(FileHandle::Virtual(BgzfReader::new(file, index)?))
        })();

        opened.map_err(|e| {
            warn!("open [{}]: virtual open failed: {}", path, e);
            Error::NotFound(path.to_string())
        })
    }

    /// Read up to `size` bytes at `offset` from an open handle.
    ///
    /// A short or empty result signals end of file, not an error. Every
    /// virtual read re-seeks; nothing about the previous read is cached.
    pub fn read(&self, fh: u64, offset: u64, size: u32) -> Result<Vec<u8>> {
        let handle = self
            .handles
            .get(fh)
            .ok_or(Error::ContractViolation(fh))?;
        let mut handle = handle.lock().expect("handle lock poisoned");

        match &mut *handle {
            FileHandle::Passthrough(file) => {
                let mut buf = vec![0u8; size as usize];
                let n = file.read_at(&mut buf, offset)?;
                trace!("read fh {} passthrough {}:{} -> {}", fh, offset, size, n);
                buf.truncate(n);
                Ok(buf)
            }
            FileHandle::Virtual(reader) => {
                reader.seek_uncompressed(offset)?;
                let mut buf = vec![0u8; size as usize];
                let mut filled = 0;
                while filled < buf.len() {
                    let n = reader.read(&mut buf[filled..])?;
                    if n == 0 {
                        break;
                    }
                    filled += n;
                }
                trace!("read fh {} virtual {}:{} -> {}", fh, offset, size, filled);
                buf.truncate(filled);
                Ok(buf)
            }
        }
    }

    /// Release a handle, closing its descriptor or stream exactly once.
    ///
    /// Releasing an unknown or already-released handle is a contract
    /// violation, not a silent no-op.
    pub fn release(&self, fh: u64) -> Result<()> {
        self.handles
            .remove(fh)
            .ok_or(Error::ContractViolation(fh))?;
        trace!("release fh {}", fh);
        Ok(())
    }

    /// List a directory lazily, rewriting each recognized virtual triple
    /// into a single logical entry. Each call is an independent pass over
    /// the directory in store-native order.
    pub fn read_dir(&self, path: &str) -> Result<OverlayReadDir<'_>> {
        let inner = self
            .store
            .read_dir(path)
            .map_err(|e| Error::from_io(path, e))?;
        Ok(OverlayReadDir::new(
            &self.classifier,
            path.to_string(),
            inner,
        ))
    }

    /// Filesystem statistics, passed through from the underlying store.
    pub fn statfs(&self) -> Result<FsStats> {
        Ok(self.store.statfs()?)
    }
}

fn attributes_from(md: &Metadata, size: u64) -> FileAttributes {
    FileAttributes {
        size,
        kind: EntryKind::from(md.file_type()),
        perm: (md.mode() & 0o7777) as u16,
        nlink: md.nlink() as u32,
        uid: md.uid(),
        gid: md.gid(),
        atime: timestamp(md.atime(), md.atime_nsec()),
        mtime: timestamp(md.mtime(), md.mtime_nsec()),
        ctime: timestamp(md.ctime(), md.ctime_nsec()),
    }
}

fn timestamp(secs: i64, nanos: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nanos as u32)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}
