//! Read-only access to the underlying directory tree the overlay is
//! layered over.

use std::ffi::CString;
use std::fs::{self, File, Metadata};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// Filesystem statistics reported by the volume holding the store root.
#[derive(Debug, Clone, Copy)]
pub struct FsStats {
    pub blocks: u64,
    pub blocks_free: u64,
    pub blocks_available: u64,
    pub files: u64,
    pub files_free: u64,
    pub block_size: u32,
    pub fragment_size: u32,
    pub name_max: u32,
}

/// The underlying store: source of truth for existence and raw bytes.
///
/// All operations take paths relative to the root, normalized to never
/// start with a separator; the empty string denotes the root itself. The
/// root is fixed at mount time and never changes afterwards.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> PathBuf {
        if path.is_empty() {
            self.root.clone()
        } else {
            self.root.join(path)
        }
    }

    /// Stat a path, following symlinks.
    pub fn metadata(&self, path: &str) -> io::Result<Metadata> {
        fs::metadata(self.full_path(path))
    }

    /// Existence probe. Absence is `Ok(false)`; any other stat failure is
    /// an error for the caller to interpret.
    pub fn exists(&self, path: &str) -> io::Result<bool> {
        match fs::metadata(self.full_path(path)) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Open a file read-only.
    pub fn open(&self, path: &str) -> io::Result<File> {
        File::open(self.full_path(path))
    }

    /// Read a whole file into memory.
    pub fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        fs::read(self.full_path(path))
    }

    /// Enumerate the raw entries of a directory, in store-native order.
    pub fn read_dir(&self, path: &str) -> io::Result<fs::ReadDir> {
        fs::read_dir(self.full_path(path))
    }

    /// Filesystem statistics for the volume holding the root.
    pub fn statfs(&self) -> io::Result<FsStats> {
        let c_path = CString::new(self.root.as_os_str().as_bytes())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "root path contains NUL"))?;
        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(FsStats {
            blocks: stat.f_blocks as u64,
            blocks_free: stat.f_bfree as u64,
            blocks_available: stat.f_bavail as u64,
            files: stat.f_files as u64,
            files_free: stat.f_ffree as u64,
            block_size: stat.f_bsize as u32,
            fragment_size: stat.f_frsize as u32,
            name_max: stat.f_namemax as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn exists_distinguishes_absence_from_presence() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path());

        File::create(dir.path().join("present")).unwrap();
        assert!(store.exists("present").unwrap());
        assert!(!store.exists("absent").unwrap());
    }

    #[test]
    fn empty_path_denotes_the_root() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path());

        assert!(store.metadata("").unwrap().is_dir());
        assert_eq!(store.read_dir("").unwrap().count(), 0);
    }

    #[test]
    fn read_returns_file_contents() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path());

        let mut f = File::create(dir.path().join("sub.txt")).unwrap();
        f.write_all(b"raw bytes").unwrap();
        assert_eq!(store.read("sub.txt").unwrap(), b"raw bytes");
    }

    #[test]
    fn statfs_reports_nonzero_block_size() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path());

        let stats = store.statfs().unwrap();
        assert!(stats.block_size > 0);
    }
}
