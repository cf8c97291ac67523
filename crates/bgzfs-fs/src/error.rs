use thiserror::Error;

/// Errors surfaced by the overlay's dispatcher-facing operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The path is absent under both passthrough and virtual resolution, or
    /// a virtual open failed after the path was classified virtual.
    #[error("no such file or directory: {0}")]
    NotFound(String),

    /// The seek index is missing or malformed.
    #[error("seek index unavailable: {0}")]
    IndexUnavailable(#[from] bgzfs_format::Error),

    /// An operation referenced a released or never-issued handle.
    #[error("operation on released or unknown handle {0}")]
    ContractViolation(u64),

    /// I/O error from the underlying store or stream.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Classify an I/O failure against `path`: absence becomes NotFound,
    /// everything else stays an I/O error.
    pub(crate) fn from_io(path: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(path.to_string())
        } else {
            Self::Io(err)
        }
    }

    /// The errno equivalent replied to the kernel by the FUSE adapter.
    pub fn errno(&self) -> i32 {
        match self {
            Self::NotFound(_) => libc::ENOENT,
            Self::IndexUnavailable(_) => libc::EIO,
            Self::ContractViolation(_) => libc::EBADF,
            Self::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

/// Result type for overlay operations.
pub type Result<T> = std::result::Result<T, Error>;
