use thiserror::Error;

/// Errors that can occur when working with `.gzi` indexes and BGZF streams.
#[derive(Debug, Error)]
pub enum Error {
    /// The index file ended before the declared record count was read.
    #[error("truncated index: {0}")]
    Truncated(String),

    /// An index record decreased in either offset field.
    #[error("index offsets go backwards at record {0}")]
    NonMonotonic(usize),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for bgzfs-format operations.
pub type Result<T> = std::result::Result<T, Error>;
