//! Error types for zipwrite

use thiserror::Error;

/// Main error type for header writing operations
#[derive(Error, Debug)]
pub enum ZipWriteError {
    /// A required model object or argument is missing or unusable.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// The underlying sink failed to write, seek or reopen a volume.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Continuing would emit a corrupt archive.
    #[error("Format invariant violated: {0}")]
    Format(String),
}

impl ZipWriteError {
    pub(crate) fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }
}

/// Result type alias for header writing operations
pub type Result<T> = std::result::Result<T, ZipWriteError>;
