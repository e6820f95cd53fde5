//! Error types for the falx library.
//!
//! All fallible operations return [`Result`], whose error type is the
//! [`FalxError`] enum. Each variant corresponds to one failure class of the
//! index: corruption is never silently tolerated, contract violations are
//! surfaced as [`FalxError::IllegalArgument`], and cooperative cancellation
//! travels as [`FalxError::SearchCancelled`].

use std::io;

use thiserror::Error;

/// The main error type for falx operations.
#[derive(Error, Debug)]
pub enum FalxError {
    /// I/O errors from the underlying directory.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Footer checksum mismatch, bad magic, impossible ordinal.
    ///
    /// A corrupt segment taints the whole index; readers never attempt
    /// partial recovery.
    #[error("index corrupt: {0}")]
    IndexCorrupt(String),

    /// The file's version field is older than the oldest supported version.
    #[error("format of {resource} is too old: version {version}, supported range {min}..={max}")]
    IndexFormatTooOld {
        /// Name of the offending file.
        resource: String,
        /// Version found in the file.
        version: u32,
        /// Oldest supported version.
        min: u32,
        /// Newest supported version.
        max: u32,
    },

    /// The file's version field is newer than the newest supported version.
    #[error("format of {resource} is too new: version {version}, supported range {min}..={max}")]
    IndexFormatTooNew {
        /// Name of the offending file.
        resource: String,
        /// Version found in the file.
        version: u32,
        /// Oldest supported version.
        min: u32,
        /// Newest supported version.
        max: u32,
    },

    /// Caller contract violation (non-ascending term insert, downgraded
    /// field options, absolute write past the end of a byte store).
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    /// Use after close.
    #[error("already closed: {0}")]
    AlreadyClosed(String),

    /// Cooperative cancellation observed between doc blocks.
    #[error("search cancelled")]
    SearchCancelled,

    /// A merge raced a delete; the merge scheduler may retry.
    #[error("merge aborted: {0}")]
    MergeAborted(String),

    /// Analysis-related errors (tokenization failures).
    #[error("analysis error: {0}")]
    Analysis(String),

    /// Storage-related errors that are not plain I/O failures.
    #[error("storage error: {0}")]
    Storage(String),

    /// JSON serialization errors (commit user data, diagnostics).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for operations that may fail with [`FalxError`].
pub type Result<T> = std::result::Result<T, FalxError>;

impl FalxError {
    /// Create a new corruption error.
    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        FalxError::IndexCorrupt(msg.into())
    }

    /// Create a new illegal-argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        FalxError::IllegalArgument(msg.into())
    }

    /// Create a new already-closed error.
    pub fn already_closed<S: Into<String>>(msg: S) -> Self {
        FalxError::AlreadyClosed(msg.into())
    }

    /// Create a new analysis error.
    pub fn analysis<S: Into<String>>(msg: S) -> Self {
        FalxError::Analysis(msg.into())
    }

    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        FalxError::Storage(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FalxError::corrupt("checksum mismatch in _0.doc");
        assert_eq!(err.to_string(), "index corrupt: checksum mismatch in _0.doc");

        let err = FalxError::invalid_argument("terms out of order");
        assert_eq!(err.to_string(), "illegal argument: terms out of order");

        let err = FalxError::IndexFormatTooOld {
            resource: "_0.si".to_string(),
            version: 0,
            min: 1,
            max: 1,
        };
        assert!(err.to_string().contains("too old"));

        let err = FalxError::SearchCancelled;
        assert_eq!(err.to_string(), "search cancelled");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err: FalxError = io_err.into();
        assert!(matches!(err, FalxError::Io(_)));
    }
}
