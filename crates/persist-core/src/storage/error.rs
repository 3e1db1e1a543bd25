//! Storage error handling
//!
//! Provides typed errors for store operations with descriptive messages
//! and recovery suggestions.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::path::PathError;

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Store was configured without a usable directory
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Keys must contain at least one character
    #[error("Invalid key: keys must not be empty")]
    EmptyKey,

    /// Failed to create the store directory
    #[error("Failed to create store directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Permission denied accessing path
    #[error("Permission denied: cannot access '{path}'. Check file permissions.")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Disk is full or quota exceeded
    #[error(
        "Disk full or quota exceeded while writing to '{path}'. Free up disk space and try again."
    )]
    DiskFull {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// File not found (when expected to exist)
    #[error("File not found: '{path}'")]
    NotFound { path: PathBuf },

    /// Failed to read file or directory
    #[error("Failed to read '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write file
    #[error("Failed to write '{path}': {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to remove file
    #[error("Failed to remove '{path}': {source}")]
    RemoveError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Record content is not valid JSON (or a value could not be encoded)
    #[error("Invalid JSON in '{path}': {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Atomic write failed during rename
    #[error("Atomic write failed: could not rename '{from}' to '{to}': {source}")]
    AtomicWriteFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Deep path write could not be applied
    #[error(transparent)]
    Path(#[from] PathError),
}

/// Which operation an I/O error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IoOp {
    Read,
    Write,
    Remove,
}

impl StoreError {
    /// Create an error from an I/O error with path context
    ///
    /// Classifies the error based on its kind (permission, disk full, etc.)
    pub(crate) fn from_io(error: io::Error, path: PathBuf, op: IoOp) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => StoreError::PermissionDenied {
                path,
                source: error,
            },
            io::ErrorKind::NotFound => StoreError::NotFound { path },
            _ if is_disk_full_error(&error) => StoreError::DiskFull {
                path,
                source: error,
            },
            _ => match op {
                IoOp::Read => StoreError::ReadError {
                    path,
                    source: error,
                },
                IoOp::Write => StoreError::WriteError {
                    path,
                    source: error,
                },
                IoOp::Remove => StoreError::RemoveError {
                    path,
                    source: error,
                },
            },
        }
    }

    /// Whether this is a missing-file error
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StoreError::DiskFull { .. } | StoreError::PermissionDenied { .. }
        )
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StoreError::DiskFull { .. } => Some("Free up disk space and flush again."),
            StoreError::PermissionDenied { .. } => {
                Some("Check file and directory permissions of the store directory.")
            }
            StoreError::CreateDirectory { .. } => {
                Some("Check that the parent directory exists and you have write permissions.")
            }
            StoreError::Configuration(_) => Some("Provide a non-empty store directory."),
            StoreError::Serialization { .. } => {
                Some("The record file was left untouched. Fix or remove it manually.")
            }
            _ => None,
        }
    }
}

/// Check if an I/O error indicates disk full condition
fn is_disk_full_error(error: &io::Error) -> bool {
    let msg = error.to_string().to_lowercase();
    msg.contains("no space left")
        || msg.contains("disk full")
        || msg.contains("quota exceeded")
        || msg.contains("not enough space")
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
