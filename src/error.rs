// src/error.rs

use thiserror::Error;

/// Core error types for packledger
#[derive(Error, Debug)]
pub enum Error {
    /// Not a readable ZIP archive, or the wrong file type at the API boundary
    #[error("Invalid archive: {0}")]
    InvalidArchive(String),

    /// Disallowed extension or an entry escaping the staging boundary
    #[error("Unsafe archive ({reason}): {}", entries.join(", "))]
    UnsafeArchive {
        reason: String,
        entries: Vec<String>,
    },

    /// Destination package folder exists and overwrite was not requested
    #[error("Package folder already exists: {0}")]
    NameCollision(String),

    /// Pre-flight space estimate exceeds the free space on the target filesystem
    #[error(
        "Insufficient disk space (available {} MB, required {} MB)",
        available / (1024 * 1024),
        required / (1024 * 1024)
    )]
    InsufficientSpace { available: u64, required: u64 },

    /// Ledger file could not be read or parsed
    #[error("Failed to load ledger: {0}")]
    LedgerLoad(String),

    /// Ledger file could not be written
    #[error("Failed to save ledger: {0}")]
    LedgerSave(String),

    /// Path that cannot be used inside the target root
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Configuration file missing required values or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP container errors
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// JSON encoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the error means the current install must be abandoned
    ///
    /// Validation, safety, collision and space errors abort an install before
    /// the ledger is touched. Everything else is either an environment failure
    /// or something the caller may degrade around (ledger load/save).
    pub fn is_abort(&self) -> bool {
        matches!(
            self,
            Error::InvalidArchive(_)
                | Error::UnsafeArchive { .. }
                | Error::NameCollision(_)
                | Error::InsufficientSpace { .. }
                | Error::InvalidPath(_)
        )
    }

    pub(crate) fn unsafe_archive(reason: impl Into<String>, entries: Vec<String>) -> Self {
        Error::UnsafeArchive {
            reason: reason.into(),
            entries,
        }
    }
}

/// Result type alias using packledger's Error type
pub type Result<T> = std::result::Result<T, Error>;
