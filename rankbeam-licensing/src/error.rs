//! Error types for the licensing core.

use thiserror::Error;

/// Result type for licensing operations.
pub type LicensingResult<T> = Result<T, LicensingError>;

/// Errors raised by the license store, service and webhook adapter.
#[derive(Debug, Error)]
pub enum LicensingError {
    /// No license exists for the presented key.
    #[error("license not found")]
    NotFound,

    /// The license is bound to a different machine.
    #[error("fingerprint mismatch")]
    FingerprintMismatch,

    /// The license expiry has passed.
    #[error("license expired")]
    Expired,

    /// A record with the same key or fingerprint already exists.
    #[error("license record already exists")]
    Duplicate,

    /// A required input was missing or malformed.
    #[error("{0}")]
    InvalidInput(String),

    /// The fingerprint hash is too short to derive key segments from.
    #[error("fingerprint hash too short ({0} characters)")]
    FingerprintHashTooShort(usize),

    /// The operating system RNG failed.
    #[error("random segment: {0}")]
    Entropy(String),

    /// A stored timestamp could not be parsed back.
    #[error("invalid stored timestamp: {0}")]
    InvalidTimestamp(String),

    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
