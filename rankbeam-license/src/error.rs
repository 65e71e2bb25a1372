//! Error types for the activation client.

use thiserror::Error;

/// Result type for client-side license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;

/// Client-side licensing errors.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// No base URL configured for the license server.
    #[error("license server base URL is not configured")]
    MissingBaseUrl,

    /// The base URL lacks an http(s) scheme.
    #[error("license server base URL must include http:// or https://, got {0:?}")]
    InvalidBaseUrl(String),

    /// The server rejected the key (not found, wrong machine or expired).
    #[error("invalid or expired license")]
    InvalidLicense,

    /// The installer token was missing or wrong.
    #[error("installer token is not authorized")]
    UnauthorizedToken,

    /// A stored license file exists but holds only whitespace.
    #[error("stored license key is empty")]
    EmptyLicenseKey,

    /// No license has been stored on this machine yet.
    #[error("no license is stored on this machine")]
    NoStoredLicense,

    /// The machine fingerprint could not be derived.
    #[error("unable to derive a machine fingerprint")]
    FingerprintUnavailable,

    /// The per-user configuration directory could not be resolved.
    #[error("could not resolve the user configuration directory")]
    NoConfigDir,

    /// Unexpected server response, body truncated to 4 KiB.
    #[error("license server returned {status}: {body}")]
    Server { status: u16, body: String },

    /// A validation request exceeded its deadline.
    #[error("license validation timed out")]
    Timeout,

    /// Network / transport error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Local storage error.
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Envelope serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
