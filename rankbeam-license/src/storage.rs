//! Per-user persistence of the activated license.
//!
//! The envelope lives at `<user-config-dir>/RankBeam/license.json` with
//! 0o600 permissions (directories 0o700). Older installers wrote a bare key
//! to `license.key`; `load` still honours that file. Saves go through a
//! temporary file and an atomic rename.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LicenseError, LicenseResult};

/// Subdirectory of the user configuration directory.
pub const PRODUCT_DIR: &str = "RankBeam";

const ENVELOPE_FILE: &str = "license.json";
const LEGACY_KEY_FILE: &str = "license.key";

/// The persisted bundle pairing a license key with its activation metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationEnvelope {
    pub license_key: String,
    pub customer_id: String,
    pub fingerprint: String,
    pub issued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ActivationEnvelope {
    /// Trims all fields and uppercases the key.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.license_key = self.license_key.trim().to_uppercase();
        self.customer_id = self.customer_id.trim().to_string();
        self.fingerprint = self.fingerprint.trim().to_string();
        self
    }
}

/// What `load` found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredLicense {
    /// The current JSON envelope.
    Envelope(ActivationEnvelope),
    /// A bare key written by an older installer.
    LegacyKey(String),
}

impl StoredLicense {
    /// The license key, whichever form it was stored in.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Envelope(envelope) => &envelope.license_key,
            Self::LegacyKey(key) => key,
        }
    }
}

/// Owner of the on-disk license file.
pub struct LicenseStorage {
    dir: PathBuf,
}

impl LicenseStorage {
    /// Resolves the platform configuration directory.
    pub fn new() -> LicenseResult<Self> {
        let base = dirs::config_dir().ok_or(LicenseError::NoConfigDir)?;
        Ok(Self {
            dir: base.join(PRODUCT_DIR),
        })
    }

    /// Uses an explicit directory instead of the platform default.
    #[must_use]
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the JSON envelope file.
    #[must_use]
    pub fn envelope_path(&self) -> PathBuf {
        self.dir.join(ENVELOPE_FILE)
    }

    /// Loads the stored license, preferring the JSON envelope over the
    /// legacy bare-key file.
    ///
    /// # Errors
    ///
    /// [`LicenseError::NoStoredLicense`] when neither file exists,
    /// [`LicenseError::EmptyLicenseKey`] when a file holds only whitespace.
    pub fn load(&self) -> LicenseResult<StoredLicense> {
        match fs::read_to_string(self.envelope_path()) {
            Ok(raw) => {
                if raw.trim().is_empty() {
                    return Err(LicenseError::EmptyLicenseKey);
                }
                let envelope: ActivationEnvelope = serde_json::from_str(&raw)?;
                let envelope = envelope.normalized();
                if envelope.license_key.is_empty() {
                    return Err(LicenseError::EmptyLicenseKey);
                }
                return Ok(StoredLicense::Envelope(envelope));
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        match fs::read_to_string(self.dir.join(LEGACY_KEY_FILE)) {
            Ok(raw) => {
                let key = raw.trim().to_uppercase();
                if key.is_empty() {
                    return Err(LicenseError::EmptyLicenseKey);
                }
                Ok(StoredLicense::LegacyKey(key))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(LicenseError::NoStoredLicense)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Persists the envelope atomically with restrictive permissions,
    /// returning the path written.
    pub fn save(&self, envelope: &ActivationEnvelope) -> LicenseResult<PathBuf> {
        let envelope = envelope.clone().normalized();
        if envelope.license_key.is_empty() {
            return Err(LicenseError::EmptyLicenseKey);
        }

        create_private_dir(&self.dir)?;
        let path = self.envelope_path();
        let tmp = self.dir.join(format!(".{ENVELOPE_FILE}.tmp"));

        let mut encoded = serde_json::to_vec_pretty(&envelope)?;
        encoded.push(b'\n');
        write_private(&tmp, &encoded)?;
        fs::rename(&tmp, &path)?;
        Ok(path)
    }
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    fs::write(path, contents)
}
