//! SQLite-backed license store.
//!
//! One row per issued license, keyed by the license key, with a partial
//! unique index on the fingerprint hash (at most one bound license per
//! machine; webhook-issued licenses stay unbound until first validation).
//! Processed Paystack deliveries are recorded in `webhook_payments` so
//! re-delivery of the same reference never mints a second key.
//!
//! Timestamps are stored as RFC 3339 UTC text. The connection sits behind a
//! mutex; SQLite's single-writer discipline plus the unique index arbitrate
//! concurrent issuance for the same fingerprint.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};

use crate::error::{LicensingError, LicensingResult};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS licenses (
    key              TEXT PRIMARY KEY,
    fingerprint_hash TEXT,
    customer_id      TEXT NOT NULL,
    issued_at        TEXT NOT NULL,
    expires_at       TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_licenses_fingerprint
    ON licenses(fingerprint_hash) WHERE fingerprint_hash IS NOT NULL;
CREATE TABLE IF NOT EXISTS webhook_payments (
    reference    TEXT PRIMARY KEY,
    license_key  TEXT NOT NULL REFERENCES licenses(key),
    customer_id  TEXT NOT NULL,
    processed_at TEXT NOT NULL
);
";

/// Persistent representation of an issued license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseRecord {
    /// The license key presented to the user. Globally unique.
    pub key: String,
    /// Uppercase SHA-256 hex of the machine fingerprint. `None` for
    /// webhook-issued licenses that have not activated yet.
    pub fingerprint_hash: Option<String>,
    /// Sanitised customer identifier.
    pub customer_id: String,
    /// Creation instant, UTC.
    pub issued_at: DateTime<Utc>,
    /// Absent means the license never expires.
    pub expires_at: Option<DateTime<Utc>>,
}

impl LicenseRecord {
    /// Returns true when an expiry is set and it is not in the future.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

/// Durable, indexed set of issued licenses.
pub struct LicenseStore {
    conn: Mutex<Connection>,
}

impl LicenseStore {
    /// Opens (or creates) the database at `path`, creating the containing
    /// directory and applying the schema idempotently. Reopening an existing
    /// store preserves its data.
    pub fn open(path: impl AsRef<Path>) -> LicensingResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                create_private_dir(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Looks up a license by its key.
    pub fn find_by_key(&self, key: &str) -> LicensingResult<Option<LicenseRecord>> {
        let conn = self.lock();
        let raw = conn
            .query_row(
                "SELECT key, fingerprint_hash, customer_id, issued_at, expires_at
                 FROM licenses WHERE key = ?1",
                params![key],
                raw_record,
            )
            .optional()?;
        raw.map(RawRecord::into_record).transpose()
    }

    /// Looks up a license by its fingerprint hash.
    pub fn find_by_fingerprint(&self, hash: &str) -> LicensingResult<Option<LicenseRecord>> {
        let conn = self.lock();
        let raw = conn
            .query_row(
                "SELECT key, fingerprint_hash, customer_id, issued_at, expires_at
                 FROM licenses WHERE fingerprint_hash = ?1",
                params![hash],
                raw_record,
            )
            .optional()?;
        raw.map(RawRecord::into_record).transpose()
    }

    /// Inserts a new record. Fails with [`LicensingError::Duplicate`] when
    /// the key or fingerprint hash already exists.
    pub fn insert(&self, record: &LicenseRecord) -> LicensingResult<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO licenses (key, fingerprint_hash, customer_id, issued_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.key,
                record.fingerprint_hash,
                record.customer_id,
                encode_ts(record.issued_at),
                record.expires_at.map(encode_ts),
            ],
        )
        .map_err(map_constraint)?;
        Ok(())
    }

    /// Rewrites key, customer and timestamps for the row bound to
    /// `fingerprint_hash`, preserving the binding. Used to replace an
    /// expired license in place. Affects exactly one row.
    pub fn replace_for_fingerprint(
        &self,
        fingerprint_hash: &str,
        record: &LicenseRecord,
    ) -> LicensingResult<()> {
        let conn = self.lock();
        let changed = conn
            .execute(
                "UPDATE licenses SET key = ?1, customer_id = ?2, issued_at = ?3, expires_at = ?4
                 WHERE fingerprint_hash = ?5",
                params![
                    record.key,
                    record.customer_id,
                    encode_ts(record.issued_at),
                    record.expires_at.map(encode_ts),
                    fingerprint_hash,
                ],
            )
            .map_err(map_constraint)?;
        if changed != 1 {
            return Err(LicensingError::NotFound);
        }
        Ok(())
    }

    /// Binds a previously unbound (webhook-issued) license to a machine.
    /// Fails with [`LicensingError::Duplicate`] when the fingerprint is
    /// already bound to another license.
    pub fn bind_fingerprint(&self, key: &str, fingerprint_hash: &str) -> LicensingResult<()> {
        let conn = self.lock();
        let changed = conn
            .execute(
                "UPDATE licenses SET fingerprint_hash = ?1
                 WHERE key = ?2 AND fingerprint_hash IS NULL",
                params![fingerprint_hash, key],
            )
            .map_err(map_constraint)?;
        if changed != 1 {
            return Err(LicensingError::NotFound);
        }
        Ok(())
    }

    /// Returns the license key minted for a processed payment reference.
    pub fn find_payment(&self, reference: &str) -> LicensingResult<Option<String>> {
        let conn = self.lock();
        let key = conn
            .query_row(
                "SELECT license_key FROM webhook_payments WHERE reference = ?1",
                params![reference],
                |row| row.get(0),
            )
            .optional()?;
        Ok(key)
    }

    /// Inserts an unbound license together with its payment marker in one
    /// transaction, so a crash between the two cannot break idempotency.
    pub fn insert_payment(&self, record: &LicenseRecord, reference: &str) -> LicensingResult<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO licenses (key, fingerprint_hash, customer_id, issued_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.key,
                record.fingerprint_hash,
                record.customer_id,
                encode_ts(record.issued_at),
                record.expires_at.map(encode_ts),
            ],
        )
        .map_err(map_constraint)?;
        tx.execute(
            "INSERT INTO webhook_payments (reference, license_key, customer_id, processed_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                reference,
                record.key,
                record.customer_id,
                encode_ts(Utc::now()),
            ],
        )
        .map_err(map_constraint)?;
        tx.commit()?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct RawRecord {
    key: String,
    fingerprint_hash: Option<String>,
    customer_id: String,
    issued_at: String,
    expires_at: Option<String>,
}

impl RawRecord {
    fn into_record(self) -> LicensingResult<LicenseRecord> {
        Ok(LicenseRecord {
            key: self.key,
            fingerprint_hash: self.fingerprint_hash,
            customer_id: self.customer_id,
            issued_at: decode_ts(&self.issued_at)?,
            expires_at: self.expires_at.as_deref().map(decode_ts).transpose()?,
        })
    }
}

fn raw_record(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok(RawRecord {
        key: row.get(0)?,
        fingerprint_hash: row.get(1)?,
        customer_id: row.get(2)?,
        issued_at: row.get(3)?,
        expires_at: row.get(4)?,
    })
}

// Full nanosecond precision, so a record re-read from the store compares
// equal to the one that was inserted.
fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn decode_ts(raw: &str) -> LicensingResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| LicensingError::InvalidTimestamp(raw.to_string()))
}

fn map_constraint(err: rusqlite::Error) -> LicensingError {
    match err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            LicensingError::Duplicate
        }
        other => LicensingError::Database(other),
    }
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}
