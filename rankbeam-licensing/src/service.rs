//! Licensing business logic: issue-or-reuse, validate, replace-on-expiry,
//! and idempotent webhook-driven issuance.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::error::{LicensingError, LicensingResult};
use crate::keygen::{generate_license_key, hash_fingerprint, sanitize_customer_id};
use crate::store::{LicenseRecord, LicenseStore};

/// Validity window for webhook-issued licenses: expiry is `paid_at` plus
/// this many days.
pub const WEBHOOK_VALIDITY_DAYS: i64 = 30;

/// Coordinates key generation, persistence and validation.
pub struct LicensingService {
    store: LicenseStore,
    default_validity: Option<Duration>,
}

impl LicensingService {
    /// Wraps an open store. `default_validity` of `None` issues licenses
    /// that never expire.
    #[must_use]
    pub fn new(store: LicenseStore, default_validity: Option<Duration>) -> Self {
        Self {
            store,
            default_validity,
        }
    }

    /// Opens the store at `db_path` and builds a service with a validity of
    /// `validity_days` days (0 disables expiry).
    pub fn open(db_path: impl AsRef<std::path::Path>, validity_days: i64) -> LicensingResult<Self> {
        let store = LicenseStore::open(db_path)?;
        let validity = (validity_days > 0).then(|| Duration::days(validity_days));
        Ok(Self::new(store, validity))
    }

    /// Issues a license for `(customer_id, fingerprint)`, or returns the
    /// existing one bound to the same machine.
    ///
    /// Returns the record and a flag that is true when a fresh key was
    /// minted (first issuance, or replacement of an expired license). An
    /// expired license is rewritten in place, preserving the fingerprint
    /// binding, so the machine never accumulates more than one row.
    pub fn issue(
        &self,
        customer_id: &str,
        fingerprint: &str,
    ) -> LicensingResult<(LicenseRecord, bool)> {
        let customer_id = customer_id.trim();
        let fingerprint = fingerprint.trim();
        if customer_id.is_empty() {
            return Err(LicensingError::InvalidInput(
                "customer identifier is required".to_string(),
            ));
        }
        if fingerprint.is_empty() {
            return Err(LicensingError::InvalidInput(
                "fingerprint is required".to_string(),
            ));
        }

        let hash = hash_fingerprint(fingerprint);
        let customer = sanitize_customer_id(customer_id);
        let now = Utc::now();

        if let Some(existing) = self.store.find_by_fingerprint(&hash)? {
            if !existing.is_expired(now) {
                debug!(key = %existing.key, "reusing unexpired license");
                return Ok((existing, false));
            }
            // Expired: fresh key, same binding.
            let record = self.fresh_record(&customer, &hash, Some(hash.clone()), now)?;
            self.store.replace_for_fingerprint(&hash, &record)?;
            info!(key = %record.key, customer = %record.customer_id, "replaced expired license");
            return Ok((record, true));
        }

        let record = self.fresh_record(&customer, &hash, Some(hash.clone()), now)?;
        match self.store.insert(&record) {
            Ok(()) => {
                info!(key = %record.key, customer = %record.customer_id, "issued license");
                Ok((record, true))
            }
            // A concurrent issuance for the same fingerprint won the insert;
            // observe the winner's row.
            Err(LicensingError::Duplicate) => {
                let winner = self
                    .store
                    .find_by_fingerprint(&hash)?
                    .ok_or(LicensingError::Duplicate)?;
                Ok((winner, false))
            }
            Err(err) => Err(err),
        }
    }

    /// Validates a license key against the presented fingerprint.
    ///
    /// A webhook-issued license that has never activated binds to the
    /// presented machine on its first successful validation; afterwards the
    /// normal mismatch rule applies.
    pub fn validate(&self, key: &str, fingerprint: &str) -> LicensingResult<LicenseRecord> {
        let key = key.trim();
        let fingerprint = fingerprint.trim();
        if key.is_empty() || fingerprint.is_empty() {
            return Err(LicensingError::InvalidInput(
                "license key and fingerprint are required".to_string(),
            ));
        }

        let hash = hash_fingerprint(fingerprint);
        let mut record = self.store.find_by_key(key)?.ok_or(LicensingError::NotFound)?;

        if let Some(stored) = &record.fingerprint_hash {
            if *stored != hash {
                return Err(LicensingError::FingerprintMismatch);
            }
        }
        if record.is_expired(Utc::now()) {
            return Err(LicensingError::Expired);
        }
        if record.fingerprint_hash.is_none() {
            match self.store.bind_fingerprint(&record.key, &hash) {
                Ok(()) => {
                    info!(key = %record.key, "bound pending license to machine");
                    record.fingerprint_hash = Some(hash);
                }
                // Another license already owns this machine.
                Err(LicensingError::Duplicate) => {
                    return Err(LicensingError::FingerprintMismatch);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(record)
    }

    /// Records a successful Paystack payment and mints an unbound license
    /// for it, idempotently on the transaction reference: re-delivery
    /// returns the previously minted record.
    ///
    /// Expiry is `paid_at` + [`WEBHOOK_VALIDITY_DAYS`]. The key's
    /// deterministic slices come from the hash of the reference since no
    /// fingerprint is known yet.
    pub fn record_payment(
        &self,
        reference: &str,
        email: &str,
        paid_at: DateTime<Utc>,
    ) -> LicensingResult<(LicenseRecord, bool)> {
        let reference = reference.trim();
        let email = email.trim().to_lowercase();
        if reference.is_empty() || email.is_empty() {
            return Err(LicensingError::InvalidInput(
                "customer email and transaction reference are required".to_string(),
            ));
        }

        if let Some(key) = self.store.find_payment(reference)? {
            let record = self.store.find_by_key(&key)?.ok_or(LicensingError::NotFound)?;
            debug!(reference, key = %record.key, "webhook re-delivery, reusing license");
            return Ok((record, false));
        }

        let customer = sanitize_customer_id(&email);
        let key = generate_license_key(&customer, &hash_fingerprint(reference))?;
        let record = LicenseRecord {
            key,
            fingerprint_hash: None,
            customer_id: customer,
            issued_at: Utc::now(),
            expires_at: Some(paid_at + Duration::days(WEBHOOK_VALIDITY_DAYS)),
        };
        match self.store.insert_payment(&record, reference) {
            Ok(()) => {
                info!(reference, key = %record.key, "issued license for payment");
                Ok((record, true))
            }
            // Concurrent delivery of the same reference; the winner's marker
            // is in place, read back through it.
            Err(LicensingError::Duplicate) => {
                let key = self
                    .store
                    .find_payment(reference)?
                    .ok_or(LicensingError::Duplicate)?;
                let record = self.store.find_by_key(&key)?.ok_or(LicensingError::NotFound)?;
                Ok((record, false))
            }
            Err(err) => Err(err),
        }
    }

    fn fresh_record(
        &self,
        customer: &str,
        key_hash: &str,
        fingerprint_hash: Option<String>,
        now: DateTime<Utc>,
    ) -> LicensingResult<LicenseRecord> {
        Ok(LicenseRecord {
            key: generate_license_key(customer, key_hash)?,
            fingerprint_hash,
            customer_id: customer.to_string(),
            issued_at: now,
            expires_at: self.default_validity.map(|v| now + v),
        })
    }
}
