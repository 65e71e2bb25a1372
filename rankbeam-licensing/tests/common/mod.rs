//! Shared test helpers for licensing tests.

#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rankbeam_licensing::{
    LicenseRecord, LicenseStore, LicensingService, Mailer, MailerError, hash_fingerprint,
};
use tempfile::TempDir;

/// Opens a store on a throwaway database file.
pub fn temp_store() -> (LicenseStore, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = LicenseStore::open(dir.path().join("licenses.db")).unwrap();
    (store, dir)
}

/// Builds a service with the given validity (days) on a throwaway database.
pub fn temp_service(validity_days: i64) -> (LicensingService, TempDir) {
    let dir = TempDir::new().unwrap();
    let service = LicensingService::open(dir.path().join("licenses.db"), validity_days).unwrap();
    (service, dir)
}

/// A record bound to `fingerprint` that expired an hour ago.
pub fn expired_record(customer: &str, fingerprint: &str) -> LicenseRecord {
    let issued = Utc::now() - Duration::days(40);
    LicenseRecord {
        key: format!("{customer}-AAAA-BBBB-CCCC-DDDDD-EEEEE"),
        fingerprint_hash: Some(hash_fingerprint(fingerprint)),
        customer_id: customer.to_string(),
        issued_at: issued,
        expires_at: Some(Utc::now() - Duration::hours(1)),
    }
}

/// Mailer that records every dispatch for later assertions.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl RecordingMailer {
    pub fn deliveries(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_license_email(
        &self,
        to: &str,
        license: &LicenseRecord,
    ) -> Result<(), MailerError> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), license.key.clone()));
        Ok(())
    }
}

/// Mailer whose delivery always fails.
pub struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send_license_email(
        &self,
        _to: &str,
        _license: &LicenseRecord,
    ) -> Result<(), MailerError> {
        Err(MailerError::Delivery("smtp unreachable".to_string()))
    }
}

/// Asserts a generated key has the documented shape:
/// `{cust 1-12}-{hex4}-{hex4}-{hex4}-{alpha5}-{alpha5}`.
pub fn assert_key_shape(key: &str) {
    let parts: Vec<&str> = key.split('-').collect();
    assert_eq!(parts.len(), 6, "key {key:?} should have six segments");
    assert!(
        (1..=12).contains(&parts[0].len()),
        "customer segment length out of range: {key:?}"
    );
    assert!(
        parts[0]
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()),
        "customer segment has invalid characters: {key:?}"
    );
    for fp_seg in &parts[1..4] {
        assert_eq!(fp_seg.len(), 4, "fingerprint segment length: {key:?}");
        assert!(
            fp_seg.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()),
            "fingerprint segment not uppercase hex: {key:?}"
        );
    }
    for rand_seg in &parts[4..6] {
        assert_eq!(rand_seg.len(), 5, "random segment length: {key:?}");
        assert!(
            rand_seg
                .bytes()
                .all(|b| rankbeam_licensing::KEY_ALPHABET.contains(&b)),
            "random segment outside alphabet: {key:?}"
        );
    }
}

pub fn utc(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
}
