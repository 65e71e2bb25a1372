mod common;

use chrono::{Duration, Utc};
use common::{assert_key_shape, expired_record, temp_service, utc};
use rankbeam_licensing::{
    LicenseStore, LicensingError, LicensingService, WEBHOOK_VALIDITY_DAYS, hash_fingerprint,
};
use tempfile::TempDir;

// ── IssueLicense ─────────────────────────────────────────────────

#[test]
fn issue_creates_then_reuses() {
    let (service, _dir) = temp_service(365);

    let (first, created) = service.issue("user@example.com", "FP-1").unwrap();
    assert!(created);
    assert_key_shape(&first.key);
    assert_eq!(first.customer_id, "USEREXAMPLEC");
    assert_eq!(first.fingerprint_hash, Some(hash_fingerprint("FP-1")));
    assert!(first.expires_at.unwrap() > Utc::now());

    let (second, created) = service.issue("user@example.com", "FP-1").unwrap();
    assert!(!created);
    assert_eq!(second.key, first.key);
    assert_eq!(second.issued_at, first.issued_at);
}

#[test]
fn issue_with_zero_validity_never_expires() {
    let (service, _dir) = temp_service(0);
    let (record, _) = service.issue("acme", "FP-1").unwrap();
    assert!(record.expires_at.is_none());
}

#[test]
fn issue_requires_both_inputs() {
    let (service, _dir) = temp_service(365);
    assert!(matches!(
        service.issue("  ", "FP-1"),
        Err(LicensingError::InvalidInput(_))
    ));
    assert!(matches!(
        service.issue("acme", ""),
        Err(LicensingError::InvalidInput(_))
    ));
}

#[test]
fn issue_replaces_expired_license_in_place() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("licenses.db");
    let store = LicenseStore::open(&path).unwrap();
    let old = expired_record("ACME", "FP-1");
    store.insert(&old).unwrap();

    let service = LicensingService::new(store, Some(Duration::days(365)));
    let (fresh, created) = service.issue("acme", "FP-1").unwrap();
    assert!(created, "expired license must be replaced with a fresh key");
    assert_ne!(fresh.key, old.key);
    assert_eq!(fresh.fingerprint_hash, old.fingerprint_hash);
    assert!(fresh.expires_at.unwrap() > Utc::now());

    // The binding row count stays one: the old key is gone.
    let store = LicenseStore::open(&path).unwrap();
    assert!(store.find_by_key(&old.key).unwrap().is_none());
    let bound = store
        .find_by_fingerprint(&hash_fingerprint("FP-1"))
        .unwrap()
        .unwrap();
    assert_eq!(bound.key, fresh.key);
}

#[test]
fn issue_different_machines_get_different_keys() {
    let (service, _dir) = temp_service(365);
    let (a, _) = service.issue("acme", "FP-1").unwrap();
    let (b, _) = service.issue("acme", "FP-2").unwrap();
    assert_ne!(a.key, b.key);
}

// ── ValidateLicense ──────────────────────────────────────────────

#[test]
fn validate_returns_record_for_original_machine() {
    let (service, _dir) = temp_service(365);
    let (issued, _) = service.issue("acme", "FP-1").unwrap();

    let record = service.validate(&issued.key, "FP-1").unwrap();
    assert_eq!(record.key, issued.key);
    assert_eq!(record.customer_id, "ACME");
}

#[test]
fn validate_rejects_other_machines() {
    let (service, _dir) = temp_service(365);
    let (issued, _) = service.issue("acme", "FP-1").unwrap();

    let err = service.validate(&issued.key, "FP-2").unwrap_err();
    assert!(matches!(err, LicensingError::FingerprintMismatch));
}

#[test]
fn validate_unknown_key_is_not_found() {
    let (service, _dir) = temp_service(365);
    let err = service.validate("NOPE-0000", "FP-1").unwrap_err();
    assert!(matches!(err, LicensingError::NotFound));
}

#[test]
fn validate_rejects_expired_license() {
    let dir = TempDir::new().unwrap();
    let store = LicenseStore::open(dir.path().join("licenses.db")).unwrap();
    let old = expired_record("ACME", "FP-1");
    store.insert(&old).unwrap();

    let service = LicensingService::new(store, Some(Duration::days(365)));
    let err = service.validate(&old.key, "FP-1").unwrap_err();
    assert!(matches!(err, LicensingError::Expired));
}

#[test]
fn validate_requires_both_inputs() {
    let (service, _dir) = temp_service(365);
    assert!(matches!(
        service.validate("", "FP-1"),
        Err(LicensingError::InvalidInput(_))
    ));
    assert!(matches!(
        service.validate("KEY", "   "),
        Err(LicensingError::InvalidInput(_))
    ));
}

#[test]
fn validate_trims_inputs() {
    let (service, _dir) = temp_service(365);
    let (issued, _) = service.issue("acme", "FP-1").unwrap();
    let record = service.validate(&format!("  {}  ", issued.key), "  FP-1  ").unwrap();
    assert_eq!(record.key, issued.key);
}

// ── Webhook-issued (pending) licenses ────────────────────────────

#[test]
fn pending_license_binds_on_first_validation() {
    let (service, _dir) = temp_service(365);
    let (pending, created) = service
        .record_payment("PSK_1", "u@x", Utc::now())
        .unwrap();
    assert!(created);
    assert!(pending.fingerprint_hash.is_none());

    let bound = service.validate(&pending.key, "FP-1").unwrap();
    assert_eq!(bound.fingerprint_hash, Some(hash_fingerprint("FP-1")));

    // Bound now: a different machine is rejected.
    let err = service.validate(&pending.key, "FP-2").unwrap_err();
    assert!(matches!(err, LicensingError::FingerprintMismatch));

    // The original machine keeps validating.
    service.validate(&pending.key, "FP-1").unwrap();
}

#[test]
fn pending_license_cannot_steal_a_bound_machine() {
    let (service, _dir) = temp_service(365);
    service.issue("acme", "FP-1").unwrap();
    let (pending, _) = service
        .record_payment("PSK_1", "u@x", Utc::now())
        .unwrap();

    let err = service.validate(&pending.key, "FP-1").unwrap_err();
    assert!(matches!(err, LicensingError::FingerprintMismatch));
}

// ── record_payment ───────────────────────────────────────────────

#[test]
fn record_payment_expiry_is_paid_at_plus_thirty_days() {
    let (service, _dir) = temp_service(365);
    let paid_at = utc("2024-01-01T00:00:00Z");
    let (record, _) = service.record_payment("PSK_1", "u@x", paid_at).unwrap();
    assert_eq!(record.expires_at, Some(utc("2024-01-31T00:00:00Z")));
    assert_eq!(
        (record.expires_at.unwrap() - paid_at).num_days(),
        WEBHOOK_VALIDITY_DAYS
    );
}

#[test]
fn record_payment_is_idempotent_on_reference() {
    let (service, _dir) = temp_service(365);
    let (first, created) = service
        .record_payment("PSK_1", "u@x", Utc::now())
        .unwrap();
    assert!(created);

    let (second, created) = service
        .record_payment("PSK_1", "u@x", Utc::now())
        .unwrap();
    assert!(!created);
    assert_eq!(second.key, first.key);
}

#[test]
fn record_payment_sanitises_email_into_customer_id() {
    let (service, _dir) = temp_service(365);
    let (record, _) = service
        .record_payment("PSK_1", "User@Example.com", Utc::now())
        .unwrap();
    assert_eq!(record.customer_id, "USEREXAMPLEC");
}

#[test]
fn record_payment_requires_email_and_reference() {
    let (service, _dir) = temp_service(365);
    assert!(matches!(
        service.record_payment("", "u@x", Utc::now()),
        Err(LicensingError::InvalidInput(_))
    ));
    assert!(matches!(
        service.record_payment("PSK_1", "  ", Utc::now()),
        Err(LicensingError::InvalidInput(_))
    ));
}

// ── Concurrency ──────────────────────────────────────────────────

#[test]
fn concurrent_issue_for_same_fingerprint_yields_one_key() {
    let dir = TempDir::new().unwrap();
    let service = std::sync::Arc::new(
        LicensingService::open(dir.path().join("licenses.db"), 365).unwrap(),
    );

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = service.clone();
        handles.push(std::thread::spawn(move || {
            service.issue("acme", "FP-RACE").unwrap()
        }));
    }
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let created_count = results.iter().filter(|(_, created)| *created).count();
    assert_eq!(created_count, 1, "exactly one issuance must win");
    let first_key = &results[0].0.key;
    assert!(results.iter().all(|(rec, _)| rec.key == *first_key));
}
