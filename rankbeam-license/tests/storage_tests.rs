use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use rankbeam_license::{ActivationEnvelope, LicenseError, LicenseStorage, StoredLicense};

fn envelope() -> ActivationEnvelope {
    ActivationEnvelope {
        license_key: "ACME-AAAA-BBBB-CCCC-DDDDD-EEEEE".to_string(),
        customer_id: "ACME".to_string(),
        fingerprint: "F".repeat(64),
        issued_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        expires_at: Some(Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()),
    }
}

// ── Round trips ─────────────────────────────────────────────────────────

#[test]
fn save_then_load_returns_the_envelope() {
    let dir = TempDir::new().unwrap();
    let storage = LicenseStorage::with_dir(dir.path());

    let path = storage.save(&envelope()).unwrap();
    assert!(path.ends_with("license.json"));

    match storage.load().unwrap() {
        StoredLicense::Envelope(loaded) => assert_eq!(loaded, envelope()),
        other => panic!("expected envelope, got {:?}", other),
    }
}

#[test]
fn save_creates_missing_directories() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("deep").join("config");
    let storage = LicenseStorage::with_dir(&nested);

    storage.save(&envelope()).unwrap();
    assert!(nested.join("license.json").exists());
}

#[test]
fn save_overwrites_previous_envelope() {
    let dir = TempDir::new().unwrap();
    let storage = LicenseStorage::with_dir(dir.path());
    storage.save(&envelope()).unwrap();

    let mut refreshed = envelope();
    refreshed.license_key = "ACME-1111-2222-3333-44444-55555".to_string();
    refreshed.expires_at = None;
    storage.save(&refreshed).unwrap();

    match storage.load().unwrap() {
        StoredLicense::Envelope(loaded) => {
            assert_eq!(loaded.license_key, "ACME-1111-2222-3333-44444-55555");
            assert_eq!(loaded.expires_at, None);
        }
        other => panic!("expected envelope, got {:?}", other),
    }
}

#[test]
fn save_normalizes_key_case_and_whitespace() {
    let dir = TempDir::new().unwrap();
    let storage = LicenseStorage::with_dir(dir.path());
    let mut raw = envelope();
    raw.license_key = "  acme-aaaa-bbbb-cccc-ddddd-eeeee \n".to_string();

    storage.save(&raw).unwrap();
    let loaded = storage.load().unwrap();
    assert_eq!(loaded.key(), "ACME-AAAA-BBBB-CCCC-DDDDD-EEEEE");
}

// ── Legacy bare-key file ────────────────────────────────────────────────

#[test]
fn load_falls_back_to_legacy_key_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("license.key"),
        "acme-aaaa-bbbb-cccc-ddddd-eeeee\n",
    )
    .unwrap();

    let storage = LicenseStorage::with_dir(dir.path());
    match storage.load().unwrap() {
        StoredLicense::LegacyKey(key) => {
            assert_eq!(key, "ACME-AAAA-BBBB-CCCC-DDDDD-EEEEE");
        }
        other => panic!("expected legacy key, got {:?}", other),
    }
}

#[test]
fn envelope_takes_precedence_over_legacy_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("license.key"), "OLD-KEY\n").unwrap();
    let storage = LicenseStorage::with_dir(dir.path());
    storage.save(&envelope()).unwrap();

    assert_eq!(storage.load().unwrap().key(), envelope().license_key);
}

// ── Sentinels ───────────────────────────────────────────────────────────

#[test]
fn load_without_any_file_reports_no_stored_license() {
    let dir = TempDir::new().unwrap();
    let storage = LicenseStorage::with_dir(dir.path());
    assert!(matches!(
        storage.load(),
        Err(LicenseError::NoStoredLicense)
    ));
}

#[test]
fn whitespace_only_files_report_empty_key() {
    let dir = TempDir::new().unwrap();
    let storage = LicenseStorage::with_dir(dir.path());

    std::fs::write(dir.path().join("license.key"), "   \n\t").unwrap();
    assert!(matches!(storage.load(), Err(LicenseError::EmptyLicenseKey)));

    std::fs::write(dir.path().join("license.json"), "  \n").unwrap();
    assert!(matches!(storage.load(), Err(LicenseError::EmptyLicenseKey)));
}

#[test]
fn save_rejects_blank_key() {
    let dir = TempDir::new().unwrap();
    let storage = LicenseStorage::with_dir(dir.path());
    let mut blank = envelope();
    blank.license_key = "   ".to_string();
    assert!(matches!(
        storage.save(&blank),
        Err(LicenseError::EmptyLicenseKey)
    ));
}

// ── Permissions ─────────────────────────────────────────────────────────

#[cfg(unix)]
#[test]
fn stored_file_is_owner_readable_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("config");
    let storage = LicenseStorage::with_dir(&nested);
    let path = storage.save(&envelope()).unwrap();

    let file_mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
    assert_eq!(file_mode, 0o600);
    let dir_mode = std::fs::metadata(&nested).unwrap().permissions().mode() & 0o777;
    assert_eq!(dir_mode, 0o700);
}
