use rankbeam_license::machine_fingerprint;

#[test]
fn fingerprint_is_uppercase_sha256_hex() {
    let fingerprint = machine_fingerprint().unwrap();
    assert_eq!(fingerprint.len(), 64);
    assert!(
        fingerprint
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase())
    );
}

#[test]
fn fingerprint_is_stable_across_calls() {
    assert_eq!(machine_fingerprint().unwrap(), machine_fingerprint().unwrap());
}
