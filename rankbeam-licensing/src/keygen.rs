//! License key derivation and fingerprint hashing.
//!
//! Keys are composed as `{customer}-{fp0}-{fp1}-{fp2}-{rand1}-{rand2}`:
//! a sanitised customer prefix, three 4-character slices of the fingerprint
//! hash for operator debuggability, and two 5-character random segments so
//! the key stays unguessable even for a known (customer, fingerprint) pair.
//! The authoritative check is always the server-side lookup.

use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::error::{LicensingError, LicensingResult};

/// Alphabet for random key segments. Ambiguous `I`, `O`, `0`, `1` removed.
pub const KEY_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

const MIN_FINGERPRINT_HASH_LEN: usize = 12;
const RANDOM_SEGMENT_LEN: usize = 5;
const MAX_CUSTOMER_LEN: usize = 12;
const FALLBACK_CUSTOMER: &str = "CUSTOMER";

/// Uppercases the customer id, drops everything outside `[A-Z0-9]` and
/// truncates to 12 characters. Falls back to `CUSTOMER` when nothing is left.
#[must_use]
pub fn sanitize_customer_id(input: &str) -> String {
    let cleaned: String = input
        .trim()
        .chars()
        .flat_map(char::to_uppercase)
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        .take(MAX_CUSTOMER_LEN)
        .collect();
    if cleaned.is_empty() {
        FALLBACK_CUSTOMER.to_string()
    } else {
        cleaned
    }
}

/// Hashes a machine fingerprint to its canonical stored form: uppercase
/// SHA-256 hex of the trimmed input. Raw fingerprints are never persisted.
#[must_use]
pub fn hash_fingerprint(raw: &str) -> String {
    let digest = Sha256::digest(raw.trim().as_bytes());
    hex::encode_upper(digest)
}

/// Composes a license key from the sanitised customer id, three slices of
/// the fingerprint hash and two random segments.
///
/// # Errors
///
/// Fails when the fingerprint hash is shorter than 12 characters or not
/// plain hex, or when the OS RNG fails.
pub fn generate_license_key(customer_id: &str, fingerprint_hash: &str) -> LicensingResult<String> {
    let sanitized = sanitize_customer_id(customer_id);
    if fingerprint_hash.len() < MIN_FINGERPRINT_HASH_LEN {
        return Err(LicensingError::FingerprintHashTooShort(
            fingerprint_hash.len(),
        ));
    }
    if !fingerprint_hash.is_ascii() {
        return Err(LicensingError::InvalidInput(
            "fingerprint hash must be hex".to_string(),
        ));
    }
    let rand1 = random_segment(RANDOM_SEGMENT_LEN)?;
    let rand2 = random_segment(RANDOM_SEGMENT_LEN)?;
    Ok(format!(
        "{sanitized}-{}-{}-{}-{rand1}-{rand2}",
        &fingerprint_hash[0..4],
        &fingerprint_hash[4..8],
        &fingerprint_hash[8..12],
    ))
}

/// Draws `len` characters uniformly from [`KEY_ALPHABET`] using the OS RNG.
/// Bytes >= 224 are rejected so the modulo stays uniform (224 = 7 * 32).
fn random_segment(len: usize) -> LicensingResult<String> {
    let mut out = String::with_capacity(len);
    let mut buf = [0u8; 16];
    while out.len() < len {
        OsRng
            .try_fill_bytes(&mut buf)
            .map_err(|e| LicensingError::Entropy(e.to_string()))?;
        for byte in buf {
            if out.len() == len {
                break;
            }
            if byte < 224 {
                out.push(KEY_ALPHABET[(byte % 32) as usize] as char);
            }
        }
    }
    Ok(out)
}
