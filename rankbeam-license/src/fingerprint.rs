//! Machine fingerprinting for license binding.
//!
//! Combines stable host identifiers into an anonymised fingerprint: the raw
//! components never leave the machine, only their uppercase SHA-256 hex
//! digest. The value is deterministic across reboots and independent of
//! mutable user state.

use std::env;

use sha2::{Digest, Sha256};

use crate::error::{LicenseError, LicenseResult};

/// Derives the fingerprint for the current machine.
///
/// # Errors
///
/// Fails only when no identifying component can be collected at all.
pub fn machine_fingerprint() -> LicenseResult<String> {
    let components = fingerprint_components();
    if components.is_empty() {
        return Err(LicenseError::FingerprintUnavailable);
    }
    let digest = Sha256::digest(components.join("|").as_bytes());
    Ok(hex::encode_upper(digest))
}

fn fingerprint_components() -> Vec<String> {
    let mut parts = vec![env::consts::OS.to_string(), env::consts::ARCH.to_string()];

    if let Some(host) = get_hostname() {
        parts.push(host.to_uppercase());
    }
    if let Ok(user) = env::var("USER").or_else(|_| env::var("USERNAME")) {
        if !user.is_empty() {
            parts.push(user.to_uppercase());
        }
    }
    if let Some(machine_id) = get_machine_id() {
        parts.push(machine_id);
    }

    parts
}

fn get_hostname() -> Option<String> {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
}

/// Gets the machine ID (platform-specific unique identifier).
fn get_machine_id() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/etc/machine-id")
            .or_else(|_| std::fs::read_to_string("/var/lib/dbus/machine-id"))
            .ok()
            .map(|s| s.trim().to_string())
    }

    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("ioreg")
            .args(["-rd1", "-c", "IOPlatformExpertDevice"])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| {
                output
                    .lines()
                    .find(|l| l.contains("IOPlatformUUID"))
                    .and_then(|l| l.split('"').nth(3))
                    .map(String::from)
            })
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        None
    }
}
