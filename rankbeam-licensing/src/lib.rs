//! Server-side licensing core for RankBeam.
//!
//! This crate handles:
//! - License key derivation (customer prefix + fingerprint slices + random tail)
//! - The SQLite-backed license store (one bound license per machine)
//! - Issue / validate / replace-on-expiry business logic
//! - Paystack webhook verification and idempotent payment-driven issuance
//! - The mailer capability for dispatching keys
//!
//! # Design Principles
//!
//! - **Server is the authority**: keys are only partially derived; validity
//!   is always decided by a server-side lookup, never by key structure.
//! - **One license per machine**: the fingerprint hash carries a uniqueness
//!   constraint; expired licenses are replaced in place.
//! - **No raw fingerprints**: only uppercase SHA-256 hashes are persisted.
//! - **Idempotent onboarding**: webhook re-deliveries never mint a second key.

mod error;
mod keygen;
mod mailer;
mod service;
mod store;
mod webhook;

pub use error::{LicensingError, LicensingResult};
pub use keygen::{KEY_ALPHABET, generate_license_key, hash_fingerprint, sanitize_customer_id};
pub use mailer::{LICENSE_EMAIL_SUBJECT, Mailer, MailerError, TracingMailer, license_email_body};
pub use service::{LicensingService, WEBHOOK_VALIDITY_DAYS};
pub use store::{LicenseRecord, LicenseStore};
pub use webhook::{
    PaystackCustomer, PaystackData, PaystackEvent, WebhookOutcome, process_event, verify_signature,
};
