//! Paystack webhook processing.
//!
//! Deliveries are authenticated by `hex(HMAC-SHA512(secret, raw_body))` in
//! the `x-paystack-signature` header; verification happens on the raw body
//! before any JSON decoding or storage I/O. Successful charge events mint a
//! license (idempotently on the transaction reference) and dispatch the key
//! to the customer's email.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha512;
use tracing::warn;

use crate::error::{LicensingError, LicensingResult};
use crate::mailer::Mailer;
use crate::service::LicensingService;
use crate::store::LicenseRecord;

type HmacSha512 = Hmac<Sha512>;

/// Verifies a Paystack signature over the raw request body. The comparison
/// runs in constant time.
#[must_use]
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(provided) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha512::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&provided).is_ok()
}

/// A Paystack event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct PaystackEvent {
    /// Event type, e.g. `charge.success`.
    pub event: String,
    #[serde(default)]
    pub data: PaystackData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaystackData {
    /// Transaction reference; the idempotency key for issuance.
    #[serde(default)]
    pub reference: String,
    /// RFC 3339 payment instant. Absent or unparsable falls back to now.
    #[serde(default)]
    pub paid_at: Option<String>,
    #[serde(default)]
    pub customer: PaystackCustomer,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaystackCustomer {
    #[serde(default)]
    pub email: String,
}

impl PaystackEvent {
    /// True for events that trigger license issuance. `charge.success` is
    /// canonical; subscription and invoice events renew the same way.
    #[must_use]
    pub fn is_issuance_event(&self) -> bool {
        [
            "charge.success",
            "invoice.create",
            "subscription.create",
            "subscription.renewed",
        ]
        .iter()
        .any(|candidate| self.event.eq_ignore_ascii_case(candidate))
    }

    /// Payment instant, defaulting to the current time when the field is
    /// missing, empty or malformed.
    #[must_use]
    pub fn paid_at(&self) -> DateTime<Utc> {
        self.data
            .paid_at
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or_else(Utc::now)
    }
}

/// Result of processing a verified webhook delivery.
#[derive(Debug)]
pub enum WebhookOutcome {
    /// A license was minted (or re-read for a re-delivered reference).
    Issued {
        record: LicenseRecord,
        created: bool,
    },
    /// The event type does not trigger issuance; acknowledged and dropped.
    Ignored,
}

/// Processes a signature-verified event: issues (or re-reads) the license
/// and emails the key. Mailer failures never undo issuance; they are logged
/// and the delivery is still acknowledged.
pub async fn process_event(
    service: &LicensingService,
    mailer: &dyn Mailer,
    event: &PaystackEvent,
) -> LicensingResult<WebhookOutcome> {
    if !event.is_issuance_event() {
        return Ok(WebhookOutcome::Ignored);
    }

    let email = event.data.customer.email.trim().to_lowercase();
    let reference = event.data.reference.trim();
    if email.is_empty() || reference.is_empty() {
        return Err(LicensingError::InvalidInput(
            "missing customer email or transaction reference".to_string(),
        ));
    }

    let (record, created) = service.record_payment(reference, &email, event.paid_at())?;

    if let Err(err) = mailer.send_license_email(&email, &record).await {
        warn!(recipient = %email, key = %record.key, error = %err, "license email delivery failed");
    }

    Ok(WebhookOutcome::Issued { record, created })
}
