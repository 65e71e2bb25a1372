//! Mailer capability for dispatching license keys.
//!
//! The concrete SMTP transport lives outside this crate; the server wires a
//! tracing-backed implementation by default and tests inject fakes.

use async_trait::async_trait;
use chrono::SecondsFormat;
use thiserror::Error;
use tracing::info;

use crate::store::LicenseRecord;

/// Subject line for license delivery emails.
pub const LICENSE_EMAIL_SUBJECT: &str = "Your RankBeam license key";

/// Errors from license email dispatch.
#[derive(Debug, Error)]
pub enum MailerError {
    #[error("recipient email is required")]
    MissingRecipient,

    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Capability for delivering a freshly issued license key.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_license_email(&self, to: &str, license: &LicenseRecord)
    -> Result<(), MailerError>;
}

/// Plain-text body for a license delivery email.
#[must_use]
pub fn license_email_body(license: &LicenseRecord) -> String {
    let expiry = license
        .expires_at
        .map(|exp| exp.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| "never".to_string());
    format!(
        "Hello,\n\n\
         Thank you for keeping your RankBeam subscription active. Here is your \
         current license key (valid until {expiry}):\n\n\
         {key}\n\n\
         You can paste this key inside the RankBeam installer or the desktop \
         app's activation screen.\n\n\
         If you did not expect this email, please contact support immediately.\n\n\
         The RankBeam Team\n",
        key = license.key,
    )
}

/// Mailer that records the dispatch in the log instead of dialing SMTP.
/// Used when no transport is configured.
pub struct TracingMailer;

#[async_trait]
impl Mailer for TracingMailer {
    async fn send_license_email(
        &self,
        to: &str,
        license: &LicenseRecord,
    ) -> Result<(), MailerError> {
        let to = to.trim().to_lowercase();
        if to.is_empty() {
            return Err(MailerError::MissingRecipient);
        }
        info!(
            recipient = %to,
            key = %license.key,
            subject = LICENSE_EMAIL_SUBJECT,
            "license email queued (no SMTP transport configured)"
        );
        Ok(())
    }
}
