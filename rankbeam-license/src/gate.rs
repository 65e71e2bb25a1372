//! Activation gate run before the main application loads.
//!
//! A small state machine: validate whatever license is already on disk, and
//! fall back to prompting the user for a key. The UI layer renders
//! [`GateState`] and calls [`ActivationGate::activate`] when the user submits
//! a key; completions are marshalled back through a [`UiDispatcher`].

use std::sync::Mutex;
use std::time::Duration;

use tracing::warn;

use crate::client::LicenseClient;
use crate::error::LicenseError;
use crate::fingerprint::machine_fingerprint;
use crate::storage::{ActivationEnvelope, LicenseStorage};

/// Deadline for the silent validation attempted at boot and for user
/// activations.
pub const VALIDATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the gate currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Nothing has happened yet.
    Idle,
    /// A validation request is in flight.
    Validating,
    /// The user must supply a key.
    AwaitingInput,
    /// The machine is licensed; the main app may start.
    Success,
    /// A terminal failure (no fingerprint, or the key validated but could
    /// not be stored).
    Error,
}

/// Marshals closures onto the UI thread.
pub trait UiDispatcher: Send + Sync {
    fn post(&self, work: Box<dyn FnOnce() + Send>);
}

/// Runs closures inline. Suitable for headless use and tests.
pub struct InlineDispatcher;

impl UiDispatcher for InlineDispatcher {
    fn post(&self, work: Box<dyn FnOnce() + Send>) {
        work();
    }
}

struct GateInner {
    state: GateState,
    message: String,
    fingerprint: Option<String>,
    on_success: Option<Box<dyn FnOnce() + Send>>,
}

/// Orchestrates boot-time validation and user-driven activation.
pub struct ActivationGate {
    client: LicenseClient,
    storage: LicenseStorage,
    ui: Box<dyn UiDispatcher>,
    inner: Mutex<GateInner>,
}

impl ActivationGate {
    /// `on_success` fires at most once, on the UI thread, and only after the
    /// envelope has been persisted (or an existing one re-validated).
    pub fn new(
        client: LicenseClient,
        storage: LicenseStorage,
        ui: Box<dyn UiDispatcher>,
        on_success: Box<dyn FnOnce() + Send>,
    ) -> Self {
        Self {
            client,
            storage,
            ui,
            inner: Mutex::new(GateInner {
                state: GateState::Idle,
                message: String::new(),
                fingerprint: None,
                on_success: Some(on_success),
            }),
        }
    }

    #[must_use]
    pub fn state(&self) -> GateState {
        self.lock().state
    }

    /// The message the UI should currently display.
    #[must_use]
    pub fn message(&self) -> String {
        self.lock().message.clone()
    }

    /// Silent validation pass at startup.
    ///
    /// Computes the fingerprint, loads any stored license, and validates it
    /// against the server. Ends in `Success`, `AwaitingInput` or, if no
    /// fingerprint can be derived, `Error`.
    pub async fn boot(&self) {
        let fingerprint = match machine_fingerprint() {
            Ok(fp) => fp,
            Err(err) => {
                self.transition(GateState::Error, license_error_message(&err));
                return;
            }
        };

        let stored = {
            let mut inner = self.lock();
            inner.fingerprint = Some(fingerprint.clone());
            match self.storage.load() {
                Ok(stored) => {
                    inner.state = GateState::Validating;
                    stored
                }
                Err(err) => {
                    inner.state = GateState::AwaitingInput;
                    inner.message = license_error_message(&err);
                    return;
                }
            }
        };

        match self.validate(stored.key(), &fingerprint).await {
            Ok(envelope) => {
                // An unwritable disk at boot is not fatal: the key already
                // validated, so let the app start and retry next launch.
                if let Err(err) = self.storage.save(&envelope) {
                    warn!(error = %err, "could not refresh the stored license envelope");
                }
                self.finish_success();
            }
            Err(err) => {
                self.transition(GateState::AwaitingInput, license_error_message(&err));
            }
        }
    }

    /// User-driven activation with a freshly supplied key.
    ///
    /// Concurrent calls are dropped while a validation is in flight. A key
    /// that validates but cannot be persisted leaves the gate in `Error`:
    /// the server accepted the key, only the local write failed.
    pub async fn activate(&self, key: &str) {
        let key = key.trim().to_uppercase();
        if key.is_empty() {
            self.transition(
                GateState::AwaitingInput,
                license_error_message(&LicenseError::EmptyLicenseKey),
            );
            return;
        }

        let fingerprint = {
            let mut inner = self.lock();
            if inner.state == GateState::Validating || inner.state == GateState::Success {
                return;
            }
            let Some(fingerprint) = inner.fingerprint.clone() else {
                inner.state = GateState::Error;
                inner.message = license_error_message(&LicenseError::FingerprintUnavailable);
                return;
            };
            inner.state = GateState::Validating;
            inner.message.clear();
            fingerprint
        };

        match self.validate(&key, &fingerprint).await {
            Ok(envelope) => match self.storage.save(&envelope) {
                Ok(_) => self.finish_success(),
                Err(err) => {
                    self.transition(GateState::Error, activation_error_message(&err));
                }
            },
            Err(err) => {
                self.transition(GateState::AwaitingInput, activation_error_message(&err));
            }
        }
    }

    async fn validate(
        &self,
        key: &str,
        fingerprint: &str,
    ) -> Result<ActivationEnvelope, LicenseError> {
        let validated = tokio::time::timeout(
            VALIDATE_TIMEOUT,
            self.client.validate_license(key, fingerprint),
        )
        .await
        .map_err(|_| LicenseError::Timeout)??;

        Ok(ActivationEnvelope {
            license_key: key.trim().to_uppercase(),
            customer_id: validated.customer_id,
            fingerprint: fingerprint.to_string(),
            issued_at: validated.issued_at,
            expires_at: validated.expires_at,
        })
    }

    fn finish_success(&self) {
        let callback = {
            let mut inner = self.lock();
            inner.state = GateState::Success;
            inner.message.clear();
            inner.on_success.take()
        };
        if let Some(callback) = callback {
            self.ui.post(callback);
        }
    }

    fn transition(&self, state: GateState, message: String) {
        let mut inner = self.lock();
        inner.state = state;
        inner.message = message;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GateInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Message for failures loading or validating an existing license.
#[must_use]
pub fn license_error_message(err: &LicenseError) -> String {
    match err {
        LicenseError::NoStoredLicense => {
            "License key not found. Please run the installer to activate this machine.".to_string()
        }
        LicenseError::EmptyLicenseKey => {
            "The stored license key is empty. Re-run the installer or paste a valid key."
                .to_string()
        }
        LicenseError::InvalidLicense => {
            "The license key on this machine is invalid or expired. Contact support to refresh it."
                .to_string()
        }
        LicenseError::UnauthorizedToken => {
            "The installer token configured for this app is not authorized. Check LICENSE_API_TOKEN."
                .to_string()
        }
        LicenseError::FingerprintUnavailable => {
            "Unable to identify this machine. Contact support.".to_string()
        }
        other => format!("Unable to validate license: {other}"),
    }
}

/// Message for failures during a user-driven activation.
#[must_use]
pub fn activation_error_message(err: &LicenseError) -> String {
    match err {
        LicenseError::Timeout => {
            "Activation timed out. Check your connection and try again.".to_string()
        }
        LicenseError::InvalidLicense
        | LicenseError::EmptyLicenseKey
        | LicenseError::UnauthorizedToken => license_error_message(err),
        LicenseError::Storage(_) => {
            "Activation failed: insufficient permissions to store the license key on this device."
                .to_string()
        }
        other => format!("Activation failed: {other}"),
    }
}
