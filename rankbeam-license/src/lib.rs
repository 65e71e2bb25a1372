//! License activation client for the RankBeam desktop app.
//!
//! Provides everything the GUI needs to gate startup on a valid license:
//! machine fingerprinting, the HTTP client for the license server, per-user
//! storage of the activation envelope, and the [`ActivationGate`] state
//! machine that ties them together.

pub mod client;
pub mod error;
pub mod fingerprint;
pub mod gate;
pub mod storage;

pub use client::{INSTALLER_TOKEN_HEADER, IssuedLicense, LicenseClient, ValidatedLicense};
pub use error::{LicenseError, LicenseResult};
pub use fingerprint::machine_fingerprint;
pub use gate::{
    ActivationGate, GateState, InlineDispatcher, UiDispatcher, VALIDATE_TIMEOUT,
    activation_error_message, license_error_message,
};
pub use storage::{ActivationEnvelope, LicenseStorage, PRODUCT_DIR, StoredLicense};
