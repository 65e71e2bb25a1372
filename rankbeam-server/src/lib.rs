//! HTTP API for the RankBeam license server.
//!
//! Three POST endpoints plus a health probe:
//! `/api/v1/licenses` issues (or reuses) a license for a machine,
//! `/api/v1/licenses/validate` confirms a key belongs to a machine, and
//! `/api/v1/paystack/webhook` onboards paying customers. The first two are
//! protected by the installer shared secret; the webhook is authenticated
//! by its HMAC signature instead.

use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use rankbeam_licensing::{
    LicenseRecord, LicensingError, LicensingService, Mailer, PaystackEvent, WebhookOutcome,
    process_event, verify_signature,
};

/// Header carrying the installer shared secret.
pub const INSTALLER_TOKEN_HEADER: &str = "x-installer-token";

/// Header carrying the Paystack webhook signature.
pub const PAYSTACK_SIGNATURE_HEADER: &str = "x-paystack-signature";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<LicensingService>,
    pub installer_token: Option<String>,
    pub webhook_secret: Option<String>,
    pub mailer: Arc<dyn Mailer>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueRequest {
    #[serde(default)]
    customer_id: String,
    #[serde(default)]
    fingerprint: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateRequest {
    #[serde(default)]
    license_key: String,
    #[serde(default)]
    fingerprint: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IssueResponse {
    license_key: String,
    issued_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
    customer_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidateResponse {
    status: &'static str,
    issued_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
    customer_id: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Builds the API router over the given state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/licenses", post(issue_handler))
        .route("/api/v1/licenses/validate", post(validate_handler))
        .route("/api/v1/paystack/webhook", post(webhook_handler))
        .route("/healthz", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn issue_handler(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Some(denied) = authorize(&state, &headers) {
        return denied;
    }
    let request: IssueRequest = match parse_json(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    match state.service.issue(&request.customer_id, &request.fingerprint) {
        Ok((record, created)) => {
            let status = if created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            info!(key = %record.key, created, "license issued");
            (status, Json(issue_response(record))).into_response()
        }
        Err(err) => error_response(&err),
    }
}

async fn validate_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(denied) = authorize(&state, &headers) {
        return denied;
    }
    let request: ValidateRequest = match parse_json(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    match state
        .service
        .validate(&request.license_key, &request.fingerprint)
    {
        Ok(record) => (
            StatusCode::OK,
            Json(ValidateResponse {
                status: "valid",
                issued_at: record.issued_at,
                expires_at: record.expires_at,
                customer_id: record.customer_id,
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(secret) = state.webhook_secret.as_deref() else {
        return reject(
            StatusCode::SERVICE_UNAVAILABLE,
            "webhook secret is not configured",
        );
    };

    let signature = headers
        .get(PAYSTACK_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !verify_signature(secret, &body, signature) {
        warn!("webhook delivery with a bad signature");
        return reject(StatusCode::FORBIDDEN, "invalid webhook signature");
    }

    let event: PaystackEvent = match parse_json(&body) {
        Ok(event) => event,
        Err(response) => return response,
    };

    match process_event(state.service.as_ref(), state.mailer.as_ref(), &event).await {
        Ok(WebhookOutcome::Issued { record, created }) => {
            let status = if created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            info!(key = %record.key, created, event = %event.event, "webhook license issued");
            (status, Json(issue_response(record))).into_response()
        }
        Ok(WebhookOutcome::Ignored) => {
            (StatusCode::OK, Json(serde_json::json!({ "status": "ignored" }))).into_response()
        }
        Err(err) => error_response(&err),
    }
}

/// Checks the installer token. `None` means the request may proceed.
fn authorize(state: &AppState, headers: &HeaderMap) -> Option<Response> {
    let Some(expected) = state.installer_token.as_deref() else {
        return None;
    };
    let presented = headers
        .get(INSTALLER_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if presented.as_bytes().ct_eq(expected.as_bytes()).into() {
        None
    } else {
        Some(reject(
            StatusCode::FORBIDDEN,
            "installer token is not authorized",
        ))
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, Response> {
    serde_json::from_slice(body)
        .map_err(|err| reject(StatusCode::BAD_REQUEST, &format!("invalid request body: {err}")))
}

fn issue_response(record: LicenseRecord) -> IssueResponse {
    IssueResponse {
        license_key: record.key,
        issued_at: record.issued_at,
        expires_at: record.expires_at,
        customer_id: record.customer_id,
    }
}

fn error_response(err: &LicensingError) -> Response {
    match err {
        LicensingError::NotFound
        | LicensingError::FingerprintMismatch
        | LicensingError::Expired => reject(StatusCode::UNAUTHORIZED, "invalid or expired license"),
        LicensingError::InvalidInput(message) => reject(StatusCode::BAD_REQUEST, message),
        other => {
            error!(error = %other, "request failed");
            reject(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

fn reject(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
