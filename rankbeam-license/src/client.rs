//! HTTP client for the RankBeam license server.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LicenseError, LicenseResult};

/// Header carrying the installer shared secret.
pub const INSTALLER_TOKEN_HEADER: &str = "X-Installer-Token";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_ERROR_BODY: usize = 4096;

/// A license issued by the server.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedLicense {
    pub license_key: String,
    pub issued_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub customer_id: Option<String>,
}

/// Server confirmation that a key is valid for this machine.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedLicense {
    pub status: String,
    pub issued_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub customer_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IssueRequest<'a> {
    customer_id: &'a str,
    fingerprint: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidateRequest<'a> {
    license_key: &'a str,
    fingerprint: &'a str,
}

/// Wraps HTTP access to the license server.
pub struct LicenseClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl LicenseClient {
    /// Builds a client. The base URL must carry an http(s) scheme; a
    /// trailing slash is stripped. The transport times out after 15 s.
    pub fn new(base_url: &str, token: Option<&str>) -> LicenseResult<Self> {
        let base = base_url.trim();
        if base.is_empty() {
            return Err(LicenseError::MissingBaseUrl);
        }
        if !base.starts_with("http://") && !base.starts_with("https://") {
            return Err(LicenseError::InvalidBaseUrl(base.to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base.trim_end_matches('/').to_string(),
            token: token
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from),
            http,
        })
    }

    /// Builds a client from `LICENSE_API_URL` and `LICENSE_API_TOKEN`.
    pub fn from_env() -> LicenseResult<Self> {
        let base = std::env::var("LICENSE_API_URL").unwrap_or_default();
        let token = std::env::var("LICENSE_API_TOKEN").unwrap_or_default();
        Self::new(&base, Some(&token))
    }

    /// Returns the normalised base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Requests a license for this machine, reusing any unexpired one the
    /// server already holds for the fingerprint.
    pub async fn request_license(
        &self,
        customer_id: &str,
        fingerprint: &str,
    ) -> LicenseResult<IssuedLicense> {
        let response = self
            .post(
                "/api/v1/licenses",
                &IssueRequest {
                    customer_id,
                    fingerprint,
                },
            )
            .await?;

        match response.status().as_u16() {
            200 | 201 => Ok(response.json().await?),
            403 => Err(LicenseError::UnauthorizedToken),
            _ => Err(Self::server_error(response).await),
        }
    }

    /// Confirms a key belongs to this machine and has not expired.
    pub async fn validate_license(
        &self,
        license_key: &str,
        fingerprint: &str,
    ) -> LicenseResult<ValidatedLicense> {
        let response = self
            .post(
                "/api/v1/licenses/validate",
                &ValidateRequest {
                    license_key,
                    fingerprint,
                },
            )
            .await?;

        match response.status().as_u16() {
            200 => {
                let validated: ValidatedLicense = response.json().await?;
                if !validated.status.trim().eq_ignore_ascii_case("valid") {
                    return Err(LicenseError::Server {
                        status: 200,
                        body: format!("unexpected validation status {:?}", validated.status),
                    });
                }
                Ok(validated)
            }
            401 => Err(LicenseError::InvalidLicense),
            403 => Err(LicenseError::UnauthorizedToken),
            _ => Err(Self::server_error(response).await),
        }
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> LicenseResult<reqwest::Response> {
        let mut request = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body);
        if let Some(token) = &self.token {
            request = request.header(INSTALLER_TOKEN_HEADER, token);
        }
        Ok(request.send().await?)
    }

    async fn server_error(response: reqwest::Response) -> LicenseError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let mut body = body.trim().to_string();
        if body.len() > MAX_ERROR_BODY {
            let mut end = MAX_ERROR_BODY;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            body.truncate(end);
        }
        LicenseError::Server { status, body }
    }
}
