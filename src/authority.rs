//! Remote validation authority.
//!
//! Protocol: `POST {"license_key": <credential>}` and expect HTTP 200 with
//! `{"valid": bool, "expiry"?: str, "details"?: object, "message"?: str}`.
//! A well-formed answer is returned as-is (including `valid: false`); any
//! transport or protocol problem becomes a `TransportUnavailable` error so the
//! engine can fall back to offline validation.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::Serialize;

use crate::error::{LicenseError, Result};
use crate::status::ValidationStatus;

pub const DEFAULT_VALIDATION_URL: &str = "https://api.licenseserver.com/validate";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Something that can rule on a credential over the network.
pub trait Authority: Send + Sync {
    /// `Ok` with the authority's verdict, or a `TransportUnavailable` error
    /// when no verdict could be obtained.
    fn validate(&self, credential: &str) -> Result<ValidationStatus>;
}

#[derive(Debug, Serialize)]
struct ValidateRequest<'a> {
    license_key: &'a str,
}

/// Blocking HTTPS client for the validation endpoint.
#[derive(Debug, Clone)]
pub struct HttpAuthority {
    client: Client,
    endpoint: String,
}

impl HttpAuthority {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        Self::with_timeout(endpoint, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LicenseError::configuration(format!("Unable to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Authority for HttpAuthority {
    fn validate(&self, credential: &str) -> Result<ValidationStatus> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&ValidateRequest {
                license_key: credential,
            })
            .send()
            .map_err(|e| {
                LicenseError::transport(format!(
                    "License server unreachable: {}",
                    e.without_url()
                ))
            })?;

        if response.status() != StatusCode::OK {
            return Err(LicenseError::transport(format!(
                "Unexpected response status: {}",
                response.status().as_u16()
            )));
        }

        response
            .json::<ValidationStatus>()
            .map_err(|_| LicenseError::transport("Invalid response from license server"))
    }
}

/// Stand-in used when no authority is configured: every call is a
/// transport failure, which routes the engine to offline fallback.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAuthority;

impl Authority for NoAuthority {
    fn validate(&self, _credential: &str) -> Result<ValidationStatus> {
        Err(LicenseError::transport("No license server configured."))
    }
}
