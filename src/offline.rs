//! Offline licenses signed with a shared HMAC secret.
//!
//! Format: `SAOFF1-<base64url(canonical_json)>.<hex(hmac_sha256(secret, canonical_json))>`
//!
//! The payload carries customer, plan, seats, features and free-form
//! metadata. Verification checks the HMAC in constant time and returns the
//! decoded JSON object; expiry enforcement is left to the caller.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::crypto::{constant_time_eq, hmac_sha256_hex, to_canonical_json};
use crate::error::{LicenseError, Result};
use crate::status::format_datetime;

pub const OFFLINE_LICENSE_PREFIX: &str = "SAOFF1-";
pub const PAYLOAD_VERSION: i64 = 1;

/// Structured payload embedded inside offline licenses.
#[derive(Debug, Clone, PartialEq)]
pub struct OfflineLicensePayload {
    pub customer: String,
    pub license_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub plan: Option<String>,
    pub seats: Option<i64>,
    pub notes: Option<String>,
    pub features: Vec<String>,
    pub metadata: Map<String, Value>,
}

impl OfflineLicensePayload {
    /// New payload issued now with a random 16-hex-char license id.
    pub fn new(customer: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            customer: customer.into(),
            license_id: generate_license_id(),
            issued_at: Utc::now(),
            expires_at,
            plan: None,
            seats: None,
            notes: None,
            features: Vec::new(),
            metadata: Map::new(),
        }
    }

    /// JSON object that gets signed. Empty optional fields are left out.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("version".into(), Value::from(PAYLOAD_VERSION));
        data.insert("customer".into(), Value::from(self.customer.clone()));
        data.insert("license_id".into(), Value::from(self.license_id.clone()));
        data.insert("issued_at".into(), Value::from(format_datetime(self.issued_at)));
        data.insert("expires_at".into(), Value::from(format_datetime(self.expires_at)));
        if let Some(plan) = self.plan.as_ref().filter(|p| !p.is_empty()) {
            data.insert("plan".into(), Value::from(plan.clone()));
        }
        if let Some(seats) = self.seats {
            data.insert("seats".into(), Value::from(seats));
        }
        if let Some(notes) = self.notes.as_ref().filter(|n| !n.is_empty()) {
            data.insert("notes".into(), Value::from(notes.clone()));
        }
        if !self.features.is_empty() {
            data.insert("features".into(), Value::from(self.features.clone()));
        }
        if !self.metadata.is_empty() {
            data.insert("metadata".into(), Value::Object(self.metadata.clone()));
        }
        data
    }
}

fn generate_license_id() -> String {
    hex::encode(rand::random::<[u8; 8]>())
}

/// True iff the string uses the offline license format.
pub fn is_offline_format(license: &str) -> bool {
    license.starts_with(OFFLINE_LICENSE_PREFIX)
}

fn require_secret(secret: &str, action: &str) -> Result<()> {
    if secret.is_empty() {
        return Err(LicenseError::configuration(format!(
            "Signing secret is required to {action} a license."
        )));
    }
    Ok(())
}

fn encode_payload(payload: &Map<String, Value>) -> Result<Vec<u8>> {
    to_canonical_json(payload)
        .map_err(|e| LicenseError::malformed(format!("Offline license payload is invalid: {e}")))
}

/// Generate a new offline license string.
pub fn generate(secret: &str, payload: &OfflineLicensePayload) -> Result<String> {
    require_secret(secret, "generate")?;

    let raw_payload = encode_payload(&payload.to_map())?;
    let signature = hmac_sha256_hex(secret.as_bytes(), &raw_payload)?;
    Ok(format!(
        "{OFFLINE_LICENSE_PREFIX}{}.{signature}",
        URL_SAFE_NO_PAD.encode(&raw_payload)
    ))
}

/// Verify an offline license and return the embedded payload.
pub fn verify(secret: &str, license: &str) -> Result<Map<String, Value>> {
    require_secret(secret, "verify")?;
    let body = license
        .strip_prefix(OFFLINE_LICENSE_PREFIX)
        .ok_or_else(|| LicenseError::malformed("Not an offline license key."))?;

    let (payload_part, signature) = body
        .split_once('.')
        .ok_or_else(|| LicenseError::malformed("Offline license is malformed."))?;

    let raw_payload = URL_SAFE_NO_PAD
        .decode(payload_part.trim_end_matches('='))
        .map_err(|_| LicenseError::malformed("Offline license payload is invalid."))?;

    let expected = hmac_sha256_hex(secret.as_bytes(), &raw_payload)?;
    let provided = signature.to_ascii_lowercase();
    if !constant_time_eq(expected.as_bytes(), provided.as_bytes()) {
        return Err(LicenseError::invalid_signature(
            "Offline license signature mismatch.",
        ));
    }

    match serde_json::from_slice::<Value>(&raw_payload) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(LicenseError::malformed("Offline license payload is invalid.")),
    }
}
