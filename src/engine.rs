//! Tiered license validation.
//!
//! Order of checks, first match wins:
//!
//! 1. Locally verifiable credentials: `SAOFF1-` offline licenses (needs the
//!    signing secret), Ed25519 tokens (needs the public key), product keys
//!    (needs a [`ProductKeyVerifier`]). A recognized offline license or token
//!    that fails verification is a hard failure.
//! 2. A fresh, valid, unexpired cache entry for this exact credential.
//! 3. The remote authority. An explicit "invalid" answer is final; anything
//!    else that prevents an answer falls through to step 4.
//! 4. Offline fallback: the cache again, then the local mirror file.
//!
//! The resulting status must be `valid` and unexpired. Every success other
//! than a cache hit is written back to the cache, and every outcome is logged to the
//! `license_audit` target with the credential obfuscated.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use ed25519_dalek::VerifyingKey;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::authority::{Authority, NoAuthority};
use crate::cache::{DEFAULT_TTL_HOURS, ValidationCache};
use crate::clock::{Clock, SystemClock};
use crate::credential::{CredentialFormat, classify, obfuscate};
use crate::error::{LicenseError, Result};
use crate::kdf::ProductKeyVerifier;
use crate::status::{ValidationStatus, format_timestamp};
use crate::{offline, token};

/// `tracing` target for audit events.
pub const AUDIT_TARGET: &str = "license_audit";

const NOT_YET_VALIDATED: &str = "License not yet validated.";

/// Everything the engine needs, passed in explicitly.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub cache_path: PathBuf,
    pub fallback_path: PathBuf,
    pub cache_ttl: TimeDelta,
    /// HMAC secret for `SAOFF1-` licenses; also authenticates cache entries
    pub signing_secret: Option<String>,
    /// Ed25519 key for signed tokens
    pub public_key: Option<VerifyingKey>,
    pub expected_product: Option<String>,
    pub expected_version: Option<String>,
    pub product_key: Option<ProductKeyVerifier>,
}

impl EngineConfig {
    pub fn new(cache_path: impl Into<PathBuf>, fallback_path: impl Into<PathBuf>) -> Self {
        Self {
            cache_path: cache_path.into(),
            fallback_path: fallback_path.into(),
            cache_ttl: TimeDelta::hours(DEFAULT_TTL_HOURS),
            signing_secret: None,
            public_key: None,
            expected_product: None,
            expected_version: None,
            product_key: None,
        }
    }
}

/// Which tier produced a successful result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationSource {
    OfflineLicense,
    SignedToken,
    ProductKey,
    Cache,
    Remote,
    OfflineFallback,
}

impl fmt::Display for ValidationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::OfflineLicense => "offline signature",
            Self::SignedToken => "signed token",
            Self::ProductKey => "product key",
            Self::Cache => "cached result",
            Self::Remote => "remote validation",
            Self::OfflineFallback => "offline validation",
        };
        f.write_str(label)
    }
}

/// Status as shown to operators: never includes the raw credential.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    #[serde(flatten)]
    pub status: ValidationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validated_at: Option<String>,
}

/// Validates one credential. Holds the latest status for its lifetime.
pub struct LicenseEngine {
    credential: String,
    config: EngineConfig,
    cache: ValidationCache,
    authority: Box<dyn Authority>,
    clock: Arc<dyn Clock>,
    status: Option<ValidationStatus>,
    last_validated_at: Option<String>,
    last_source: Option<ValidationSource>,
}

impl LicenseEngine {
    /// Engine without a remote authority; remote validation always falls
    /// back to offline data until [`LicenseEngine::with_authority`] is used.
    pub fn new(credential: impl Into<String>, config: EngineConfig) -> Self {
        let cache = ValidationCache::new(&config.cache_path, &config.fallback_path)
            .with_ttl(config.cache_ttl)
            .with_integrity_key(config.signing_secret.clone());
        Self {
            credential: credential.into(),
            config,
            cache,
            authority: Box::new(NoAuthority),
            clock: Arc::new(SystemClock),
            status: None,
            last_validated_at: None,
            last_source: None,
        }
    }

    pub fn with_authority(mut self, authority: impl Authority + 'static) -> Self {
        self.authority = Box::new(authority);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Redacted credential for display.
    pub fn obfuscated_credential(&self) -> String {
        obfuscate(&self.credential)
    }

    /// Latest status produced by this engine, if any.
    pub fn status(&self) -> Option<&ValidationStatus> {
        self.status.as_ref()
    }

    /// Tier that produced the latest success.
    pub fn last_source(&self) -> Option<ValidationSource> {
        self.last_source
    }

    /// Run the tiers. Any error means the license must be treated as invalid.
    pub fn validate(&mut self) -> Result<ValidationStatus> {
        match self.run() {
            Ok((status, source)) => {
                self.last_source = Some(source);
                tracing::info!(
                    target: AUDIT_TARGET,
                    key = %self.obfuscated_credential(),
                    source = %source,
                    "License validation succeeded ({}).",
                    source
                );
                Ok(status)
            }
            Err(e) => {
                // A failed attempt supersedes any earlier success.
                self.status = Some(ValidationStatus::invalid(e.message.clone()));
                self.last_validated_at = None;
                self.last_source = None;
                tracing::error!(
                    target: AUDIT_TARGET,
                    key = %self.obfuscated_credential(),
                    code = %e.code,
                    "License validation failed: {}",
                    e.message
                );
                Err(e)
            }
        }
    }

    /// Current status plus the obfuscated credential and `validated_at`.
    pub fn status_report(&self) -> StatusReport {
        let (status, validated_at) = match &self.status {
            Some(status) => (status.clone(), self.last_validated_at.clone()),
            None => match self.cache.load(&self.credential, self.clock.now()) {
                Some(cached) => (cached.status, Some(cached.validated_at)),
                None => (ValidationStatus::invalid(NOT_YET_VALIDATED), None),
            },
        };
        StatusReport {
            status,
            license_key: (!self.credential.is_empty()).then(|| self.obfuscated_credential()),
            validated_at,
        }
    }

    fn run(&mut self) -> Result<(ValidationStatus, ValidationSource)> {
        if self.credential.trim().is_empty() {
            return Err(LicenseError::missing_credential());
        }
        let now = self.clock.now();

        if let Some((status, source)) = self.local_verdict(now)? {
            let status = enforce(status, now)?;
            self.commit(&status, now);
            return Ok((status, source));
        }

        if let Some(cached) = self.cache.load(&self.credential, now) {
            self.status = Some(cached.status.clone());
            self.last_validated_at = Some(cached.validated_at);
            if cached.status.valid && !cached.status.is_expired(now) {
                return Ok((cached.status, ValidationSource::Cache));
            }
        }

        let (status, source) = match self.authority.validate(&self.credential) {
            Ok(status) => (status, ValidationSource::Remote),
            Err(e) if e.is_transport() => {
                tracing::warn!(
                    target: AUDIT_TARGET,
                    key = %self.obfuscated_credential(),
                    "Remote validation unavailable ({}); attempting offline validation.",
                    e.message
                );
                let status = self
                    .offline_fallback(now)
                    .map_err(|offline| offline.caused_by(e))?;
                (status, ValidationSource::OfflineFallback)
            }
            Err(e) => return Err(e),
        };

        let status = enforce(status, now)?;
        self.commit(&status, now);
        Ok((status, source))
    }

    fn local_verdict(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<(ValidationStatus, ValidationSource)>> {
        match classify(&self.credential) {
            CredentialFormat::OfflineSigned => {
                let Some(secret) = self.config.signing_secret.as_deref() else {
                    return Ok(None);
                };
                let payload = offline::verify(secret, self.credential.trim())?;
                Ok(Some((offline_status(payload), ValidationSource::OfflineLicense)))
            }
            CredentialFormat::SignedToken(normalized) => {
                let Some(public_key) = self.config.public_key.as_ref() else {
                    return Ok(None);
                };
                let payload = token::verify(
                    public_key,
                    &normalized,
                    self.config.expected_product.as_deref(),
                    self.config.expected_version.as_deref(),
                )?;
                if payload.is_expired(now.timestamp()) {
                    return Err(LicenseError::expired());
                }
                let status = ValidationStatus::valid()
                    .with_expiry(format_timestamp(payload.expiry))
                    .with_details(payload.to_details())
                    .with_message("Signed token validated locally.");
                Ok(Some((status, ValidationSource::SignedToken)))
            }
            CredentialFormat::Symmetric => {
                let matches = self
                    .config
                    .product_key
                    .as_ref()
                    .is_some_and(|verifier| verifier.verify(&self.credential));
                if !matches {
                    return Ok(None);
                }
                let mut details = Map::new();
                details.insert("mode".into(), Value::from("offline"));
                let status = ValidationStatus::valid()
                    .with_details(details)
                    .with_message("License validated locally.");
                Ok(Some((status, ValidationSource::ProductKey)))
            }
        }
    }

    fn offline_fallback(&mut self, now: DateTime<Utc>) -> Result<ValidationStatus> {
        if let Some(cached) = self.cache.load(&self.credential, now)
            && cached.status.valid
            && !cached.status.is_expired(now)
        {
            tracing::info!(
                target: AUDIT_TARGET,
                key = %self.obfuscated_credential(),
                "Using cached license validation result due to offline mode."
            );
            self.last_validated_at = Some(cached.validated_at);
            return Ok(cached.status);
        }

        let Some(local) = self.cache.load_fallback(&self.credential)? else {
            return Err(LicenseError::offline_unavailable(
                "Offline validation unavailable.",
            ));
        };
        if local.status.is_expired(now) {
            return Err(LicenseError::expired().caused_by(LicenseError::offline_unavailable(
                "Local license expired or invalid.",
            )));
        }
        if !local.status.valid {
            return Err(LicenseError::offline_unavailable(
                "Local license expired or invalid.",
            ));
        }
        self.last_validated_at = Some(local.validated_at);
        Ok(local.status)
    }

    fn commit(&mut self, status: &ValidationStatus, now: DateTime<Utc>) {
        self.status = Some(status.clone());
        if let Some(validated_at) = self.cache.store(&self.credential, status, now) {
            self.last_validated_at = Some(validated_at);
        }
    }
}

/// Final gate: the status must claim validity and must not be expired.
fn enforce(status: ValidationStatus, now: DateTime<Utc>) -> Result<ValidationStatus> {
    if !status.valid {
        let message = status
            .message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "Invalid license.".to_string());
        return Err(LicenseError::rejected(message));
    }
    if status.is_expired(now) {
        return Err(LicenseError::expired());
    }
    Ok(status)
}

/// Status for a verified offline license: the payload minus `version` and
/// `expires_at` becomes the details, `expires_at` becomes the expiry.
fn offline_status(mut payload: Map<String, Value>) -> ValidationStatus {
    payload.remove("version");
    let expiry = payload
        .remove("expires_at")
        .and_then(|v| v.as_str().map(str::to_string));
    ValidationStatus::valid()
        .with_expiry(expiry)
        .with_details(payload)
        .with_message("Offline license validated locally.")
}
