//! Error types for license issuing and validation

use strum::{AsRefStr, Display};
use thiserror::Error;

/// Error codes for license failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No credential was supplied
    MissingCredential,
    /// Token or license structure/encoding is broken
    MalformedCredential,
    /// Signature or HMAC did not match
    InvalidSignature,
    /// Signed token was issued for another product
    ProductMismatch,
    /// Signed token was issued for another version
    VersionMismatch,
    /// License expiry has passed
    Expired,
    /// The remote authority explicitly said the license is invalid
    RemoteRejected,
    /// The remote authority could not be reached or answered garbage
    TransportUnavailable,
    /// Neither a cached result nor a local fallback file could be used
    OfflineUnavailable,
    /// Missing public key, missing signing secret and similar
    ConfigurationError,
    /// Caller passed an unusable argument (zero length, `|` in a field)
    InvalidParameter,
}

/// License validation error
///
/// Every failure surfaced by this crate is a `LicenseError`. Callers should
/// treat any of them as "deny use"; the [`ErrorCode`] only exists so the
/// cause can be told apart in diagnostics.
#[derive(Debug, Error)]
#[error("{message} (code: {code})")]
pub struct LicenseError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable message (never contains the raw credential)
    pub message: String,
    /// Earlier failure that led to this one, e.g. the transport error
    /// behind a failed offline fallback
    #[source]
    pub cause: Option<Box<LicenseError>>,
}

impl LicenseError {
    /// Create a new error
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// Attach the failure that preceded this one
    pub fn caused_by(mut self, cause: LicenseError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn missing_credential() -> Self {
        Self::new(ErrorCode::MissingCredential, "No license key provided.")
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MalformedCredential, message)
    }

    pub fn invalid_signature(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidSignature, message)
    }

    pub fn expired() -> Self {
        Self::new(ErrorCode::Expired, "License expired.")
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RemoteRejected, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TransportUnavailable, message)
    }

    pub fn offline_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::OfflineUnavailable, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigurationError, message)
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParameter, message)
    }

    /// True when the remote authority was unreachable rather than negative
    pub fn is_transport(&self) -> bool {
        self.code == ErrorCode::TransportUnavailable
    }

    /// Walk to the first failure in the cause chain
    pub fn root_cause(&self) -> &LicenseError {
        let mut current = self;
        while let Some(cause) = current.cause.as_deref() {
            current = cause;
        }
        current
    }
}

/// Result type for license operations
pub type Result<T> = std::result::Result<T, LicenseError>;
