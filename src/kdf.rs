//! Deterministic product key derivation.
//!
//! A product key is `HMAC-SHA256(secret, identifier[:salt])` rendered as
//! unpadded Base32 and cut to the requested length. Lengths that need more
//! than one digest (more than 51 characters) are stretched with PBKDF2.

use data_encoding::BASE32_NOPAD;
use sha2::Sha256;

use crate::crypto::{constant_time_eq, hmac_sha256};
use crate::error::{LicenseError, Result};

/// Default raw length used by the key generator.
pub const DEFAULT_LENGTH: usize = 20;
/// Default number of characters per group when formatting.
pub const DEFAULT_GROUP_SIZE: usize = 5;
/// Default group separator.
pub const DEFAULT_SEPARATOR: &str = "-";
/// Salt shipped product keys are derived with.
pub const DEFAULT_SALT: &str = "v1";
/// Length of shipped product keys.
pub const PRODUCT_KEY_LENGTH: usize = 25;
/// Identifier used when no deployment-specific one is configured.
pub const DEFAULT_IDENTIFIER: &str = "GLOBAL";

const PBKDF2_ROUNDS: u32 = 100_000;
const DIGEST_LEN: usize = 32;

/// Derive a Base32 key of `out_length` characters.
pub fn derive(secret: &str, identifier: &str, salt: Option<&str>, out_length: usize) -> Result<String> {
    if out_length == 0 {
        return Err(LicenseError::invalid_parameter("out_length must be > 0"));
    }

    let salt = salt.unwrap_or_default();
    let mut message = identifier.as_bytes().to_vec();
    if !salt.is_empty() {
        message.push(b':');
        message.extend_from_slice(salt.as_bytes());
    }

    let digest = hmac_sha256(secret.as_bytes(), &message)?;
    let needed_bytes = (out_length * 5).div_ceil(8);

    let material = if needed_bytes > DIGEST_LEN {
        let mut stretched = vec![0u8; needed_bytes];
        let password = format!("{secret}{salt}");
        pbkdf2::pbkdf2_hmac::<Sha256>(
            identifier.as_bytes(),
            password.as_bytes(),
            PBKDF2_ROUNDS,
            &mut stretched,
        );
        stretched
    } else {
        digest[..needed_bytes].to_vec()
    };

    let mut encoded = BASE32_NOPAD.encode(&material);
    encoded.truncate(out_length);
    Ok(encoded)
}

/// Split a raw key into `group_size` chunks joined by `separator`.
pub fn format_key(raw: &str, group_size: usize, separator: &str) -> String {
    if group_size == 0 {
        return raw.to_string();
    }
    let chars: Vec<char> = raw.chars().collect();
    chars
        .chunks(group_size)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(separator)
}

/// Strip everything but ASCII letters and digits and uppercase the rest.
pub fn normalize_candidate(candidate: &str) -> String {
    candidate
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Checks human-typed product keys against the key derived for this install.
#[derive(Clone)]
pub struct ProductKeyVerifier {
    secret: String,
    identifier: String,
    salt: Option<String>,
    length: usize,
}

impl ProductKeyVerifier {
    pub fn new(secret: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            identifier: identifier.into(),
            salt: Some(DEFAULT_SALT.to_string()),
            length: PRODUCT_KEY_LENGTH,
        }
    }

    pub fn with_salt(mut self, salt: Option<String>) -> Self {
        self.salt = salt.filter(|s| !s.is_empty());
        self
    }

    pub fn with_length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The key this verifier accepts, ungrouped.
    pub fn expected_key(&self) -> Result<String> {
        derive(&self.secret, &self.identifier, self.salt.as_deref(), self.length)
    }

    /// Constant-time check of a candidate. Separators, whitespace and case
    /// are ignored.
    pub fn verify(&self, candidate: &str) -> bool {
        if candidate.trim().is_empty() {
            return false;
        }
        let Ok(expected) = self.expected_key() else {
            return false;
        };
        let normalized = normalize_candidate(candidate);
        constant_time_eq(normalized.as_bytes(), expected.as_bytes())
    }
}

impl std::fmt::Debug for ProductKeyVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductKeyVerifier")
            .field("identifier", &self.identifier)
            .field("salt", &self.salt)
            .field("length", &self.length)
            .finish()
    }
}
