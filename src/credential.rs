//! Credential classification and redaction.

use crate::offline::is_offline_format;
use crate::token::normalize;

/// Which verification tier a credential belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialFormat {
    /// `SAOFF1-...` HMAC-signed offline license
    OfflineSigned,
    /// Ed25519 token; carries the normalized (raw) token text
    SignedToken(String),
    /// Anything else: a raw or grouped product key, or a key only the
    /// remote authority understands
    Symmetric,
}

/// Classify a credential. Checked in order: offline prefix, then signed
/// token (after Base32 normalization), then symmetric.
pub fn classify(credential: &str) -> CredentialFormat {
    let credential = credential.trim();
    if is_offline_format(credential) {
        return CredentialFormat::OfflineSigned;
    }

    let normalized = normalize(credential);
    let mut parts = normalized.split('.');
    if let (Some(payload), Some(signature), None) = (parts.next(), parts.next(), parts.next())
        && !payload.is_empty()
        && !signature.is_empty()
    {
        return CredentialFormat::SignedToken(normalized);
    }

    CredentialFormat::Symmetric
}

/// Redacted form safe for logs and status output: `XXXX-XXXX-<last 4>`.
pub fn obfuscate(credential: &str) -> String {
    let alnum: Vec<char> = credential
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect();
    if alnum.is_empty() {
        return "UNKNOWN".to_string();
    }
    let tail: String = alnum[alnum.len().saturating_sub(4)..]
        .iter()
        .map(|c| c.to_ascii_uppercase())
        .collect();
    format!("XXXX-XXXX-{tail}")
}
