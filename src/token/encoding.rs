use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use data_encoding::BASE32_NOPAD;

use super::claims::TokenPayload;
use crate::error::{LicenseError, Result};

/// A token split into its parts. Nothing here has been verified yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedToken {
    pub payload: TokenPayload,
    pub signature: Vec<u8>,
    pub payload_bytes: Vec<u8>,
}

fn decode_b64(part: &str, what: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(part.trim_end_matches('='))
        .map_err(|_| LicenseError::malformed(format!("Token {what} is not valid base64url")))
}

/// Split a token into raw payload bytes and raw signature bytes.
pub(super) fn split_raw(token: &str) -> Result<(Vec<u8>, Vec<u8>)> {
    let parts: Vec<&str> = token.trim().split('.').collect();
    let [payload_b64, signature_b64] = parts.as_slice() else {
        return Err(LicenseError::malformed(
            "Token must have exactly two parts separated by a dot",
        ));
    };
    Ok((
        decode_b64(payload_b64, "payload")?,
        decode_b64(signature_b64, "signature")?,
    ))
}

/// Decode a token without checking its signature.
pub fn decode(token: &str) -> Result<DecodedToken> {
    let (payload_bytes, signature) = split_raw(token)?;
    let payload = TokenPayload::from_bytes(&payload_bytes)?;
    Ok(DecodedToken {
        payload,
        signature,
        payload_bytes,
    })
}

pub(super) fn encode(payload_bytes: &[u8], signature: &[u8]) -> String {
    format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(payload_bytes),
        URL_SAFE_NO_PAD.encode(signature)
    )
}

/// Resolve a human-typed grouped Base32 token to the raw token.
///
/// Anything that does not Base32-decode to UTF-8 containing a `.` is returned
/// unchanged (trimmed), so raw tokens pass straight through and
/// `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(input: &str) -> String {
    let trimmed = input.trim();
    let compact: String = trimmed
        .chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    let compact = compact.trim_end_matches('=');

    if let Ok(bytes) = BASE32_NOPAD.decode(compact.as_bytes())
        && let Ok(decoded) = String::from_utf8(bytes)
        && decoded.contains('.')
    {
        return decoded.trim().to_string();
    }
    trimmed.to_string()
}

/// Grouped Base32 form of a token for people to type in.
pub fn human_readable(token: &str) -> String {
    crate::kdf::format_key(&BASE32_NOPAD.encode(token.as_bytes()), 5, "-")
}
