//! Hashing, HMAC and comparison primitives shared by the codecs and the cache.

mod canonical;

pub use canonical::to_canonical_json;

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{LicenseError, Result};

pub type HmacSha256 = Hmac<Sha256>;

/// SHA-256 of a secret as lowercase hex. Used to key cache entries so the
/// raw credential never touches disk.
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Raw HMAC-SHA256 digest.
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> Result<[u8; 32]> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|_| LicenseError::configuration("Invalid HMAC key"))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().into())
}

/// HMAC-SHA256 as lowercase hex.
pub fn hmac_sha256_hex(key: &[u8], message: &[u8]) -> Result<String> {
    hmac_sha256(key, message).map(hex::encode)
}

/// Constant-time equality. Length mismatch returns false without
/// inspecting contents.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
