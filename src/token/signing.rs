use std::fs;
use std::path::{Path, PathBuf};

use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

use super::claims::TokenPayload;
use super::encoding::{encode, split_raw};
use crate::error::{ErrorCode, LicenseError, Result};

/// Sign a payload and return the compact token.
pub fn sign(signing_key: &SigningKey, payload: &TokenPayload) -> Result<String> {
    let payload_bytes = payload.to_bytes()?;
    let signature = signing_key.sign(&payload_bytes);
    Ok(encode(&payload_bytes, &signature.to_bytes()))
}

/// Verify a token's signature and optional product/version expectations.
///
/// The signature is checked over the raw payload bytes before the payload
/// is parsed. Expiry is not checked here; see [`TokenPayload::is_expired`].
pub fn verify(
    public_key: &VerifyingKey,
    token: &str,
    expected_product: Option<&str>,
    expected_version: Option<&str>,
) -> Result<TokenPayload> {
    let (payload_bytes, signature_bytes) = split_raw(token)?;

    let signature = Signature::from_slice(&signature_bytes)
        .map_err(|_| LicenseError::invalid_signature("Token signature has an invalid length"))?;
    public_key
        .verify(&payload_bytes, &signature)
        .map_err(|_| LicenseError::invalid_signature("Token signature invalid"))?;

    let payload = TokenPayload::from_bytes(&payload_bytes)?;

    if let Some(product) = expected_product
        && payload.product != product
    {
        return Err(LicenseError::new(
            ErrorCode::ProductMismatch,
            format!("Token issued for product '{}'", payload.product),
        ));
    }
    if let Some(version) = expected_version
        && payload.version != version
    {
        return Err(LicenseError::new(
            ErrorCode::VersionMismatch,
            format!("Token issued for version '{}'", payload.version),
        ));
    }

    Ok(payload)
}

/// Fresh Ed25519 signing key from the OS RNG.
pub fn generate_keypair() -> SigningKey {
    SigningKey::generate(&mut OsRng)
}

/// Write `license_private.pem` (PKCS#8) and `license_public.pem` (SPKI)
/// into `dir`, returning both paths.
pub fn write_keypair(signing_key: &SigningKey, dir: &Path) -> Result<(PathBuf, PathBuf)> {
    let private_pem = signing_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| LicenseError::configuration(format!("Unable to encode private key: {e}")))?;
    let public_pem = signing_key
        .verifying_key()
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| LicenseError::configuration(format!("Unable to encode public key: {e}")))?;

    let private_path = dir.join("license_private.pem");
    let public_path = dir.join("license_public.pem");
    fs::write(&private_path, private_pem.as_bytes())
        .and_then(|_| fs::write(&public_path, public_pem.as_bytes()))
        .map_err(|e| LicenseError::configuration(format!("Unable to write key pair: {e}")))?;

    Ok((private_path, public_path))
}

pub fn load_signing_key(path: &Path) -> Result<SigningKey> {
    let pem = read_key_file(path)?;
    SigningKey::from_pkcs8_pem(&pem).map_err(|e| {
        LicenseError::configuration(format!("Invalid private key {}: {e}", path.display()))
    })
}

pub fn load_verifying_key(path: &Path) -> Result<VerifyingKey> {
    let pem = read_key_file(path)?;
    parse_verifying_key(&pem).map_err(|e| {
        LicenseError::configuration(format!("Invalid public key {}: {}", path.display(), e.message))
    })
}

/// Accepts an SPKI PEM block or 64 hex chars of raw key bytes.
pub fn parse_verifying_key(text: &str) -> Result<VerifyingKey> {
    let text = text.trim();
    if text.starts_with("-----BEGIN") {
        return VerifyingKey::from_public_key_pem(text)
            .map_err(|e| LicenseError::configuration(format!("bad PEM: {e}")));
    }
    let bytes: [u8; 32] = hex::decode(text)
        .ok()
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| LicenseError::configuration("expected 32-byte hex public key"))?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|_| LicenseError::configuration("public key is not a valid Ed25519 point"))
}

fn read_key_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        LicenseError::configuration(format!("Unable to read key file {}: {e}", path.display()))
    })
}
