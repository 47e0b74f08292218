use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{TimeDelta, Utc};
use serde_json::json;

use saavy_license::offline::{self, OFFLINE_LICENSE_PREFIX};
use saavy_license::{ErrorCode, OfflineLicensePayload};

use crate::common::SIGNING_SECRET;

fn acme_payload() -> OfflineLicensePayload {
    let mut payload = OfflineLicensePayload::new("Acme Corp", Utc::now() + TimeDelta::days(30));
    payload.plan = Some("pro".into());
    payload.seats = Some(5);
    payload.features = vec!["reports".into(), "export".into()];
    payload
}

#[test]
fn test_generate_and_verify() {
    let payload = acme_payload();
    let license = offline::generate(SIGNING_SECRET, &payload).unwrap();
    assert!(license.starts_with(OFFLINE_LICENSE_PREFIX));
    assert!(offline::is_offline_format(&license));

    let decoded = offline::verify(SIGNING_SECRET, &license).unwrap();
    assert_eq!(decoded.get("customer"), Some(&json!("Acme Corp")));
    assert_eq!(decoded.get("plan"), Some(&json!("pro")));
    assert_eq!(decoded.get("seats"), Some(&json!(5)));
    assert_eq!(decoded.get("version"), Some(&json!(1)));
    assert_eq!(decoded.get("features"), Some(&json!(["reports", "export"])));
    assert_eq!(decoded.get("license_id"), Some(&json!(payload.license_id)));
}

#[test]
fn test_license_id_is_random_hex() {
    let a = OfflineLicensePayload::new("A", Utc::now());
    let b = OfflineLicensePayload::new("A", Utc::now());
    assert_eq!(a.license_id.len(), 16);
    assert!(a.license_id.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(a.license_id, b.license_id);
}

#[test]
fn test_empty_optionals_left_out() {
    let payload = OfflineLicensePayload::new("Solo", Utc::now());
    let map = payload.to_map();
    for key in ["plan", "seats", "notes", "features", "metadata"] {
        assert!(!map.contains_key(key), "{key}");
    }
}

#[test]
fn test_corrupted_signature_rejected() {
    let license = offline::generate(SIGNING_SECRET, &acme_payload()).unwrap();
    let last = license.chars().last().unwrap();
    let replacement = if last == 'a' { 'b' } else { 'a' };
    let corrupted = format!("{}{replacement}", &license[..license.len() - 1]);

    let err = offline::verify(SIGNING_SECRET, &corrupted).unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidSignature);
}

#[test]
fn test_any_flipped_byte_rejected() {
    let license = offline::generate(SIGNING_SECRET, &acme_payload()).unwrap();
    let body = license.strip_prefix(OFFLINE_LICENSE_PREFIX).unwrap();
    let (encoded, signature) = body.split_once('.').unwrap();
    let raw = URL_SAFE_NO_PAD.decode(encoded).unwrap();

    for i in 0..raw.len() {
        let mut tampered = raw.clone();
        tampered[i] ^= 0x01;
        let forged = format!(
            "{OFFLINE_LICENSE_PREFIX}{}.{signature}",
            URL_SAFE_NO_PAD.encode(&tampered)
        );
        let err = offline::verify(SIGNING_SECRET, &forged).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidSignature, "payload byte {i}");
    }

    for i in 0..signature.len() {
        let mut tampered = signature.as_bytes().to_vec();
        tampered[i] = if tampered[i] == b'f' { b'0' } else { b'f' };
        let forged = format!(
            "{OFFLINE_LICENSE_PREFIX}{encoded}.{}",
            String::from_utf8(tampered).unwrap()
        );
        let err = offline::verify(SIGNING_SECRET, &forged).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidSignature, "signature byte {i}");
    }
}

#[test]
fn test_uppercase_signature_accepted() {
    let license = offline::generate(SIGNING_SECRET, &acme_payload()).unwrap();
    let (body, signature) = license.rsplit_once('.').unwrap();
    let upper = format!("{body}.{}", signature.to_ascii_uppercase());
    assert!(offline::verify(SIGNING_SECRET, &upper).is_ok());
}

#[test]
fn test_wrong_secret_rejected() {
    let license = offline::generate(SIGNING_SECRET, &acme_payload()).unwrap();
    let err = offline::verify("another-secret", &license).unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidSignature);
}

#[test]
fn test_swapped_payload_rejected() {
    let license = offline::generate(SIGNING_SECRET, &acme_payload()).unwrap();
    let (_, signature) = license.rsplit_once('.').unwrap();
    let forged = URL_SAFE_NO_PAD.encode(br#"{"customer":"Mallory","version":1}"#);
    let err = offline::verify(SIGNING_SECRET, &format!("{OFFLINE_LICENSE_PREFIX}{forged}.{signature}"))
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidSignature);
}

#[test]
fn test_missing_secret_is_configuration_error() {
    let err = offline::generate("", &acme_payload()).unwrap_err();
    assert_eq!(err.code, ErrorCode::ConfigurationError);
    let err = offline::verify("", "SAOFF1-abc.def").unwrap_err();
    assert_eq!(err.code, ErrorCode::ConfigurationError);
}

#[test]
fn test_malformed_licenses() {
    let cases = [
        "not-offline",
        "SAOFF1-no-dot",
        "SAOFF1-!!!.abcdef",
    ];
    for case in cases {
        let err = offline::verify(SIGNING_SECRET, case).unwrap_err();
        assert_eq!(err.code, ErrorCode::MalformedCredential, "{case}");
    }
}

#[test]
fn test_signed_non_object_payload_is_malformed() {
    let raw = b"[1,2,3]";
    let signature = saavy_license::crypto::hmac_sha256_hex(SIGNING_SECRET.as_bytes(), raw).unwrap();
    let license = format!("{OFFLINE_LICENSE_PREFIX}{}.{signature}", URL_SAFE_NO_PAD.encode(raw));
    let err = offline::verify(SIGNING_SECRET, &license).unwrap_err();
    assert_eq!(err.code, ErrorCode::MalformedCredential);
}

#[test]
fn test_payload_is_canonical_json() {
    let mut payload = acme_payload();
    payload.metadata.insert("zeta".into(), json!(1));
    payload.metadata.insert("alpha".into(), json!("café"));
    let license = offline::generate(SIGNING_SECRET, &payload).unwrap();

    let body = license.strip_prefix(OFFLINE_LICENSE_PREFIX).unwrap();
    let (encoded, _) = body.split_once('.').unwrap();
    let raw = String::from_utf8(URL_SAFE_NO_PAD.decode(encoded).unwrap()).unwrap();

    assert!(raw.is_ascii());
    assert!(!raw.contains(": ") && !raw.contains(", "));
    assert!(raw.contains(r#""metadata":{"alpha":"caf\u00e9","zeta":1}"#));
    let positions: Vec<usize> = ["customer", "expires_at", "features", "issued_at", "license_id"]
        .iter()
        .map(|key| raw.find(&format!("\"{key}\":")).unwrap())
        .collect();
    assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
}
