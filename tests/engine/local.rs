use chrono::TimeDelta;
use serde_json::json;

use saavy_license::kdf::{self, DEFAULT_SALT, PRODUCT_KEY_LENGTH};
use saavy_license::token::{self, TokenPayload};
use saavy_license::{
    ErrorCode, OfflineLicensePayload, ProductKeyVerifier, ValidationSource, ValidationStatus,
    offline,
};

use crate::common::{FakeAuthority, PRODUCT_SECRET, SIGNING_SECRET, TestEnv, signing_key};

fn product_key() -> String {
    let raw = kdf::derive(PRODUCT_SECRET, "GLOBAL", Some(DEFAULT_SALT), PRODUCT_KEY_LENGTH).unwrap();
    kdf::format_key(&raw, 5, "-")
}

#[test]
fn test_missing_credential() {
    let env = TestEnv::new();
    let authority = FakeAuthority::down();
    let mut engine = env.engine("   ", env.config(), &authority);

    let err = engine.validate().unwrap_err();
    assert_eq!(err.code, ErrorCode::MissingCredential);
    assert_eq!(authority.calls(), 0);
}

#[test]
fn test_product_key_validates_locally() {
    let env = TestEnv::new();
    let authority = FakeAuthority::down();
    let mut config = env.config();
    config.product_key = Some(ProductKeyVerifier::new(PRODUCT_SECRET, "GLOBAL"));
    let mut engine = env.engine(&product_key(), config, &authority);

    let status = engine.validate().unwrap();
    assert!(status.valid);
    assert_eq!(status.message.as_deref(), Some("License validated locally."));
    assert_eq!(status.details.unwrap().get("mode"), Some(&json!("offline")));
    assert_eq!(engine.last_source(), Some(ValidationSource::ProductKey));
    assert_eq!(authority.calls(), 0);
}

#[test]
fn test_wrong_product_key_goes_remote() {
    let env = TestEnv::new();
    let authority = FakeAuthority::answering(ValidationStatus::invalid("Unknown key"));
    let mut config = env.config();
    config.product_key = Some(ProductKeyVerifier::new(PRODUCT_SECRET, "GLOBAL"));
    let mut engine = env.engine("WRONG-KEY-0000", config, &authority);

    let err = engine.validate().unwrap_err();
    assert_eq!(err.code, ErrorCode::RemoteRejected);
    assert_eq!(err.message, "Unknown key");
    assert_eq!(authority.calls(), 1);
}

#[test]
fn test_signed_token_validates_locally() {
    let env = TestEnv::new();
    let authority = FakeAuthority::down();
    let expiry = env.now().timestamp() + 3600;
    let signed = token::sign(&signing_key(), &TokenPayload::new("user", "ShopSaavy", "1.0.0", expiry)).unwrap();

    let mut config = env.config();
    config.public_key = Some(signing_key().verifying_key());
    config.expected_product = Some("ShopSaavy".into());
    let mut engine = env.engine(&token::human_readable(&signed), config, &authority);

    let status = engine.validate().unwrap();
    assert_eq!(status.message.as_deref(), Some("Signed token validated locally."));
    assert_eq!(status.expiry.as_deref(), Some("2030-01-01T01:00:00+00:00"));
    let details = status.details.unwrap();
    assert_eq!(details.get("identifier"), Some(&json!("user")));
    assert_eq!(details.get("mode"), Some(&json!("token")));
    assert_eq!(engine.last_source(), Some(ValidationSource::SignedToken));
    assert_eq!(authority.calls(), 0);
}

#[test]
fn test_signed_token_for_other_product_fails_hard() {
    let env = TestEnv::new();
    let authority = FakeAuthority::answering(ValidationStatus::valid());
    let expiry = env.now().timestamp() + 3600;
    let signed = token::sign(&signing_key(), &TokenPayload::new("user", "ShopSaavy", "1.0.0", expiry)).unwrap();

    let mut config = env.config();
    config.public_key = Some(signing_key().verifying_key());
    config.expected_product = Some("Other".into());
    let mut engine = env.engine(&signed, config, &authority);

    let err = engine.validate().unwrap_err();
    assert_eq!(err.code, ErrorCode::ProductMismatch);
    assert_eq!(authority.calls(), 0);
}

#[test]
fn test_expired_token_fails() {
    let env = TestEnv::new();
    let authority = FakeAuthority::answering(ValidationStatus::valid());
    let expiry = env.now().timestamp() - 10;
    let signed = token::sign(&signing_key(), &TokenPayload::new("user", "ShopSaavy", "1.0.0", expiry)).unwrap();

    let mut config = env.config();
    config.public_key = Some(signing_key().verifying_key());
    let mut engine = env.engine(&signed, config, &authority);

    assert_eq!(engine.validate().unwrap_err().code, ErrorCode::Expired);
    assert!(!engine.status_report().status.valid);
}

#[test]
fn test_token_without_public_key_goes_remote() {
    let env = TestEnv::new();
    let authority = FakeAuthority::answering(ValidationStatus::valid());
    let signed = token::sign(&signing_key(), &TokenPayload::new("user", "ShopSaavy", "1.0.0", 0)).unwrap();
    let mut engine = env.engine(&signed, env.config(), &authority);

    engine.validate().unwrap();
    assert_eq!(engine.last_source(), Some(ValidationSource::Remote));
    assert_eq!(authority.calls(), 1);
}

#[test]
fn test_offline_license_validates_locally() {
    let env = TestEnv::new();
    let authority = FakeAuthority::down();
    let mut payload = OfflineLicensePayload::new("Acme Corp", env.now() + TimeDelta::days(30));
    payload.plan = Some("pro".into());
    payload.seats = Some(5);
    let license = offline::generate(SIGNING_SECRET, &payload).unwrap();

    let mut config = env.config();
    config.signing_secret = Some(SIGNING_SECRET.into());
    let mut engine = env.engine(&license, config, &authority);

    let status = engine.validate().unwrap();
    assert_eq!(status.message.as_deref(), Some("Offline license validated locally."));
    assert_eq!(status.expiry.as_deref(), Some("2030-01-31T00:00:00+00:00"));
    let details = status.details.unwrap();
    assert_eq!(details.get("customer"), Some(&json!("Acme Corp")));
    assert_eq!(details.get("plan"), Some(&json!("pro")));
    assert_eq!(details.get("seats"), Some(&json!(5)));
    assert!(!details.contains_key("expires_at"));
    assert_eq!(engine.last_source(), Some(ValidationSource::OfflineLicense));
    assert_eq!(authority.calls(), 0);

    let report = engine.status_report();
    assert!(report.status.valid);
    assert_eq!(report.validated_at.as_deref(), Some("2030-01-01T00:00:00+00:00"));
}

#[test]
fn test_tampered_offline_license_fails_hard() {
    let env = TestEnv::new();
    let authority = FakeAuthority::answering(ValidationStatus::valid());
    let payload = OfflineLicensePayload::new("Acme Corp", env.now() + TimeDelta::days(30));
    let license = offline::generate(SIGNING_SECRET, &payload).unwrap();
    let last = license.chars().last().unwrap();
    let tampered = format!("{}{}", &license[..license.len() - 1], if last == '0' { '1' } else { '0' });

    let mut config = env.config();
    config.signing_secret = Some(SIGNING_SECRET.into());
    let mut engine = env.engine(&tampered, config, &authority);

    assert_eq!(engine.validate().unwrap_err().code, ErrorCode::InvalidSignature);
    assert_eq!(authority.calls(), 0);
}

#[test]
fn test_expired_offline_license_fails() {
    let env = TestEnv::new();
    let authority = FakeAuthority::down();
    let payload = OfflineLicensePayload::new("Acme Corp", env.now() - TimeDelta::days(1));
    let license = offline::generate(SIGNING_SECRET, &payload).unwrap();

    let mut config = env.config();
    config.signing_secret = Some(SIGNING_SECRET.into());
    let mut engine = env.engine(&license, config, &authority);

    assert_eq!(engine.validate().unwrap_err().code, ErrorCode::Expired);
    assert!(!env.dir.path().join("license.json").exists());
}

#[test]
fn test_obfuscated_credential_keeps_last_four() {
    let env = TestEnv::new();
    let engine = env.engine("ABCDE-FGHIJ-KLMNO-PQRST", env.config(), &FakeAuthority::down());
    assert_eq!(engine.obfuscated_credential(), "XXXX-XXXX-QRST");
}
