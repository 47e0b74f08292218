//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeDelta, Utc};
use ed25519_dalek::SigningKey;
use tempfile::TempDir;

use saavy_license::status::format_datetime;
use saavy_license::{
    Authority, EngineConfig, FixedClock, LicenseEngine, LicenseError, Result, ValidationStatus,
};

pub const SIGNING_SECRET: &str = "offline-signing-secret";
pub const PRODUCT_SECRET: &str = "product-secret";

/// Deterministic Ed25519 key so failures are reproducible.
pub fn signing_key() -> SigningKey {
    let mut seed = [0u8; 32];
    for (i, byte) in seed.iter_mut().enumerate() {
        *byte = i as u8 + 1;
    }
    SigningKey::from_bytes(&seed)
}

/// 2030-01-01T00:00:00Z
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_893_456_000, 0).unwrap()
}

pub fn valid_until(expiry: DateTime<Utc>) -> ValidationStatus {
    ValidationStatus::valid().with_expiry(Some(format_datetime(expiry)))
}

#[derive(Debug, Clone)]
enum Mode {
    Answer(ValidationStatus),
    Down,
}

/// Authority double that counts calls and can be switched between
/// answering and being unreachable after the engine takes ownership.
#[derive(Debug, Clone)]
pub struct FakeAuthority {
    calls: Arc<AtomicUsize>,
    mode: Arc<Mutex<Mode>>,
}

impl FakeAuthority {
    pub fn answering(status: ValidationStatus) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            mode: Arc::new(Mutex::new(Mode::Answer(status))),
        }
    }

    pub fn down() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            mode: Arc::new(Mutex::new(Mode::Down)),
        }
    }

    pub fn go_down(&self) {
        *self.mode.lock().unwrap() = Mode::Down;
    }

    pub fn answer(&self, status: ValidationStatus) {
        *self.mode.lock().unwrap() = Mode::Answer(status);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Authority for FakeAuthority {
    fn validate(&self, _credential: &str) -> Result<ValidationStatus> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &*self.mode.lock().unwrap() {
            Mode::Answer(status) => Ok(status.clone()),
            Mode::Down => Err(LicenseError::transport("connection refused")),
        }
    }
}

/// Temp directory, pinned clock, engine factory.
pub struct TestEnv {
    pub dir: TempDir,
    pub clock: Arc<FixedClock>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            clock: Arc::new(FixedClock::new(fixed_now())),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        use saavy_license::Clock;
        self.clock.now()
    }

    pub fn advance(&self, by: TimeDelta) {
        self.clock.advance(by);
    }

    pub fn config(&self) -> EngineConfig {
        EngineConfig::new(
            self.dir.path().join("license.json"),
            self.dir.path().join("license.key"),
        )
    }

    pub fn engine(
        &self,
        credential: &str,
        config: EngineConfig,
        authority: &FakeAuthority,
    ) -> LicenseEngine {
        LicenseEngine::new(credential, config)
            .with_authority(authority.clone())
            .with_clock(self.clock.clone())
    }
}
