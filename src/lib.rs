//! Offline and online license validation.
//!
//! Credentials come in three families:
//! - product keys derived from a secret with HMAC-SHA256 ([`kdf`])
//! - Ed25519-signed tokens ([`token`])
//! - HMAC-signed `SAOFF1-` offline licenses ([`offline`])
//!
//! [`engine::LicenseEngine`] ties them together with a validation cache and an
//! optional remote authority, failing closed on anything it cannot prove.

pub mod authority;
pub mod cache;
pub mod clock;
pub mod config;
pub mod credential;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod kdf;
pub mod offline;
pub mod secrets;
pub mod status;
pub mod token;

pub use authority::{Authority, HttpAuthority, NoAuthority};
pub use cache::{CacheEntry, CachedValidation, ValidationCache};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use credential::{CredentialFormat, classify, obfuscate};
pub use engine::{EngineConfig, LicenseEngine, StatusReport, ValidationSource};
pub use error::{ErrorCode, LicenseError, Result};
pub use kdf::ProductKeyVerifier;
pub use offline::OfflineLicensePayload;
pub use secrets::{EnvSource, FileSource, MemorySource, SecretChain, SecretSource};
pub use status::ValidationStatus;
pub use token::TokenPayload;
