use std::env;
use std::path::PathBuf;

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::TimeDelta;

use crate::authority::DEFAULT_VALIDATION_URL;
use crate::cache::DEFAULT_TTL_HOURS;
use crate::engine::EngineConfig;
use crate::error::{LicenseError, Result};
use crate::kdf::{DEFAULT_IDENTIFIER, DEFAULT_SALT, ProductKeyVerifier};
use crate::token::load_verifying_key;

/// Product key secret compiled into release builds, base64 so it does not
/// show up as plain text in the binary.
const EMBEDDED_PRODUCT_SECRET_B64: &str = "U0hPUFNTQUFWWS1QUk9EVUNUSU9OLVNFR1JFVA==";

const IDENTIFIER_VARS: [&str; 2] = ["SHOPSAAVY_LICENSE_IDENTIFIER", "LICENSE_IDENTIFIER"];

#[derive(Clone)]
pub struct Config {
    pub cache_path: PathBuf,
    pub local_license_path: PathBuf,
    /// Audit log file; stderr only when unset
    pub log_path: Option<PathBuf>,
    pub signing_secret: Option<String>,
    pub validation_url: String,
    /// Skip the remote authority entirely
    pub offline_only: bool,
    pub public_key_path: Option<PathBuf>,
    pub expected_product: Option<String>,
    pub expected_version: Option<String>,
    pub product_secret: Option<String>,
    pub product_identifier: String,
    pub product_salt: Option<String>,
    pub cache_ttl_hours: i64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let cache_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".app_cache");

        let cache_ttl_hours: i64 = env::var("LICENSE_CACHE_TTL_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|h| *h > 0)
            .unwrap_or(DEFAULT_TTL_HOURS);

        let offline_only = env::var("LICENSE_OFFLINE_ONLY")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let product_identifier = IDENTIFIER_VARS
            .iter()
            .find_map(|name| non_empty_var(name))
            .unwrap_or_else(|| DEFAULT_IDENTIFIER.to_string());

        Self {
            cache_path: non_empty_var("LICENSE_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| cache_dir.join("license.json")),
            local_license_path: non_empty_var("LICENSE_LOCAL_KEY_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| cache_dir.join("license.key")),
            log_path: non_empty_var("LICENSE_LOG_PATH").map(PathBuf::from),
            signing_secret: non_empty_var("LICENSE_SIGNING_SECRET"),
            validation_url: non_empty_var("LICENSE_VALIDATION_URL")
                .unwrap_or_else(|| DEFAULT_VALIDATION_URL.to_string()),
            offline_only,
            public_key_path: non_empty_var("LICENSE_PUBLIC_KEY_PATH").map(PathBuf::from),
            expected_product: non_empty_var("LICENSE_EXPECTED_PRODUCT"),
            expected_version: non_empty_var("LICENSE_EXPECTED_VERSION"),
            product_secret: non_empty_var("LICENSE_PRODUCT_SECRET"),
            product_identifier,
            product_salt: Some(non_empty_var("LICENSE_PRODUCT_SALT").unwrap_or_else(|| DEFAULT_SALT.to_string())),
            cache_ttl_hours,
        }
    }

    /// Product key secret: `LICENSE_PRODUCT_SECRET` or the embedded one.
    pub fn product_secret(&self) -> Result<String> {
        if let Some(secret) = &self.product_secret {
            return Ok(secret.clone());
        }
        STANDARD
            .decode(EMBEDDED_PRODUCT_SECRET_B64)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or_else(|| LicenseError::configuration("Embedded product secret is corrupt"))
    }

    pub fn product_key_verifier(&self) -> Result<ProductKeyVerifier> {
        Ok(
            ProductKeyVerifier::new(self.product_secret()?, &self.product_identifier)
                .with_salt(self.product_salt.clone()),
        )
    }

    /// Resolve file-based settings into an explicit engine configuration.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let public_key = self
            .public_key_path
            .as_deref()
            .map(load_verifying_key)
            .transpose()?;

        let cache_ttl = TimeDelta::try_hours(self.cache_ttl_hours).ok_or_else(|| {
            LicenseError::configuration(format!(
                "LICENSE_CACHE_TTL_HOURS {} is out of range",
                self.cache_ttl_hours
            ))
        })?;

        let mut config = EngineConfig::new(&self.cache_path, &self.local_license_path);
        config.cache_ttl = cache_ttl;
        config.signing_secret = self.signing_secret.clone();
        config.public_key = public_key;
        config.expected_product = self.expected_product.clone();
        config.expected_version = self.expected_version.clone();
        config.product_key = Some(self.product_key_verifier()?);
        Ok(config)
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("cache_path", &self.cache_path)
            .field("local_license_path", &self.local_license_path)
            .field("log_path", &self.log_path)
            .field("signing_secret", &self.signing_secret.as_ref().map(|_| "<set>"))
            .field("validation_url", &self.validation_url)
            .field("offline_only", &self.offline_only)
            .field("public_key_path", &self.public_key_path)
            .field("expected_product", &self.expected_product)
            .field("expected_version", &self.expected_version)
            .field("product_identifier", &self.product_identifier)
            .field("cache_ttl_hours", &self.cache_ttl_hours)
            .finish()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
