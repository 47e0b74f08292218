//! On-disk memo of the last successful validation.
//!
//! Every successful validation is written to the primary cache file and
//! mirrored to a local fallback file. The primary file is only trusted for
//! the TTL; the mirror is what offline fallback reads once the network is
//! gone. Both are keyed by the SHA-256 of the credential, so a changed
//! credential never inherits an old result.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::{constant_time_eq, hash_secret, hmac_sha256_hex, to_canonical_json};
use crate::error::{LicenseError, Result};
use crate::status::{ValidationStatus, format_datetime, parse_datetime};

/// Default hours a cached result stays usable.
pub const DEFAULT_TTL_HOURS: i64 = 24;

/// How far in the future `validated_at` may be before the entry is distrusted.
pub const MAX_CLOCK_SKEW_SECS: i64 = 300;

/// Persisted cache record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub license_hash: String,
    pub status: ValidationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated_at: Option<String>,
    /// HMAC over the rest of the entry, present when an integrity key is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
}

impl CacheEntry {
    fn integrity_tag(&self, key: &str) -> Result<String> {
        let unsigned = CacheEntry {
            integrity: None,
            ..self.clone()
        };
        let bytes = to_canonical_json(&unsigned)
            .map_err(|e| LicenseError::malformed(format!("Unable to encode cache entry: {e}")))?;
        hmac_sha256_hex(key.as_bytes(), &bytes)
    }

    fn integrity_ok(&self, key: Option<&str>) -> bool {
        let Some(key) = key else {
            return true;
        };
        match (&self.integrity, self.integrity_tag(key)) {
            (Some(stored), Ok(expected)) => {
                constant_time_eq(stored.to_ascii_lowercase().as_bytes(), expected.as_bytes())
            }
            _ => false,
        }
    }
}

/// A cache hit: the stored status and when it was validated.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedValidation {
    pub status: ValidationStatus,
    pub validated_at: String,
}

/// Primary cache file plus local fallback mirror.
#[derive(Debug, Clone)]
pub struct ValidationCache {
    primary: PathBuf,
    fallback: PathBuf,
    ttl: TimeDelta,
    integrity_key: Option<String>,
}

impl ValidationCache {
    pub fn new(primary: impl Into<PathBuf>, fallback: impl Into<PathBuf>) -> Self {
        Self {
            primary: primary.into(),
            fallback: fallback.into(),
            ttl: TimeDelta::hours(DEFAULT_TTL_HOURS),
            integrity_key: None,
        }
    }

    pub fn with_ttl(mut self, ttl: TimeDelta) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sign entries with `key` and refuse entries without a matching tag.
    pub fn with_integrity_key(mut self, key: Option<String>) -> Self {
        self.integrity_key = key.filter(|k| !k.is_empty());
        self
    }

    pub fn primary_path(&self) -> &Path {
        &self.primary
    }

    pub fn fallback_path(&self) -> &Path {
        &self.fallback
    }

    pub fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    /// Fresh cached result for `credential`, or `None` on any kind of miss:
    /// absent or corrupt file, other credential, missing or unparseable
    /// `validated_at`, bad integrity tag, older than the TTL, or validated
    /// more than [`MAX_CLOCK_SKEW_SECS`] in the future.
    pub fn load(&self, credential: &str, now: DateTime<Utc>) -> Option<CachedValidation> {
        let entry = read_entry(&self.primary).ok()??;
        if !self.belongs_to(&entry, credential) {
            return None;
        }
        let validated_at_raw = entry.validated_at.filter(|v| !v.is_empty())?;
        let validated_at = parse_datetime(&validated_at_raw)?;
        let age = now - validated_at;
        if age > self.ttl || age < -TimeDelta::seconds(MAX_CLOCK_SKEW_SECS) {
            return None;
        }
        Some(CachedValidation {
            status: entry.status,
            validated_at: validated_at_raw,
        })
    }

    /// Read the local fallback mirror. Unlike [`ValidationCache::load`] this
    /// reports why the file is unusable; the TTL does not apply.
    pub fn load_fallback(&self, credential: &str) -> Result<Option<CachedValidation>> {
        let entry = read_entry(&self.fallback)
            .map_err(|_| LicenseError::offline_unavailable("Invalid local license file."))?;
        let Some(entry) = entry else {
            return Ok(None);
        };
        if !self.belongs_to(&entry, credential) {
            return Err(LicenseError::offline_unavailable(
                "License key mismatch in local file.",
            ));
        }
        Ok(Some(CachedValidation {
            status: entry.status,
            validated_at: entry.validated_at.unwrap_or_default(),
        }))
    }

    /// Persist `status` for `credential` to both files. Returns the
    /// `validated_at` written. Write failures are logged and swallowed.
    pub fn store(&self, credential: &str, status: &ValidationStatus, now: DateTime<Utc>) -> Option<String> {
        let validated_at = format_datetime(now);
        let mut entry = CacheEntry {
            license_hash: hash_secret(credential),
            status: status.clone(),
            validated_at: Some(validated_at.clone()),
            integrity: None,
        };
        if let Some(key) = &self.integrity_key {
            match entry.integrity_tag(key) {
                Ok(tag) => entry.integrity = Some(tag),
                Err(e) => {
                    tracing::warn!("Unable to sign license cache entry: {}", e);
                    return None;
                }
            }
        }

        let written = [&self.primary, &self.fallback]
            .into_iter()
            .map(|path| match write_entry(path, &entry) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("Unable to write license cache {}: {}", path.display(), e);
                    false
                }
            })
            .fold(true, |all, ok| all && ok);

        written.then_some(validated_at)
    }

    fn belongs_to(&self, entry: &CacheEntry, credential: &str) -> bool {
        let expected = hash_secret(credential);
        constant_time_eq(entry.license_hash.as_bytes(), expected.as_bytes())
            && entry.integrity_ok(self.integrity_key.as_deref())
    }
}

/// `Ok(None)` when the file does not exist, `Err` when it exists but cannot
/// be read or parsed.
fn read_entry(path: &Path) -> std::io::Result<Option<CacheEntry>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(std::io::Error::other)
}

/// Atomic write: temp file in the same directory, then rename over the
/// target, so a concurrent reader sees either the old or the new entry.
fn write_entry(path: &Path, entry: &CacheEntry) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let json = serde_json::to_vec(entry).map_err(std::io::Error::other)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&json)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
