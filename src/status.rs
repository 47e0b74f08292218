//! Outcome of a validation attempt, shared by every validation path.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Result of a validation attempt. Also the shape the remote authority
/// answers with and the shape persisted in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationStatus {
    #[serde(default)]
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub message: Option<String>,
}

fn is_blank(message: &Option<String>) -> bool {
    message.as_deref().is_none_or(str::is_empty)
}

impl ValidationStatus {
    pub fn valid() -> Self {
        Self {
            valid: true,
            expiry: None,
            details: None,
            message: None,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            expiry: None,
            details: None,
            message: Some(message.into()),
        }
    }

    pub fn with_expiry(mut self, expiry: Option<String>) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn with_details(mut self, details: Map<String, Value>) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Parsed expiry. `None` when absent or unparseable.
    pub fn expiry_datetime(&self) -> Option<DateTime<Utc>> {
        self.expiry.as_deref().and_then(parse_datetime)
    }

    /// A status without a parseable expiry never expires.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry_datetime().is_some_and(|expiry| expiry < now)
    }
}

/// Parse the timestamp forms found in licenses, cache files and authority
/// responses: RFC 3339 (`Z` or offset), `YYYY-MM-DD HH:MM:SS+HHMM`, and
/// offset-less ISO 8601 which is read as UTC.
pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%z") {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%:z") {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// ISO 8601 with an explicit `+00:00` offset.
pub fn format_datetime(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Unix seconds as ISO 8601; `None` when out of range.
pub fn format_timestamp(timestamp: i64) -> Option<String> {
    DateTime::from_timestamp(timestamp, 0).map(format_datetime)
}
