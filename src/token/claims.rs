use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{LicenseError, Result};

const FIELD_SEPARATOR: char = '|';

/// Fields covered by a token signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    pub identifier: String,
    pub product: String,
    pub version: String,
    /// Unix timestamp in seconds
    pub expiry: i64,
}

impl TokenPayload {
    pub fn new(
        identifier: impl Into<String>,
        product: impl Into<String>,
        version: impl Into<String>,
        expiry: i64,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            product: product.into(),
            version: version.into(),
            expiry,
        }
    }

    /// A token is still good during its final second: only `expiry < now`
    /// counts as expired.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expiry < now
    }

    /// Signed bytes: `identifier|product|version|expiry`.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        for (name, value) in [
            ("identifier", &self.identifier),
            ("product", &self.product),
            ("version", &self.version),
        ] {
            if value.contains(FIELD_SEPARATOR) {
                return Err(LicenseError::invalid_parameter(format!(
                    "Token {name} must not contain '{FIELD_SEPARATOR}'"
                )));
            }
        }
        if self.expiry < 0 {
            return Err(LicenseError::invalid_parameter("Token expiry must be non-negative"));
        }
        Ok(format!(
            "{}|{}|{}|{}",
            self.identifier, self.product, self.version, self.expiry
        )
        .into_bytes())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| LicenseError::malformed("Token payload is not valid UTF-8"))?;
        let fields: Vec<&str> = text.split(FIELD_SEPARATOR).collect();
        let [identifier, product, version, expiry] = fields.as_slice() else {
            return Err(LicenseError::malformed(
                "Token payload must have exactly four fields",
            ));
        };
        let expiry: i64 = expiry
            .parse()
            .map_err(|_| LicenseError::malformed("Token expiry is not an integer"))?;
        if expiry < 0 {
            return Err(LicenseError::malformed("Token expiry must be non-negative"));
        }
        Ok(Self::new(*identifier, *product, *version, expiry))
    }

    /// Details exposed in a validation status.
    pub fn to_details(&self) -> Map<String, Value> {
        let mut details = Map::new();
        details.insert("identifier".into(), Value::from(self.identifier.clone()));
        details.insert("product".into(), Value::from(self.product.clone()));
        details.insert("version".into(), Value::from(self.version.clone()));
        details.insert("mode".into(), Value::from("token"));
        details
    }
}
