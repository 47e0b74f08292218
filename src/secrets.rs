//! Sources a credential or secret can be read from.
//!
//! Lookup order is an explicit [`SecretChain`]: the first source that yields
//! a non-empty value wins.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

/// A place a secret might be stored.
pub trait SecretSource: Send + Sync {
    /// Get a value by key. Empty values count as absent.
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads process environment variables. `key` is mapped to a variable name
/// through `aliases` when present, otherwise used as-is.
#[derive(Debug, Default)]
pub struct EnvSource {
    aliases: HashMap<String, String>,
}

impl EnvSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alias(mut self, key: &str, variable: &str) -> Self {
        self.aliases.insert(key.to_string(), variable.to_string());
        self
    }
}

impl SecretSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        let variable = self.aliases.get(key).map(String::as_str).unwrap_or(key);
        std::env::var(variable).ok().and_then(non_empty)
    }
}

/// Reads the first non-empty file from a list, ignoring the key.
#[derive(Debug, Clone)]
pub struct FileSource {
    paths: Vec<PathBuf>,
}

impl FileSource {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    /// `~/.license_key` then `~/.config/shopsaavy/license_key`.
    pub fn default_license_files() -> Self {
        let paths = dirs::home_dir()
            .map(|home| {
                vec![
                    home.join(".license_key"),
                    home.join(".config").join("shopsaavy").join("license_key"),
                ]
            })
            .unwrap_or_default();
        Self::new(paths)
    }
}

impl SecretSource for FileSource {
    fn get(&self, _key: &str) -> Option<String> {
        self.paths
            .iter()
            .filter_map(|path| std::fs::read_to_string(path).ok())
            .find_map(non_empty)
    }
}

/// In-memory source. Stands in for an OS keystore and is handy in tests.
#[derive(Debug, Default)]
pub struct MemorySource {
    store: RwLock<HashMap<String, String>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&self, key: &str, value: &str) {
        if let Ok(mut store) = self.store.write() {
            store.insert(key.to_string(), value.to_string());
        }
    }
}

impl SecretSource for MemorySource {
    fn get(&self, key: &str) -> Option<String> {
        self.store.read().ok()?.get(key).cloned().and_then(non_empty)
    }
}

/// Ordered list of sources.
#[derive(Default)]
pub struct SecretChain {
    sources: Vec<Box<dyn SecretSource>>,
}

impl SecretChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, source: impl SecretSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Default credential lookup: `LICENSE_KEY`, then the well-known files.
    /// A keystore source can be spliced in between with [`SecretChain::then`]
    /// by building the chain by hand.
    pub fn default_credential_chain() -> Self {
        Self::new()
            .then(EnvSource::new().alias(LICENSE_KEY, "LICENSE_KEY"))
            .then(FileSource::default_license_files())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.sources.iter().find_map(|source| source.get(key))
    }
}

impl SecretSource for SecretChain {
    fn get(&self, key: &str) -> Option<String> {
        SecretChain::get(self, key)
    }
}

/// Key under which the license credential is looked up.
pub const LICENSE_KEY: &str = "license_key";

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
