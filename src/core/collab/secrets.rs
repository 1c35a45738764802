use std::collections::HashMap;
use std::env;

/// Source of named credential strings. Values are handed to task bodies verbatim.
pub trait SecretsProvider: Send + Sync {
    /// Get a secret by key.
    fn get(&self, key: &str) -> Option<String>;

    /// Check if a secret exists.
    fn exists(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// Reads secrets from environment variables, optionally under a prefix.
///
/// With prefix `HOMEFLOW_`, the key `ALPHA_API_KEY` is read from
/// `HOMEFLOW_ALPHA_API_KEY`. Empty values count as unset.
#[derive(Debug, Clone, Default)]
pub struct EnvSecrets {
    prefix: String,
}

impl EnvSecrets {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl SecretsProvider for EnvSecrets {
    fn get(&self, key: &str) -> Option<String> {
        env::var(format!("{}{}", self.prefix, key))
            .ok()
            .filter(|value| !value.trim().is_empty())
    }
}

/// Fixed in-memory secrets, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct StaticSecrets {
    values: HashMap<String, String>,
}

impl StaticSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl SecretsProvider for StaticSecrets {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}
