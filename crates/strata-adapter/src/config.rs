//! Adapter configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AdapterError, Result};
use crate::protocol::AutogeneratePolicy;

fn default_url() -> String {
    "sqlite::memory:".to_string()
}

const fn default_max_connections() -> u32 {
    1
}

/// Connection and behavior settings for an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Database URL.
    #[serde(default = "default_url")]
    pub url: String,
    /// Pool size. In-memory SQLite databases need 1 so every statement sees
    /// the same database.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Handling of caller-assigned autogenerated keys.
    #[serde(default)]
    pub autogenerate_policy: AutogeneratePolicy,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            max_connections: default_max_connections(),
            autogenerate_policy: AutogeneratePolicy::default(),
        }
    }
}

impl AdapterConfig {
    /// Creates a configuration for `url` with default settings.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Sets the autogenerate policy.
    #[must_use]
    pub const fn autogenerate_policy(mut self, policy: AutogeneratePolicy) -> Self {
        self.autogenerate_policy = policy;
        self
    }

    /// Parses a configuration from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| AdapterError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    /// Checks the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(AdapterError::Config("url must not be empty".to_string()));
        }
        if self.max_connections == 0 {
            return Err(AdapterError::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AdapterConfig::default();
        assert_eq!(config.url, "sqlite::memory:");
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.autogenerate_policy, AutogeneratePolicy::Reject);
    }

    #[test]
    fn test_from_json() {
        let config = AdapterConfig::from_json_str(
            r#"{"url": "sqlite://app.db", "autogenerate_policy": "honor"}"#,
        )
        .unwrap();
        assert_eq!(config.url, "sqlite://app.db");
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.autogenerate_policy, AutogeneratePolicy::Honor);
    }

    #[test]
    fn test_rejects_zero_connections() {
        let result = AdapterConfig::from_json_str(r#"{"max_connections": 0}"#);
        assert!(matches!(result, Err(AdapterError::Config(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_connections": 4}}"#).unwrap();

        let config = AdapterConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.url, "sqlite::memory:");
    }
}
