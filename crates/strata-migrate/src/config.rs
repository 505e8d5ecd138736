//! Migrator configuration.
//!
//! Configuration is plain serde data, loadable from a JSON document.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};
use crate::schema::{require_identifier, ColumnType};

/// The implicit primary key column prepended to created tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimaryKeyConfig {
    /// Column name.
    pub name: String,
    /// Column type.
    #[serde(rename = "type")]
    pub ty: ColumnType,
}

impl Default for PrimaryKeyConfig {
    fn default() -> Self {
        Self {
            name: "id".to_string(),
            ty: ColumnType::Serial,
        }
    }
}

/// Settings applied to every session a migrator starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MigratorConfig {
    /// Prefix stamped on descriptors that do not name one.
    pub default_prefix: Option<String>,
    /// Implicit primary key for created tables.
    pub primary_key: PrimaryKeyConfig,
}

impl MigratorConfig {
    /// Parses a configuration from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| MigrateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    /// Checks the configuration for empty names.
    pub fn validate(&self) -> Result<()> {
        require_identifier("primary key name", &self.primary_key.name)
            .map_err(|e| MigrateError::Config(e.to_string()))?;
        if let Some(prefix) = &self.default_prefix {
            require_identifier("default prefix", prefix)
                .map_err(|e| MigrateError::Config(e.to_string()))?;
        }
        Ok(())
    }
}
