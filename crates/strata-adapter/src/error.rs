//! Error types for storage adapters.

use std::path::PathBuf;

use strata_migrate::schema::ColumnType;

/// Errors an adapter operation can return.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The filters of an update or delete matched no rows.
    #[error("Stale {operation} on '{table}': no rows matched the filters")]
    Stale {
        /// Target table.
        table: String,
        /// The operation that found nothing (`update` or `delete`).
        operation: &'static str,
    },

    /// A value was given for a key the backend assigns itself.
    #[error("Field '{field}' is autogenerated and cannot be assigned")]
    AutogeneratedKeyAssigned {
        /// The autogenerated field.
        field: String,
    },

    /// A value does not fit the requested type.
    #[error("Cannot cast {value} value to {}", .ty.as_str())]
    Cast {
        /// Target type.
        ty: ColumnType,
        /// Kind of the offending value.
        value: &'static str,
    },

    /// A bulk operation came without predicates and without an explicit
    /// all-rows scope.
    #[error("Bulk operation on '{0}' has no predicates; use Scope::All to target every row")]
    UnscopedBulkQuery(String),

    /// A predicate refers to a parameter that was not supplied.
    #[error("Missing query parameter at position {0}")]
    MissingParameter(usize),

    /// The operation was malformed.
    #[error("Invalid operation: {0}")]
    Invalid(String),

    /// The adapter was used before `start`.
    #[error("Adapter has not been started")]
    NotStarted,

    /// Database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (reading configuration files).
    #[error("IO error reading '{path}': {source}")]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AdapterError {
    /// Returns true if the operation found no rows to act on.
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        matches!(self, Self::Stale { .. })
    }
}

/// Result type for adapter operations.
pub type Result<T> = std::result::Result<T, AdapterError>;
