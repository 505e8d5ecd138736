//! Error types for the migration engine.

use std::path::PathBuf;

use crate::command::Command;
use crate::direction::Direction;

/// Errors that can occur while building, reversing or running migrations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// A command has no structural inverse and was issued in reverse.
    #[error("Irreversible migration command: {description}")]
    Irreversible {
        /// What could not be reversed.
        description: String,
        /// The offending forward command.
        command: Box<Command>,
    },

    /// A session was started while another one is active.
    #[error("Migration session {session_id} ({direction}) is already running")]
    AlreadyStarted {
        /// Identifier of the active session.
        session_id: u64,
        /// Direction of the active session.
        direction: Direction,
    },

    /// A descriptor carries an empty identifier.
    #[error("Empty identifier: {0}")]
    EmptyIdentifier(&'static str),

    /// A column operation is not allowed in this position.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// A command does not apply to the current schema state.
    #[error("Invalid migration state: {0}")]
    InvalidState(String),

    /// Two migrations share a version.
    #[error("Duplicate migration version {0}")]
    DuplicateVersion(i64),

    /// The backend failed to answer an existence check.
    #[error("Backend error: {0}")]
    Backend(String),

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

impl MigrateError {
    /// Builds an irreversibility error for a command.
    #[must_use]
    pub fn irreversible(description: impl Into<String>, command: &Command) -> Self {
        Self::Irreversible {
            description: description.into(),
            command: Box::new(command.clone()),
        }
    }

    /// Returns true if this is an irreversibility error.
    #[must_use]
    pub const fn is_irreversible(&self) -> bool {
        matches!(self, Self::Irreversible { .. })
    }
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
