//! Direction-aware schema migration commands.
//!
//! `strata-migrate` turns declarative schema changes into primitive commands
//! and, when a migration runs in reverse, into their inverses:
//! - Descriptors (`table`, `index`, `references`) describe schema shape
//! - The builder turns descriptors and column operations into commands
//! - The direction passes commands through or inverts them, rejecting
//!   statements with no inverse as soon as they are issued
//! - A session records the resulting commands for one run, and only one
//!   session per slot may be active at a time
//!
//! # Example
//!
//! ```rust
//! use strata_migrate::prelude::*;
//!
//! struct CreatePosts;
//!
//! impl Migration for CreatePosts {
//!     fn version(&self) -> i64 {
//!         20240101120000
//!     }
//!
//!     fn name(&self) -> &str {
//!         "create_posts"
//!     }
//!
//!     fn change(&self, session: &mut Session<'_>) -> Result<()> {
//!         session.create(table("posts"), |t| {
//!             t.add("title", ColumnType::String, ColumnOptions::new());
//!             t.add("author_id", references("authors"), ColumnOptions::new());
//!             t.timestamps();
//!         })?;
//!         session.create_index(index("posts", ["title"]))
//!     }
//! }
//!
//! let slot = SessionSlot::new();
//! let mut migrator = Migrator::with_slot(&slot, MigratorConfig::default());
//! migrator.run(&CreatePosts, Direction::Forward)?;
//!
//! let report = migrator.run(&CreatePosts, Direction::Reverse)?;
//! assert_eq!(report.commands.last(), Some(&Command::DropTable(table("posts"))));
//! # Ok::<(), MigrateError>(())
//! ```

pub mod backend;
pub mod builder;
pub mod command;
pub mod config;
pub mod direction;
pub mod error;
pub mod executor;
pub mod schema;
pub mod session;
pub mod state;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::backend::MigrationBackend;
    pub use crate::builder::TableBlock;
    pub use crate::command::{ColumnOperation, Command, ExistsTarget, FieldType};
    pub use crate::config::{MigratorConfig, PrimaryKeyConfig};
    pub use crate::direction::Direction;
    pub use crate::error::{MigrateError, Result};
    pub use crate::executor::{MigrationReport, Migrator};
    pub use crate::schema::{
        index, references, table, ColumnOptions, ColumnType, DefaultValue, Index, Reference,
        ReferenceAction, Table,
    };
    pub use crate::session::{Session, SessionOptions, SessionSlot};
    pub use crate::state::SchemaState;
    pub use crate::Migration;
}

/// A versioned migration.
///
/// Most migrations only implement `change`, which runs as written going
/// forward and is inverted statement by statement going in reverse.
/// Migrations that cannot be inverted implement `up` and `down` instead and
/// return `true` from `has_down`.
pub trait Migration {
    /// Version used to order migrations.
    fn version(&self) -> i64;

    /// Migration name.
    fn name(&self) -> &str;

    /// Reversible body of the migration.
    fn change(&self, _session: &mut session::Session<'_>) -> error::Result<()> {
        Err(error::MigrateError::InvalidOperation(format!(
            "migration '{}' defines neither change nor up",
            self.name()
        )))
    }

    /// Forward body; defaults to `change`.
    fn up(&self, session: &mut session::Session<'_>) -> error::Result<()> {
        self.change(session)
    }

    /// Reverse body, only used when `has_down` returns true.
    fn down(&self, _session: &mut session::Session<'_>) -> error::Result<()> {
        Err(error::MigrateError::InvalidOperation(format!(
            "migration '{}' defines no down",
            self.name()
        )))
    }

    /// Whether `down` should be used instead of reversing `change`.
    fn has_down(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    struct Empty;

    impl Migration for Empty {
        fn version(&self) -> i64 {
            7
        }

        fn name(&self) -> &str {
            "empty"
        }
    }

    #[test]
    fn test_migration_without_body() {
        let slot = SessionSlot::new();
        let mut migrator = Migrator::with_slot(&slot, MigratorConfig::default());

        let err = migrator.run(&Empty, Direction::Forward).unwrap_err();
        assert!(matches!(err, MigrateError::InvalidOperation(_)));
        assert!(!migrator.is_applied(7));
        assert!(slot.active().is_none());
    }
}
