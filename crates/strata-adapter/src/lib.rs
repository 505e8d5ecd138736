//! Storage adapters for strata.
//!
//! An [`Adapter`](protocol::Adapter) converts values between their loaded and
//! stored forms, generates keys the database cannot, and performs single and
//! bulk data operations. Updates and deletes that match no rows fail with
//! [`AdapterError::Stale`](error::AdapterError::Stale).
//!
//! [`SqliteAdapter`](sqlite::SqliteAdapter) implements the protocol over a
//! sqlx pool. Its [`catalog`](sqlite::SqliteAdapter::catalog) snapshot answers
//! the existence checks of a migration session.

pub mod config;
pub mod error;
pub mod protocol;
pub mod sqlite;
pub mod value;

pub use config::AdapterConfig;
pub use error::{AdapterError, Result};
pub use protocol::{
    Adapter, Autogenerate, AutogenerateKind, AutogeneratePolicy, BulkQuery, Comparison, Fields,
    Filters, OperationOptions, Predicate, SchemaMeta, Scope, StartError, Started,
};
pub use sqlite::{CatalogSnapshot, SqliteAdapter};
pub use value::Value;
