//! Primitive migration commands.
//!
//! A command is the unit a session records and a backend executes. Column
//! operations only ever appear inside a create or alter command.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::{ColumnOptions, ColumnType, Index, Reference, Table};

/// The type given to an added or modified column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// A plain column type.
    Type(ColumnType),
    /// A foreign key to another table's column.
    References(Reference),
}

impl FieldType {
    /// Returns the type the column is stored as, when known.
    ///
    /// Unresolved references report `None`.
    #[must_use]
    pub const fn storage_type(&self) -> Option<ColumnType> {
        match self {
            Self::Type(ty) => Some(*ty),
            Self::References(reference) => reference.storage_type(),
        }
    }
}

impl From<ColumnType> for FieldType {
    fn from(ty: ColumnType) -> Self {
        Self::Type(ty)
    }
}

impl From<Reference> for FieldType {
    fn from(reference: Reference) -> Self {
        Self::References(reference)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(ty) => f.write_str(ty.as_str()),
            Self::References(r) => write!(f, "references {}({})", r.table, r.column),
        }
    }
}

/// A single column change inside a create or alter command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnOperation {
    /// Add a column.
    Add(String, FieldType, ColumnOptions),
    /// Change a column's type or options.
    Modify(String, FieldType, ColumnOptions),
    /// Remove a column.
    Remove(String),
    /// Rename a column.
    Rename(String, String),
}

impl ColumnOperation {
    /// Creates an add operation.
    #[must_use]
    pub fn add(name: impl Into<String>, ty: impl Into<FieldType>, options: ColumnOptions) -> Self {
        Self::Add(name.into(), ty.into(), options)
    }

    /// Creates a modify operation.
    #[must_use]
    pub fn modify(
        name: impl Into<String>,
        ty: impl Into<FieldType>,
        options: ColumnOptions,
    ) -> Self {
        Self::Modify(name.into(), ty.into(), options)
    }

    /// Creates a remove operation.
    #[must_use]
    pub fn remove(name: impl Into<String>) -> Self {
        Self::Remove(name.into())
    }

    /// Creates a rename operation.
    #[must_use]
    pub fn rename(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::Rename(from.into(), to.into())
    }

    /// Returns the column this operation targets (the old name for renames).
    #[must_use]
    pub fn column(&self) -> &str {
        match self {
            Self::Add(name, ..) | Self::Modify(name, ..) | Self::Remove(name) => name,
            Self::Rename(from, _) => from,
        }
    }

    /// Returns a human-readable description of this operation.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::Add(name, ty, _) => format!("add column '{name}' ({ty})"),
            Self::Modify(name, ty, _) => format!("modify column '{name}' ({ty})"),
            Self::Remove(name) => format!("remove column '{name}'"),
            Self::Rename(from, to) => format!("rename column '{from}' to '{to}'"),
        }
    }
}

/// A primitive migration command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Create a table with the given column operations.
    CreateTable(Table, Vec<ColumnOperation>),
    /// Create a table unless it already exists.
    CreateTableIfNotExists(Table, Vec<ColumnOperation>),
    /// Alter a table.
    AlterTable(Table, Vec<ColumnOperation>),
    /// Drop a table.
    DropTable(Table),
    /// Drop a table if it exists.
    DropTableIfExists(Table),
    /// Rename a table.
    RenameTable(Table, Table),
    /// Create an index.
    CreateIndex(Index),
    /// Create an index unless it already exists.
    CreateIndexIfNotExists(Index),
    /// Drop an index.
    DropIndex(Index),
    /// Drop an index if it exists.
    DropIndexIfExists(Index),
    /// Raw backend statement.
    ExecuteRaw(String),
}

impl Command {
    /// Returns a human-readable description of this command.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::CreateTable(t, _) => format!("create table '{}'", t.qualified_name()),
            Self::CreateTableIfNotExists(t, _) => {
                format!("create table if not exists '{}'", t.qualified_name())
            }
            Self::AlterTable(t, ops) => format!(
                "alter table '{}' ({} operation(s))",
                t.qualified_name(),
                ops.len()
            ),
            Self::DropTable(t) => format!("drop table '{}'", t.qualified_name()),
            Self::DropTableIfExists(t) => {
                format!("drop table if exists '{}'", t.qualified_name())
            }
            Self::RenameTable(from, to) => format!(
                "rename table '{}' to '{}'",
                from.qualified_name(),
                to.qualified_name()
            ),
            Self::CreateIndex(i) => format!("create index '{}' on '{}'", i.name, i.table),
            Self::CreateIndexIfNotExists(i) => {
                format!("create index if not exists '{}' on '{}'", i.name, i.table)
            }
            Self::DropIndex(i) => format!("drop index '{}'", i.name),
            Self::DropIndexIfExists(i) => format!("drop index if exists '{}'", i.name),
            Self::ExecuteRaw(_) => "execute raw statement".to_string(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

/// The descriptor an existence check asks about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExistsTarget {
    /// Does the table exist?
    Table(Table),
    /// Does the index exist?
    Index(Index),
}

impl From<Table> for ExistsTarget {
    fn from(table: Table) -> Self {
        Self::Table(table)
    }
}

impl From<Index> for ExistsTarget {
    fn from(index: Index) -> Self {
        Self::Index(index)
    }
}
