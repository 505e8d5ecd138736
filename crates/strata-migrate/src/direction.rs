//! Migration direction and command reversal.
//!
//! In forward mode commands pass through untouched. In reverse mode every
//! command is replaced by its structural inverse, or rejected when it has
//! none.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::command::{ColumnOperation, Command};
use crate::error::{MigrateError, Result};

/// The direction a migration session runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Apply the migration.
    Forward,
    /// Undo the migration.
    Reverse,
}

impl Direction {
    /// Passes a command through this direction.
    pub fn emit(self, command: Command) -> Result<Command> {
        match self {
            Self::Forward => Ok(command),
            Self::Reverse => reverse(&command),
        }
    }

    /// Interprets an existence check result for this direction.
    ///
    /// A reverse run asks what held before the forward run, so the answer is
    /// negated.
    #[must_use]
    pub const fn check(self, exists: bool) -> bool {
        match self {
            Self::Forward => exists,
            Self::Reverse => !exists,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forward => f.write_str("forward"),
            Self::Reverse => f.write_str("reverse"),
        }
    }
}

/// Returns the structural inverse of a command.
pub fn reverse(command: &Command) -> Result<Command> {
    match command {
        Command::CreateTable(table, _) => Ok(Command::DropTable(table.clone())),
        Command::CreateTableIfNotExists(table, _) => {
            Ok(Command::DropTableIfExists(table.clone()))
        }
        Command::DropTable(table) | Command::DropTableIfExists(table) => {
            Err(MigrateError::irreversible(
                format!(
                    "dropping table '{}' keeps no column history to recreate it",
                    table.qualified_name()
                ),
                command,
            ))
        }
        Command::RenameTable(from, to) => Ok(Command::RenameTable(to.clone(), from.clone())),
        Command::CreateIndex(index) => Ok(Command::DropIndex(index.clone())),
        Command::CreateIndexIfNotExists(index) => Ok(Command::DropIndexIfExists(index.clone())),
        Command::DropIndex(index) => Ok(Command::CreateIndex(index.clone())),
        Command::DropIndexIfExists(index) => Ok(Command::CreateIndexIfNotExists(index.clone())),
        Command::AlterTable(table, operations) => {
            let reversed = operations
                .iter()
                .rev()
                .map(|op| {
                    reverse_operation(op).ok_or_else(|| {
                        MigrateError::irreversible(
                            format!(
                                "alter table '{}': cannot reverse {}",
                                table.qualified_name(),
                                op.description()
                            ),
                            command,
                        )
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Command::AlterTable(table.clone(), reversed))
        }
        Command::ExecuteRaw(_) => Err(MigrateError::irreversible(
            "raw statements have no inverse",
            command,
        )),
    }
}

/// Returns the inverse of a single column operation, if it has one.
///
/// Removing or modifying a column loses the original type and options, so
/// neither can be reversed.
#[must_use]
pub fn reverse_operation(op: &ColumnOperation) -> Option<ColumnOperation> {
    match op {
        ColumnOperation::Add(name, _, _) => Some(ColumnOperation::Remove(name.clone())),
        ColumnOperation::Rename(from, to) => {
            Some(ColumnOperation::Rename(to.clone(), from.clone()))
        }
        ColumnOperation::Remove(_) | ColumnOperation::Modify(..) => None,
    }
}
