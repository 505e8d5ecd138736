//! In-memory schema state.
//!
//! `SchemaState` replays commands against a model of tables, columns and
//! indexes. The migrator uses it as the existence backend for its sessions
//! and applies each run's commands to it, so later runs see earlier changes.

use tracing::warn;

use crate::backend::MigrationBackend;
use crate::command::{ColumnOperation, Command, ExistsTarget, FieldType};
use crate::error::{MigrateError, Result};
use crate::schema::{qualify, ColumnOptions, Index, Table};

/// A column as the state currently knows it.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnState {
    /// Column name.
    pub name: String,
    /// Column type.
    pub ty: FieldType,
    /// Column options.
    pub options: ColumnOptions,
}

/// A table as the state currently knows it.
#[derive(Debug, Clone, PartialEq)]
pub struct TableState {
    /// Table name.
    pub name: String,
    /// Table prefix.
    pub prefix: Option<String>,
    /// Columns in creation order.
    pub columns: Vec<ColumnState>,
}

impl TableState {
    /// Returns a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnState> {
        self.columns.iter().find(|c| c.name == name)
    }

    fn qualified_name(&self) -> String {
        qualify(self.prefix.as_deref(), &self.name)
    }
}

/// Schema reconstructed by replaying commands.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaState {
    tables: Vec<TableState>,
    indexes: Vec<Index>,
}

impl SchemaState {
    /// Creates an empty schema state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a table by descriptor.
    #[must_use]
    pub fn table(&self, table: &Table) -> Option<&TableState> {
        self.tables
            .iter()
            .find(|t| t.name == table.name && t.prefix == table.prefix)
    }

    /// Returns all known tables.
    #[must_use]
    pub fn tables(&self) -> &[TableState] {
        &self.tables
    }

    /// Returns all known indexes.
    #[must_use]
    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    /// Applies a sequence of commands in order.
    ///
    /// Either every command applies or the state is left unchanged.
    pub fn apply_all<'c>(&mut self, commands: impl IntoIterator<Item = &'c Command>) -> Result<()> {
        let mut next = self.clone();
        commands
            .into_iter()
            .try_for_each(|command| next.apply_in_place(command))?;
        *self = next;
        Ok(())
    }

    /// Applies a single command. On error the state is left unchanged.
    pub fn apply(&mut self, command: &Command) -> Result<()> {
        self.apply_all([command])
    }

    fn apply_in_place(&mut self, command: &Command) -> Result<()> {
        match command {
            Command::CreateTable(table, columns) => self.create_table(table, columns),
            Command::CreateTableIfNotExists(table, columns) => {
                if self.table(table).is_some() {
                    return Ok(());
                }
                self.create_table(table, columns)
            }
            Command::AlterTable(table, operations) => {
                let state = self.table_mut(table)?;
                operations
                    .iter()
                    .try_for_each(|op| alter_column(state, op))
            }
            Command::DropTable(table) => {
                let position = self.table_position(table)?;
                self.tables.remove(position);
                self.indexes
                    .retain(|i| !(i.table == table.name && i.prefix == table.prefix));
                Ok(())
            }
            Command::DropTableIfExists(table) => {
                if self.table(table).is_none() {
                    return Ok(());
                }
                self.apply_in_place(&Command::DropTable(table.clone()))
            }
            Command::RenameTable(from, to) => {
                if self.table(to).is_some() {
                    return Err(MigrateError::InvalidState(format!(
                        "Table '{}' already exists",
                        to.qualified_name()
                    )));
                }
                let state = self.table_mut(from)?;
                state.name.clone_from(&to.name);
                state.prefix.clone_from(&to.prefix);
                for index in &mut self.indexes {
                    if index.table == from.name && index.prefix == from.prefix {
                        index.table.clone_from(&to.name);
                        index.prefix.clone_from(&to.prefix);
                    }
                }
                Ok(())
            }
            Command::CreateIndex(index) => {
                if self.find_index(index).is_some() {
                    return Err(MigrateError::InvalidState(format!(
                        "Index '{}' already exists",
                        index.name
                    )));
                }
                self.create_index(index)
            }
            Command::CreateIndexIfNotExists(index) => {
                if self.find_index(index).is_some() {
                    return Ok(());
                }
                self.create_index(index)
            }
            Command::DropIndex(index) => {
                let position = self.find_index(index).ok_or_else(|| {
                    MigrateError::InvalidState(format!("Index '{}' does not exist", index.name))
                })?;
                self.indexes.remove(position);
                Ok(())
            }
            Command::DropIndexIfExists(index) => {
                if let Some(position) = self.find_index(index) {
                    self.indexes.remove(position);
                }
                Ok(())
            }
            Command::ExecuteRaw(_) => {
                warn!("Raw statement has no effect on the tracked schema state");
                Ok(())
            }
        }
    }

    fn create_table(&mut self, table: &Table, columns: &[ColumnOperation]) -> Result<()> {
        if self.table(table).is_some() {
            return Err(MigrateError::InvalidState(format!(
                "Table '{}' already exists",
                table.qualified_name()
            )));
        }

        let mut state = TableState {
            name: table.name.clone(),
            prefix: table.prefix.clone(),
            columns: Vec::with_capacity(columns.len()),
        };
        for op in columns {
            alter_column(&mut state, op)?;
        }
        self.tables.push(state);
        Ok(())
    }

    fn create_index(&mut self, index: &Index) -> Result<()> {
        let table = self
            .tables
            .iter()
            .find(|t| t.name == index.table && t.prefix == index.prefix)
            .ok_or_else(|| {
                MigrateError::InvalidState(format!(
                    "Cannot index missing table '{}'",
                    qualify(index.prefix.as_deref(), &index.table)
                ))
            })?;
        if let Some(missing) = index.columns.iter().find(|c| table.column(c).is_none()) {
            return Err(MigrateError::InvalidState(format!(
                "Column '{}' does not exist in table '{}'",
                missing,
                table.qualified_name()
            )));
        }
        self.indexes.push(index.clone());
        Ok(())
    }

    fn find_index(&self, index: &Index) -> Option<usize> {
        self.indexes
            .iter()
            .position(|i| i.name == index.name && i.prefix == index.prefix)
    }

    fn table_position(&self, table: &Table) -> Result<usize> {
        self.tables
            .iter()
            .position(|t| t.name == table.name && t.prefix == table.prefix)
            .ok_or_else(|| {
                MigrateError::InvalidState(format!(
                    "Table '{}' does not exist",
                    table.qualified_name()
                ))
            })
    }

    fn table_mut(&mut self, table: &Table) -> Result<&mut TableState> {
        let position = self.table_position(table)?;
        Ok(&mut self.tables[position])
    }
}

fn alter_column(table: &mut TableState, op: &ColumnOperation) -> Result<()> {
    match op {
        ColumnOperation::Add(name, ty, options) => {
            if table.column(name).is_some() {
                return Err(MigrateError::InvalidState(format!(
                    "Column '{}' already exists in table '{}'",
                    name,
                    table.qualified_name()
                )));
            }
            table.columns.push(ColumnState {
                name: name.clone(),
                ty: ty.clone(),
                options: options.clone(),
            });
        }
        ColumnOperation::Modify(name, ty, options) => {
            let column = column_mut(table, name)?;
            column.ty = ty.clone();
            column.options = options.clone();
        }
        ColumnOperation::Remove(name) => {
            column_mut(table, name)?;
            table.columns.retain(|c| c.name != *name);
        }
        ColumnOperation::Rename(from, to) => {
            if table.column(to).is_some() {
                return Err(MigrateError::InvalidState(format!(
                    "Column '{}' already exists in table '{}'",
                    to,
                    table.qualified_name()
                )));
            }
            column_mut(table, from)?.name.clone_from(to);
        }
    }
    Ok(())
}

fn column_mut<'t>(table: &'t mut TableState, name: &str) -> Result<&'t mut ColumnState> {
    let qualified = table.qualified_name();
    table
        .columns
        .iter_mut()
        .find(|c| c.name == name)
        .ok_or_else(|| {
            MigrateError::InvalidState(format!(
                "Column '{name}' does not exist in table '{qualified}'"
            ))
        })
}

impl MigrationBackend for SchemaState {
    fn exists(&self, target: &ExistsTarget) -> Result<bool> {
        Ok(match target {
            ExistsTarget::Table(table) => self.table(table).is_some(),
            ExistsTarget::Index(index) => self.find_index(index).is_some(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{index, table, ColumnType};

    fn posts() -> Command {
        Command::CreateTable(
            table("posts"),
            vec![
                ColumnOperation::add("id", ColumnType::Serial, ColumnOptions::new().primary_key()),
                ColumnOperation::add("title", ColumnType::String, ColumnOptions::new()),
                ColumnOperation::add("slug", ColumnType::String, ColumnOptions::new()),
            ],
        )
    }

    #[test]
    fn test_create_and_drop_table() {
        let mut state = SchemaState::new();
        state.apply(&posts()).unwrap();
        state
            .apply(&Command::CreateIndex(index("posts", ["slug"])))
            .unwrap();
        assert!(state.exists(&table("posts").into()).unwrap());
        assert!(state.exists(&index("posts", ["slug"]).into()).unwrap());

        state.apply(&Command::DropTable(table("posts"))).unwrap();
        assert!(!state.exists(&table("posts").into()).unwrap());
        assert!(state.indexes().is_empty());
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let mut state = SchemaState::new();
        state.apply(&posts()).unwrap();
        assert!(matches!(
            state.apply(&posts()),
            Err(MigrateError::InvalidState(_))
        ));

        let if_not_exists = Command::CreateTableIfNotExists(table("posts"), vec![]);
        assert!(state.apply(&if_not_exists).is_ok());
    }

    #[test]
    fn test_alter_columns() {
        let mut state = SchemaState::new();
        state.apply(&posts()).unwrap();
        state
            .apply(&Command::AlterTable(
                table("posts"),
                vec![
                    ColumnOperation::add("summary", ColumnType::Text, ColumnOptions::new()),
                    ColumnOperation::rename("slug", "permalink"),
                    ColumnOperation::modify(
                        "title",
                        ColumnType::Text,
                        ColumnOptions::new().null(false),
                    ),
                ],
            ))
            .unwrap();

        let posts = state.table(&table("posts")).unwrap();
        let names: Vec<&str> = posts.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "title", "permalink", "summary"]);
        assert_eq!(
            posts.column("title").unwrap().ty,
            FieldType::Type(ColumnType::Text)
        );
    }

    #[test]
    fn test_missing_column_rejected() {
        let mut state = SchemaState::new();
        state.apply(&posts()).unwrap();
        let result = state.apply(&Command::AlterTable(
            table("posts"),
            vec![ColumnOperation::remove("body")],
        ));
        assert!(matches!(result, Err(MigrateError::InvalidState(_))));

        let result = state.apply(&Command::CreateIndex(index("posts", ["body"])));
        assert!(matches!(result, Err(MigrateError::InvalidState(_))));
    }

    #[test]
    fn test_rename_table_moves_indexes() {
        let mut state = SchemaState::new();
        state.apply(&posts()).unwrap();
        state
            .apply(&Command::CreateIndex(index("posts", ["slug"])))
            .unwrap();
        state
            .apply(&Command::RenameTable(table("posts"), table("articles")))
            .unwrap();

        assert!(state.table(&table("articles")).is_some());
        assert_eq!(state.indexes()[0].table, "articles");
    }

    #[test]
    fn test_if_exists_variants_are_idempotent() {
        let mut state = SchemaState::new();
        state
            .apply(&Command::DropTableIfExists(table("posts")))
            .unwrap();
        state
            .apply(&Command::DropIndexIfExists(index("posts", ["slug"])))
            .unwrap();
        assert_eq!(state, SchemaState::new());
    }

    #[test]
    fn test_prefixes_are_distinct() {
        let mut state = SchemaState::new();
        state.apply(&posts()).unwrap();
        assert!(!state.exists(&table("posts").prefix("archive").into()).unwrap());
    }

    #[test]
    fn test_failed_commands_leave_state_untouched() {
        let mut state = SchemaState::new();
        state.apply(&posts()).unwrap();
        let before = state.clone();

        let err = state
            .apply(&Command::AlterTable(
                table("posts"),
                vec![
                    ColumnOperation::add("summary", ColumnType::Text, ColumnOptions::new()),
                    ColumnOperation::remove("missing"),
                ],
            ))
            .unwrap_err();
        assert!(matches!(err, MigrateError::InvalidState(_)));
        assert_eq!(state, before);

        let err = state
            .apply_all(&[
                Command::CreateIndex(index("posts", ["title"])),
                Command::CreateIndex(index("posts", ["missing"])),
            ])
            .unwrap_err();
        assert!(matches!(err, MigrateError::InvalidState(_)));
        assert_eq!(state, before);
    }
}
