//! Command builder.
//!
//! Turns descriptors and column operations into primitive commands. Every
//! function here is a pure function of its arguments; the backend is only
//! consulted for the storage type of foreign-key columns.

use crate::backend::MigrationBackend;
use crate::command::{ColumnOperation, Command, FieldType};
use crate::config::PrimaryKeyConfig;
use crate::error::{MigrateError, Result};
use crate::schema::{require_identifier, ColumnOptions, ColumnType, Index, Table};

/// Collects the column operations of a `create` or `alter` block.
#[derive(Debug, Default)]
pub struct TableBlock {
    operations: Vec<ColumnOperation>,
}

impl TableBlock {
    /// Creates an empty block.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        ty: impl Into<FieldType>,
        options: ColumnOptions,
    ) -> &mut Self {
        self.operations.push(ColumnOperation::add(name, ty, options));
        self
    }

    /// Modifies a column.
    pub fn modify(
        &mut self,
        name: impl Into<String>,
        ty: impl Into<FieldType>,
        options: ColumnOptions,
    ) -> &mut Self {
        self.operations.push(ColumnOperation::modify(name, ty, options));
        self
    }

    /// Removes a column.
    pub fn remove(&mut self, name: impl Into<String>) -> &mut Self {
        self.operations.push(ColumnOperation::remove(name));
        self
    }

    /// Renames a column.
    pub fn rename(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.operations.push(ColumnOperation::rename(from, to));
        self
    }

    /// Adds `inserted_at` and `updated_at` columns.
    pub fn timestamps(&mut self) -> &mut Self {
        let options = ColumnOptions::new().null(false);
        self.add("inserted_at", ColumnType::NaiveDateTime, options.clone());
        self.add("updated_at", ColumnType::NaiveDateTime, options)
    }

    /// Returns the collected operations in declaration order.
    #[must_use]
    pub fn into_operations(self) -> Vec<ColumnOperation> {
        self.operations
    }
}

/// Builds a create-table command with the default implicit primary key.
pub fn build_create(
    table: Table,
    operations: Vec<ColumnOperation>,
    backend: &dyn MigrationBackend,
) -> Result<Command> {
    build_create_with(table, operations, backend, &PrimaryKeyConfig::default())
}

/// Builds a create-table command with a configured implicit primary key.
pub fn build_create_with(
    table: Table,
    operations: Vec<ColumnOperation>,
    backend: &dyn MigrationBackend,
    primary_key: &PrimaryKeyConfig,
) -> Result<Command> {
    let columns = create_columns(&table, operations, backend, primary_key)?;
    Ok(Command::CreateTable(table, columns))
}

/// Builds a create-table-if-not-exists command.
pub fn build_create_if_not_exists_with(
    table: Table,
    operations: Vec<ColumnOperation>,
    backend: &dyn MigrationBackend,
    primary_key: &PrimaryKeyConfig,
) -> Result<Command> {
    let columns = create_columns(&table, operations, backend, primary_key)?;
    Ok(Command::CreateTableIfNotExists(table, columns))
}

/// Builds an alter-table command. Operations keep their declaration order.
pub fn build_alter(
    table: Table,
    operations: Vec<ColumnOperation>,
    backend: &dyn MigrationBackend,
) -> Result<Command> {
    table.validate()?;
    let operations = operations
        .into_iter()
        .map(|op| resolve_operation(op, backend))
        .collect::<Result<Vec<_>>>()?;
    Ok(Command::AlterTable(table, operations))
}

/// Builds a drop-table command.
pub fn build_drop(table: Table) -> Result<Command> {
    table.validate()?;
    Ok(Command::DropTable(table))
}

/// Builds a drop-table-if-exists command.
pub fn build_drop_if_exists(table: Table) -> Result<Command> {
    table.validate()?;
    Ok(Command::DropTableIfExists(table))
}

/// Builds a rename-table command.
pub fn build_rename_table(from: Table, to: Table) -> Result<Command> {
    from.validate()?;
    to.validate()?;
    Ok(Command::RenameTable(from, to))
}

/// Builds a create-index command.
pub fn build_create_index(index: Index) -> Result<Command> {
    index.validate()?;
    Ok(Command::CreateIndex(index))
}

/// Builds a create-index-if-not-exists command.
pub fn build_create_index_if_not_exists(index: Index) -> Result<Command> {
    index.validate()?;
    Ok(Command::CreateIndexIfNotExists(index))
}

/// Builds a drop-index command.
pub fn build_drop_index(index: Index) -> Result<Command> {
    index.validate()?;
    Ok(Command::DropIndex(index))
}

/// Builds a drop-index-if-exists command.
pub fn build_drop_index_if_exists(index: Index) -> Result<Command> {
    index.validate()?;
    Ok(Command::DropIndexIfExists(index))
}

fn create_columns(
    table: &Table,
    operations: Vec<ColumnOperation>,
    backend: &dyn MigrationBackend,
    primary_key: &PrimaryKeyConfig,
) -> Result<Vec<ColumnOperation>> {
    table.validate()?;

    let mut columns = Vec::with_capacity(operations.len() + 1);
    if table.primary_key {
        columns.push(ColumnOperation::add(
            primary_key.name.clone(),
            primary_key.ty,
            ColumnOptions::new().primary_key(),
        ));
    }

    for op in operations {
        if !matches!(op, ColumnOperation::Add(..)) {
            return Err(MigrateError::InvalidOperation(format!(
                "cannot {} while creating table '{}'",
                op.description(),
                table.qualified_name()
            )));
        }
        columns.push(resolve_operation(op, backend)?);
    }

    Ok(columns)
}

fn resolve_operation(
    op: ColumnOperation,
    backend: &dyn MigrationBackend,
) -> Result<ColumnOperation> {
    require_identifier("column name", op.column())?;
    Ok(match op {
        ColumnOperation::Add(name, ty, options) => {
            ColumnOperation::Add(name, resolve_field(ty, backend)?, options)
        }
        ColumnOperation::Modify(name, ty, options) => {
            ColumnOperation::Modify(name, resolve_field(ty, backend)?, options)
        }
        ColumnOperation::Rename(from, to) => {
            require_identifier("column name", &to)?;
            ColumnOperation::Rename(from, to)
        }
        remove @ ColumnOperation::Remove(_) => remove,
    })
}

fn resolve_field(ty: FieldType, backend: &dyn MigrationBackend) -> Result<FieldType> {
    match ty {
        FieldType::References(reference) => {
            reference.validate()?;
            let storage = backend.reference_type(&reference);
            Ok(FieldType::References(reference.resolve(storage)))
        }
        plain @ FieldType::Type(_) => Ok(plain),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ExistsTarget;
    use crate::schema::{index, references, table, Reference};

    struct NullBackend;

    impl MigrationBackend for NullBackend {
        fn exists(&self, _target: &ExistsTarget) -> Result<bool> {
            Ok(false)
        }
    }

    struct UuidKeys;

    impl MigrationBackend for UuidKeys {
        fn exists(&self, _target: &ExistsTarget) -> Result<bool> {
            Ok(false)
        }

        fn reference_type(&self, _reference: &Reference) -> ColumnType {
            ColumnType::Uuid
        }
    }

    fn title_block() -> Vec<ColumnOperation> {
        let mut block = TableBlock::new();
        block.add("title", ColumnType::String, ColumnOptions::new());
        block.into_operations()
    }

    #[test]
    fn test_create_prepends_one_id() {
        let command = build_create(table("posts"), title_block(), &NullBackend).unwrap();
        let Command::CreateTable(t, columns) = command else {
            panic!("Expected CreateTable");
        };
        assert!(t.primary_key);
        assert_eq!(
            columns,
            vec![
                ColumnOperation::add("id", ColumnType::Serial, ColumnOptions::new().primary_key()),
                ColumnOperation::add("title", ColumnType::String, ColumnOptions::new()),
            ]
        );
    }

    #[test]
    fn test_create_without_primary_key() {
        let command =
            build_create(table("tags").without_primary_key(), title_block(), &NullBackend).unwrap();
        let Command::CreateTable(_, columns) = command else {
            panic!("Expected CreateTable");
        };
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].column(), "title");
    }

    #[test]
    fn test_create_with_configured_primary_key() {
        let pk = PrimaryKeyConfig {
            name: "uuid".to_string(),
            ty: ColumnType::BinaryId,
        };
        let command = build_create_with(table("posts"), vec![], &NullBackend, &pk).unwrap();
        assert_eq!(
            command,
            Command::CreateTable(
                table("posts"),
                vec![ColumnOperation::add(
                    "uuid",
                    ColumnType::BinaryId,
                    ColumnOptions::new().primary_key()
                )]
            )
        );
    }

    #[test]
    fn test_create_resolves_references() {
        let mut block = TableBlock::new();
        block.add("author_id", references("authors"), ColumnOptions::new());
        let command = build_create(table("posts"), block.into_operations(), &UuidKeys).unwrap();

        let Command::CreateTable(_, columns) = command else {
            panic!("Expected CreateTable");
        };
        match &columns[1] {
            ColumnOperation::Add(name, FieldType::References(reference), _) => {
                assert_eq!(name, "author_id");
                assert_eq!(reference.table, "authors");
                assert_eq!(reference.storage_type(), Some(ColumnType::Uuid));
            }
            other => panic!("Expected reference column, got {other:?}"),
        }
    }

    #[test]
    fn test_create_rejects_non_add() {
        let result = build_create(
            table("posts"),
            vec![ColumnOperation::remove("title")],
            &NullBackend,
        );
        assert!(matches!(result, Err(MigrateError::InvalidOperation(_))));
    }

    #[test]
    fn test_alter_keeps_order_without_id() {
        let mut block = TableBlock::new();
        block
            .add("summary", ColumnType::Text, ColumnOptions::new())
            .rename("slug", "permalink")
            .remove("legacy");
        let command = build_alter(table("posts"), block.into_operations(), &NullBackend).unwrap();
        assert_eq!(
            command,
            Command::AlterTable(
                table("posts"),
                vec![
                    ColumnOperation::add("summary", ColumnType::Text, ColumnOptions::new()),
                    ColumnOperation::rename("slug", "permalink"),
                    ColumnOperation::remove("legacy"),
                ]
            )
        );
    }

    #[test]
    fn test_timestamps() {
        let mut block = TableBlock::new();
        block.timestamps();
        let ops = block.into_operations();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].column(), "inserted_at");
        assert_eq!(ops[1].column(), "updated_at");
    }

    #[test]
    fn test_empty_identifiers() {
        assert!(build_drop(table("")).is_err());
        assert!(build_create_index(index("posts", Vec::<String>::new())).is_err());
        assert!(build_alter(
            table("posts"),
            vec![ColumnOperation::rename("slug", "")],
            &NullBackend
        )
        .is_err());
    }
}
