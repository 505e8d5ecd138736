//! Structural descriptors.
//!
//! These are the value types migration authors hand to a session: a table, an
//! index and a foreign-key reference. They carry no behavior beyond defaults
//! and identifier checks; the command builder turns them into commands.

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};

/// Column type tags understood by the migration engine.
///
/// Backends decide how a tag is stored; the engine only threads it through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Integer primary key generated by the database.
    Id,
    /// Opaque binary identifier (UUID-like) generated by the backend.
    BinaryId,
    /// Auto-incrementing 32-bit integer.
    Serial,
    /// Auto-incrementing 64-bit integer.
    BigSerial,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInt,
    /// Double precision float.
    Float,
    /// Arbitrary precision decimal.
    Decimal,
    /// Boolean.
    Boolean,
    /// Bounded string.
    String,
    /// Unbounded text.
    Text,
    /// Binary data.
    Binary,
    /// UUID.
    Uuid,
    /// Date only.
    Date,
    /// Time only.
    Time,
    /// Date and time without timezone.
    NaiveDateTime,
    /// Date and time in UTC.
    UtcDateTime,
    /// Structured map (JSON).
    Map,
}

impl ColumnType {
    /// Returns the storage type a reference to a column of this type uses.
    ///
    /// Auto-incrementing keys are referenced through their plain integer type.
    #[must_use]
    pub const fn reference_storage(self) -> Self {
        match self {
            Self::Serial => Self::Integer,
            Self::BigSerial | Self::Id => Self::BigInt,
            other => other,
        }
    }

    /// Returns the tag name used in descriptions.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::BinaryId => "binary_id",
            Self::Serial => "serial",
            Self::BigSerial => "bigserial",
            Self::Integer => "integer",
            Self::BigInt => "bigint",
            Self::Float => "float",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::String => "string",
            Self::Text => "text",
            Self::Binary => "binary",
            Self::Uuid => "uuid",
            Self::Date => "date",
            Self::Time => "time",
            Self::NaiveDateTime => "naive_datetime",
            Self::UtcDateTime => "utc_datetime",
            Self::Map => "map",
        }
    }
}

/// Default value for a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DefaultValue {
    /// NULL default.
    Null,
    /// Boolean default.
    Bool(bool),
    /// Integer default.
    Integer(i64),
    /// Float default.
    Float(f64),
    /// String default.
    String(String),
    /// Backend expression passed through untouched (e.g. `now()`).
    Fragment(String),
}

/// Action taken on referencing rows when the referenced row changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceAction {
    /// Leave referencing rows alone.
    #[default]
    Nothing,
    /// Delete referencing rows.
    DeleteAll,
    /// Set the referencing column to NULL.
    NilifyAll,
    /// Refuse the change while references exist.
    Restrict,
}

/// Options attached to a column operation.
///
/// `ColumnOptions::default()` is the empty option list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ColumnOptions {
    /// Whether the column is (part of) the primary key.
    pub primary_key: bool,
    /// Explicit nullability, `None` leaves the backend default.
    pub null: Option<bool>,
    /// Default value.
    pub default: Option<DefaultValue>,
    /// Size for bounded types.
    pub size: Option<u32>,
    /// Precision for decimals.
    pub precision: Option<u32>,
    /// Scale for decimals.
    pub scale: Option<u32>,
}

impl ColumnOptions {
    /// Creates an empty option list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the column as primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Sets nullability.
    #[must_use]
    pub fn null(mut self, null: bool) -> Self {
        self.null = Some(null);
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default_value(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Sets the size.
    #[must_use]
    pub fn size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    /// Sets precision and scale.
    #[must_use]
    pub fn precision(mut self, precision: u32, scale: u32) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }
}

/// A table descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Whether an implicit primary key column is added on create.
    pub primary_key: bool,
    /// Schema/namespace prefix.
    pub prefix: Option<String>,
    /// Table comment.
    pub comment: Option<String>,
}

impl Table {
    /// Creates a table descriptor with an implicit primary key.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: true,
            prefix: None,
            comment: None,
        }
    }

    /// Disables the implicit primary key column.
    #[must_use]
    pub fn without_primary_key(mut self) -> Self {
        self.primary_key = false;
        self
    }

    /// Sets the prefix.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Sets the comment.
    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Checks the identifiers of this descriptor.
    pub fn validate(&self) -> Result<()> {
        require_identifier("table name", &self.name)
    }

    /// Returns the name qualified by the prefix, if any.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        qualify(self.prefix.as_deref(), &self.name)
    }
}

/// An index descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Index {
    /// Indexed table.
    pub table: String,
    /// Indexed columns, in order.
    pub columns: Vec<String>,
    /// Whether the index is unique.
    pub unique: bool,
    /// Index name.
    pub name: String,
    /// Schema/namespace prefix.
    pub prefix: Option<String>,
    /// Partial index condition.
    pub where_clause: Option<String>,
}

impl Index {
    /// Creates an index descriptor with the derived default name.
    #[must_use]
    pub fn new<I, S>(table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let table = table.into();
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let name = default_index_name(&table, &columns);
        Self {
            table,
            columns,
            unique: false,
            name,
            prefix: None,
            where_clause: None,
        }
    }

    /// Makes the index unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Overrides the derived name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the prefix.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Sets a partial index condition.
    #[must_use]
    pub fn where_clause(mut self, condition: impl Into<String>) -> Self {
        self.where_clause = Some(condition.into());
        self
    }

    /// Checks the identifiers of this descriptor.
    pub fn validate(&self) -> Result<()> {
        require_identifier("index table", &self.table)?;
        require_identifier("index name", &self.name)?;
        if self.columns.is_empty() {
            return Err(MigrateError::EmptyIdentifier("index columns"));
        }
        self.columns
            .iter()
            .try_for_each(|column| require_identifier("index column", column))
    }
}

/// Derives the default index name: `<table>_<col1>_..._index`.
#[must_use]
pub fn default_index_name(table: &str, columns: &[String]) -> String {
    let mut parts = Vec::with_capacity(columns.len() + 2);
    parts.push(table);
    parts.extend(columns.iter().map(String::as_str));
    parts.push("index");
    parts.join("_")
}

/// A foreign-key reference descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    /// Referenced table.
    pub table: String,
    /// Referenced column.
    pub column: String,
    /// Type of the referenced column.
    pub ty: ColumnType,
    /// Action on delete.
    pub on_delete: ReferenceAction,
    /// Action on update.
    pub on_update: ReferenceAction,
    /// Prefix of the referenced table.
    pub prefix: Option<String>,
    storage: Option<ColumnType>,
}

impl Reference {
    /// Creates a reference to `table.id` of type integer.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: "id".to_string(),
            ty: ColumnType::Integer,
            on_delete: ReferenceAction::Nothing,
            on_update: ReferenceAction::Nothing,
            prefix: None,
            storage: None,
        }
    }

    /// Sets the referenced column.
    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    /// Sets the referenced column type.
    #[must_use]
    pub fn ty(mut self, ty: ColumnType) -> Self {
        self.ty = ty;
        self
    }

    /// Sets the on-delete action.
    #[must_use]
    pub fn on_delete(mut self, action: ReferenceAction) -> Self {
        self.on_delete = action;
        self
    }

    /// Sets the on-update action.
    #[must_use]
    pub fn on_update(mut self, action: ReferenceAction) -> Self {
        self.on_update = action;
        self
    }

    /// Sets the prefix of the referenced table.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Records the storage type of the foreign-key column.
    ///
    /// Only the first resolution sticks; later calls return the value as is.
    #[must_use]
    pub fn resolve(mut self, storage: ColumnType) -> Self {
        if self.storage.is_none() {
            self.storage = Some(storage);
        }
        self
    }

    /// Returns the resolved storage type, if the builder resolved it.
    #[must_use]
    pub const fn storage_type(&self) -> Option<ColumnType> {
        self.storage
    }

    /// Checks the identifiers of this descriptor.
    pub fn validate(&self) -> Result<()> {
        require_identifier("referenced table", &self.table)?;
        require_identifier("referenced column", &self.column)
    }
}

/// Builds a table descriptor.
#[must_use]
pub fn table(name: impl Into<String>) -> Table {
    Table::new(name)
}

/// Builds an index descriptor.
#[must_use]
pub fn index<I, S>(table: impl Into<String>, columns: I) -> Index
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Index::new(table, columns)
}

/// Builds a reference descriptor.
#[must_use]
pub fn references(table: impl Into<String>) -> Reference {
    Reference::new(table)
}

pub(crate) fn require_identifier(kind: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(MigrateError::EmptyIdentifier(kind));
    }
    Ok(())
}

/// Joins a prefix and a name with a dot.
#[must_use]
pub fn qualify(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}.{name}"),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_defaults() {
        let t = table("posts");
        assert_eq!(t.name, "posts");
        assert!(t.primary_key);
        assert!(t.prefix.is_none());
        assert!(!t.without_primary_key().primary_key);
    }

    #[test]
    fn test_index_default_name() {
        let i = index("posts", ["title", "author_id"]);
        assert_eq!(i.name, "posts_title_author_id_index");
        assert!(!i.unique);

        let named = index("posts", ["slug"]).unique().name("posts_slug");
        assert_eq!(named.name, "posts_slug");
        assert!(named.unique);
    }

    #[test]
    fn test_reference_defaults() {
        let r = references("authors");
        assert_eq!(r.column, "id");
        assert_eq!(r.ty, ColumnType::Integer);
        assert_eq!(r.on_delete, ReferenceAction::Nothing);
        assert!(r.storage_type().is_none());
    }

    #[test]
    fn test_reference_resolves_once() {
        let r = references("authors")
            .resolve(ColumnType::BigInt)
            .resolve(ColumnType::Uuid);
        assert_eq!(r.storage_type(), Some(ColumnType::BigInt));
    }

    #[test]
    fn test_empty_identifiers_rejected() {
        assert!(matches!(
            table("").validate(),
            Err(MigrateError::EmptyIdentifier("table name"))
        ));
        assert!(index("posts", Vec::<String>::new()).validate().is_err());
        assert!(index("posts", [" "]).validate().is_err());
        assert!(references("authors").column("").validate().is_err());
        assert!(table("posts").validate().is_ok());
    }

    #[test]
    fn test_reference_storage_mapping() {
        assert_eq!(ColumnType::Serial.reference_storage(), ColumnType::Integer);
        assert_eq!(ColumnType::BigSerial.reference_storage(), ColumnType::BigInt);
        assert_eq!(ColumnType::Uuid.reference_storage(), ColumnType::Uuid);
    }

    #[test]
    fn test_qualified_name() {
        assert_eq!(table("posts").qualified_name(), "posts");
        assert_eq!(table("posts").prefix("blog").qualified_name(), "blog.posts");
    }
}
