//! The adapter protocol.
//!
//! A storage backend implements [`Adapter`] to take part in record
//! persistence: value coercion in both directions, primary-key generation,
//! and the data-manipulation operations with their autogeneration and
//! staleness rules.

use std::future::Future;

use serde::{Deserialize, Serialize};
use strata_migrate::schema::{qualify, ColumnType};

use crate::config::AdapterConfig;
use crate::error::{AdapterError, Result};
use crate::value::Value;

/// Named values, in order.
pub type Fields = Vec<(String, Value)>;

/// Equality filters, in order. A NULL value matches NULL.
pub type Filters = Vec<(String, Value)>;

/// Where the records live.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaMeta {
    /// Table (or collection) name.
    pub source: String,
    /// Schema/namespace prefix.
    pub prefix: Option<String>,
}

impl SchemaMeta {
    /// Creates metadata for an unprefixed source.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            prefix: None,
        }
    }

    /// Sets the prefix.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Returns `prefix.source`, or the bare source.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        qualify(self.prefix.as_deref(), &self.source)
    }
}

/// How a primary key is generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutogenerateKind {
    /// Integer key assigned by the database.
    Id,
    /// Binary identifier the adapter generates.
    BinaryId,
}

/// Tells the adapter which field is an autogenerated key.
#[derive(Debug, Clone, PartialEq)]
pub struct Autogenerate {
    /// The key field.
    pub field: String,
    /// How the key is generated.
    pub kind: AutogenerateKind,
    /// A value the caller supplied for the key, if any.
    pub value: Option<Value>,
}

impl Autogenerate {
    /// Describes a key with no caller-supplied value.
    #[must_use]
    pub fn new(field: impl Into<String>, kind: AutogenerateKind) -> Self {
        Self {
            field: field.into(),
            kind,
            value: None,
        }
    }

    /// Attaches a caller-supplied value.
    #[must_use]
    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Returns the non-null value the caller assigned, in the descriptor or
    /// in `fields`.
    #[must_use]
    pub fn assigned<'a>(&'a self, fields: &'a [(String, Value)]) -> Option<&'a Value> {
        self.value
            .as_ref()
            .filter(|v| !v.is_null())
            .or_else(|| {
                fields
                    .iter()
                    .find(|(name, v)| *name == self.field && !v.is_null())
                    .map(|(_, v)| v)
            })
    }
}

/// What an adapter does when a caller assigns an autogenerated key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AutogeneratePolicy {
    /// Fail with [`AdapterError::AutogeneratedKeyAssigned`].
    #[default]
    Reject,
    /// Store the supplied value.
    Honor,
}

impl AutogeneratePolicy {
    /// Applies the policy to an operation.
    pub fn check(
        self,
        autogenerate: Option<&Autogenerate>,
        fields: &[(String, Value)],
    ) -> Result<()> {
        let Some(autogenerate) = autogenerate else {
            return Ok(());
        };
        match (self, autogenerate.assigned(fields)) {
            (Self::Reject, Some(_)) => Err(AdapterError::AutogeneratedKeyAssigned {
                field: autogenerate.field.clone(),
            }),
            _ => Ok(()),
        }
    }
}

/// Comparison used by a bulk predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    /// Equal.
    Eq,
    /// Not equal.
    NotEq,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
}

/// A filter predicate of a bulk query. `param` indexes the parameter list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Predicate {
    /// Filtered column.
    pub column: String,
    /// Comparison.
    pub comparison: Comparison,
    /// Position of the compared value in the parameter list.
    pub param: usize,
}

impl Predicate {
    /// Creates a predicate.
    #[must_use]
    pub fn new(column: impl Into<String>, comparison: Comparison, param: usize) -> Self {
        Self {
            column: column.into(),
            comparison,
            param,
        }
    }

    /// Creates an equality predicate.
    #[must_use]
    pub fn eq(column: impl Into<String>, param: usize) -> Self {
        Self::new(column, Comparison::Eq, param)
    }
}

/// The rows a bulk query targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Every row, stated explicitly.
    All,
    /// Rows matching all predicates.
    Where(Vec<Predicate>),
}

/// A bulk update or delete.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BulkQuery {
    /// Target source.
    pub meta: SchemaMeta,
    /// Targeted rows.
    pub scope: Scope,
    /// Assignments for bulk updates: column and parameter position.
    pub updates: Vec<(String, usize)>,
}

impl BulkQuery {
    /// Creates a query over rows matching `predicates`.
    #[must_use]
    pub fn filtered(meta: SchemaMeta, predicates: Vec<Predicate>) -> Self {
        Self {
            meta,
            scope: Scope::Where(predicates),
            updates: Vec::new(),
        }
    }

    /// Creates a query over every row.
    #[must_use]
    pub fn all(meta: SchemaMeta) -> Self {
        Self {
            meta,
            scope: Scope::All,
            updates: Vec::new(),
        }
    }

    /// Adds an assignment.
    #[must_use]
    pub fn set(mut self, column: impl Into<String>, param: usize) -> Self {
        self.updates.push((column.into(), param));
        self
    }

    /// Returns the predicates, rejecting an empty filter that is not an
    /// explicit all-rows scope.
    pub fn predicates(&self) -> Result<&[Predicate]> {
        match &self.scope {
            Scope::All => Ok(&[]),
            Scope::Where(predicates) if predicates.is_empty() => {
                Err(AdapterError::UnscopedBulkQuery(self.meta.qualified_name()))
            }
            Scope::Where(predicates) => Ok(predicates),
        }
    }

    /// Checks that every parameter position is in range.
    pub fn check_params(&self, params: &[Value]) -> Result<()> {
        let predicates = self.predicates()?;
        predicates
            .iter()
            .map(|p| p.param)
            .chain(self.updates.iter().map(|(_, param)| *param))
            .find(|param| *param >= params.len())
            .map_or(Ok(()), |param| Err(AdapterError::MissingParameter(param)))
    }
}

/// Per-operation options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationOptions {
    /// Prefix overriding the one in the schema metadata.
    pub prefix: Option<String>,
    /// Columns bulk operations return for each affected row.
    pub returning: Vec<String>,
}

/// Successful outcome of [`Adapter::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Started<H> {
    /// The adapter started and hands back a handle.
    Handle(H),
    /// Nothing needed starting.
    Ignored,
}

/// Failed outcome of [`Adapter::start`].
#[derive(Debug)]
pub enum StartError<H> {
    /// The adapter is already running; the existing handle is returned.
    AlreadyStarted(H),
    /// Starting failed.
    Failed(AdapterError),
}

impl<H> From<AdapterError> for StartError<H> {
    fn from(err: AdapterError) -> Self {
        Self::Failed(err)
    }
}

/// The capability contract of a storage backend.
///
/// `load`/`dump` have no default: every backend decides how it stores a
/// binary identifier. Only the data operations suspend; they resolve to a
/// single result.
pub trait Adapter: Send + Sync {
    /// Handle returned by `start` (e.g. a connection pool).
    type Handle: Clone + Send;

    /// Starts the backend.
    fn start(
        &self,
        config: &AdapterConfig,
    ) -> impl Future<Output = std::result::Result<Started<Self::Handle>, StartError<Self::Handle>>>
           + Send;

    /// Converts a stored value into its loaded form.
    fn load(&self, ty: ColumnType, raw: Value) -> Result<Value>;

    /// Converts a loaded value into its stored form.
    fn dump(&self, ty: ColumnType, value: Value) -> Result<Value>;

    /// Generates a key the database cannot generate; `None` means the
    /// database assigns it.
    fn autogenerate(&self, kind: AutogenerateKind) -> Option<Value>;

    /// Updates every row in the query's scope. Returns the affected count
    /// and, when `options.returning` is set, the returned fields.
    fn bulk_update(
        &self,
        query: &BulkQuery,
        params: &[Value],
        options: &OperationOptions,
    ) -> impl Future<Output = Result<(u64, Option<Vec<Fields>>)>> + Send;

    /// Deletes every row in the query's scope.
    fn bulk_delete(
        &self,
        query: &BulkQuery,
        params: &[Value],
        options: &OperationOptions,
    ) -> impl Future<Output = Result<(u64, Option<Vec<Fields>>)>> + Send;

    /// Inserts one record and returns the `returning` fields plus any key the
    /// adapter generated.
    fn insert(
        &self,
        meta: &SchemaMeta,
        fields: Fields,
        autogenerate: Option<&Autogenerate>,
        returning: &[String],
        options: &OperationOptions,
    ) -> impl Future<Output = Result<Fields>> + Send;

    /// Updates one record matched by `filters`.
    ///
    /// Zero matched rows yields [`AdapterError::Stale`].
    fn update(
        &self,
        meta: &SchemaMeta,
        fields: Fields,
        filters: Filters,
        autogenerate: Option<&Autogenerate>,
        returning: &[String],
        options: &OperationOptions,
    ) -> impl Future<Output = Result<Fields>> + Send;

    /// Deletes one record matched by `filters`.
    ///
    /// Zero matched rows yields [`AdapterError::Stale`].
    fn delete(
        &self,
        meta: &SchemaMeta,
        filters: Filters,
        autogenerate: Option<&Autogenerate>,
        options: &OperationOptions,
    ) -> impl Future<Output = Result<Fields>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assigned_key_detection() {
        let auto = Autogenerate::new("id", AutogenerateKind::Id);
        assert!(auto.assigned(&[]).is_none());
        assert!(auto.assigned(&[("id".to_string(), Value::Null)]).is_none());
        assert_eq!(
            auto.assigned(&[("id".to_string(), Value::Int(4))]),
            Some(&Value::Int(4))
        );

        let with_value = auto.with_value(9_i64);
        assert_eq!(with_value.assigned(&[]), Some(&Value::Int(9)));
    }

    #[test]
    fn test_policy() {
        let auto = Autogenerate::new("id", AutogenerateKind::Id).with_value(1_i64);
        assert!(matches!(
            AutogeneratePolicy::Reject.check(Some(&auto), &[]),
            Err(AdapterError::AutogeneratedKeyAssigned { .. })
        ));
        assert!(AutogeneratePolicy::Honor.check(Some(&auto), &[]).is_ok());
        assert!(AutogeneratePolicy::Reject.check(None, &[]).is_ok());
    }

    #[test]
    fn test_bulk_scope() {
        let meta = SchemaMeta::new("posts");
        let unscoped = BulkQuery::filtered(meta.clone(), vec![]);
        assert!(matches!(
            unscoped.predicates(),
            Err(AdapterError::UnscopedBulkQuery(_))
        ));
        assert!(BulkQuery::all(meta.clone()).predicates().unwrap().is_empty());

        let query = BulkQuery::filtered(meta, vec![Predicate::eq("id", 0)]).set("title", 1);
        assert!(query.check_params(&[Value::Int(1), Value::from("t")]).is_ok());
        assert!(matches!(
            query.check_params(&[Value::Int(1)]),
            Err(AdapterError::MissingParameter(1))
        ));
    }

    #[test]
    fn test_qualified_meta() {
        assert_eq!(SchemaMeta::new("posts").qualified_name(), "posts");
        assert_eq!(
            SchemaMeta::new("posts").prefix("archive").qualified_name(),
            "archive.posts"
        );
    }
}
