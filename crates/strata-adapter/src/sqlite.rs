//! SQLite adapter built on sqlx.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, Sqlite, TypeInfo, ValueRef};
use strata_migrate::backend::MigrationBackend;
use strata_migrate::command::ExistsTarget;
use strata_migrate::schema::{qualify, ColumnType, Reference};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::AdapterConfig;
use crate::error::{AdapterError, Result};
use crate::protocol::{
    Adapter, Autogenerate, AutogenerateKind, AutogeneratePolicy, BulkQuery, Comparison, Fields,
    Filters, OperationOptions, Predicate, SchemaMeta, StartError, Started,
};
use crate::value::Value;

const NAIVE_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug)]
struct Connected {
    pool: SqlitePool,
    policy: AutogeneratePolicy,
}

/// Adapter for SQLite databases.
///
/// Binary identifiers are stored as 16-byte blobs, booleans as integers and
/// timestamps as text.
#[derive(Debug, Default)]
pub struct SqliteAdapter {
    connected: OnceLock<Connected>,
}

impl SqliteAdapter {
    /// Creates an adapter that still needs `start`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an already started adapter over an existing pool.
    #[must_use]
    pub fn from_pool(pool: SqlitePool, policy: AutogeneratePolicy) -> Self {
        Self {
            connected: OnceLock::from(Connected { pool, policy }),
        }
    }

    /// Returns the pool once started.
    pub fn pool(&self) -> Result<&SqlitePool> {
        self.connected().map(|c| &c.pool)
    }

    fn connected(&self) -> Result<&Connected> {
        self.connected.get().ok_or(AdapterError::NotStarted)
    }

    /// Reads the names of all tables and indexes of every attached database.
    pub async fn catalog(&self) -> Result<CatalogSnapshot> {
        let pool = self.pool()?;
        let schemas = sqlx::query("PRAGMA database_list").fetch_all(pool).await?;

        let mut catalog = CatalogSnapshot::default();
        for schema in schemas {
            let schema: String = schema.try_get("name")?;
            let sql = format!(
                "SELECT type, name FROM {}.sqlite_master \
                 WHERE type IN ('table', 'index') AND name NOT LIKE 'sqlite_%'",
                quote(&schema)
            );
            debug!(sql = %sql, "Reading catalog");
            let prefix = (schema != "main").then_some(schema.as_str());
            for row in sqlx::query(&sql).fetch_all(pool).await? {
                let kind: String = row.try_get("type")?;
                let name: String = row.try_get("name")?;
                let name = qualify(prefix, &name);
                if kind == "table" {
                    catalog.tables.insert(name);
                } else {
                    catalog.indexes.insert(name);
                }
            }
        }
        Ok(catalog)
    }

    async fn run(
        &self,
        sql: &str,
        params: Vec<Value>,
        returning: bool,
    ) -> Result<(u64, Vec<Fields>)> {
        let pool = self.pool()?;
        debug!(sql = %sql, params = params.len(), "Executing statement");
        let query = params.into_iter().fold(sqlx::query(sql), bind_value);

        if returning {
            let rows = query.fetch_all(pool).await?;
            let fields = rows.iter().map(row_fields).collect::<Result<Vec<_>>>()?;
            Ok((u64::try_from(fields.len()).unwrap_or(u64::MAX), fields))
        } else {
            let result = query.execute(pool).await?;
            Ok((result.rows_affected(), Vec::new()))
        }
    }
}

impl Adapter for SqliteAdapter {
    type Handle = SqlitePool;

    async fn start(
        &self,
        config: &AdapterConfig,
    ) -> std::result::Result<Started<SqlitePool>, StartError<SqlitePool>> {
        if let Some(connected) = self.connected.get() {
            return Err(StartError::AlreadyStarted(connected.pool.clone()));
        }
        config.validate()?;

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(AdapterError::from)?;

        let connected = Connected {
            pool: pool.clone(),
            policy: config.autogenerate_policy,
        };
        match self.connected.set(connected) {
            Ok(()) => {
                info!(url = %config.url, "SQLite adapter started");
                Ok(Started::Handle(pool))
            }
            Err(rejected) => {
                rejected.pool.close().await;
                match self.connected.get() {
                    Some(existing) => Err(StartError::AlreadyStarted(existing.pool.clone())),
                    None => Err(StartError::Failed(AdapterError::NotStarted)),
                }
            }
        }
    }

    fn load(&self, ty: ColumnType, raw: Value) -> Result<Value> {
        if raw.is_null() {
            return Ok(Value::Null);
        }
        match (ty, raw) {
            (ColumnType::Boolean, Value::Int(i)) => Ok(Value::Bool(i != 0)),
            (ColumnType::BinaryId | ColumnType::Uuid, Value::Blob(bytes)) => {
                Uuid::from_slice(&bytes)
                    .map(Value::Uuid)
                    .map_err(|_| AdapterError::Cast { ty, value: "blob" })
            }
            (ColumnType::BinaryId | ColumnType::Uuid, Value::Text(text)) => {
                Uuid::parse_str(&text)
                    .map(Value::Uuid)
                    .map_err(|_| AdapterError::Cast { ty, value: "text" })
            }
            (ColumnType::UtcDateTime | ColumnType::NaiveDateTime, Value::Text(text)) => {
                parse_datetime(&text)
                    .map(Value::DateTime)
                    .ok_or(AdapterError::Cast { ty, value: "text" })
            }
            (ColumnType::Date, Value::Text(text)) => {
                NaiveDate::parse_from_str(&text, "%Y-%m-%d")
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
                    .map(|naive| Value::DateTime(naive.and_utc()))
                    .ok_or(AdapterError::Cast { ty, value: "text" })
            }
            #[allow(clippy::cast_precision_loss)]
            (ColumnType::Float | ColumnType::Decimal, Value::Int(i)) => Ok(Value::Float(i as f64)),
            (ty, raw) => passthrough(ty, raw),
        }
    }

    fn dump(&self, ty: ColumnType, value: Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match (ty, value) {
            (ColumnType::Boolean, Value::Bool(b)) => Ok(Value::Int(i64::from(b))),
            (ColumnType::BinaryId | ColumnType::Uuid, Value::Uuid(uuid)) => {
                Ok(Value::Blob(uuid.as_bytes().to_vec()))
            }
            (ColumnType::BinaryId | ColumnType::Uuid, Value::Text(text)) => {
                Uuid::parse_str(&text)
                    .map(|uuid| Value::Blob(uuid.as_bytes().to_vec()))
                    .map_err(|_| AdapterError::Cast { ty, value: "text" })
            }
            (ColumnType::UtcDateTime, Value::DateTime(dt)) => {
                Ok(Value::Text(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
            }
            (ColumnType::NaiveDateTime, Value::DateTime(dt)) => {
                Ok(Value::Text(dt.format(NAIVE_DATETIME_FORMAT).to_string()))
            }
            (ColumnType::Date, Value::DateTime(dt)) => {
                Ok(Value::Text(dt.format("%Y-%m-%d").to_string()))
            }
            (ColumnType::Time, Value::DateTime(dt)) => {
                Ok(Value::Text(dt.format("%H:%M:%S").to_string()))
            }
            #[allow(clippy::cast_precision_loss)]
            (ColumnType::Float | ColumnType::Decimal, Value::Int(i)) => Ok(Value::Float(i as f64)),
            (ty, value) => passthrough(ty, value),
        }
    }

    fn autogenerate(&self, kind: AutogenerateKind) -> Option<Value> {
        match kind {
            AutogenerateKind::Id => None,
            AutogenerateKind::BinaryId => Some(Value::Uuid(Uuid::new_v4())),
        }
    }

    async fn bulk_update(
        &self,
        query: &BulkQuery,
        params: &[Value],
        options: &OperationOptions,
    ) -> Result<(u64, Option<Vec<Fields>>)> {
        query.check_params(params)?;
        if query.updates.is_empty() {
            return Err(AdapterError::Invalid(format!(
                "bulk update on '{}' has no assignments",
                query.meta.qualified_name()
            )));
        }

        let mut bound = Vec::new();
        let assignments = query
            .updates
            .iter()
            .map(|(column, param)| {
                format!("{} = {}", quote(column), placeholder(&mut bound, params[*param].clone()))
            })
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {assignments}{}{}",
            target(&query.meta, options),
            predicate_clause(query.predicates()?, params, &mut bound),
            returning_clause(&options.returning)
        );

        let returning = !options.returning.is_empty();
        let (count, rows) = self.run(&sql, bound, returning).await?;
        Ok((count, returning.then_some(rows)))
    }

    async fn bulk_delete(
        &self,
        query: &BulkQuery,
        params: &[Value],
        options: &OperationOptions,
    ) -> Result<(u64, Option<Vec<Fields>>)> {
        query.check_params(params)?;

        let mut bound = Vec::new();
        let sql = format!(
            "DELETE FROM {}{}{}",
            target(&query.meta, options),
            predicate_clause(query.predicates()?, params, &mut bound),
            returning_clause(&options.returning)
        );

        let returning = !options.returning.is_empty();
        let (count, rows) = self.run(&sql, bound, returning).await?;
        Ok((count, returning.then_some(rows)))
    }

    async fn insert(
        &self,
        meta: &SchemaMeta,
        mut fields: Fields,
        autogenerate: Option<&Autogenerate>,
        returning: &[String],
        options: &OperationOptions,
    ) -> Result<Fields> {
        let connected = self.connected()?;
        connected.policy.check(autogenerate, &fields)?;

        let mut generated = None;
        if let Some(auto) = autogenerate {
            let assigned = auto.assigned(&fields).cloned();
            fields.retain(|(name, _)| *name != auto.field);
            match assigned {
                Some(value) => fields.push((auto.field.clone(), value)),
                None => {
                    if let Some(value) = self.autogenerate(auto.kind) {
                        let stored = self.dump(ColumnType::BinaryId, value.clone())?;
                        fields.push((auto.field.clone(), stored));
                        generated = Some((auto.field.clone(), value));
                    }
                }
            }
        }

        let table = target(meta, options);
        let mut bound = Vec::new();
        let sql = if fields.is_empty() {
            format!("INSERT INTO {table} DEFAULT VALUES{}", returning_clause(returning))
        } else {
            let columns = fields
                .iter()
                .map(|(name, _)| quote(name))
                .collect::<Vec<_>>()
                .join(", ");
            let values = fields
                .into_iter()
                .map(|(_, value)| placeholder(&mut bound, value))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "INSERT INTO {table} ({columns}) VALUES ({values}){}",
                returning_clause(returning)
            )
        };

        let (_, rows) = self.run(&sql, bound, !returning.is_empty()).await?;
        let mut returned = rows.into_iter().next().unwrap_or_default();
        if let Some((field, value)) = generated {
            match returned.iter_mut().find(|(name, _)| *name == field) {
                Some(existing) => existing.1 = value,
                None => returned.push((field, value)),
            }
        }
        Ok(returned)
    }

    async fn update(
        &self,
        meta: &SchemaMeta,
        fields: Fields,
        filters: Filters,
        autogenerate: Option<&Autogenerate>,
        returning: &[String],
        options: &OperationOptions,
    ) -> Result<Fields> {
        let connected = self.connected()?;
        connected.policy.check(autogenerate, &fields)?;
        if fields.is_empty() {
            return Err(AdapterError::Invalid(format!(
                "update on '{}' has no fields",
                meta.qualified_name()
            )));
        }
        require_filters("update", meta, &filters)?;

        let mut bound = Vec::new();
        let assignments = fields
            .into_iter()
            .map(|(column, value)| {
                format!("{} = {}", quote(&column), placeholder(&mut bound, value))
            })
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {assignments} WHERE {}{}",
            target(meta, options),
            filter_clause(filters, &mut bound),
            returning_clause(returning)
        );

        let (count, rows) = self.run(&sql, bound, !returning.is_empty()).await?;
        if count == 0 {
            return Err(stale(meta, options, "update"));
        }
        Ok(rows.into_iter().next().unwrap_or_default())
    }

    /// Deletes one record; `options.returning` selects the fields returned
    /// from the deleted row.
    async fn delete(
        &self,
        meta: &SchemaMeta,
        filters: Filters,
        _autogenerate: Option<&Autogenerate>,
        options: &OperationOptions,
    ) -> Result<Fields> {
        require_filters("delete", meta, &filters)?;

        let mut bound = Vec::new();
        let sql = format!(
            "DELETE FROM {} WHERE {}{}",
            target(meta, options),
            filter_clause(filters, &mut bound),
            returning_clause(&options.returning)
        );

        let (count, rows) = self.run(&sql, bound, !options.returning.is_empty()).await?;
        if count == 0 {
            return Err(stale(meta, options, "delete"));
        }
        Ok(rows.into_iter().next().unwrap_or_default())
    }
}

/// Table and index names loaded from a SQLite database.
///
/// Objects of attached databases other than `main` are named
/// `<schema>.<name>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogSnapshot {
    tables: BTreeSet<String>,
    indexes: BTreeSet<String>,
}

impl CatalogSnapshot {
    /// Returns the table names.
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(String::as_str)
    }

    /// Returns the index names.
    pub fn indexes(&self) -> impl Iterator<Item = &str> {
        self.indexes.iter().map(String::as_str)
    }
}

impl MigrationBackend for CatalogSnapshot {
    fn exists(&self, target: &ExistsTarget) -> strata_migrate::error::Result<bool> {
        Ok(match target {
            ExistsTarget::Table(table) => self.tables.contains(&table.qualified_name()),
            ExistsTarget::Index(index) => self
                .indexes
                .contains(&qualify(index.prefix.as_deref(), &index.name)),
        })
    }

    fn reference_type(&self, reference: &Reference) -> ColumnType {
        match reference.ty {
            ColumnType::BinaryId | ColumnType::Uuid => ColumnType::Binary,
            ColumnType::Id
            | ColumnType::Serial
            | ColumnType::BigSerial
            | ColumnType::Integer
            | ColumnType::BigInt => ColumnType::Integer,
            other => other.reference_storage(),
        }
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn target(meta: &SchemaMeta, options: &OperationOptions) -> String {
    match options.prefix.as_deref().or(meta.prefix.as_deref()) {
        Some(prefix) => format!("{}.{}", quote(prefix), quote(&meta.source)),
        None => quote(&meta.source),
    }
}

fn stale(meta: &SchemaMeta, options: &OperationOptions, operation: &'static str) -> AdapterError {
    AdapterError::Stale {
        table: qualify(
            options.prefix.as_deref().or(meta.prefix.as_deref()),
            &meta.source,
        ),
        operation,
    }
}

fn require_filters(operation: &str, meta: &SchemaMeta, filters: &Filters) -> Result<()> {
    if filters.is_empty() {
        return Err(AdapterError::Invalid(format!(
            "{operation} on '{}' has no filters",
            meta.qualified_name()
        )));
    }
    Ok(())
}

fn placeholder(bound: &mut Vec<Value>, value: Value) -> String {
    bound.push(value);
    format!("?{}", bound.len())
}

fn filter_clause(filters: Filters, bound: &mut Vec<Value>) -> String {
    filters
        .into_iter()
        .map(|(column, value)| {
            if value.is_null() {
                format!("{} IS NULL", quote(&column))
            } else {
                format!("{} = {}", quote(&column), placeholder(bound, value))
            }
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn predicate_clause(predicates: &[Predicate], params: &[Value], bound: &mut Vec<Value>) -> String {
    if predicates.is_empty() {
        return String::new();
    }
    let conditions = predicates
        .iter()
        .map(|p| {
            format!(
                "{} {} {}",
                quote(&p.column),
                operator(p.comparison),
                placeholder(bound, params[p.param].clone())
            )
        })
        .collect::<Vec<_>>()
        .join(" AND ");
    format!(" WHERE {conditions}")
}

const fn operator(comparison: Comparison) -> &'static str {
    match comparison {
        Comparison::Eq => "=",
        Comparison::NotEq => "<>",
        Comparison::Lt => "<",
        Comparison::Lte => "<=",
        Comparison::Gt => ">",
        Comparison::Gte => ">=",
    }
}

fn returning_clause(columns: &[String]) -> String {
    if columns.is_empty() {
        return String::new();
    }
    let columns = columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", ");
    format!(" RETURNING {columns}")
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(Option::<i64>::None),
        Value::Bool(b) => query.bind(b),
        Value::Int(i) => query.bind(i),
        Value::Float(f) => query.bind(f),
        Value::Text(s) => query.bind(s),
        Value::Blob(b) => query.bind(b),
        Value::Uuid(u) => query.bind(u.as_bytes().to_vec()),
        Value::DateTime(dt) => query.bind(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
    }
}

fn row_fields(row: &SqliteRow) -> Result<Fields> {
    row.columns()
        .iter()
        .map(|column| -> Result<(String, Value)> {
            let index = column.ordinal();
            let raw = row.try_get_raw(index)?;
            let value = if raw.is_null() {
                Value::Null
            } else {
                match raw.type_info().name() {
                    "INTEGER" => Value::Int(row.try_get(index)?),
                    "REAL" => Value::Float(row.try_get(index)?),
                    "BLOB" => Value::Blob(row.try_get(index)?),
                    _ => Value::Text(row.try_get(index)?),
                }
            };
            Ok((column.name().to_string(), value))
        })
        .collect()
}

fn passthrough(ty: ColumnType, value: Value) -> Result<Value> {
    let fits = match (&value, ty) {
        (
            Value::Int(_),
            ColumnType::Id
            | ColumnType::Serial
            | ColumnType::BigSerial
            | ColumnType::Integer
            | ColumnType::BigInt
            | ColumnType::Boolean,
        )
        | (Value::Float(_), ColumnType::Float | ColumnType::Decimal)
        | (Value::Bool(_), ColumnType::Boolean)
        | (Value::Uuid(_), ColumnType::BinaryId | ColumnType::Uuid)
        | (Value::DateTime(_), ColumnType::UtcDateTime | ColumnType::NaiveDateTime)
        | (
            Value::Text(_),
            ColumnType::String
            | ColumnType::Text
            | ColumnType::Map
            | ColumnType::Decimal
            | ColumnType::Time
            | ColumnType::Date,
        ) => true,
        (Value::Blob(bytes), ColumnType::BinaryId | ColumnType::Uuid) => bytes.len() == 16,
        (Value::Blob(_), ColumnType::Binary) => true,
        _ => false,
    };
    if fits {
        Ok(value)
    } else {
        Err(AdapterError::Cast {
            ty,
            value: value.kind(),
        })
    }
}

fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
                .map(|naive| naive.and_utc())
        })
}
