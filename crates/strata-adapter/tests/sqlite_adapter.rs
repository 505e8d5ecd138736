//! SQLite adapter scenarios against in-memory databases.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use strata_adapter::{
    Adapter, AdapterConfig, AdapterError, Autogenerate, AutogenerateKind, AutogeneratePolicy,
    BulkQuery, Comparison, OperationOptions, Predicate, SchemaMeta, SqliteAdapter, StartError,
    Started, Value,
};
use strata_migrate::prelude::*;

async fn create_test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .expect("Failed to create in-memory SQLite pool");

    sqlx::query(
        "CREATE TABLE posts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            views INTEGER NOT NULL DEFAULT 0
        )",
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query("CREATE TABLE tokens (id BLOB PRIMARY KEY, label TEXT)")
        .execute(&pool)
        .await
        .unwrap();

    pool
}

async fn adapter(policy: AutogeneratePolicy) -> SqliteAdapter {
    SqliteAdapter::from_pool(create_test_pool().await, policy)
}

fn fields(pairs: &[(&str, Value)]) -> Vec<(String, Value)> {
    pairs
        .iter()
        .map(|(name, value)| ((*name).to_string(), value.clone()))
        .collect()
}

fn returning(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| (*c).to_string()).collect()
}

async fn insert_post(adapter: &SqliteAdapter, title: &str, views: i64) -> Value {
    let auto = Autogenerate::new("id", AutogenerateKind::Id);
    let returned = adapter
        .insert(
            &SchemaMeta::new("posts"),
            fields(&[("title", Value::from(title)), ("views", Value::Int(views))]),
            Some(&auto),
            &returning(&["id"]),
            &OperationOptions::default(),
        )
        .await
        .unwrap();
    returned[0].1.clone()
}

#[tokio::test]
async fn start_twice_returns_existing_pool() {
    let adapter = SqliteAdapter::new();

    let started = adapter.start(&AdapterConfig::default()).await.unwrap();
    assert!(matches!(started, Started::Handle(_)));

    let again = adapter.start(&AdapterConfig::default()).await.unwrap_err();
    assert!(matches!(again, StartError::AlreadyStarted(_)));
    assert!(adapter.pool().is_ok());
}

#[tokio::test]
async fn update_without_matching_rows_is_stale() {
    let adapter = adapter(AutogeneratePolicy::Reject).await;

    let err = adapter
        .update(
            &SchemaMeta::new("posts"),
            fields(&[("title", Value::from("renamed"))]),
            fields(&[("id", Value::Int(5))]),
            None,
            &[],
            &OperationOptions::default(),
        )
        .await
        .unwrap_err();

    assert!(err.is_stale());
    assert!(matches!(
        err,
        AdapterError::Stale { ref table, operation: "update" } if table == "posts"
    ));
}

#[tokio::test]
async fn delete_without_matching_rows_is_stale() {
    let adapter = adapter(AutogeneratePolicy::Reject).await;

    let err = adapter
        .delete(
            &SchemaMeta::new("posts"),
            fields(&[("id", Value::Int(1))]),
            None,
            &OperationOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::Stale { operation: "delete", .. }));
}

#[tokio::test]
async fn insert_lets_database_assign_id() {
    let adapter = adapter(AutogeneratePolicy::Reject).await;

    assert_eq!(insert_post(&adapter, "first", 0).await, Value::Int(1));
    assert_eq!(insert_post(&adapter, "second", 0).await, Value::Int(2));
}

#[tokio::test]
async fn update_and_delete_existing_rows() {
    let adapter = adapter(AutogeneratePolicy::Reject).await;
    let id = insert_post(&adapter, "draft", 3).await;

    let returned = adapter
        .update(
            &SchemaMeta::new("posts"),
            fields(&[("title", Value::from("published"))]),
            vec![("id".to_string(), id.clone())],
            None,
            &returning(&["title", "views"]),
            &OperationOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(
        returned,
        fields(&[("title", Value::from("published")), ("views", Value::Int(3))])
    );

    let deleted = adapter
        .delete(
            &SchemaMeta::new("posts"),
            vec![("id".to_string(), id)],
            None,
            &OperationOptions {
                returning: returning(&["title"]),
                ..OperationOptions::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(deleted, fields(&[("title", Value::from("published"))]));
}

#[tokio::test]
async fn assigned_autogenerated_key_follows_policy() {
    let auto = Autogenerate::new("id", AutogenerateKind::Id);
    let row = fields(&[("id", Value::Int(42)), ("title", Value::from("manual"))]);

    let strict = adapter(AutogeneratePolicy::Reject).await;
    let err = strict
        .insert(
            &SchemaMeta::new("posts"),
            row.clone(),
            Some(&auto),
            &[],
            &OperationOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::AutogeneratedKeyAssigned { ref field } if field == "id"));

    let lenient = adapter(AutogeneratePolicy::Honor).await;
    let returned = lenient
        .insert(
            &SchemaMeta::new("posts"),
            row,
            Some(&auto),
            &returning(&["id"]),
            &OperationOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(returned, fields(&[("id", Value::Int(42))]));
}

#[tokio::test]
async fn binary_id_is_generated_by_adapter() {
    let adapter = adapter(AutogeneratePolicy::Reject).await;
    let auto = Autogenerate::new("id", AutogenerateKind::BinaryId);

    let returned = adapter
        .insert(
            &SchemaMeta::new("tokens"),
            fields(&[("label", Value::from("api"))]),
            Some(&auto),
            &[],
            &OperationOptions::default(),
        )
        .await
        .unwrap();
    let [(field, Value::Uuid(generated))] = returned.as_slice() else {
        panic!("expected a generated binary id, got {returned:?}");
    };
    assert_eq!(field, "id");

    let row = sqlx::query("SELECT id FROM tokens")
        .fetch_one(adapter.pool().unwrap())
        .await
        .unwrap();
    let stored: Vec<u8> = row.get("id");
    assert_eq!(
        adapter
            .load(ColumnType::BinaryId, Value::Blob(stored))
            .unwrap(),
        Value::Uuid(*generated)
    );
}

#[tokio::test]
async fn bulk_operations_require_scope() {
    let adapter = adapter(AutogeneratePolicy::Reject).await;
    let meta = SchemaMeta::new("posts");

    let unscoped = BulkQuery::filtered(meta.clone(), vec![]).set("views", 0);
    let err = adapter
        .bulk_update(&unscoped, &[Value::Int(0)], &OperationOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::UnscopedBulkQuery(ref source) if source == "posts"));

    let err = adapter
        .bulk_delete(
            &BulkQuery::filtered(meta, vec![]),
            &[],
            &OperationOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::UnscopedBulkQuery(_)));
}

#[tokio::test]
async fn bulk_update_counts_matched_rows() {
    let adapter = adapter(AutogeneratePolicy::Reject).await;
    insert_post(&adapter, "a", 1).await;
    insert_post(&adapter, "b", 10).await;
    insert_post(&adapter, "c", 20).await;

    let query = BulkQuery::filtered(
        SchemaMeta::new("posts"),
        vec![Predicate::new("views", Comparison::Gte, 0)],
    )
    .set("title", 1);

    let (count, rows) = adapter
        .bulk_update(
            &query,
            &[Value::Int(10), Value::from("popular")],
            &OperationOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(count, 2);
    assert!(rows.is_none());

    let (count, rows) = adapter
        .bulk_delete(
            &BulkQuery::all(SchemaMeta::new("posts")),
            &[],
            &OperationOptions {
                returning: returning(&["title"]),
                ..OperationOptions::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(count, 3);
    let mut titles: Vec<Value> = rows
        .unwrap()
        .into_iter()
        .map(|mut row| row.remove(0).1)
        .collect();
    titles.sort_by_key(|v| format!("{v:?}"));
    assert_eq!(
        titles,
        vec![Value::from("a"), Value::from("popular"), Value::from("popular")]
    );
}

#[tokio::test]
async fn bulk_query_rejects_missing_parameter() {
    let adapter = adapter(AutogeneratePolicy::Reject).await;
    let query = BulkQuery::filtered(SchemaMeta::new("posts"), vec![Predicate::eq("id", 2)]);

    let err = adapter
        .bulk_delete(&query, &[Value::Int(1)], &OperationOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::MissingParameter(2)));
}

#[tokio::test]
async fn catalog_answers_existence_checks() {
    let adapter = adapter(AutogeneratePolicy::Reject).await;
    sqlx::query("CREATE INDEX posts_title_index ON posts (title)")
        .execute(adapter.pool().unwrap())
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("archive.db");
    std::fs::File::create(&archive).unwrap();
    sqlx::query(&format!("ATTACH DATABASE '{}' AS archive", archive.display()))
        .execute(adapter.pool().unwrap())
        .await
        .unwrap();
    sqlx::query("CREATE TABLE archive.posts (id INTEGER PRIMARY KEY)")
        .execute(adapter.pool().unwrap())
        .await
        .unwrap();

    let catalog = adapter.catalog().await.unwrap();
    assert!(catalog.tables().any(|t| t == "archive.posts"));

    let slot = SessionSlot::new();
    let mut session = slot.start(&catalog, Direction::Forward).unwrap();
    assert!(session.exists(table("posts")).unwrap());
    assert!(session.exists(table("posts").prefix("archive")).unwrap());
    assert!(!session.exists(table("comments")).unwrap());
    assert!(session.exists(index("posts", ["title"])).unwrap());
    session.stop();

    let mut session = slot.start(&catalog, Direction::Reverse).unwrap();
    assert!(!session.exists(table("posts")).unwrap());
    session.stop();
}

#[tokio::test]
async fn catalog_resolves_reference_storage() {
    let adapter = adapter(AutogeneratePolicy::Reject).await;
    let catalog = adapter.catalog().await.unwrap();

    let slot = SessionSlot::new();
    let mut session = slot.start(&catalog, Direction::Forward).unwrap();
    session
        .create(table("comments"), |t| {
            t.add(
                "token_id",
                references("tokens").ty(ColumnType::BinaryId),
                ColumnOptions::new(),
            );
        })
        .unwrap();

    let Some(Command::CreateTable(_, columns)) = session.last_command() else {
        panic!("expected a create table command");
    };
    let ColumnOperation::Add(name, field, _) = &columns[1] else {
        panic!("expected an add operation");
    };
    assert_eq!(name, "token_id");
    assert_eq!(field.storage_type(), Some(ColumnType::Binary));
}
