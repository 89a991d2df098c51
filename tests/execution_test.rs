//! Query and schema execution through a recording adapter

use async_trait::async_trait;
use rustf_sql::database::{Connection, ConnectionConfig, DatabaseAdapter, QueryResult, SearchPath};
use rustf_sql::database::types::SqlValue;
use rustf_sql::query::{row, DatabaseBackend, QueryBuilder, UpsertUpdate};
use rustf_sql::Result;
use serde_json::{json, Value as JsonValue};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

type Statement = (String, Vec<SqlValue>);

/// Records every statement and answers selects from a queue of canned results
#[derive(Clone)]
struct RecordingAdapter {
    backend: DatabaseBackend,
    statements: Arc<Mutex<Vec<Statement>>>,
    responses: Arc<Mutex<VecDeque<Vec<JsonValue>>>>,
    result: QueryResult,
}

impl RecordingAdapter {
    fn new(backend: DatabaseBackend) -> Self {
        Self {
            backend,
            statements: Arc::new(Mutex::new(Vec::new())),
            responses: Arc::new(Mutex::new(VecDeque::new())),
            result: QueryResult {
                rows_affected: 1,
                last_insert_id: None,
            },
        }
    }

    fn with_result(mut self, rows_affected: u64, last_insert_id: Option<i64>) -> Self {
        self.result = QueryResult {
            rows_affected,
            last_insert_id,
        };
        self
    }

    fn respond(&self, rows: Vec<JsonValue>) {
        self.responses.lock().unwrap().push_back(rows);
    }

    fn record(&self, sql: &str, params: Vec<SqlValue>) {
        self.statements.lock().unwrap().push((sql.to_string(), params));
    }

    fn statements(&self) -> Vec<Statement> {
        self.statements.lock().unwrap().clone()
    }

    fn last(&self) -> Statement {
        self.statements().pop().expect("no statement recorded")
    }

    fn next_rows(&self) -> Vec<JsonValue> {
        self.responses.lock().unwrap().pop_front().unwrap_or_default()
    }
}

#[async_trait]
impl DatabaseAdapter for RecordingAdapter {
    fn name(&self) -> &str {
        "recording"
    }

    fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    async fn execute(&self, sql: &str, params: Vec<SqlValue>) -> Result<QueryResult> {
        self.record(sql, params);
        Ok(self.result.clone())
    }

    async fn fetch_all(&self, sql: &str, params: Vec<SqlValue>) -> Result<Vec<JsonValue>> {
        self.record(sql, params);
        Ok(self.next_rows())
    }

    async fn fetch_one(&self, sql: &str, params: Vec<SqlValue>) -> Result<Option<JsonValue>> {
        self.record(sql, params);
        Ok(self.next_rows().into_iter().next())
    }

    async fn execute_unprepared(&self, sql: &str) -> Result<()> {
        self.record(sql, Vec::new());
        Ok(())
    }

    async fn ping(&self) -> Result<bool> {
        Ok(true)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn clone_box(&self) -> Box<dyn DatabaseAdapter> {
        Box::new(self.clone())
    }
}

fn connect(adapter: &RecordingAdapter, config: ConnectionConfig) -> Connection {
    Connection::new("recording", config, Arc::new(adapter.clone()))
}

fn pg(adapter: &RecordingAdapter) -> Connection {
    connect(adapter, ConnectionConfig::new("pgsql"))
}

fn text(value: &str) -> SqlValue {
    SqlValue::String(value.to_string())
}

#[tokio::test]
async fn test_multi_row_insert_aligns_sorted_columns() {
    let adapter = RecordingAdapter::new(DatabaseBackend::Postgres);
    let inserted = pg(&adapter)
        .table("users")
        .insert(vec![
            row([("name", "Ann"), ("email", "ann@example.com")]),
            row([("email", "bob@example.com"), ("name", "Bob")]),
        ])
        .await
        .unwrap();

    assert!(inserted);
    assert_eq!(
        adapter.last(),
        (
            r#"insert into "users" ("email", "name") values (?, ?), (?, ?)"#.to_string(),
            vec![
                text("ann@example.com"),
                text("Ann"),
                text("bob@example.com"),
                text("Bob")
            ]
        )
    );
}

#[tokio::test]
async fn test_empty_insert_is_a_no_op() {
    let adapter = RecordingAdapter::new(DatabaseBackend::Postgres);
    assert!(pg(&adapter).table("users").insert(Vec::new()).await.unwrap());
    assert!(adapter.statements().is_empty(), "nothing should reach the driver");
}

#[tokio::test]
async fn test_insert_get_id_reads_returned_row() {
    let adapter = RecordingAdapter::new(DatabaseBackend::Postgres);
    adapter.respond(vec![json!({ "id": 42 })]);

    let id = pg(&adapter)
        .table("users")
        .insert_get_id(row([("email", "ann@example.com")]), None)
        .await
        .unwrap();

    assert_eq!(id, 42);
    assert_eq!(
        adapter.last().0,
        r#"insert into "users" ("email") values (?) returning "id""#
    );
}

#[tokio::test]
async fn test_insert_get_id_uses_driver_last_insert_id() {
    let adapter = RecordingAdapter::new(DatabaseBackend::MySQL).with_result(1, Some(7));
    let connection = connect(&adapter, ConnectionConfig::new("mysql"));

    let id = connection
        .table("users")
        .insert_get_id(row([("email", "ann@example.com")]), None)
        .await
        .unwrap();

    assert_eq!(id, 7);
    assert_eq!(adapter.last().0, "insert into `users` (`email`) values (?)");
}

#[tokio::test]
async fn test_insert_get_id_without_driver_id() {
    let adapter = RecordingAdapter::new(DatabaseBackend::MySQL);
    let connection = connect(&adapter, ConnectionConfig::new("mysql"));

    let err = connection
        .table("users")
        .insert_get_id(row([("email", "ann@example.com")]), None)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Insert did not report a generated id.");
}

#[tokio::test]
async fn test_update_binds_values_before_wheres() {
    let adapter = RecordingAdapter::new(DatabaseBackend::MySQL).with_result(3, None);
    let connection = connect(&adapter, ConnectionConfig::new("mysql"));

    let affected = connection
        .table("users")
        .where_("id", "=", 1)
        .update(row([("name", "Ann")]))
        .await
        .unwrap();

    assert_eq!(affected, 3);
    assert_eq!(
        adapter.last(),
        (
            "update `users` set `name` = ? where `id` = ?".to_string(),
            vec![text("Ann"), SqlValue::Int(1)]
        )
    );
}

#[tokio::test]
async fn test_increment_inlines_expression() {
    let adapter = RecordingAdapter::new(DatabaseBackend::Postgres);
    pg(&adapter)
        .table("users")
        .where_("id", "=", 1)
        .increment("votes", 5)
        .await
        .unwrap();

    assert_eq!(
        adapter.last(),
        (
            r#"update "users" set "votes" = "votes" + 5 where "id" = ?"#.to_string(),
            vec![SqlValue::Int(1)]
        )
    );
}

#[tokio::test]
async fn test_delete() {
    let adapter = RecordingAdapter::new(DatabaseBackend::Postgres).with_result(2, None);
    let deleted = pg(&adapter)
        .table("users")
        .where_("active", "=", false)
        .delete()
        .await
        .unwrap();

    assert_eq!(deleted, 2);
    assert_eq!(
        adapter.last(),
        (
            r#"delete from "users" where "active" = ?"#.to_string(),
            vec![SqlValue::Bool(false)]
        )
    );
}

#[tokio::test]
async fn test_count_drops_columns_and_orders() {
    let adapter = RecordingAdapter::new(DatabaseBackend::Postgres);
    adapter.respond(vec![json!({ "aggregate": 3 })]);

    let count = pg(&adapter)
        .table("users")
        .select(["id", "email"])
        .where_("active", "=", true)
        .order_by("email", rustf_sql::query::Direction::Asc)
        .count()
        .await
        .unwrap();

    assert_eq!(count, 3);
    assert_eq!(
        adapter.last(),
        (
            r#"select count(*) as aggregate from "users" where "active" = ?"#.to_string(),
            vec![SqlValue::Bool(true)]
        )
    );
}

#[tokio::test]
async fn test_sum_defaults_to_zero() {
    let adapter = RecordingAdapter::new(DatabaseBackend::Postgres);
    adapter.respond(vec![json!({ "aggregate": null })]);

    let total = pg(&adapter).table("orders").sum("total").await.unwrap();
    assert_eq!(total, json!(0));
    assert_eq!(
        adapter.last().0,
        r#"select sum("total") as aggregate from "orders""#
    );
}

#[tokio::test]
async fn test_exists() {
    let adapter = RecordingAdapter::new(DatabaseBackend::Postgres);
    adapter.respond(vec![json!({ "exists": true })]);
    adapter.respond(vec![json!({ "exists": false })]);

    let connection = pg(&adapter);
    assert!(connection.table("users").where_("id", "=", 1).exists().await.unwrap());
    assert!(connection.table("users").where_("id", "=", 2).doesnt_exist().await.unwrap());

    assert_eq!(
        adapter.statements()[0].0,
        r#"select exists(select * from "users" where "id" = ?) as "exists""#
    );
}

#[tokio::test]
async fn test_first_value_and_pluck() {
    let adapter = RecordingAdapter::new(DatabaseBackend::Postgres);
    let connection = pg(&adapter);

    adapter.respond(vec![json!({ "id": 1, "email": "ann@example.com" })]);
    let first = connection.table("users").where_("id", "=", 1).first().await.unwrap();
    assert_eq!(first, Some(json!({ "id": 1, "email": "ann@example.com" })));
    assert_eq!(
        adapter.last().0,
        r#"select * from "users" where "id" = ? limit 1"#
    );

    adapter.respond(vec![json!({ "email": "ann@example.com" })]);
    let email = connection.table("users").value("email").await.unwrap();
    assert_eq!(email, Some(json!("ann@example.com")));
    assert_eq!(adapter.last().0, r#"select "email" from "users" limit 1"#);

    adapter.respond(vec![json!({ "email": "a@x" }), json!({ "email": "b@x" })]);
    let emails = connection.table("users").pluck("users.email").await.unwrap();
    assert_eq!(emails, vec![json!("a@x"), json!("b@x")]);
    assert_eq!(adapter.last().0, r#"select "users"."email" from "users""#);
}

#[tokio::test]
async fn test_upsert_updates_every_column_by_default() {
    let adapter = RecordingAdapter::new(DatabaseBackend::Postgres);
    pg(&adapter)
        .table("users")
        .upsert(
            vec![row([("email", "ann@example.com"), ("name", "Ann")])],
            ["email"],
            None,
        )
        .await
        .unwrap();

    assert_eq!(
        adapter.last().0,
        r#"insert into "users" ("email", "name") values (?, ?) on conflict ("email") do update set "email" = "excluded"."email", "name" = "excluded"."name""#
    );
}

#[tokio::test]
async fn test_upsert_assignment_bindings_follow_rows() {
    let adapter = RecordingAdapter::new(DatabaseBackend::SQLite);
    let connection = connect(&adapter, ConnectionConfig::new("sqlite").database(":memory:"));

    connection
        .table("users")
        .upsert(
            vec![row([("email", "ann@example.com")])],
            ["email"],
            Some(vec![UpsertUpdate::Assign("visits".to_string(), 1.into())]),
        )
        .await
        .unwrap();

    assert_eq!(
        adapter.last(),
        (
            r#"insert into "users" ("email") values (?) on conflict ("email") do update set "visits" = ?"#.to_string(),
            vec![text("ann@example.com"), SqlValue::Int(1)]
        )
    );
}

#[tokio::test]
async fn test_upsert_with_no_updates_is_plain_insert() {
    let adapter = RecordingAdapter::new(DatabaseBackend::Postgres);
    pg(&adapter)
        .table("users")
        .upsert(vec![row([("email", "ann@example.com")])], ["email"], Some(Vec::new()))
        .await
        .unwrap();

    assert_eq!(
        adapter.last().0,
        r#"insert into "users" ("email") values (?)"#
    );
}

#[tokio::test]
async fn test_sqlite_truncate_resets_sequence() {
    let adapter = RecordingAdapter::new(DatabaseBackend::SQLite);
    let connection = connect(&adapter, ConnectionConfig::new("sqlite").prefix("app_"));

    connection.table("users").truncate().await.unwrap();

    assert_eq!(
        adapter.statements(),
        vec![
            (
                "delete from sqlite_sequence where name = ?".to_string(),
                vec![text("app_users")]
            ),
            (r#"delete from "app_users""#.to_string(), Vec::new()),
        ]
    );
}

#[tokio::test]
async fn test_before_query_callbacks_run_on_execution() {
    let adapter = RecordingAdapter::new(DatabaseBackend::Postgres);
    pg(&adapter)
        .table("posts")
        .before_query(|q| q.where_("published", "=", true))
        .get()
        .await
        .unwrap();

    assert_eq!(
        adapter.last(),
        (
            r#"select * from "posts" where "published" = ?"#.to_string(),
            vec![SqlValue::Bool(true)]
        )
    );
}

#[tokio::test]
async fn test_unbound_builder_cannot_execute() {
    let err = QueryBuilder::for_backend(DatabaseBackend::Postgres)
        .from("users")
        .get()
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Query builder is not bound to a database connection."
    );
}

#[tokio::test]
async fn test_connection_prefix_and_upsert_alias_reach_grammar() {
    let adapter = RecordingAdapter::new(DatabaseBackend::MySQL);
    let connection = connect(
        &adapter,
        ConnectionConfig::new("mysql").prefix("app_").use_upsert_alias(true),
    );

    connection
        .table("users")
        .upsert(vec![row([("email", "a@x"), ("name", "A")])], ["email"], Some(vec!["name".into()]))
        .await
        .unwrap();

    assert_eq!(
        adapter.last().0,
        "insert into `app_users` (`email`, `name`) values (?, ?) as laravel_upsert_alias on duplicate key update `name` = `laravel_upsert_alias`.`name`"
    );
}

#[tokio::test]
async fn test_scalar_rejects_multiple_columns() {
    let adapter = RecordingAdapter::new(DatabaseBackend::Postgres);
    adapter.respond(vec![json!({ "a": 1, "b": 2 })]);

    let err = pg(&adapter).scalar("select 1 as a, 2 as b", Vec::new()).await.unwrap_err();
    assert_eq!(err.to_string(), "The scalar query returned more than one column.");
}

#[tokio::test]
async fn test_schema_has_table_reads_scalar() {
    let adapter = RecordingAdapter::new(DatabaseBackend::Postgres);
    adapter.respond(vec![json!({ "exists": true })]);
    adapter.respond(vec![json!({ "exists": 0 })]);

    let schema = pg(&adapter).schema();
    assert!(schema.has_table("users").await.unwrap());
    assert!(!schema.has_table("audit.missing").await.unwrap());
    assert_eq!(adapter.statements().len(), 2);
}

#[tokio::test]
async fn test_schema_drop_all_tables_stays_on_search_path() {
    let adapter = RecordingAdapter::new(DatabaseBackend::Postgres);
    adapter.respond(vec![
        json!({ "name": "users", "schema": "public" }),
        json!({ "name": "log", "schema": "audit" }),
        json!({ "name": "other", "schema": "reporting" }),
    ]);
    let connection = connect(
        &adapter,
        ConnectionConfig::new("pgsql")
            .search_path(SearchPath::Many(vec!["public".into(), "audit".into()])),
    );

    connection.schema().drop_all_tables().await.unwrap();

    assert_eq!(
        adapter.last().0,
        r#"drop table "public"."users", "audit"."log" cascade"#
    );
}

#[tokio::test]
async fn test_schema_drop_all_tables_skips_empty_database() {
    let adapter = RecordingAdapter::new(DatabaseBackend::Postgres);
    pg(&adapter).schema().drop_all_tables().await.unwrap();
    assert_eq!(adapter.statements().len(), 1, "only the table listing runs");
}

#[tokio::test]
async fn test_schema_without_foreign_key_constraints() {
    let adapter = RecordingAdapter::new(DatabaseBackend::SQLite);
    let connection = connect(&adapter, ConnectionConfig::new("sqlite").database(":memory:"));
    let schema = connection.schema();

    let value = schema
        .without_foreign_key_constraints(|| async {
            connection.statement("delete from parents", Vec::new()).await?;
            Ok::<_, rustf_sql::Error>(5)
        })
        .await
        .unwrap();

    assert_eq!(value, 5);
    let statements: Vec<String> = adapter.statements().into_iter().map(|(sql, _)| sql).collect();
    assert_eq!(
        statements,
        vec![
            "PRAGMA foreign_keys = OFF;",
            "delete from parents",
            "PRAGMA foreign_keys = ON;"
        ]
    );
}

#[tokio::test]
async fn test_schema_column_type_lookup() {
    let adapter = RecordingAdapter::new(DatabaseBackend::SQLite);
    let connection = connect(&adapter, ConnectionConfig::new("sqlite").database(":memory:"));
    let columns = vec![
        json!({ "name": "id", "type": "INTEGER", "nullable": 0, "default": null, "primary": 1, "extra": 0 }),
        json!({ "name": "email", "type": "VARCHAR(255)", "nullable": 1, "default": null, "primary": 0, "extra": 0 }),
    ];
    adapter.respond(columns.clone());
    adapter.respond(columns);

    let schema = connection.schema();
    assert_eq!(schema.get_column_type("users", "EMAIL", false).await.unwrap(), "varchar");

    let err = schema.get_column_type("users", "phone", false).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "There is no column with name 'phone' on table 'users'."
    );
}
