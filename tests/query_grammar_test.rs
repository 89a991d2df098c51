use rustf_sql::database::types::SqlValue;
use rustf_sql::query::{
    row, DatabaseBackend, Direction, FulltextOptions, Grammar, MySqlGrammar, PostgresGrammar,
    QueryBuilder, QueryError, Registry, SQLiteGrammar, SqlServerGrammar, UpsertUpdate,
};
use rustf_sql::query::grammar::insert_bindings;
use std::sync::Arc;

fn pg() -> QueryBuilder {
    QueryBuilder::for_backend(DatabaseBackend::Postgres)
}

fn mysql() -> QueryBuilder {
    QueryBuilder::for_backend(DatabaseBackend::MySQL)
}

fn sqlite() -> QueryBuilder {
    QueryBuilder::for_backend(DatabaseBackend::SQLite)
}

fn sqlsrv() -> QueryBuilder {
    QueryBuilder::for_backend(DatabaseBackend::SqlServer)
}

fn paged(query: QueryBuilder) -> QueryBuilder {
    query
        .from("users")
        .select(["id", "email"])
        .where_("votes", ">", 100)
        .order_by("email", Direction::Asc)
        .limit(10)
        .offset(20)
}

#[test]
fn test_select_per_dialect() {
    assert_eq!(
        paged(pg()).to_sql().unwrap(),
        r#"select "id", "email" from "users" where "votes" > ? order by "email" asc limit 10 offset 20"#
    );
    assert_eq!(
        paged(mysql()).to_sql().unwrap(),
        "select `id`, `email` from `users` where `votes` > ? order by `email` asc limit 10 offset 20"
    );
    assert_eq!(
        paged(sqlite()).to_sql().unwrap(),
        r#"select "id", "email" from "users" where "votes" > ? order by "email" asc limit 10 offset 20"#
    );
    // SQL Server pages with offset/fetch after the order by
    assert_eq!(
        paged(sqlsrv()).to_sql().unwrap(),
        "select [id], [email] from [users] where [votes] > ? order by [email] asc offset 20 rows fetch next 10 rows only"
    );
}

#[test]
fn test_sqlserver_top_and_implicit_order() {
    assert_eq!(
        sqlsrv().from("users").limit(5).to_sql().unwrap(),
        "select top 5 * from [users]"
    );
    assert_eq!(
        sqlsrv().from("users").offset(10).to_sql().unwrap(),
        "select * from [users] order by (SELECT 0) offset 10 rows"
    );
}

#[test]
fn test_identifier_quoting_escapes_delimiters() {
    assert_eq!(MySqlGrammar::new().wrap_value("we`ird"), "`we``ird`");
    assert_eq!(SqlServerGrammar::new().wrap_value("we]ird"), "[we]]ird]");
    assert_eq!(PostgresGrammar::new().wrap_value("we\"ird"), "\"we\"\"ird\"");
    assert_eq!(SQLiteGrammar::new().wrap_value("*"), "*");
}

#[test]
fn test_prefixed_tables_and_aliases() {
    let grammar = Arc::new(PostgresGrammar::new().with_table_prefix("app_"));
    let mut query = QueryBuilder::new(grammar)
        .from("users as u")
        .join("posts as p", "u.id", "=", "p.user_id");

    assert_eq!(
        query.to_sql().unwrap(),
        r#"select * from "app_users" as "app_u" inner join "app_posts" as "app_p" on "app_u"."id" = "app_p"."user_id""#
    );
}

#[test]
fn test_schema_qualified_table_gets_prefix_on_last_segment() {
    let grammar = MySqlGrammar::new().with_table_prefix("app_");
    assert_eq!(grammar.wrap_table_str("reports.daily"), "`reports`.`app_daily`");
}

#[test]
fn test_null_comparisons_become_null_checks() {
    let mut query = pg()
        .from("users")
        .where_("deleted_at", "=", None::<String>)
        .where_("banned_at", "!=", None::<String>)
        .or_where_null("archived_at");

    assert_eq!(
        query.to_sql().unwrap(),
        r#"select * from "users" where "deleted_at" is null and "banned_at" is not null or "archived_at" is null"#
    );
    assert!(query.get_bindings().is_empty(), "null checks bind nothing");
}

#[test]
fn test_nested_groups_keep_binding_order() {
    let mut query = pg()
        .from("users")
        .where_("active", "=", true)
        .where_nested(|q| q.where_("role", "=", "admin").or_where("votes", ">", 100));

    assert_eq!(
        query.to_sql().unwrap(),
        r#"select * from "users" where "active" = ? and ("role" = ? or "votes" > ?)"#
    );
    assert_eq!(
        query.get_bindings(),
        vec![
            SqlValue::Bool(true),
            SqlValue::String("admin".to_string()),
            SqlValue::Int(100)
        ]
    );
}

#[test]
fn test_where_not_group() {
    let mut query = pg().from("users").where_not(|q| q.where_("banned", "=", true));
    assert_eq!(
        query.to_sql().unwrap(),
        r#"select * from "users" where not ("banned" = ?)"#
    );
}

#[test]
fn test_empty_nested_group_is_dropped() {
    let mut query = pg().from("users").where_nested(|q| q);
    assert_eq!(query.to_sql().unwrap(), r#"select * from "users""#);
}

#[test]
fn test_where_in_lists() {
    let mut query = pg().from("users").where_in("id", [1, 2, 3]);
    assert_eq!(
        query.to_sql().unwrap(),
        r#"select * from "users" where "id" in (?, ?, ?)"#
    );
    assert_eq!(
        query.get_bindings(),
        vec![SqlValue::Int(1), SqlValue::Int(2), SqlValue::Int(3)]
    );

    // Empty lists compile to constant predicates
    let mut none = pg().from("users").where_in("id", Vec::<i32>::new());
    assert_eq!(none.to_sql().unwrap(), r#"select * from "users" where 0 = 1"#);

    let mut all = pg().from("users").where_not_in("id", Vec::<i32>::new());
    assert_eq!(all.to_sql().unwrap(), r#"select * from "users" where 1 = 1"#);
}

#[test]
fn test_where_between() {
    let mut query = mysql().from("orders").where_between("total", 10, 50);
    assert_eq!(
        query.to_sql().unwrap(),
        "select * from `orders` where `total` between ? and ?"
    );
    assert_eq!(query.get_bindings(), vec![SqlValue::Int(10), SqlValue::Int(50)]);
}

#[test]
fn test_exists_and_in_sub_queries() {
    let mut query = pg()
        .from("users")
        .where_exists(|q| q.from("orders").where_column("orders.user_id", "=", "users.id"));
    assert_eq!(
        query.to_sql().unwrap(),
        r#"select * from "users" where exists (select * from "orders" where "orders"."user_id" = "users"."id")"#
    );

    let mut query = pg().from("users").where_in_sub("id", |q| {
        q.from("orders").select(["user_id"]).where_("total", ">", 100)
    });
    assert_eq!(
        query.to_sql().unwrap(),
        r#"select * from "users" where "id" in (select "user_id" from "orders" where "total" > ?)"#
    );
    assert_eq!(query.get_bindings(), vec![SqlValue::Int(100)]);
}

#[test]
fn test_unions_per_dialect() {
    let mut query = pg().from("a").union_all(pg().from("b"));
    assert_eq!(
        query.to_sql().unwrap(),
        r#"(select * from "a") union all (select * from "b")"#
    );

    // SQLite cannot parenthesize compound members
    let mut query = sqlite().from("a").union(sqlite().from("b"));
    assert_eq!(
        query.to_sql().unwrap(),
        r#"select * from (select * from "a") union select * from (select * from "b")"#
    );
}

#[test]
fn test_union_bindings_follow_main_query() {
    let mut query = pg()
        .from("a")
        .where_("x", "=", 1)
        .union(pg().from("b").where_("y", "=", 2));

    query.to_sql().unwrap();
    assert_eq!(query.get_bindings(), vec![SqlValue::Int(1), SqlValue::Int(2)]);
}

#[test]
fn test_locks_per_dialect() {
    assert_eq!(
        pg().from("users").where_("id", "=", 1).lock_for_update().to_sql().unwrap(),
        r#"select * from "users" where "id" = ? for update"#
    );
    assert_eq!(
        mysql().from("users").shared_lock().to_sql().unwrap(),
        "select * from `users` lock in share mode"
    );
    assert_eq!(
        sqlsrv().from("users").where_("id", "=", 1).lock_for_update().to_sql().unwrap(),
        "select * from [users] with(rowlock,updlock,holdlock) where [id] = ?"
    );
    assert_eq!(
        sqlite().from("users").lock_for_update().to_sql().unwrap(),
        r#"select * from "users""#,
        "SQLite has no row locks"
    );
}

#[test]
fn test_index_hints() {
    assert_eq!(
        mysql().from("users").force_index("idx_email").to_sql().unwrap(),
        "select * from `users` force index (idx_email)"
    );
    assert_eq!(
        mysql().from("users").ignore_index("idx_email").to_sql().unwrap(),
        "select * from `users` ignore index (idx_email)"
    );
    assert_eq!(
        sqlite().from("users").force_index("idx_email").to_sql().unwrap(),
        r#"select * from "users" indexed by idx_email"#
    );
    assert_eq!(
        pg().from("users").use_index("idx_email").to_sql().unwrap(),
        r#"select * from "users""#
    );
    assert_eq!(
        sqlite().from("users").ignore_index("idx_email").to_sql().unwrap(),
        r#"select * from "users""#
    );
    assert_eq!(
        sqlsrv().from("users").force_index("idx_email").to_sql().unwrap(),
        "select * from [users] with (index(idx_email))"
    );
    assert_eq!(
        sqlsrv().from("users").use_index("idx_email").to_sql().unwrap(),
        "select * from [users]"
    );
}

#[test]
fn test_like_per_dialect() {
    assert_eq!(
        pg().from("users").where_like("name", "jo%", false).to_sql().unwrap(),
        r#"select * from "users" where "name"::text ilike ?"#
    );
    assert_eq!(
        mysql().from("users").where_like("name", "Jo%", true).to_sql().unwrap(),
        "select * from `users` where `name` like binary ?"
    );

    let err = sqlite()
        .from("users")
        .where_like("name", "Jo%", true)
        .to_sql()
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "This database engine (SQLite) does not support case sensitive like operations."
    );
}

#[test]
fn test_json_selectors() {
    assert_eq!(
        mysql().from("users").select(["options->language"]).to_sql().unwrap(),
        r#"select json_unquote(json_extract(`options`, '$."language"')) from `users`"#
    );
    assert_eq!(
        pg().from("users").where_("options->language", "=", "en").to_sql().unwrap(),
        r#"select * from "users" where "options"->>'language' = ?"#
    );
    assert_eq!(
        sqlite().from("users").where_("options->language", "=", "en").to_sql().unwrap(),
        r#"select * from "users" where json_extract("options", '$."language"') = ?"#
    );
    assert_eq!(
        sqlsrv().from("users").where_("options->language", "=", "en").to_sql().unwrap(),
        r#"select * from [users] where json_value([options], '$."language"') = ?"#
    );
}

#[test]
fn test_json_contains() {
    let mut query = mysql()
        .from("users")
        .where_json_contains("options->languages", serde_json::json!(["en"]));
    assert_eq!(
        query.to_sql().unwrap(),
        r#"select * from `users` where json_contains(`options`, ?, '$."languages"')"#
    );
    assert_eq!(
        query.get_bindings(),
        vec![SqlValue::Json(serde_json::json!(["en"]))]
    );

    assert_eq!(
        pg().from("users")
            .where_json_contains("options->languages", serde_json::json!(["en"]))
            .to_sql()
            .unwrap(),
        r#"select * from "users" where ("options"->'languages')::jsonb @> ?"#
    );

    let err = sqlite()
        .from("users")
        .where_json_contains("options->languages", serde_json::json!(["en"]))
        .to_sql()
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "This database engine (SQLite) does not support JSON contains operations."
    );
}

#[test]
fn test_json_contains_key_keeps_escaped_operator() {
    assert_eq!(
        pg().from("users").where_json_contains_key("options->languages").to_sql().unwrap(),
        r#"select * from "users" where coalesce(("options")::jsonb ?? 'languages', false)"#
    );
    assert_eq!(
        sqlite().from("users").where_json_contains_key("options->languages").to_sql().unwrap(),
        r#"select * from "users" where json_type("options", '$."languages"') is not null"#
    );
}

#[test]
fn test_fulltext() {
    assert_eq!(
        mysql()
            .from("posts")
            .where_fulltext(["title", "body"], "rust", FulltextOptions::default())
            .to_sql()
            .unwrap(),
        "select * from `posts` where match (`title`, `body`) against (? in natural language mode)"
    );
    assert_eq!(
        pg().from("posts")
            .where_fulltext(["title", "body"], "rust", FulltextOptions::default())
            .to_sql()
            .unwrap(),
        r#"select * from "posts" where (to_tsvector('english', "title") || to_tsvector('english', "body")) @@ plainto_tsquery('english', ?)"#
    );
    assert!(sqlite()
        .from("posts")
        .where_fulltext(["title"], "rust", FulltextOptions::default())
        .to_sql()
        .is_err());
}

#[test]
fn test_date_wheres() {
    assert_eq!(
        pg().from("orders").where_date("created_at", "=", "2024-01-01").to_sql().unwrap(),
        r#"select * from "orders" where "created_at"::date = ?"#
    );
    assert_eq!(
        mysql().from("orders").where_date("created_at", "=", "2024-01-01").to_sql().unwrap(),
        "select * from `orders` where date(`created_at`) = ?"
    );

    // Month numbers are zero padded to match strftime output
    let mut query = sqlite().from("orders").where_month("created_at", "=", 5);
    assert_eq!(
        query.to_sql().unwrap(),
        r#"select * from "orders" where strftime('%m', "created_at") = cast(? as text)"#
    );
    assert_eq!(query.get_bindings(), vec![SqlValue::String("05".to_string())]);
}

#[test]
fn test_inserts() {
    let table = Registry::table("users");
    let rows = vec![row([("email", "a@example.com")]), row([("email", "b@example.com")])];

    assert_eq!(
        PostgresGrammar::new().compile_insert(&table, &rows).unwrap(),
        r#"insert into "users" ("email") values (?), (?)"#
    );
    assert_eq!(
        PostgresGrammar::new().compile_insert(&table, &[]).unwrap(),
        r#"insert into "users" default values"#
    );
    assert_eq!(
        MySqlGrammar::new().compile_insert(&table, &[]).unwrap(),
        "insert into `users` () values ()"
    );
}

#[test]
fn test_insert_rows_with_missing_columns_bind_null() {
    let table = Registry::table("users");
    let rows = vec![
        row([("a", SqlValue::from(1)), ("b", SqlValue::from(2))]),
        row([("a", SqlValue::from(3))]),
    ];

    let sql = PostgresGrammar::new().compile_insert(&table, &rows).unwrap();
    assert_eq!(sql, r#"insert into "users" ("a", "b") values (?, ?), (?, ?)"#);

    let bindings = insert_bindings(&rows);
    assert_eq!(
        bindings,
        vec![SqlValue::Int(1), SqlValue::Int(2), SqlValue::Int(3), SqlValue::Null]
    );
    assert_eq!(sql.matches('?').count(), bindings.len());
}

#[test]
fn test_insert_or_ignore_per_dialect() {
    let table = Registry::table("users");
    let rows = vec![row([("email", "a@example.com")])];

    assert_eq!(
        MySqlGrammar::new().compile_insert_or_ignore(&table, &rows).unwrap(),
        "insert ignore into `users` (`email`) values (?)"
    );
    assert_eq!(
        SQLiteGrammar::new().compile_insert_or_ignore(&table, &rows).unwrap(),
        r#"insert or ignore into "users" ("email") values (?)"#
    );
    assert_eq!(
        PostgresGrammar::new().compile_insert_or_ignore(&table, &rows).unwrap(),
        r#"insert into "users" ("email") values (?) on conflict do nothing"#
    );
    assert_eq!(
        SqlServerGrammar::new().compile_insert_or_ignore(&table, &rows).unwrap_err(),
        QueryError::UnsupportedFeature {
            backend: DatabaseBackend::SqlServer,
            feature: "inserting while ignoring errors".to_string(),
        }
    );
}

#[test]
fn test_insert_get_id() {
    let table = Registry::table("users");
    let rows = vec![row([("email", "a@example.com")])];

    assert_eq!(
        PostgresGrammar::new().compile_insert_get_id(&table, &rows, None).unwrap(),
        r#"insert into "users" ("email") values (?) returning "id""#
    );
    assert_eq!(
        SqlServerGrammar::new().compile_insert_get_id(&table, &rows, Some("user_id")).unwrap(),
        "set nocount on;insert into [users] ([email]) values (?);select scope_identity() as [user_id]"
    );
}

#[test]
fn test_upserts_per_dialect() {
    let table = Registry::table("users");
    let rows = vec![row([("email", "a@example.com"), ("name", "Ann")])];
    let unique_by = vec!["email".to_string()];
    let update = vec![UpsertUpdate::from("name")];

    assert_eq!(
        MySqlGrammar::new().compile_upsert(&table, &rows, &unique_by, &update).unwrap(),
        "insert into `users` (`email`, `name`) values (?, ?) on duplicate key update `name` = values(`name`)"
    );
    assert_eq!(
        MySqlGrammar::new()
            .with_upsert_alias(true)
            .compile_upsert(&table, &rows, &unique_by, &update)
            .unwrap(),
        "insert into `users` (`email`, `name`) values (?, ?) as laravel_upsert_alias on duplicate key update `name` = `laravel_upsert_alias`.`name`"
    );
    assert_eq!(
        PostgresGrammar::new().compile_upsert(&table, &rows, &unique_by, &update).unwrap(),
        r#"insert into "users" ("email", "name") values (?, ?) on conflict ("email") do update set "name" = "excluded"."name""#
    );
    assert_eq!(
        SqlServerGrammar::new().compile_upsert(&table, &rows, &unique_by, &update).unwrap(),
        "merge [users] using (values (?, ?)) [laravel_source] ([email], [name]) \
         on [laravel_source].[email] = [users].[email] \
         when matched then update set [name] = [laravel_source].[name] \
         when not matched then insert ([email], [name]) values ([email], [name]);"
    );
}

#[test]
fn test_updates() {
    let query = pg().from("users").where_("id", "=", 1);
    let values = row([("name", "Ann")]);
    let grammar = PostgresGrammar::new();

    assert_eq!(
        grammar.compile_update(query.registry(), &values).unwrap(),
        r#"update "users" set "name" = ? where "id" = ?"#
    );
    assert_eq!(
        grammar.prepare_bindings_for_update(query.get_raw_bindings(), &values),
        vec![SqlValue::String("Ann".to_string()), SqlValue::Int(1)]
    );
}

#[test]
fn test_update_with_join_per_dialect() {
    let values = row([("name", "Ann")]);
    let joined = |query: QueryBuilder| {
        query
            .from("users")
            .join("orders", "users.id", "=", "orders.user_id")
            .where_("orders.total", ">", 100)
    };

    assert_eq!(
        MySqlGrammar::new()
            .compile_update(joined(mysql()).registry(), &values)
            .unwrap(),
        "update `users` inner join `orders` on `users`.`id` = `orders`.`user_id` set `name` = ? where `orders`.`total` > ?"
    );
    // PostgreSQL has no update-join; rows are matched by ctid
    assert_eq!(
        PostgresGrammar::new()
            .compile_update(joined(pg()).registry(), &values)
            .unwrap(),
        r#"update "users" set "name" = ? where "ctid" in (select "users"."ctid" from "users" inner join "orders" on "users"."id" = "orders"."user_id" where "orders"."total" > ?)"#
    );
}

#[test]
fn test_deletes_with_limit() {
    let limited = |query: QueryBuilder| {
        query
            .from("logs")
            .where_("level", "=", "debug")
            .order_by("id", Direction::Asc)
            .limit(100)
    };

    assert_eq!(
        MySqlGrammar::new().compile_delete(limited(mysql()).registry()).unwrap(),
        "delete from `logs` where `level` = ? order by `id` asc limit 100"
    );
    assert_eq!(
        SqlServerGrammar::new().compile_delete(limited(sqlsrv()).registry()).unwrap(),
        "delete top (100) from [logs] where [level] = ?"
    );
}

#[test]
fn test_truncate_per_dialect() {
    let table = Registry::table("users");

    assert_eq!(
        PostgresGrammar::new().compile_truncate(&table).unwrap(),
        vec![(r#"truncate "users" restart identity cascade"#.to_string(), Vec::new())]
    );
    assert_eq!(
        MySqlGrammar::new().compile_truncate(&table).unwrap(),
        vec![("truncate table `users`".to_string(), Vec::new())]
    );
    assert_eq!(
        SQLiteGrammar::new().compile_truncate(&table).unwrap(),
        vec![
            (
                "delete from sqlite_sequence where name = ?".to_string(),
                vec![SqlValue::String("users".to_string())]
            ),
            (r#"delete from "users""#.to_string(), Vec::new()),
        ]
    );
}

#[test]
fn test_exists_per_dialect() {
    let query = pg().from("users").where_("id", "=", 1);
    assert_eq!(
        PostgresGrammar::new().compile_exists(query.registry()).unwrap(),
        r#"select exists(select * from "users" where "id" = ?) as "exists""#
    );

    let query = sqlsrv().from("users").where_("id", "=", 1);
    assert_eq!(
        SqlServerGrammar::new().compile_exists(query.registry()).unwrap(),
        "select top 1 1 [exists] from [users] where [id] = ?"
    );
}

#[test]
fn test_missing_from_clause() {
    let err = PostgresGrammar::new()
        .compile_insert(&Registry::new(), &[row([("a", 1)])])
        .unwrap_err();
    assert_eq!(
        err,
        QueryError::MissingClause {
            clause: "from".to_string()
        }
    );
}
