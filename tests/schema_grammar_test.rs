use rustf_sql::query::DatabaseBackend;
use rustf_sql::schema::{schema_grammar_for, Blueprint, SchemaGrammar, TypeDefinition};
use rustf_sql::ConnectionConfig;
use std::sync::Arc;

fn grammar(backend: DatabaseBackend) -> Arc<dyn SchemaGrammar> {
    schema_grammar_for(backend, &ConnectionConfig::new(backend.driver()))
}

fn posts() -> Blueprint {
    let mut table = Blueprint::new("posts");
    table.id();
    table.string("title", 200);
    table.big_integer("user_id").unsigned();
    table.boolean("published").default(false);
    table
        .foreign(&["user_id"])
        .references(&["id"])
        .on("users")
        .cascade_on_delete();
    table.index(&["user_id", "published"]);
    table
}

#[test]
fn test_create_table_mysql() {
    let statements = grammar(DatabaseBackend::MySQL).compile_create(&posts()).unwrap();
    assert_eq!(
        statements,
        vec![
            "create table `posts` (`id` bigint unsigned not null auto_increment primary key, \
             `title` varchar(200) not null, `user_id` bigint unsigned not null, \
             `published` tinyint(1) not null default 0, \
             constraint `posts_user_id_foreign` foreign key (`user_id`) references `users` (`id`) on delete cascade)"
                .to_string(),
            "create index `posts_user_id_published_index` on `posts` (`user_id`, `published`)".to_string(),
        ]
    );
}

#[test]
fn test_create_table_postgres() {
    let statements = grammar(DatabaseBackend::Postgres).compile_create(&posts()).unwrap();
    assert_eq!(
        statements[0],
        "create table \"posts\" (\"id\" bigserial not null primary key, \"title\" varchar(200) not null, \
         \"user_id\" bigint not null, \"published\" boolean not null default false, \
         constraint \"posts_user_id_foreign\" foreign key (\"user_id\") references \"users\" (\"id\") on delete cascade)"
    );
}

#[test]
fn test_create_table_sqlite() {
    let statements = grammar(DatabaseBackend::SQLite).compile_create(&posts()).unwrap();
    assert_eq!(
        statements[0],
        "create table \"posts\" (\"id\" integer primary key autoincrement not null, \"title\" varchar not null, \
         \"user_id\" integer not null, \"published\" tinyint(1) not null default 0, \
         constraint \"posts_user_id_foreign\" foreign key (\"user_id\") references \"users\" (\"id\") on delete cascade)"
    );
}

#[test]
fn test_create_table_sqlserver() {
    let statements = grammar(DatabaseBackend::SqlServer).compile_create(&posts()).unwrap();
    assert_eq!(
        statements[0],
        "create table [posts] ([id] bigint not null identity primary key, [title] nvarchar(200) not null, \
         [user_id] bigint not null, [published] bit not null default 0, \
         constraint [posts_user_id_foreign] foreign key ([user_id]) references [users] ([id]) on delete cascade)"
    );
}

#[test]
fn test_prefix_reaches_names_and_references() {
    let config = ConnectionConfig::new("pgsql").prefix("app_");
    let grammar = schema_grammar_for(DatabaseBackend::Postgres, &config);

    let mut table = Blueprint::new("likes");
    table.big_integer("post_id");
    table.foreign(&["post_id"]).references(&["id"]).on("posts");
    table.unique(&["post_id"]);

    let statements = grammar.compile_create(&table).unwrap();
    assert_eq!(
        statements,
        vec![
            "create table \"app_likes\" (\"post_id\" bigint not null, \
             constraint \"app_likes_post_id_foreign\" foreign key (\"post_id\") references \"app_posts\" (\"id\"))"
                .to_string(),
            "create unique index \"app_likes_post_id_unique\" on \"app_likes\" (\"post_id\")".to_string(),
        ]
    );
}

#[test]
fn test_composite_primary_key_and_defaults() {
    let mut table = Blueprint::new("role_user");
    table.integer("role_id");
    table.integer("user_id");
    table.string("granted_by", 50).nullable().default("system");
    table.timestamp("granted_at").use_current();
    table.primary(&["role_id", "user_id"]);

    let statements = grammar(DatabaseBackend::MySQL).compile_create(&table).unwrap();
    assert_eq!(
        statements,
        vec![
            "create table `role_user` (`role_id` int not null, `user_id` int not null, \
             `granted_by` varchar(50) null default 'system', \
             `granted_at` timestamp not null default CURRENT_TIMESTAMP, \
             primary key (`role_id`, `user_id`))"
                .to_string()
        ]
    );
}

#[test]
fn test_foreign_key_needs_target() {
    let mut table = Blueprint::new("posts");
    table.big_integer("user_id");
    table.foreign(&["user_id"]);

    let err = grammar(DatabaseBackend::SQLite).compile_create(&table).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Foreign key on [user_id] needs a referenced table and columns."
    );
}

#[test]
fn test_drop_and_rename_per_dialect() {
    assert_eq!(grammar(DatabaseBackend::MySQL).compile_rename("a", "b"), "rename table `a` to `b`");
    assert_eq!(
        grammar(DatabaseBackend::Postgres).compile_rename("a", "b"),
        "alter table \"a\" rename to \"b\""
    );
    assert_eq!(
        grammar(DatabaseBackend::SqlServer).compile_rename("a", "b"),
        "sp_rename '[a]', [b]"
    );
    assert_eq!(
        grammar(DatabaseBackend::SqlServer).compile_drop_if_exists("users"),
        "if object_id('[users]', 'U') is not null drop table [users]"
    );
    assert_eq!(
        grammar(DatabaseBackend::SQLite).compile_drop_if_exists("users"),
        "drop table if exists \"users\""
    );
}

#[test]
fn test_bulk_drops() {
    assert_eq!(
        grammar(DatabaseBackend::MySQL)
            .compile_drop_all_tables(&["users".into(), "posts".into()])
            .unwrap(),
        "drop table `users`, `posts`"
    );
    assert_eq!(
        grammar(DatabaseBackend::SQLite)
            .compile_drop_all_tables(&["users".into(), "posts".into()])
            .unwrap(),
        "drop table if exists \"users\"; drop table if exists \"posts\""
    );
    assert_eq!(
        grammar(DatabaseBackend::Postgres)
            .compile_drop_all_domains(&["public.email".into()])
            .unwrap(),
        "drop domain \"public\".\"email\" cascade"
    );
    assert!(grammar(DatabaseBackend::SQLite).compile_drop_all_types(&[]).is_err());
}

#[test]
fn test_user_defined_types() {
    assert_eq!(
        grammar(DatabaseBackend::Postgres)
            .compile_create_type("email", &TypeDefinition::Alias("text check (value like '%@%')".into()))
            .unwrap(),
        "create domain \"email\" as text check (value like '%@%')"
    );

    let err = grammar(DatabaseBackend::MySQL)
        .compile_create_type("mood", &TypeDefinition::Enum(vec!["sad".into()]))
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "This database engine (MySQL) does not support user-defined types."
    );
}

#[test]
fn test_foreign_key_toggles() {
    let toggles = |backend| {
        let grammar = grammar(backend);
        (
            grammar.compile_disable_foreign_key_constraints().unwrap(),
            grammar.compile_enable_foreign_key_constraints().unwrap(),
        )
    };

    assert_eq!(
        toggles(DatabaseBackend::MySQL),
        ("SET FOREIGN_KEY_CHECKS=0;".to_string(), "SET FOREIGN_KEY_CHECKS=1;".to_string())
    );
    assert_eq!(
        toggles(DatabaseBackend::Postgres),
        ("SET CONSTRAINTS ALL DEFERRED;".to_string(), "SET CONSTRAINTS ALL IMMEDIATE;".to_string())
    );
    assert_eq!(
        toggles(DatabaseBackend::SQLite),
        ("PRAGMA foreign_keys = OFF;".to_string(), "PRAGMA foreign_keys = ON;".to_string())
    );
}

#[test]
fn test_introspection_queries_name_the_schema() {
    let sql = grammar(DatabaseBackend::MySQL)
        .compile_table_exists(None, "users")
        .unwrap();
    assert!(sql.contains("table_schema = schema() and table_name = 'users'"));

    let sql = grammar(DatabaseBackend::Postgres)
        .compile_table_exists(Some("audit"), "o'log")
        .unwrap();
    assert!(sql.contains("n.nspname = 'audit' and c.relname = 'o''log'"));

    let sql = grammar(DatabaseBackend::Postgres).compile_tables(None).unwrap();
    assert!(!sql.contains("n.nspname = '"), "no schema filter without a schema");
}
