use rustf_sql::database::types::SqlValue;
use rustf_sql::query::{BindingKind, DatabaseBackend, Direction, Grammar, QueryBuilder, Section};
use rustf_sql::query::{MySqlGrammar, PostgresGrammar, SqlServerGrammar};

fn pg() -> QueryBuilder {
    QueryBuilder::for_backend(DatabaseBackend::Postgres)
}

#[test]
fn test_bindings_follow_placeholder_order() {
    // Clauses added out of order still bind in SQL order
    let mut query = pg()
        .from("users")
        .having("total", ">", 3)
        .where_("active", "=", true)
        .select_raw("? as flag", [7])
        .group_by(["role"]);

    assert_eq!(
        query.to_sql().unwrap(),
        r#"select ? as flag from "users" where "active" = ? group by "role" having "total" > ?"#
    );
    assert_eq!(
        query.get_bindings(),
        vec![SqlValue::Int(7), SqlValue::Bool(true), SqlValue::Int(3)]
    );
}

#[test]
fn test_join_bindings_precede_where_bindings() {
    let mut query = pg()
        .from("users")
        .where_("users.active", "=", true)
        .join_where("orders", "orders.status", "=", "paid");

    assert_eq!(
        query.to_sql().unwrap(),
        r#"select * from "users" inner join "orders" on "orders"."status" = ? where "users"."active" = ?"#
    );
    assert_eq!(
        query.get_bindings(),
        vec![SqlValue::String("paid".to_string()), SqlValue::Bool(true)]
    );
}

#[test]
fn test_sub_query_bindings_land_in_parent_slot() {
    let mut query = pg()
        .select_sub(
            |q| {
                q.from("orders")
                    .select_raw("count(*)", Vec::<SqlValue>::new())
                    .where_("total", ">", 10)
            },
            "big_orders",
        )
        .from_sub(|q| q.from("users").where_("active", "=", true), "u")
        .where_("u.votes", ">", 5);

    assert_eq!(
        query.to_sql().unwrap(),
        r#"select (select count(*) from "orders" where "total" > ?) as "big_orders" from (select * from "users" where "active" = ?) as "u" where "u"."votes" > ?"#
    );
    assert_eq!(
        query.get_bindings(),
        vec![SqlValue::Int(10), SqlValue::Bool(true), SqlValue::Int(5)]
    );
}

#[test]
fn test_add_binding_by_kind_name() {
    let query = pg()
        .from("users")
        .where_raw("id = ? or id = ?", [1])
        .add_binding([2], "where")
        .unwrap()
        .add_binding([0], "select")
        .unwrap();

    assert_eq!(
        query.get_bindings(),
        vec![SqlValue::Int(0), SqlValue::Int(1), SqlValue::Int(2)]
    );
}

#[test]
fn test_invalid_binding_kind() {
    let err = pg().add_binding([1], "noway").unwrap_err();
    assert_eq!(err.to_string(), "Invalid binding type: noway.");

    let err = pg().set_bindings([1], "Where").unwrap_err();
    assert_eq!(err.to_string(), "Invalid binding type: Where.");
}

#[test]
fn test_set_bindings_replaces_slot() {
    let query = pg()
        .from("users")
        .where_("a", "=", 1)
        .where_("b", "=", 2)
        .set_bindings([9, 8], "where")
        .unwrap();
    assert_eq!(query.get_bindings(), vec![SqlValue::Int(9), SqlValue::Int(8)]);
}

#[test]
fn test_clone_without_bindings_keeps_clauses() {
    let query = pg()
        .from("users")
        .select_raw("? as flag", [1])
        .where_("id", "=", 2);

    let mut stripped = query.clone_without_bindings(&[BindingKind::Select]);
    assert_eq!(
        stripped.to_sql().unwrap(),
        r#"select ? as flag from "users" where "id" = ?"#
    );
    assert_eq!(stripped.get_bindings(), vec![SqlValue::Int(2)]);

    // The original is untouched
    assert_eq!(query.get_bindings(), vec![SqlValue::Int(1), SqlValue::Int(2)]);
}

#[test]
fn test_clone_without_sections() {
    let query = pg()
        .from("users")
        .select(["id"])
        .order_by("id", Direction::Desc)
        .limit(5);

    let mut bare = query.clone_without(&[Section::Columns, Section::Orders, Section::Limit]);
    assert_eq!(bare.to_sql().unwrap(), r#"select * from "users""#);
}

#[test]
fn test_clone_is_independent() {
    let original = pg().from("users").where_("id", "=", 1);
    let mut copy = original.clone();
    assert_eq!(copy.to_sql().unwrap(), r#"select * from "users" where "id" = ?"#);
    assert_eq!(copy.get_bindings(), original.get_bindings());

    let mut copy = copy.where_("role", "=", "admin");
    let mut original = original.order_by("id", Direction::Asc);

    assert_eq!(
        copy.to_sql().unwrap(),
        r#"select * from "users" where "id" = ? and "role" = ?"#
    );
    assert_eq!(
        copy.get_bindings(),
        vec![SqlValue::Int(1), SqlValue::String("admin".to_string())]
    );
    assert_eq!(
        original.to_sql().unwrap(),
        r#"select * from "users" where "id" = ? order by "id" asc"#
    );
    assert_eq!(original.get_bindings(), vec![SqlValue::Int(1)]);
}

#[test]
fn test_clone_without_wheres_and_where_bindings() {
    let mut query = pg()
        .from("users")
        .where_("email", "=", "foo")
        .order_by("email", Direction::Asc);

    let mut stripped = query
        .clone_without(&[Section::Wheres])
        .clone_without_bindings(&[BindingKind::Where]);

    assert_eq!(stripped.to_sql().unwrap(), r#"select * from "users" order by "email" asc"#);
    assert!(stripped.get_bindings().is_empty());

    assert_eq!(
        query.to_sql().unwrap(),
        r#"select * from "users" where "email" = ? order by "email" asc"#
    );
    assert_eq!(query.get_bindings(), vec![SqlValue::String("foo".to_string())]);
}

#[test]
fn test_clone_without_order_bindings() {
    let query = pg()
        .from("users")
        .where_("id", ">", 10)
        .order_by_raw("field(id, ?, ?)", [3, 4]);

    let stripped = query.clone_without_bindings(&[BindingKind::Order]);
    assert_eq!(stripped.get_bindings(), vec![SqlValue::Int(10)]);
    assert_eq!(
        query.get_bindings(),
        vec![SqlValue::Int(10), SqlValue::Int(3), SqlValue::Int(4)]
    );
}

#[test]
fn test_when_false_skips_and_empty_string_applies() {
    let mut query = pg()
        .from("users")
        .when(false, |q, _| q.where_("skipped", "=", 1))
        .when("", |q, _| q.where_("applied", "=", 2));

    assert_eq!(
        query.to_sql().unwrap(),
        r#"select * from "users" where "applied" = ?"#
    );
    assert_eq!(query.get_bindings(), vec![SqlValue::Int(2)]);
}

#[test]
fn test_when_and_unless() {
    let role: Option<&str> = Some("admin");
    let mut query = pg()
        .from("users")
        .when(role, |q, role| q.where_("role", "=", role))
        .when(0, |q, _| q.where_("zero", "=", 1))
        .unless(true, |q, _| q.where_("never", "=", 1));

    assert_eq!(
        query.to_sql().unwrap(),
        r#"select * from "users" where "role" = ?"#
    );
    assert_eq!(query.get_bindings(), vec![SqlValue::String("admin".to_string())]);
}

#[test]
fn test_for_page() {
    let mut query = pg().from("users").for_page(3, 15);
    assert_eq!(
        query.to_sql().unwrap(),
        r#"select * from "users" limit 15 offset 30"#
    );
}

#[test]
fn test_reorder_drops_order_bindings() {
    let mut query = pg()
        .from("users")
        .order_by_raw("field(id, ?)", [3])
        .reorder()
        .order_by("name", Direction::Asc);

    assert_eq!(query.to_sql().unwrap(), r#"select * from "users" order by "name" asc"#);
    assert!(query.get_bindings().is_empty());
}

#[test]
fn test_raw_sql_rendering_per_dialect() {
    let build = |backend| {
        QueryBuilder::for_backend(backend)
            .from("users")
            .where_("email", "=", "o'hara@example.com")
            .where_("active", "=", true)
    };

    assert_eq!(
        build(DatabaseBackend::Postgres).to_raw_sql().unwrap(),
        r#"select * from "users" where "email" = 'o''hara@example.com' and "active" = true"#
    );
    assert_eq!(
        build(DatabaseBackend::MySQL).to_raw_sql().unwrap(),
        r"select * from `users` where `email` = 'o\'hara@example.com' and `active` = 1"
    );
    assert_eq!(
        build(DatabaseBackend::SqlServer).to_raw_sql().unwrap(),
        "select * from [users] where [email] = 'o''hara@example.com' and [active] = 1"
    );
}

#[test]
fn test_raw_sql_literals() {
    let grammar = PostgresGrammar::new();
    let sql = grammar.substitute_bindings_into_raw_sql(
        r#"select * from "files" where "data" = ? and "size" = ? and "note" is ?"#,
        &[SqlValue::Bytes(vec![0xde, 0xad]), SqlValue::Int(2), SqlValue::Null],
    );
    assert_eq!(
        sql,
        r#"select * from "files" where "data" = '\xdead'::bytea and "size" = 2 and "note" is NULL"#
    );

    assert_eq!(
        SqlServerGrammar::new().escape(&SqlValue::Bytes(vec![0x01, 0xff])),
        "0x01ff"
    );
    assert_eq!(
        MySqlGrammar::new().escape(&SqlValue::Bytes(vec![0x74])),
        "x'74'"
    );
}

#[test]
fn test_raw_sql_leaves_extra_placeholders() {
    let sql = PostgresGrammar::new().substitute_bindings_into_raw_sql(
        r#"select * from "t" where "a" = ? and "b" = ?"#,
        &[SqlValue::Int(1)],
    );
    assert_eq!(sql, r#"select * from "t" where "a" = 1 and "b" = ?"#);
}

#[test]
fn test_raw_sql_ignores_placeholders_in_literals() {
    let mut query = pg()
        .from("users")
        .where_raw("note <> '?'", Vec::<SqlValue>::new())
        .where_("id", "=", 4);
    assert_eq!(
        query.to_raw_sql().unwrap(),
        r#"select * from "users" where note <> '?' and "id" = 4"#
    );
}

#[test]
fn test_sub_query_error_surfaces_on_compile() {
    let mut query = QueryBuilder::for_backend(DatabaseBackend::SQLite)
        .from("users")
        .select_sub(|q| q.from("posts").where_like("title", "A%", true), "posts");

    let err = query.to_sql().unwrap_err();
    assert_eq!(
        err.to_string(),
        "This database engine (SQLite) does not support case sensitive like operations."
    );
}
