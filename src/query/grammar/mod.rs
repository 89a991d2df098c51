//! SQL grammars
//!
//! [`Grammar`] turns a [`Registry`] into SQL text. Its default methods are the
//! dialect-neutral compiler; each dialect overrides the hooks where its SQL
//! differs. Overrides that extend rather than replace the neutral behavior call
//! the matching function in [`base`].

use crate::database::types::SqlValue;
use crate::query::expression::{Column, QueryValue};
use crate::query::registry::{
    Aggregate, Bindings, BindingKind, DatePart, Distinct, FulltextOptions, IndexHint,
    JoinClause, Lock, OrderClause, Registry, Row, UpsertUpdate, WhereClause, WhereKind,
};
use crate::query::{DatabaseBackend, QueryError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;

pub mod mysql;
pub mod postgres;
pub mod raw;
pub mod sqlite;
pub mod sqlserver;

pub use mysql::MySqlGrammar;
pub use postgres::PostgresGrammar;
pub use sqlite::SQLiteGrammar;
pub use sqlserver::SqlServerGrammar;

pub type CompileResult = Result<String, QueryError>;

static ALIAS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s+as\s+").expect("Grammar: invalid alias pattern"));
static JSON_ARRAY_KEYS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\[[^\]]+\])+$").expect("Grammar: invalid JSON key pattern"));
static JSON_PATH_QUOTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\\+)?'").expect("Grammar: invalid JSON quote pattern"));

/// Which clause list a nested condition group reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Where,
    Having,
}

/// Split `"users as u"` into `("users", "u")`
pub fn split_alias(value: &str) -> Option<(&str, &str)> {
    let mut parts = ALIAS.splitn(value, 3);
    let first = parts.next()?;
    let second = parts.next()?;
    Some((first, second))
}

/// Join non-empty segments with single spaces
pub fn concatenate<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    segments
        .into_iter()
        .filter(|s| !s.as_ref().is_empty())
        .map(|s| s.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Columns of a multi-row insert, taken from the first row
pub fn insert_columns(rows: &[Row]) -> Vec<String> {
    rows.first()
        .map(|record| record.keys().cloned().collect())
        .unwrap_or_default()
}

/// Values of one row laid out on `columns`; a missing column is null
pub fn aligned_values(columns: &[String], record: &Row) -> Vec<QueryValue> {
    columns
        .iter()
        .map(|column| {
            record
                .get(column)
                .cloned()
                .unwrap_or(QueryValue::Param(SqlValue::Null))
        })
        .collect()
}

/// Bindings for an insert: row-major, column-minor, expressions skipped
pub fn insert_bindings(rows: &[Row]) -> Vec<SqlValue> {
    let columns = insert_columns(rows);
    let mut out = Vec::new();
    for record in rows {
        for value in aligned_values(&columns, record) {
            if let Some(binding) = value.into_binding() {
                binding.flatten_into(&mut out);
            }
        }
    }
    out
}

/// `"name"[0][1]` style JSON path segment
pub fn wrap_json_path_segment(segment: &str) -> String {
    if let Some(found) = JSON_ARRAY_KEYS.find(segment) {
        let key = &segment[..found.start()];
        if !key.is_empty() {
            return format!("\"{}\"{}", key, found.as_str());
        }
        return found.as_str().to_string();
    }
    format!("\"{}\"", segment)
}

/// Split `"name[0][1]"` into `["name", "0", "1"]`
pub fn parse_json_path_array_keys(attribute: &str) -> Vec<String> {
    if let Some(found) = JSON_ARRAY_KEYS.find(attribute) {
        let key = &attribute[..found.start()];
        let mut keys: Vec<String> = Vec::new();
        if !key.is_empty() {
            keys.push(key.to_string());
        }
        keys.extend(
            found
                .as_str()
                .split(|c| c == '[' || c == ']')
                .filter(|k| !k.is_empty())
                .map(str::to_string),
        );
        return keys;
    }
    vec![attribute.to_string()]
}

/// Dialect SQL compiler
pub trait Grammar: Send + Sync + fmt::Debug {
    fn backend(&self) -> DatabaseBackend;

    fn table_prefix(&self) -> &str {
        ""
    }

    /// Whether `insert_get_id` reads the id back from a returned row
    fn returns_inserted_id(&self) -> bool {
        false
    }

    fn unsupported(&self, feature: &str) -> QueryError {
        QueryError::UnsupportedFeature {
            backend: self.backend(),
            feature: feature.to_string(),
        }
    }

    // Identifiers

    fn wrap_value(&self, value: &str) -> String {
        if value == "*" {
            return value.to_string();
        }
        format!("\"{}\"", value.replace('"', "\"\""))
    }

    fn wrap(&self, column: &Column) -> String {
        match column {
            Column::Raw(expression) => expression.sql(),
            Column::Name(name) => self.wrap_str(name),
        }
    }

    fn wrap_str(&self, value: &str) -> String {
        base::wrap(self, value)
    }

    /// Wrap dotted segments; the first of several is treated as a table
    fn wrap_segments(&self, segments: &[&str]) -> String {
        let many = segments.len() > 1;
        segments
            .iter()
            .enumerate()
            .map(|(i, segment)| {
                if i == 0 && many {
                    self.wrap_table_str(segment)
                } else {
                    self.wrap_value(segment)
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    fn wrap_table(&self, table: &Column) -> String {
        match table {
            Column::Raw(expression) => expression.sql(),
            Column::Name(name) => self.wrap_table_str(name),
        }
    }

    fn wrap_table_str(&self, table: &str) -> String {
        base::wrap_table(self, table, self.table_prefix())
    }

    fn is_json_selector(&self, value: &str) -> bool {
        value.contains("->")
    }

    fn wrap_json_selector(&self, value: &str) -> String {
        let (field, path) = self.wrap_json_field_and_path(value);
        format!("{}{}", field, path)
    }

    /// `("`field`", ", '$."a"."b"'")` for `field->a->b`
    fn wrap_json_field_and_path(&self, column: &str) -> (String, String) {
        let mut parts = column.splitn(2, "->");
        let field = self.wrap_str(parts.next().unwrap_or_default());
        let path = match parts.next() {
            Some(path) => format!(", {}", self.wrap_json_path(path, "->")),
            None => String::new(),
        };
        (field, path)
    }

    fn wrap_json_path(&self, value: &str, delimiter: &str) -> String {
        let value = JSON_PATH_QUOTE.replace_all(value, "''");
        let path = value
            .split(delimiter)
            .map(wrap_json_path_segment)
            .collect::<Vec<_>>()
            .join(".");
        let dot = if path.starts_with('[') { "" } else { "." };
        format!("'${}{}'", dot, path)
    }

    fn columnize(&self, columns: &[Column]) -> String {
        columns
            .iter()
            .map(|c| self.wrap(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn columnize_names(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.wrap_str(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn parameter(&self, value: &QueryValue) -> String {
        match value {
            QueryValue::Expr(expression) => expression.sql(),
            QueryValue::Param(_) => "?".to_string(),
        }
    }

    fn parameter_list(&self, values: &[QueryValue]) -> String {
        values
            .iter()
            .map(|v| self.parameter(v))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Single-quoted string literal with `'` doubled
    fn quote_string(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    // Selects

    fn compile_select(&self, query: &Registry) -> CompileResult {
        base::compile_select(self, query)
    }

    fn compile_components(&self, query: &Registry) -> Result<Vec<String>, QueryError> {
        let mut sql = Vec::new();
        if let Some(aggregate) = &query.aggregate {
            sql.push(self.compile_aggregate(query, aggregate));
        } else {
            sql.push(self.compile_columns(query));
        }
        if let Some(from) = &query.from {
            sql.push(self.compile_from(query, from));
        }
        if let Some(hint) = &query.index_hint {
            sql.push(self.compile_index_hint(query, hint));
        }
        sql.push(self.compile_joins(query, &query.joins)?);
        sql.push(self.compile_wheres(query)?);
        sql.push(self.compile_groups(&query.groups));
        sql.push(self.compile_havings(query)?);
        sql.push(self.compile_orders(&query.orders));
        let limit = query.limit.map(|limit| self.compile_limit(query, limit));
        let offset = query.offset.map(|offset| self.compile_offset(query, offset));
        if self.offset_before_limit() {
            sql.extend(offset);
            sql.extend(limit);
        } else {
            sql.extend(limit);
            sql.extend(offset);
        }
        if let Some(lock) = &query.lock {
            sql.push(self.compile_lock(query, lock));
        }
        Ok(sql)
    }

    /// Whether the offset clause is rendered ahead of the limit clause
    fn offset_before_limit(&self) -> bool {
        false
    }

    fn compile_aggregate(&self, query: &Registry, aggregate: &Aggregate) -> String {
        let mut column = self.columnize(&aggregate.columns);
        match &query.distinct {
            Distinct::On(columns) => column = format!("distinct {}", self.columnize(columns)),
            Distinct::Yes if column != "*" => column = format!("distinct {}", column),
            _ => {}
        }
        format!("select {}({}) as aggregate", aggregate.function, column)
    }

    fn compile_columns(&self, query: &Registry) -> String {
        base::compile_columns(self, query)
    }

    fn compile_from(&self, _query: &Registry, table: &Column) -> String {
        format!("from {}", self.wrap_table(table))
    }

    fn compile_index_hint(&self, _query: &Registry, _hint: &IndexHint) -> String {
        String::new()
    }

    fn compile_joins(&self, _query: &Registry, joins: &[JoinClause]) -> CompileResult {
        let mut sql = Vec::with_capacity(joins.len());
        for join in joins {
            let conditions = self.compile_conditions(&join.wheres, Scope::Where)?;
            let on = if conditions.is_empty() {
                String::new()
            } else {
                format!("on {}", conditions)
            };
            sql.push(concatenate([
                format!("{} join {}", join.kind.as_str(), self.wrap_table(&join.table)),
                on,
            ]));
        }
        Ok(sql.join(" "))
    }

    fn compile_wheres(&self, query: &Registry) -> CompileResult {
        let conditions = self.compile_conditions(&query.wheres, Scope::Where)?;
        if conditions.is_empty() {
            return Ok(String::new());
        }
        Ok(format!("where {}", conditions))
    }

    /// Render a clause list joined by connectors, without a leading one
    fn compile_conditions(&self, clauses: &[WhereClause], scope: Scope) -> CompileResult {
        let mut parts = Vec::with_capacity(clauses.len());
        for (i, clause) in clauses.iter().enumerate() {
            let body = self.compile_condition(&clause.kind, scope)?;
            let connector = if i == 0 {
                clause.boolean.leading()
            } else {
                clause.boolean.as_str()
            };
            parts.push(concatenate([connector, body.as_str()]));
        }
        Ok(parts.join(" "))
    }

    fn compile_condition(&self, kind: &WhereKind, scope: Scope) -> CompileResult {
        let sql = match kind {
            WhereKind::Basic {
                column,
                operator,
                value,
            } => self.compile_where_basic(column, operator, value),
            WhereKind::Column {
                first,
                operator,
                second,
            } => format!("{} {} {}", self.wrap(first), operator, self.wrap(second)),
            WhereKind::Null { column, not } => self.compile_where_null(column, *not),
            WhereKind::Between {
                column,
                min,
                max,
                not,
            } => format!(
                "{} {} {} and {}",
                self.wrap(column),
                if *not { "not between" } else { "between" },
                self.parameter(min),
                self.parameter(max)
            ),
            WhereKind::In {
                column,
                values,
                not,
            } => {
                if values.is_empty() {
                    let always = if *not { "1 = 1" } else { "0 = 1" };
                    always.to_string()
                } else {
                    format!(
                        "{} {} ({})",
                        self.wrap(column),
                        if *not { "not in" } else { "in" },
                        self.parameter_list(values)
                    )
                }
            }
            WhereKind::InSub { column, query, not } => format!(
                "{} {} ({})",
                self.wrap(column),
                if *not { "not in" } else { "in" },
                self.compile_select(query)?
            ),
            WhereKind::Exists { query, not } => format!(
                "{}exists ({})",
                if *not { "not " } else { "" },
                self.compile_select(query)?
            ),
            WhereKind::Nested { query } => {
                let clauses = match scope {
                    Scope::Where => &query.wheres,
                    Scope::Having => &query.havings,
                };
                format!("({})", self.compile_conditions(clauses, scope)?)
            }
            WhereKind::Sub {
                column,
                operator,
                query,
            } => format!(
                "{} {} ({})",
                self.wrap(column),
                operator,
                self.compile_select(query)?
            ),
            WhereKind::Raw { sql } => sql.clone(),
            WhereKind::Date {
                part,
                column,
                operator,
                value,
            } => self.compile_date_based_where(*part, column, operator, value),
            WhereKind::Like {
                column,
                value,
                case_sensitive,
                not,
            } => self.compile_where_like(column, value, *case_sensitive, *not)?,
            WhereKind::JsonContains { column, value, not } => format!(
                "{}{}",
                if *not { "not " } else { "" },
                self.compile_json_contains(&column_text(column), &self.parameter(value))?
            ),
            WhereKind::JsonContainsKey { column, not } => format!(
                "{}{}",
                if *not { "not " } else { "" },
                self.compile_json_contains_key(&column_text(column))?
            ),
            WhereKind::JsonLength {
                column,
                operator,
                value,
            } => self.compile_json_length(&column_text(column), operator, &self.parameter(value))?,
            WhereKind::Fulltext {
                columns, options, ..
            } => self.compile_where_fulltext(columns, options)?,
        };
        Ok(sql)
    }

    fn compile_where_basic(&self, column: &Column, operator: &str, value: &QueryValue) -> String {
        base::compile_where_basic(self, column, operator, value)
    }

    fn compile_where_null(&self, column: &Column, not: bool) -> String {
        format!(
            "{} is {}null",
            self.wrap(column),
            if not { "not " } else { "" }
        )
    }

    fn compile_where_like(
        &self,
        column: &Column,
        value: &QueryValue,
        case_sensitive: bool,
        not: bool,
    ) -> CompileResult {
        if case_sensitive {
            return Err(self.unsupported("case sensitive like operations"));
        }
        let operator = if not { "not like" } else { "like" };
        Ok(self.compile_where_basic(column, operator, value))
    }

    fn compile_date_based_where(
        &self,
        part: DatePart,
        column: &Column,
        operator: &str,
        value: &QueryValue,
    ) -> String {
        base::compile_date_based_where(self, part, column, operator, value)
    }

    fn compile_json_contains(&self, _column: &str, _value: &str) -> CompileResult {
        Err(self.unsupported("JSON contains operations"))
    }

    fn compile_json_contains_key(&self, _column: &str) -> CompileResult {
        Err(self.unsupported("JSON contains key operations"))
    }

    fn compile_json_length(&self, _column: &str, _operator: &str, _value: &str) -> CompileResult {
        Err(self.unsupported("JSON length operations"))
    }

    fn prepare_binding_for_json_contains(&self, value: &JsonValue) -> SqlValue {
        SqlValue::Json(value.clone())
    }

    fn compile_where_fulltext(&self, _columns: &[Column], _options: &FulltextOptions) -> CompileResult {
        Err(self.unsupported("fulltext search operations"))
    }

    fn compile_groups(&self, groups: &[Column]) -> String {
        if groups.is_empty() {
            return String::new();
        }
        format!("group by {}", self.columnize(groups))
    }

    fn compile_havings(&self, query: &Registry) -> CompileResult {
        let conditions = self.compile_conditions(&query.havings, Scope::Having)?;
        if conditions.is_empty() {
            return Ok(String::new());
        }
        Ok(format!("having {}", conditions))
    }

    fn compile_orders(&self, orders: &[OrderClause]) -> String {
        if orders.is_empty() {
            return String::new();
        }
        let orders = orders
            .iter()
            .map(|order| match order {
                OrderClause::Column { column, direction } => {
                    format!("{} {}", self.wrap(column), direction.as_str())
                }
                OrderClause::Raw { sql } => sql.clone(),
            })
            .collect::<Vec<_>>();
        format!("order by {}", orders.join(", "))
    }

    fn compile_random(&self, _seed: Option<&str>) -> String {
        "RANDOM()".to_string()
    }

    fn compile_limit(&self, _query: &Registry, limit: u64) -> String {
        format!("limit {}", limit)
    }

    fn compile_offset(&self, _query: &Registry, offset: u64) -> String {
        format!("offset {}", offset)
    }

    fn compile_lock(&self, _query: &Registry, lock: &Lock) -> String {
        match lock {
            Lock::Raw(sql) => sql.clone(),
            _ => String::new(),
        }
    }

    fn compile_unions(&self, query: &Registry) -> CompileResult {
        let mut sql = String::new();
        for union in &query.unions {
            let conjunction = if union.all { " union all " } else { " union " };
            sql.push_str(conjunction);
            sql.push_str(&self.wrap_union(&self.compile_select(&union.query)?));
        }
        if !query.union_orders.is_empty() {
            sql.push(' ');
            sql.push_str(&self.compile_orders(&query.union_orders));
        }
        if let Some(limit) = query.union_limit {
            sql.push(' ');
            sql.push_str(&self.compile_limit(query, limit));
        }
        if let Some(offset) = query.union_offset {
            sql.push(' ');
            sql.push_str(&self.compile_offset(query, offset));
        }
        Ok(sql.trim_start().to_string())
    }

    fn wrap_union(&self, sql: &str) -> String {
        format!("({})", sql)
    }

    /// Aggregate over a union or having query through a derived table
    fn compile_union_aggregate(&self, query: &Registry) -> CompileResult {
        let Some(aggregate) = &query.aggregate else {
            return self.compile_select(query);
        };
        let sql = self.compile_aggregate(query, aggregate);
        let mut inner = query.clone();
        inner.aggregate = None;
        Ok(format!(
            "{} from ({}) as {}",
            sql,
            self.compile_select(&inner)?,
            self.wrap_table_str("temp_table")
        ))
    }

    fn compile_exists(&self, query: &Registry) -> CompileResult {
        let select = self.compile_select(query)?;
        Ok(format!(
            "select exists({}) as {}",
            select,
            self.wrap_str("exists")
        ))
    }

    // Inserts

    fn compile_insert(&self, query: &Registry, rows: &[Row]) -> CompileResult {
        base::compile_insert(self, query, rows)
    }

    fn compile_insert_or_ignore(&self, _query: &Registry, _rows: &[Row]) -> CompileResult {
        Err(self.unsupported("inserting while ignoring errors"))
    }

    fn compile_insert_get_id(
        &self,
        query: &Registry,
        rows: &[Row],
        _sequence: Option<&str>,
    ) -> CompileResult {
        self.compile_insert(query, rows)
    }

    fn compile_insert_using(&self, query: &Registry, columns: &[String], sql: &str) -> CompileResult {
        let table = self.wrap_table(query_table(query)?);
        if columns.is_empty() || (columns.len() == 1 && columns[0] == "*") {
            return Ok(format!("insert into {} {}", table, sql));
        }
        Ok(format!(
            "insert into {} ({}) {}",
            table,
            self.columnize_names(columns),
            sql
        ))
    }

    fn compile_insert_or_ignore_using(
        &self,
        _query: &Registry,
        _columns: &[String],
        _sql: &str,
    ) -> CompileResult {
        Err(self.unsupported("inserting while ignoring errors"))
    }

    fn compile_upsert(
        &self,
        _query: &Registry,
        _rows: &[Row],
        _unique_by: &[String],
        _update: &[UpsertUpdate],
    ) -> CompileResult {
        Err(self.unsupported("upserts"))
    }

    // Updates

    fn compile_update(&self, query: &Registry, values: &Row) -> CompileResult {
        base::compile_update(self, query, values)
    }

    fn compile_update_columns(&self, _query: &Registry, values: &Row) -> String {
        values
            .iter()
            .map(|(column, value)| format!("{} = {}", self.wrap_str(column), self.parameter(value)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn compile_update_without_joins(
        &self,
        _query: &Registry,
        table: &str,
        columns: &str,
        wheres: &str,
    ) -> CompileResult {
        Ok(concatenate([
            format!("update {} set {}", table, columns),
            wheres.to_string(),
        ]))
    }

    fn compile_update_with_joins(
        &self,
        query: &Registry,
        table: &str,
        columns: &str,
        wheres: &str,
    ) -> CompileResult {
        let joins = self.compile_joins(query, &query.joins)?;
        Ok(concatenate([
            format!("update {}", table),
            joins,
            format!("set {}", columns),
            wheres.to_string(),
        ]))
    }

    /// Join bindings, then set values, then everything after the `set`
    fn prepare_bindings_for_update(&self, bindings: &Bindings, values: &Row) -> Vec<SqlValue> {
        let mut out: Vec<SqlValue> = bindings.get(BindingKind::Join).to_vec();
        out.extend(update_value_bindings(values));
        out.extend(bindings.flatten_except(&[BindingKind::Select, BindingKind::Join]));
        out
    }

    // Deletes

    fn compile_delete(&self, query: &Registry) -> CompileResult {
        base::compile_delete(self, query)
    }

    fn compile_delete_without_joins(&self, _query: &Registry, table: &str, wheres: &str) -> CompileResult {
        Ok(concatenate([format!("delete from {}", table), wheres.to_string()]))
    }

    fn compile_delete_with_joins(&self, query: &Registry, table: &str, wheres: &str) -> CompileResult {
        let alias = split_alias(table).map(|(_, alias)| alias).unwrap_or(table);
        let joins = self.compile_joins(query, &query.joins)?;
        Ok(concatenate([
            format!("delete {} from {}", alias, table),
            joins,
            wheres.to_string(),
        ]))
    }

    fn prepare_bindings_for_delete(&self, bindings: &Bindings) -> Vec<SqlValue> {
        bindings.flatten_except(&[BindingKind::Select])
    }

    /// One or more statements, each with its own bindings
    fn compile_truncate(&self, query: &Registry) -> Result<Vec<(String, Vec<SqlValue>)>, QueryError> {
        Ok(vec![(
            format!("truncate table {}", self.wrap_table(query_table(query)?)),
            Vec::new(),
        )])
    }

    // Raw SQL rendering

    fn escape(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(b) => self.escape_bool(*b),
            SqlValue::Int(_)
            | SqlValue::BigInt(_)
            | SqlValue::UnsignedBigInt(_)
            | SqlValue::Float(_)
            | SqlValue::Double(_)
            | SqlValue::Decimal(_) => value.to_string(),
            SqlValue::Bytes(bytes) => self.escape_binary(bytes),
            SqlValue::Json(json) => self.escape_string(&json.to_string()),
            SqlValue::Array(values) => values
                .iter()
                .map(|v| self.escape(v))
                .collect::<Vec<_>>()
                .join(", "),
            SqlValue::String(s)
            | SqlValue::Uuid(s)
            | SqlValue::Date(s)
            | SqlValue::Time(s)
            | SqlValue::DateTime(s) => self.escape_string(s),
        }
    }

    fn escape_string(&self, value: &str) -> String {
        self.quote_string(value)
    }

    fn escape_binary(&self, value: &[u8]) -> String {
        format!("x'{}'", hex(value))
    }

    fn escape_bool(&self, value: bool) -> String {
        let literal = if value { "1" } else { "0" };
        literal.to_string()
    }

    /// Inline bindings as literals, for logging and debugging only
    fn substitute_bindings_into_raw_sql(&self, sql: &str, bindings: &[SqlValue]) -> String {
        raw::substitute(sql, bindings.iter().map(|b| self.escape(b)))
    }
}

/// Lowercase hex digits
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// The text of a column reference, as JSON compilers split it on `->`
fn column_text(column: &Column) -> String {
    match column {
        Column::Name(name) => name.clone(),
        Column::Raw(expression) => expression.sql(),
    }
}

fn query_table(query: &Registry) -> Result<&Column, QueryError> {
    query
        .from
        .as_ref()
        .ok_or_else(|| QueryError::MissingClause {
            clause: "from".to_string(),
        })
}

/// Bindings for the `set` clause of an update, expressions skipped
pub fn update_value_bindings(values: &Row) -> Vec<SqlValue> {
    let mut out = Vec::new();
    for value in values.values() {
        if let Some(binding) = value.binding() {
            binding.clone().flatten_into(&mut out);
        }
    }
    out
}

/// Dialect-neutral implementations that dialect overrides build on
pub mod base {
    use super::*;

    pub fn wrap<G: Grammar + ?Sized>(g: &G, value: &str) -> String {
        if let Some((column, alias)) = split_alias(value) {
            return format!("{} as {}", g.wrap_str(column), g.wrap_value(alias));
        }
        if g.is_json_selector(value) {
            return g.wrap_json_selector(value);
        }
        let segments: Vec<&str> = value.split('.').collect();
        g.wrap_segments(&segments)
    }

    pub fn wrap_table<G: Grammar + ?Sized>(g: &G, table: &str, prefix: &str) -> String {
        if let Some((name, alias)) = split_alias(table) {
            return format!(
                "{} as {}",
                wrap_table(g, name, prefix),
                g.wrap_value(&format!("{}{}", prefix, alias))
            );
        }
        if let Some(dot) = table.rfind('.') {
            let prefixed = format!("{}.{}{}", &table[..dot], prefix, &table[dot + 1..]);
            return prefixed
                .split('.')
                .map(|segment| g.wrap_value(segment))
                .collect::<Vec<_>>()
                .join(".");
        }
        g.wrap_value(&format!("{}{}", prefix, table))
    }

    pub fn compile_select<G: Grammar + ?Sized>(g: &G, query: &Registry) -> CompileResult {
        if (query.has_unions() || !query.havings.is_empty()) && query.aggregate.is_some() {
            return g.compile_union_aggregate(query);
        }
        let mut sql = concatenate(g.compile_components(query)?);
        if query.has_unions() {
            sql = format!("{} {}", g.wrap_union(&sql), g.compile_unions(query)?);
        }
        Ok(sql)
    }

    pub fn compile_columns<G: Grammar + ?Sized>(g: &G, query: &Registry) -> String {
        let select = match query.distinct {
            Distinct::No => "select ",
            _ => "select distinct ",
        };
        format!("{}{}", select, columns_or_star(g, query))
    }

    pub fn columns_or_star<G: Grammar + ?Sized>(g: &G, query: &Registry) -> String {
        if query.columns.is_empty() {
            "*".to_string()
        } else {
            g.columnize(&query.columns)
        }
    }

    pub fn compile_where_basic<G: Grammar + ?Sized>(
        g: &G,
        column: &Column,
        operator: &str,
        value: &QueryValue,
    ) -> String {
        format!(
            "{} {} {}",
            g.wrap(column),
            operator.replace('?', "??"),
            g.parameter(value)
        )
    }

    pub fn compile_date_based_where<G: Grammar + ?Sized>(
        g: &G,
        part: DatePart,
        column: &Column,
        operator: &str,
        value: &QueryValue,
    ) -> String {
        format!(
            "{}({}) {} {}",
            part.as_str(),
            g.wrap(column),
            operator,
            g.parameter(value)
        )
    }

    pub fn compile_insert<G: Grammar + ?Sized>(g: &G, query: &Registry, rows: &[Row]) -> CompileResult {
        let table = g.wrap_table(query_table(query)?);
        let Some(first) = rows.first() else {
            return Ok(format!("insert into {} default values", table));
        };
        let columns: Vec<String> = first.keys().cloned().collect();
        let parameters = rows
            .iter()
            .map(|record| format!("({})", g.parameter_list(&aligned_values(&columns, record))))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!(
            "insert into {} ({}) values {}",
            table,
            g.columnize_names(&columns),
            parameters
        ))
    }

    pub fn compile_update<G: Grammar + ?Sized>(g: &G, query: &Registry, values: &Row) -> CompileResult {
        let table = g.wrap_table(query_table(query)?);
        let columns = g.compile_update_columns(query, values);
        let wheres = g.compile_wheres(query)?;
        if query.joins.is_empty() {
            g.compile_update_without_joins(query, &table, &columns, &wheres)
        } else {
            g.compile_update_with_joins(query, &table, &columns, &wheres)
        }
    }

    pub fn compile_delete<G: Grammar + ?Sized>(g: &G, query: &Registry) -> CompileResult {
        let table = g.wrap_table(query_table(query)?);
        let wheres = g.compile_wheres(query)?;
        if query.joins.is_empty() {
            g.compile_delete_without_joins(query, &table, &wheres)
        } else {
            g.compile_delete_with_joins(query, &table, &wheres)
        }
    }

    /// `update t set ... where <key> in (select <alias>.<key> ...)`
    pub fn compile_update_by_key<G: Grammar + ?Sized>(
        g: &G,
        query: &Registry,
        values: &Row,
        key: &str,
    ) -> CompileResult {
        let table = g.wrap_table(query_table(query)?);
        let columns = g.compile_update_columns(query, values);
        let select = g.compile_select(&select_key(query, key))?;
        Ok(format!(
            "update {} set {} where {} in ({})",
            table,
            columns,
            g.wrap_str(key),
            select
        ))
    }

    /// `delete from t where <key> in (select <alias>.<key> ...)`
    pub fn compile_delete_by_key<G: Grammar + ?Sized>(g: &G, query: &Registry, key: &str) -> CompileResult {
        let table = g.wrap_table(query_table(query)?);
        let select = g.compile_select(&select_key(query, key))?;
        Ok(format!(
            "delete from {} where {} in ({})",
            table,
            g.wrap_str(key),
            select
        ))
    }

    fn select_key(query: &Registry, key: &str) -> Registry {
        let from = match &query.from {
            Some(Column::Name(name)) => name.clone(),
            Some(Column::Raw(expression)) => expression.sql(),
            None => String::new(),
        };
        let alias = split_alias(&from)
            .map(|(_, alias)| alias.to_string())
            .unwrap_or(from.clone());
        let mut select = query.clone();
        select.columns = vec![Column::Name(format!("{}.{}", alias, key))];
        select
    }
}

/// Construct the grammar for a backend with default options
pub fn grammar_for(backend: DatabaseBackend) -> Arc<dyn Grammar> {
    match backend {
        DatabaseBackend::Postgres => Arc::new(PostgresGrammar::new()),
        DatabaseBackend::MySQL | DatabaseBackend::MariaDB => Arc::new(MySqlGrammar::new()),
        DatabaseBackend::SQLite => Arc::new(SQLiteGrammar::new()),
        DatabaseBackend::SqlServer => Arc::new(SqlServerGrammar::new()),
    }
}
