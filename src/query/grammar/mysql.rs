//! MySQL / MariaDB grammar

use super::{base, concatenate, update_value_bindings, CompileResult, Grammar};
use crate::database::types::SqlValue;
use crate::query::expression::{Column, QueryValue};
use crate::query::registry::{
    Bindings, BindingKind, FulltextOptions, IndexHint, IndexHintKind, Lock, Registry, Row,
    UpsertUpdate,
};
use crate::query::DatabaseBackend;

/// Alias given to the inserted row when `use_upsert_alias` is on
pub const UPSERT_ALIAS: &str = "laravel_upsert_alias";

#[derive(Debug, Clone, Default)]
pub struct MySqlGrammar {
    table_prefix: String,
    use_upsert_alias: bool,
    mariadb: bool,
}

impl MySqlGrammar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mariadb() -> Self {
        Self {
            mariadb: true,
            ..Self::default()
        }
    }

    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    /// Upserts reference the inserted row by alias instead of `values()`
    pub fn with_upsert_alias(mut self, enabled: bool) -> Self {
        self.use_upsert_alias = enabled;
        self
    }

    fn compile_json_update_column(&self, key: &str, value: &QueryValue) -> String {
        let value = match value {
            QueryValue::Param(SqlValue::Bool(b)) => b.to_string(),
            QueryValue::Param(SqlValue::Json(_)) | QueryValue::Param(SqlValue::Array(_)) => {
                "cast(? as json)".to_string()
            }
            other => self.parameter(other),
        };
        let (field, path) = self.wrap_json_field_and_path(key);
        format!("{} = json_set({}{}, {})", field, field, path, value)
    }

    /// Append `order by` / `limit`, which MySQL accepts on update and delete
    fn append_order_and_limit(&self, query: &Registry, sql: String) -> String {
        let limit = query
            .limit
            .map(|limit| self.compile_limit(query, limit))
            .unwrap_or_default();
        concatenate([sql, self.compile_orders(&query.orders), limit])
    }
}

impl Grammar for MySqlGrammar {
    fn backend(&self) -> DatabaseBackend {
        if self.mariadb {
            DatabaseBackend::MariaDB
        } else {
            DatabaseBackend::MySQL
        }
    }

    fn table_prefix(&self) -> &str {
        &self.table_prefix
    }

    fn wrap_value(&self, value: &str) -> String {
        if value == "*" {
            return value.to_string();
        }
        format!("`{}`", value.replace('`', "``"))
    }

    fn wrap_json_selector(&self, value: &str) -> String {
        let (field, path) = self.wrap_json_field_and_path(value);
        format!("json_unquote(json_extract({}{}))", field, path)
    }

    fn compile_where_null(&self, column: &Column, not: bool) -> String {
        if let Column::Name(name) = column {
            if self.is_json_selector(name) {
                let (field, path) = self.wrap_json_field_and_path(name);
                return if not {
                    format!(
                        "(json_extract({f}{p}) is not null AND json_type(json_extract({f}{p})) != 'NULL')",
                        f = field,
                        p = path
                    )
                } else {
                    format!(
                        "(json_extract({f}{p}) is null OR json_type(json_extract({f}{p})) = 'NULL')",
                        f = field,
                        p = path
                    )
                };
            }
        }
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
        let operator = format!(
            "{}{}",
            if not { "not " } else { "" },
            if case_sensitive { "like binary" } else { "like" }
        );
        Ok(self.compile_where_basic(column, &operator, value))
    }

    fn compile_json_contains(&self, column: &str, value: &str) -> CompileResult {
        let (field, path) = self.wrap_json_field_and_path(column);
        Ok(format!("json_contains({}, {}{})", field, value, path))
    }

    fn compile_json_contains_key(&self, column: &str) -> CompileResult {
        let (field, path) = self.wrap_json_field_and_path(column);
        Ok(format!("ifnull(json_contains_path({}, 'one'{}), 0)", field, path))
    }

    fn compile_json_length(&self, column: &str, operator: &str, value: &str) -> CompileResult {
        let (field, path) = self.wrap_json_field_and_path(column);
        Ok(format!("json_length({}{}) {} {}", field, path, operator, value))
    }

    fn compile_where_fulltext(&self, columns: &[Column], options: &FulltextOptions) -> CompileResult {
        let boolean = options.mode.as_deref() == Some("boolean");
        let mode = if boolean {
            " in boolean mode"
        } else {
            " in natural language mode"
        };
        let expanded = if options.expanded && !boolean {
            " with query expansion"
        } else {
            ""
        };
        Ok(format!(
            "match ({}) against (?{}{})",
            self.columnize(columns),
            mode,
            expanded
        ))
    }

    fn compile_index_hint(&self, _query: &Registry, hint: &IndexHint) -> String {
        match hint.kind {
            IndexHintKind::Hint => format!("use index ({})", hint.index),
            IndexHintKind::Force => format!("force index ({})", hint.index),
            IndexHintKind::Ignore => format!("ignore index ({})", hint.index),
        }
    }

    fn compile_random(&self, seed: Option<&str>) -> String {
        format!("RAND({})", seed.unwrap_or_default())
    }

    fn compile_lock(&self, _query: &Registry, lock: &Lock) -> String {
        match lock {
            Lock::Exclusive => "for update".to_string(),
            Lock::Shared => "lock in share mode".to_string(),
            Lock::Raw(sql) => sql.clone(),
        }
    }

    fn compile_insert(&self, query: &Registry, rows: &[Row]) -> CompileResult {
        // `() values ()` instead of `default values`
        if rows.is_empty() {
            return base::compile_insert(self, query, &[Row::new()]);
        }
        base::compile_insert(self, query, rows)
    }

    fn compile_insert_or_ignore(&self, query: &Registry, rows: &[Row]) -> CompileResult {
        Ok(self
            .compile_insert(query, rows)?
            .replacen("insert", "insert ignore", 1))
    }

    fn compile_insert_or_ignore_using(
        &self,
        query: &Registry,
        columns: &[String],
        sql: &str,
    ) -> CompileResult {
        Ok(self
            .compile_insert_using(query, columns, sql)?
            .replacen("insert", "insert ignore", 1))
    }

    fn compile_upsert(
        &self,
        query: &Registry,
        rows: &[Row],
        _unique_by: &[String],
        update: &[UpsertUpdate],
    ) -> CompileResult {
        let mut sql = self.compile_insert(query, rows)?;
        if self.use_upsert_alias {
            sql.push_str(" as ");
            sql.push_str(UPSERT_ALIAS);
        }
        sql.push_str(" on duplicate key update ");

        let columns = update
            .iter()
            .map(|item| match item {
                UpsertUpdate::Assign(column, value) => {
                    format!("{} = {}", self.wrap_str(column), self.parameter(value))
                }
                UpsertUpdate::Column(column) if self.use_upsert_alias => format!(
                    "{} = {}.{}",
                    self.wrap_str(column),
                    self.wrap_str(UPSERT_ALIAS),
                    self.wrap_str(column)
                ),
                UpsertUpdate::Column(column) => format!(
                    "{} = values({})",
                    self.wrap_str(column),
                    self.wrap_str(column)
                ),
            })
            .collect::<Vec<_>>()
            .join(", ");

        Ok(sql + &columns)
    }

    fn compile_update_columns(&self, _query: &Registry, values: &Row) -> String {
        values
            .iter()
            .map(|(column, value)| {
                if self.is_json_selector(column) {
                    self.compile_json_update_column(column, value)
                } else {
                    format!("{} = {}", self.wrap_str(column), self.parameter(value))
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn compile_update_without_joins(
        &self,
        query: &Registry,
        table: &str,
        columns: &str,
        wheres: &str,
    ) -> CompileResult {
        let sql = concatenate([format!("update {} set {}", table, columns), wheres.to_string()]);
        Ok(self.append_order_and_limit(query, sql))
    }

    /// JSON booleans are inlined, JSON documents are bound as text
    fn prepare_bindings_for_update(&self, bindings: &Bindings, values: &Row) -> Vec<SqlValue> {
        let values: Row = values
            .iter()
            .filter(|(column, value)| {
                !(self.is_json_selector(column)
                    && matches!(value, QueryValue::Param(SqlValue::Bool(_))))
            })
            .map(|(column, value)| {
                let value = match value {
                    QueryValue::Param(json @ (SqlValue::Json(_) | SqlValue::Array(_))) => {
                        QueryValue::Param(SqlValue::String(json.to_json().to_string()))
                    }
                    other => other.clone(),
                };
                (column.clone(), value)
            })
            .collect();

        let mut out: Vec<SqlValue> = bindings.get(BindingKind::Join).to_vec();
        out.extend(update_value_bindings(&values));
        out.extend(bindings.flatten_except(&[BindingKind::Select, BindingKind::Join]));
        out
    }

    fn compile_delete_without_joins(&self, query: &Registry, table: &str, wheres: &str) -> CompileResult {
        let sql = concatenate([format!("delete from {}", table), wheres.to_string()]);
        Ok(self.append_order_and_limit(query, sql))
    }

    fn escape_string(&self, value: &str) -> String {
        let mut out = String::with_capacity(value.len() + 2);
        out.push('\'');
        for c in value.chars() {
            match c {
                '\\' => out.push_str("\\\\"),
                '\'' => out.push_str("\\'"),
                '"' => out.push_str("\\\""),
                '\0' => out.push_str("\\0"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\x1a' => out.push_str("\\Z"),
                other => out.push(other),
            }
        }
        out.push('\'');
        out
    }
}
