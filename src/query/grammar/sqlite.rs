//! SQLite grammar

use super::{base, query_table, CompileResult, Grammar};
use crate::database::types::SqlValue;
use crate::query::expression::{Column, QueryValue};
use crate::query::registry::{
    Bindings, BindingKind, DatePart, IndexHint, IndexHintKind, Lock, Registry, Row, UpsertUpdate,
};
use crate::query::{DatabaseBackend, QueryError};
use indexmap::IndexMap;
use serde_json::{Map, Value as JsonValue};

#[derive(Debug, Clone, Default)]
pub struct SQLiteGrammar {
    table_prefix: String,
}

/// Write `value` at `path` inside `target`, creating objects on the way
fn set_json_path(target: &mut JsonValue, path: &[&str], value: JsonValue) {
    match path.split_first() {
        None => *target = value,
        Some((head, rest)) => {
            if !target.is_object() {
                *target = JsonValue::Object(Map::new());
            }
            if let JsonValue::Object(map) = target {
                let child = map.entry(head.to_string()).or_insert(JsonValue::Null);
                set_json_path(child, rest, value);
            }
        }
    }
}

impl SQLiteGrammar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    /// Collapse `column->a->b` updates into one JSON patch document per column
    fn group_json_columns(&self, values: &Row) -> IndexMap<String, JsonValue> {
        let mut groups: IndexMap<String, JsonValue> = IndexMap::new();
        for (key, value) in values {
            if !self.is_json_selector(key) {
                continue;
            }
            let key = match (key.find('.'), key.find("->")) {
                (Some(dot), Some(arrow)) if dot < arrow => &key[dot + 1..],
                _ => key.as_str(),
            };
            let mut segments = key.split("->");
            let column = segments.next().unwrap_or_default().to_string();
            let path: Vec<&str> = segments.collect();
            let json = match value {
                QueryValue::Param(value) => value.to_json(),
                QueryValue::Expr(expression) => JsonValue::String(expression.sql()),
            };
            let document = groups
                .entry(column)
                .or_insert_with(|| JsonValue::Object(Map::new()));
            set_json_path(document, &path, json);
        }
        groups
    }
}

impl Grammar for SQLiteGrammar {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::SQLite
    }

    fn table_prefix(&self) -> &str {
        &self.table_prefix
    }

    fn wrap_json_selector(&self, value: &str) -> String {
        let (field, path) = self.wrap_json_field_and_path(value);
        format!("json_extract({}{})", field, path)
    }

    fn compile_date_based_where(
        &self,
        part: DatePart,
        column: &Column,
        operator: &str,
        value: &QueryValue,
    ) -> String {
        let format = match part {
            DatePart::Date => "%Y-%m-%d",
            DatePart::Time => "%H:%M:%S",
            DatePart::Day => "%d",
            DatePart::Month => "%m",
            DatePart::Year => "%Y",
        };
        format!(
            "strftime('{}', {}) {} cast({} as text)",
            format,
            self.wrap(column),
            operator,
            self.parameter(value)
        )
    }

    fn compile_json_contains_key(&self, column: &str) -> CompileResult {
        let (field, path) = self.wrap_json_field_and_path(column);
        Ok(format!("json_type({}{}) is not null", field, path))
    }

    fn compile_json_length(&self, column: &str, operator: &str, value: &str) -> CompileResult {
        let (field, path) = self.wrap_json_field_and_path(column);
        Ok(format!("json_array_length({}{}) {} {}", field, path, operator, value))
    }

    /// Only forced hints map to `indexed by`; `Hint` and `Ignore` render nothing
    fn compile_index_hint(&self, _query: &Registry, hint: &IndexHint) -> String {
        match hint.kind {
            IndexHintKind::Force => format!("indexed by {}", hint.index),
            _ => String::new(),
        }
    }

    fn compile_lock(&self, _query: &Registry, _lock: &Lock) -> String {
        String::new()
    }

    fn wrap_union(&self, sql: &str) -> String {
        format!("select * from ({})", sql)
    }

    fn compile_insert_or_ignore(&self, query: &Registry, rows: &[Row]) -> CompileResult {
        Ok(self
            .compile_insert(query, rows)?
            .replacen("insert", "insert or ignore", 1))
    }

    fn compile_insert_or_ignore_using(
        &self,
        query: &Registry,
        columns: &[String],
        sql: &str,
    ) -> CompileResult {
        Ok(self
            .compile_insert_using(query, columns, sql)?
            .replacen("insert", "insert or ignore", 1))
    }

    fn compile_upsert(
        &self,
        query: &Registry,
        rows: &[Row],
        unique_by: &[String],
        update: &[UpsertUpdate],
    ) -> CompileResult {
        let sql = format!(
            "{} on conflict ({}) do update set ",
            self.compile_insert(query, rows)?,
            self.columnize_names(unique_by)
        );
        let columns = update
            .iter()
            .map(|item| match item {
                UpsertUpdate::Column(column) => format!(
                    "{} = {}.{}",
                    self.wrap_str(column),
                    self.wrap_value("excluded"),
                    self.wrap_str(column)
                ),
                UpsertUpdate::Assign(column, value) => {
                    format!("{} = {}", self.wrap_str(column), self.parameter(value))
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        Ok(sql + &columns)
    }

    fn compile_update(&self, query: &Registry, values: &Row) -> CompileResult {
        if !query.joins.is_empty() || query.limit.is_some() {
            return base::compile_update_by_key(self, query, values, "rowid");
        }
        base::compile_update(self, query, values)
    }

    fn compile_update_columns(&self, _query: &Registry, values: &Row) -> String {
        let mut columns: Vec<String> = values
            .iter()
            .filter(|(key, _)| !self.is_json_selector(key))
            .map(|(key, value)| {
                let column = key.rsplit('.').next().unwrap_or(key);
                format!("{} = {}", self.wrap_str(column), self.parameter(value))
            })
            .collect();
        for column in self.group_json_columns(values).keys() {
            let wrapped = self.wrap_str(column);
            columns.push(format!(
                "{} = json_patch(ifnull({}, json('{{}}')), json(?))",
                wrapped, wrapped
            ));
        }
        columns.join(", ")
    }

    fn prepare_bindings_for_update(&self, bindings: &Bindings, values: &Row) -> Vec<SqlValue> {
        let mut out = Vec::new();
        for (column, value) in values {
            if self.is_json_selector(column) {
                continue;
            }
            match value {
                QueryValue::Expr(_) => {}
                QueryValue::Param(value @ (SqlValue::Json(_) | SqlValue::Array(_))) => {
                    out.push(SqlValue::String(value.to_json().to_string()))
                }
                QueryValue::Param(value) => out.push(value.clone()),
            }
        }
        for document in self.group_json_columns(values).values() {
            out.push(SqlValue::String(document.to_string()));
        }
        out.extend(bindings.flatten_except(&[BindingKind::Select]));
        out
    }

    fn compile_delete(&self, query: &Registry) -> CompileResult {
        if !query.joins.is_empty() || query.limit.is_some() {
            return base::compile_delete_by_key(self, query, "rowid");
        }
        base::compile_delete(self, query)
    }

    fn compile_truncate(&self, query: &Registry) -> Result<Vec<(String, Vec<SqlValue>)>, QueryError> {
        let table = query_table(query)?;
        let name = match table {
            Column::Name(name) => format!("{}{}", self.table_prefix, name),
            Column::Raw(expression) => expression.sql(),
        };
        Ok(vec![
            (
                "delete from sqlite_sequence where name = ?".to_string(),
                vec![SqlValue::String(name)],
            ),
            (format!("delete from {}", self.wrap_table(table)), Vec::new()),
        ])
    }
}
