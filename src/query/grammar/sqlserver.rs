//! SQL Server grammar

use super::{
    aligned_values, base, concatenate, insert_columns, split_alias, update_value_bindings,
    CompileResult, Grammar,
};
use crate::database::types::SqlValue;
use crate::query::expression::{raw, Column, QueryValue};
use crate::query::registry::{
    Bindings, BindingKind, DatePart, Distinct, IndexHint, IndexHintKind, Lock, OrderClause, Registry, Row,
    UpsertUpdate,
};
use crate::query::DatabaseBackend;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;

static ARRAY_INDEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([0-9]+)\]$").expect("SqlServerGrammar: invalid index pattern"));

const UPSERT_SOURCE: &str = "laravel_source";

#[derive(Debug, Clone, Default)]
pub struct SqlServerGrammar {
    table_prefix: String,
}

impl SqlServerGrammar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    fn has_offset(query: &Registry) -> bool {
        query.offset.map_or(false, |offset| offset > 0)
    }
}

impl Grammar for SqlServerGrammar {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::SqlServer
    }

    fn table_prefix(&self) -> &str {
        &self.table_prefix
    }

    fn returns_inserted_id(&self) -> bool {
        true
    }

    fn wrap_value(&self, value: &str) -> String {
        if value == "*" {
            return value.to_string();
        }
        format!("[{}]", value.replace(']', "]]"))
    }

    fn wrap_json_selector(&self, value: &str) -> String {
        let (field, path) = self.wrap_json_field_and_path(value);
        format!("json_value({}{})", field, path)
    }

    /// Offsets need an order by; `(SELECT 0)` keeps the natural order
    fn compile_select(&self, query: &Registry) -> CompileResult {
        if Self::has_offset(query) && query.orders.is_empty() {
            let mut ordered = query.clone();
            ordered.orders.push(OrderClause::Raw {
                sql: "(SELECT 0)".to_string(),
            });
            return base::compile_select(self, &ordered);
        }
        base::compile_select(self, query)
    }

    fn compile_columns(&self, query: &Registry) -> String {
        let distinct = match query.distinct {
            Distinct::No => "",
            _ => "distinct ",
        };
        let top = match query.limit {
            Some(limit) if limit > 0 && !Self::has_offset(query) => format!("top {} ", limit),
            _ => String::new(),
        };
        format!("select {}{}{}", distinct, top, base::columns_or_star(self, query))
    }

    fn compile_from(&self, query: &Registry, table: &Column) -> String {
        let from = format!("from {}", self.wrap_table(table));
        match &query.lock {
            Some(Lock::Raw(sql)) => format!("{} {}", from, sql),
            Some(Lock::Exclusive) => format!("{} with(rowlock,updlock,holdlock)", from),
            Some(Lock::Shared) => format!("{} with(rowlock,holdlock)", from),
            None => from,
        }
    }

    /// Only forced hints have a table hint here; `Hint` and `Ignore` render nothing
    fn compile_index_hint(&self, _query: &Registry, hint: &IndexHint) -> String {
        match hint.kind {
            IndexHintKind::Force => format!("with (index({}))", hint.index),
            _ => String::new(),
        }
    }

    fn compile_date_based_where(
        &self,
        part: DatePart,
        column: &Column,
        operator: &str,
        value: &QueryValue,
    ) -> String {
        match part {
            DatePart::Date => format!(
                "cast({} as date) {} {}",
                self.wrap(column),
                operator,
                self.parameter(value)
            ),
            DatePart::Time => format!(
                "cast({} as time) {} {}",
                self.wrap(column),
                operator,
                self.parameter(value)
            ),
            _ => base::compile_date_based_where(self, part, column, operator, value),
        }
    }

    fn compile_json_contains(&self, column: &str, value: &str) -> CompileResult {
        let (field, path) = self.wrap_json_field_and_path(column);
        Ok(format!(
            "{} in (select [value] from openjson({}{}))",
            value, field, path
        ))
    }

    fn prepare_binding_for_json_contains(&self, value: &JsonValue) -> SqlValue {
        match value {
            JsonValue::Bool(b) => SqlValue::String(b.to_string()),
            other => SqlValue::from_json(other.clone()),
        }
    }

    fn compile_json_contains_key(&self, column: &str) -> CompileResult {
        let mut segments: Vec<String> = column.split("->").map(str::to_string).collect();
        let last = segments.pop().unwrap_or_default();

        let key = match ARRAY_INDEX.captures(&last) {
            Some(captures) => {
                let start = captures.get(0).map(|m| m.start()).unwrap_or(last.len());
                segments.push(last[..start].to_string());
                captures
                    .get(1)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default()
            }
            None => self.quote_string(&last),
        };

        let (field, path) = self.wrap_json_field_and_path(&segments.join("->"));
        Ok(format!("{} in (select [key] from openjson({}{}))", key, field, path))
    }

    fn compile_json_length(&self, column: &str, operator: &str, value: &str) -> CompileResult {
        let (field, path) = self.wrap_json_field_and_path(column);
        Ok(format!(
            "(select count(*) from openjson({}{})) {} {}",
            field, path, operator, value
        ))
    }

    fn compile_random(&self, _seed: Option<&str>) -> String {
        "NEWID()".to_string()
    }

    /// `offset n rows fetch next m rows only`
    fn offset_before_limit(&self) -> bool {
        true
    }

    fn compile_limit(&self, query: &Registry, limit: u64) -> String {
        if limit > 0 && Self::has_offset(query) {
            return format!("fetch next {} rows only", limit);
        }
        String::new()
    }

    fn compile_offset(&self, _query: &Registry, offset: u64) -> String {
        if offset > 0 {
            return format!("offset {} rows", offset);
        }
        String::new()
    }

    /// Locks are table hints in the from clause
    fn compile_lock(&self, _query: &Registry, _lock: &Lock) -> String {
        String::new()
    }

    fn wrap_union(&self, sql: &str) -> String {
        format!("select * from ({}) as {}", sql, self.wrap_table_str("temp_table"))
    }

    fn compile_exists(&self, query: &Registry) -> CompileResult {
        let mut exists = query.clone();
        exists.columns = vec![Column::Raw(raw("1 [exists]"))];
        exists.limit = Some(1);
        self.compile_select(&exists)
    }

    fn compile_insert_get_id(
        &self,
        query: &Registry,
        rows: &[Row],
        sequence: Option<&str>,
    ) -> CompileResult {
        Ok(format!(
            "set nocount on;{};select scope_identity() as {}",
            self.compile_insert(query, rows)?,
            self.wrap_str(sequence.unwrap_or("id"))
        ))
    }

    fn compile_upsert(
        &self,
        query: &Registry,
        rows: &[Row],
        unique_by: &[String],
        update: &[UpsertUpdate],
    ) -> CompileResult {
        let table = super::query_table(query)?;
        let table_name = match table {
            Column::Name(name) => name.clone(),
            Column::Raw(expression) => expression.sql(),
        };
        let first = insert_columns(rows);
        let columns = self.columnize_names(&first);

        let parameters = rows
            .iter()
            .map(|record| format!("({})", self.parameter_list(&aligned_values(&first, record))))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "merge {} using (values {}) {} ({}) ",
            self.wrap_table(table),
            parameters,
            self.wrap_table_str(UPSERT_SOURCE),
            columns
        );

        let on = unique_by
            .iter()
            .map(|column| {
                format!(
                    "{} = {}",
                    self.wrap_str(&format!("{}.{}", UPSERT_SOURCE, column)),
                    self.wrap_str(&format!("{}.{}", table_name, column))
                )
            })
            .collect::<Vec<_>>()
            .join(" and ");
        sql.push_str(&format!("on {} ", on));

        if !update.is_empty() {
            let assignments = update
                .iter()
                .map(|item| match item {
                    UpsertUpdate::Column(column) => format!(
                        "{} = {}",
                        self.wrap_str(column),
                        self.wrap_str(&format!("{}.{}", UPSERT_SOURCE, column))
                    ),
                    UpsertUpdate::Assign(column, value) => {
                        format!("{} = {}", self.wrap_str(column), self.parameter(value))
                    }
                })
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!("when matched then update set {} ", assignments));
        }

        sql.push_str(&format!(
            "when not matched then insert ({}) values ({});",
            columns, columns
        ));
        Ok(sql)
    }

    fn compile_update_with_joins(
        &self,
        query: &Registry,
        table: &str,
        columns: &str,
        wheres: &str,
    ) -> CompileResult {
        let alias = split_alias(table).map(|(_, alias)| alias).unwrap_or(table);
        let joins = self.compile_joins(query, &query.joins)?;
        Ok(concatenate([
            format!("update {} set {} from {}", alias, columns, table),
            joins,
            wheres.to_string(),
        ]))
    }

    fn prepare_bindings_for_update(&self, bindings: &Bindings, values: &Row) -> Vec<SqlValue> {
        let mut out = update_value_bindings(values);
        out.extend(bindings.flatten_except(&[BindingKind::Select]));
        out
    }

    fn compile_delete_without_joins(&self, query: &Registry, table: &str, wheres: &str) -> CompileResult {
        let sql = concatenate([format!("delete from {}", table), wheres.to_string()]);
        match query.limit {
            Some(limit) if limit > 0 && !Self::has_offset(query) => {
                Ok(sql.replacen("delete", &format!("delete top ({})", limit), 1))
            }
            _ => Ok(sql),
        }
    }

    fn escape_binary(&self, value: &[u8]) -> String {
        format!("0x{}", super::hex(value))
    }
}
