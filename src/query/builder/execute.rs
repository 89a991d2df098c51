//! Running built queries through the bound connection
//!
//! Every operation drains the pending before-query callbacks, compiles through
//! the grammar and hands the SQL with its bindings to the [`Connection`].
//!
//! [`Connection`]: crate::database::Connection

use super::QueryBuilder;
use crate::error::{Error, Result};
use crate::query::expression::{Column, Expression, QueryValue};
use crate::query::grammar::{insert_bindings, split_alias};
use crate::query::registry::{Aggregate, BindingKind, Row, Section, UpsertUpdate};
use crate::query::Truthy;
use serde_json::Value as JsonValue;

/// The key a selected column shows up under in a result row
fn result_key(column: &str) -> &str {
    if let Some((_, alias)) = split_alias(column) {
        return alias;
    }
    column.rsplit('.').next().unwrap_or(column)
}

/// Field `key` of a row object, falling back to its first field
fn row_field(row: JsonValue, key: &str) -> Option<JsonValue> {
    match row {
        JsonValue::Object(mut map) => match map.remove(key) {
            Some(value) => Some(value),
            None => map.into_iter().next().map(|(_, value)| value),
        },
        _ => None,
    }
}

fn json_to_i64(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        JsonValue::String(s) => s
            .parse::<i64>()
            .ok()
            .or_else(|| s.parse::<f64>().ok().map(|f| f as i64)),
        JsonValue::Bool(b) => Some(*b as i64),
        _ => None,
    }
}

/// Align multi-row inserts on one sorted column list
fn sort_rows(mut rows: Vec<Row>) -> Vec<Row> {
    if rows.len() > 1 {
        for record in rows.iter_mut() {
            record.sort_keys();
        }
    }
    rows
}

impl QueryBuilder {
    async fn run_select(&self) -> Result<Vec<JsonValue>> {
        let sql = self.compile()?;
        self.bound_connection()?
            .select(&sql, self.get_bindings())
            .await
    }

    /// Execute as a select and return every row
    pub async fn get(&mut self) -> Result<Vec<JsonValue>> {
        self.apply_before_query_callbacks();
        self.run_select().await
    }

    /// The first row, if any
    pub async fn first(&mut self) -> Result<Option<JsonValue>> {
        self.apply_before_query_callbacks();
        let query = self.clone().limit(1);
        Ok(query.run_select().await?.into_iter().next())
    }

    /// A single column of the first row
    pub async fn value(&mut self, column: &str) -> Result<Option<JsonValue>> {
        self.apply_before_query_callbacks();
        let mut query = self.clone().limit(1);
        if query.registry.columns.is_empty() {
            query = query.select([column]);
        }
        let row = query.run_select().await?.into_iter().next();
        Ok(row.and_then(|row| row_field(row, result_key(column))))
    }

    /// One column of every row
    pub async fn pluck(&mut self, column: &str) -> Result<Vec<JsonValue>> {
        self.apply_before_query_callbacks();
        let mut query = self.clone();
        if query.registry.columns.is_empty() {
            query = query.select([column]);
        }
        let key = result_key(column);
        Ok(query
            .run_select()
            .await?
            .into_iter()
            .filter_map(|row| row_field(row, key))
            .collect())
    }

    // Aggregates

    fn set_aggregate(&mut self, function: &str, columns: Vec<Column>) {
        self.registry.aggregate = Some(Aggregate {
            function: function.to_string(),
            columns,
        });
        if self.registry.groups.is_empty() {
            self.registry.orders.clear();
            self.registry.bindings.clear(BindingKind::Order);
        }
    }

    /// Run an aggregate function and return its value
    pub async fn aggregate(&mut self, function: &str, columns: Vec<Column>) -> Result<Option<JsonValue>> {
        self.apply_before_query_callbacks();
        let keep_columns = self.registry.has_unions() || !self.registry.havings.is_empty();
        let mut query = if keep_columns {
            self.clone()
        } else {
            self.clone_without(&[Section::Columns])
                .clone_without_bindings(&[BindingKind::Select])
        };
        query.set_aggregate(function, columns);

        let row = query.run_select().await?.into_iter().next();
        Ok(row.and_then(|row| match row {
            JsonValue::Object(map) => map
                .into_iter()
                .find(|(key, _)| key.eq_ignore_ascii_case("aggregate"))
                .map(|(_, value)| value),
            _ => None,
        }))
    }

    pub async fn count(&mut self) -> Result<i64> {
        let value = self.aggregate("count", vec![Column::from("*")]).await?;
        Ok(value.as_ref().and_then(json_to_i64).unwrap_or(0))
    }

    pub async fn min(&mut self, column: &str) -> Result<Option<JsonValue>> {
        self.aggregate("min", vec![Column::from(column)]).await
    }

    pub async fn max(&mut self, column: &str) -> Result<Option<JsonValue>> {
        self.aggregate("max", vec![Column::from(column)]).await
    }

    /// Sum of `column`, zero when there are no rows
    pub async fn sum(&mut self, column: &str) -> Result<JsonValue> {
        let value = self.aggregate("sum", vec![Column::from(column)]).await?;
        Ok(match value {
            Some(JsonValue::Null) | None => JsonValue::from(0),
            Some(value) => value,
        })
    }

    pub async fn avg(&mut self, column: &str) -> Result<Option<JsonValue>> {
        self.aggregate("avg", vec![Column::from(column)]).await
    }

    /// Whether any row matches
    pub async fn exists(&mut self) -> Result<bool> {
        self.apply_before_query_callbacks();
        let sql = self.grammar.compile_exists(&self.registry)?;
        let row = self
            .bound_connection()?
            .select_one(&sql, self.get_bindings())
            .await?;
        Ok(match row {
            Some(JsonValue::Object(map)) => map
                .get("exists")
                .map_or(true, |value| match value {
                    JsonValue::String(s) => !matches!(s.as_str(), "0" | "f" | "false"),
                    other => other.is_truthy(),
                }),
            _ => false,
        })
    }

    pub async fn doesnt_exist(&mut self) -> Result<bool> {
        Ok(!self.exists().await?)
    }

    // Inserts

    /// Insert rows; several rows are aligned on their sorted column names
    pub async fn insert(&mut self, rows: Vec<Row>) -> Result<bool> {
        if rows.is_empty() {
            return Ok(true);
        }
        self.apply_before_query_callbacks();
        let rows = sort_rows(rows);
        let sql = self.grammar.compile_insert(&self.registry, &rows)?;
        self.bound_connection()?
            .insert(&sql, insert_bindings(&rows))
            .await
    }

    /// Insert rows, skipping those that violate a constraint
    pub async fn insert_or_ignore(&mut self, rows: Vec<Row>) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        self.apply_before_query_callbacks();
        let rows = sort_rows(rows);
        let sql = self.grammar.compile_insert_or_ignore(&self.registry, &rows)?;
        self.bound_connection()?
            .affecting_statement(&sql, insert_bindings(&rows))
            .await
    }

    /// Insert one row and return its generated id
    pub async fn insert_get_id(&mut self, values: Row, sequence: Option<&str>) -> Result<i64> {
        self.apply_before_query_callbacks();
        let rows = if values.is_empty() { Vec::new() } else { vec![values] };
        let sql = self
            .grammar
            .compile_insert_get_id(&self.registry, &rows, sequence)?;
        let bindings = insert_bindings(&rows);
        let connection = self.bound_connection()?;

        if self.grammar.returns_inserted_id() {
            let key = sequence.unwrap_or("id");
            let row = connection.select_one(&sql, bindings).await?;
            return row
                .and_then(|row| row_field(row, key))
                .as_ref()
                .and_then(json_to_i64)
                .ok_or_else(|| Error::not_found(format!("Insert did not return column [{}].", key)));
        }

        connection
            .execute(&sql, bindings)
            .await?
            .last_insert_id
            .ok_or_else(|| Error::not_found("Insert did not report a generated id."))
    }

    /// `insert into table (columns) <sub-query>`
    pub async fn insert_using<I, S, F>(&mut self, columns: I, callback: F) -> Result<u64>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.insert_from_query(columns, callback, false).await
    }

    pub async fn insert_or_ignore_using<I, S, F>(&mut self, columns: I, callback: F) -> Result<u64>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.insert_from_query(columns, callback, true).await
    }

    async fn insert_from_query<I, S, F>(&mut self, columns: I, callback: F, ignore: bool) -> Result<u64>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.apply_before_query_callbacks();
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let (sub, bindings) = self.compile_sub(callback);
        if let Some(err) = &self.error {
            return Err(err.clone().into());
        }
        let sql = if ignore {
            self.grammar
                .compile_insert_or_ignore_using(&self.registry, &columns, &sub)?
        } else {
            self.grammar
                .compile_insert_using(&self.registry, &columns, &sub)?
        };
        self.bound_connection()?
            .affecting_statement(&sql, bindings)
            .await
    }

    /// Insert rows or update the ones conflicting on `unique_by`
    ///
    /// `update` of `None` updates every inserted column; an empty list turns
    /// the upsert into a plain insert.
    pub async fn upsert<I, S>(&mut self, rows: Vec<Row>, unique_by: I, update: Option<Vec<UpsertUpdate>>) -> Result<u64>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if rows.is_empty() {
            return Ok(0);
        }
        if matches!(&update, Some(update) if update.is_empty()) {
            return Ok(self.insert(rows).await? as u64);
        }

        let rows = sort_rows(rows);
        let update = match update {
            Some(update) => update,
            None => rows[0].keys().cloned().map(UpsertUpdate::Column).collect(),
        };
        let unique_by: Vec<String> = unique_by.into_iter().map(Into::into).collect();

        self.apply_before_query_callbacks();
        let mut bindings = insert_bindings(&rows);
        for item in &update {
            if let UpsertUpdate::Assign(_, QueryValue::Param(value)) = item {
                value.clone().flatten_into(&mut bindings);
            }
        }

        let sql = self
            .grammar
            .compile_upsert(&self.registry, &rows, &unique_by, &update)?;
        self.bound_connection()?
            .affecting_statement(&sql, bindings)
            .await
    }

    // Updates

    /// Update matching rows and return how many changed
    pub async fn update(&mut self, values: Row) -> Result<u64> {
        self.apply_before_query_callbacks();
        let sql = self.grammar.compile_update(&self.registry, &values)?;
        let bindings = self
            .grammar
            .prepare_bindings_for_update(&self.registry.bindings, &values);
        self.bound_connection()?.update(&sql, bindings).await
    }

    pub async fn increment(&mut self, column: &str, amount: i64) -> Result<u64> {
        self.increment_with(column, amount, Row::new()).await
    }

    /// Increment `column` and set `extra` columns in the same statement
    pub async fn increment_with(&mut self, column: &str, amount: i64, extra: Row) -> Result<u64> {
        let expression = format!("{} + {}", self.grammar.wrap_str(column), amount);
        self.update_counter(column, expression, extra).await
    }

    pub async fn decrement(&mut self, column: &str, amount: i64) -> Result<u64> {
        self.decrement_with(column, amount, Row::new()).await
    }

    pub async fn decrement_with(&mut self, column: &str, amount: i64, extra: Row) -> Result<u64> {
        let expression = format!("{} - {}", self.grammar.wrap_str(column), amount);
        self.update_counter(column, expression, extra).await
    }

    async fn update_counter(&mut self, column: &str, expression: String, extra: Row) -> Result<u64> {
        let mut values = Row::new();
        values.insert(column.to_string(), QueryValue::Expr(Expression::new(expression)));
        values.extend(extra);
        self.update(values).await
    }

    // Deletes

    pub async fn delete(&mut self) -> Result<u64> {
        self.apply_before_query_callbacks();
        let sql = self.grammar.compile_delete(&self.registry)?;
        let bindings = self.grammar.prepare_bindings_for_delete(&self.registry.bindings);
        self.bound_connection()?.delete(&sql, bindings).await
    }

    /// Remove every row, resetting identity counters where the dialect can
    pub async fn truncate(&mut self) -> Result<()> {
        self.apply_before_query_callbacks();
        let statements = self.grammar.compile_truncate(&self.registry)?;
        let connection = self.bound_connection()?;
        for (sql, bindings) in statements {
            connection.statement(&sql, bindings).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_key() {
        assert_eq!(result_key("users.email"), "email");
        assert_eq!(result_key("email as address"), "address");
        assert_eq!(result_key("name"), "name");
    }

    #[test]
    fn test_row_field_falls_back_to_first() {
        let row = serde_json::json!({ "count(*)": 3 });
        assert_eq!(row_field(row, "aggregate"), Some(JsonValue::from(3)));
    }

    #[test]
    fn test_sort_rows_only_for_many() {
        let single = sort_rows(vec![crate::query::row([("b", 1), ("a", 2)])]);
        assert_eq!(single[0].keys().collect::<Vec<_>>(), vec!["b", "a"]);

        let many = sort_rows(vec![
            crate::query::row([("b", 1), ("a", 2)]),
            crate::query::row([("a", 3), ("b", 4)]),
        ]);
        assert_eq!(many[0].keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_json_to_i64() {
        assert_eq!(json_to_i64(&JsonValue::from("42")), Some(42));
        assert_eq!(json_to_i64(&JsonValue::from(7.0)), Some(7));
        assert_eq!(json_to_i64(&JsonValue::Null), None);
    }
}
