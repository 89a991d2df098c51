//! PostgreSQL binding and row decoding

use super::value::SqlValue;
use super::{parse_date, parse_datetime, parse_time};
use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};

/// PostgreSQL type converter
#[derive(Clone, Default)]
pub struct PostgresTypeConverter;

impl PostgresTypeConverter {
    pub fn new() -> Self {
        PostgresTypeConverter
    }

    /// Bind a SqlValue to a PostgreSQL query
    pub fn bind_param<'q>(
        query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
        value: SqlValue,
    ) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
        match value {
            // Typed NULL; bytea casts implicitly in most positions
            SqlValue::Null => query.bind(None::<Vec<u8>>),
            SqlValue::Bool(b) => query.bind(b),
            SqlValue::Int(i) => query.bind(i),
            SqlValue::BigInt(i) => query.bind(i),
            // No unsigned types; values past i64 go through numeric text
            SqlValue::UnsignedBigInt(i) => match i64::try_from(i) {
                Ok(i) => query.bind(i),
                Err(_) => query.bind(i.to_string()),
            },
            SqlValue::Float(f) => query.bind(f),
            SqlValue::Double(f) => query.bind(f),
            SqlValue::Decimal(d) => query.bind(d),
            SqlValue::String(s) => query.bind(s),
            SqlValue::Bytes(b) => query.bind(b),
            SqlValue::Uuid(s) => match uuid::Uuid::parse_str(&s) {
                Ok(uuid) => query.bind(uuid),
                Err(_) => query.bind(s),
            },
            SqlValue::Json(j) => query.bind(j),
            SqlValue::Date(s) => match parse_date(&s) {
                Some(date) => query.bind(date),
                None => query.bind(s),
            },
            SqlValue::Time(s) => match parse_time(&s) {
                Some(time) => query.bind(time),
                None => query.bind(s),
            },
            SqlValue::DateTime(s) => match DateTime::parse_from_rfc3339(&s) {
                Ok(dt) => query.bind(dt.with_timezone(&Utc)),
                Err(_) => match parse_datetime(&s) {
                    Some(dt) => query.bind(dt),
                    None => query.bind(s),
                },
            },
            SqlValue::Array(values) => {
                let items: Vec<String> = values.iter().map(ToString::to_string).collect();
                query.bind(items)
            }
        }
    }

    /// Decode one column by its PostgreSQL type name
    pub fn extract_column_value(&self, row: &PgRow, index: usize) -> Result<SqlValue> {
        let raw = row.try_get_raw(index).map_err(|e| {
            Error::database_query(format!("Failed to get raw value at column {}: {}", index, e))
        })?;
        if raw.is_null() {
            return Ok(SqlValue::Null);
        }
        let type_name = row
            .columns()
            .get(index)
            .map(|column| column.type_info().name().to_uppercase())
            .unwrap_or_default();

        let value = match type_name.as_str() {
            "BOOL" => SqlValue::Bool(get::<bool>(row, index)?),
            "\"CHAR\"" | "CHAR" if is_internal_char(row, index) => {
                SqlValue::String(char::from(get::<i8>(row, index)? as u8).to_string())
            }
            "INT2" => SqlValue::Int(get::<i16>(row, index)? as i32),
            "INT4" => SqlValue::Int(get::<i32>(row, index)?),
            "INT8" => SqlValue::BigInt(get::<i64>(row, index)?),
            "OID" => SqlValue::BigInt(get::<sqlx::postgres::types::Oid>(row, index)?.0 as i64),
            "FLOAT4" => SqlValue::Float(get::<f32>(row, index)?),
            "FLOAT8" => SqlValue::Double(get::<f64>(row, index)?),
            "NUMERIC" => SqlValue::Decimal(get::<rust_decimal::Decimal>(row, index)?),
            "JSON" | "JSONB" => SqlValue::Json(get::<JsonValue>(row, index)?),
            "UUID" => SqlValue::Uuid(get::<uuid::Uuid>(row, index)?.to_string()),
            "DATE" => SqlValue::Date(get::<NaiveDate>(row, index)?.to_string()),
            "TIME" => SqlValue::Time(get::<NaiveTime>(row, index)?.to_string()),
            "TIMESTAMP" => SqlValue::DateTime(
                get::<NaiveDateTime>(row, index)?
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string(),
            ),
            "TIMESTAMPTZ" => SqlValue::DateTime(get::<DateTime<Utc>>(row, index)?.to_rfc3339()),
            "BYTEA" => SqlValue::Bytes(get::<Vec<u8>>(row, index)?),
            "TEXT[]" | "VARCHAR[]" | "NAME[]" | "_TEXT" | "_VARCHAR" | "_NAME" => SqlValue::Array(
                get::<Vec<String>>(row, index)?
                    .into_iter()
                    .map(SqlValue::String)
                    .collect(),
            ),
            "INT4[]" | "_INT4" => SqlValue::Array(
                get::<Vec<i32>>(row, index)?
                    .into_iter()
                    .map(SqlValue::Int)
                    .collect(),
            ),
            "INT8[]" | "_INT8" => SqlValue::Array(
                get::<Vec<i64>>(row, index)?
                    .into_iter()
                    .map(SqlValue::BigInt)
                    .collect(),
            ),
            // Text, names, enums and anything else with a text representation
            _ => match row.try_get_unchecked::<String, _>(index) {
                Ok(text) => SqlValue::String(text),
                Err(e) => {
                    log::warn!("Could not decode PostgreSQL type '{}' at column {}", type_name, index);
                    return Err(decode_error(index, e));
                }
            },
        };
        Ok(value)
    }

    /// Convert a row to a JSON object keyed by column name
    pub fn row_to_json(&self, row: &PgRow) -> Result<JsonValue> {
        let mut obj = serde_json::Map::new();
        for (i, column) in row.columns().iter().enumerate() {
            let value = self.extract_column_value(row, i)?;
            obj.insert(column.name().to_string(), value.to_json());
        }
        Ok(JsonValue::Object(obj))
    }
}

/// The single-byte catalog type (`pg_constraint.confupdtype` and friends)
fn is_internal_char(row: &PgRow, index: usize) -> bool {
    row.try_get::<i8, _>(index).is_ok()
}

fn get<'r, T>(row: &'r PgRow, index: usize) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get::<T, _>(index).map_err(|e| decode_error(index, e))
}

fn decode_error(index: usize, err: sqlx::Error) -> Error {
    Error::database_query(format!("Failed to decode column {}: {}", index, err))
}
