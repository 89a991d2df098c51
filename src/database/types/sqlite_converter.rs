//! SQLite binding and row decoding

use super::value::SqlValue;
use super::json_text;
use crate::error::{Error, Result};
use serde_json::Value as JsonValue;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};

/// SQLite type converter
#[derive(Clone, Default)]
pub struct SqliteTypeConverter;

impl SqliteTypeConverter {
    pub fn new() -> Self {
        SqliteTypeConverter
    }

    /// Bind a SqlValue to a SQLite query
    pub fn bind_param<'q>(
        query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
        value: SqlValue,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        match value {
            SqlValue::Null => query.bind(None::<i32>),
            SqlValue::Bool(b) => query.bind(if b { 1i32 } else { 0i32 }),
            SqlValue::Int(i) => query.bind(i),
            SqlValue::BigInt(i) => query.bind(i),
            SqlValue::UnsignedBigInt(i) => {
                // INTEGER is a signed 8-byte value
                if i > i64::MAX as u64 {
                    query.bind(i.to_string())
                } else {
                    query.bind(i as i64)
                }
            }
            SqlValue::Float(f) => query.bind(f as f64),
            SqlValue::Double(f) => query.bind(f),
            SqlValue::Decimal(d) => query.bind(d.to_string()),
            SqlValue::String(s)
            | SqlValue::Uuid(s)
            | SqlValue::Date(s)
            | SqlValue::Time(s)
            | SqlValue::DateTime(s) => query.bind(s),
            SqlValue::Bytes(b) => query.bind(b),
            SqlValue::Json(j) => query.bind(j.to_string()),
            array @ SqlValue::Array(_) => query.bind(json_text(&array)),
        }
    }

    /// Decode one column by the storage class of the stored value
    ///
    /// Declared `BOOLEAN` columns come back as booleans; everything else
    /// follows the value's own class since SQLite typing is per value.
    pub fn extract_column_value(&self, row: &SqliteRow, index: usize) -> Result<SqlValue> {
        let raw = row.try_get_raw(index).map_err(|e| {
            Error::database_query(format!("Failed to get raw value at column {}: {}", index, e))
        })?;
        if raw.is_null() {
            return Ok(SqlValue::Null);
        }
        let storage = raw.type_info().name().to_uppercase();
        let declared = row
            .columns()
            .get(index)
            .map(|column| column.type_info().name().to_uppercase())
            .unwrap_or_default();

        let value = match storage.as_str() {
            "INTEGER" | "INT8" | "INT" | "BOOLEAN" => {
                let val: i64 = row.try_get_unchecked(index).map_err(|e| decode_error(index, e))?;
                if declared == "BOOLEAN" || storage == "BOOLEAN" {
                    SqlValue::Bool(val != 0)
                } else if val >= i32::MIN as i64 && val <= i32::MAX as i64 {
                    SqlValue::Int(val as i32)
                } else {
                    SqlValue::BigInt(val)
                }
            }
            "REAL" | "FLOAT" | "DOUBLE" => {
                let val: f64 = row.try_get_unchecked(index).map_err(|e| decode_error(index, e))?;
                SqlValue::Double(val)
            }
            "BLOB" => {
                let val: Vec<u8> = row.try_get_unchecked(index).map_err(|e| decode_error(index, e))?;
                SqlValue::Bytes(val)
            }
            _ => {
                let val: String = row.try_get_unchecked(index).map_err(|e| decode_error(index, e))?;
                SqlValue::String(val)
            }
        };
        Ok(value)
    }

    /// Convert a row to a JSON object keyed by column name
    pub fn row_to_json(&self, row: &SqliteRow) -> Result<JsonValue> {
        let mut obj = serde_json::Map::new();
        for (i, column) in row.columns().iter().enumerate() {
            let value = self.extract_column_value(row, i)?;
            obj.insert(column.name().to_string(), value.to_json());
        }
        Ok(JsonValue::Object(obj))
    }
}

fn decode_error(index: usize, err: sqlx::Error) -> Error {
    Error::database_query(format!("Failed to decode column {}: {}", index, err))
}
