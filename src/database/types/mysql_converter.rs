//! MySQL / MariaDB binding and row decoding

use super::value::SqlValue;
use super::{json_text, parse_date, parse_datetime, parse_time};
use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::mysql::MySqlRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};

/// MySQL type converter
#[derive(Clone, Default)]
pub struct MySqlTypeConverter;

impl MySqlTypeConverter {
    pub fn new() -> Self {
        MySqlTypeConverter
    }

    /// Bind a SqlValue to a MySQL query
    pub fn bind_param<'q>(
        query: sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments>,
        value: SqlValue,
    ) -> sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments> {
        match value {
            SqlValue::Null => query.bind(None::<Vec<u8>>),
            SqlValue::Bool(b) => query.bind(b),
            SqlValue::Int(i) => query.bind(i),
            SqlValue::BigInt(i) => query.bind(i),
            SqlValue::UnsignedBigInt(i) => query.bind(i),
            SqlValue::Float(f) => query.bind(f),
            SqlValue::Double(f) => query.bind(f),
            SqlValue::Decimal(d) => query.bind(d),
            SqlValue::String(s) | SqlValue::Uuid(s) => query.bind(s),
            SqlValue::Bytes(b) => query.bind(b),
            SqlValue::Json(j) => query.bind(j),
            SqlValue::Date(s) => match parse_date(&s) {
                Some(date) => query.bind(date),
                None => query.bind(s),
            },
            SqlValue::Time(s) => match parse_time(&s) {
                Some(time) => query.bind(time),
                None => query.bind(s),
            },
            SqlValue::DateTime(s) => match parse_datetime(&s) {
                Some(dt) => query.bind(dt),
                None => query.bind(s),
            },
            // No array type; bound as a JSON document
            array @ SqlValue::Array(_) => query.bind(json_text(&array)),
        }
    }

    /// Decode one column by its reported type name
    pub fn extract_column_value(&self, row: &MySqlRow, index: usize) -> Result<SqlValue> {
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
            "BOOLEAN" | "BOOL" => SqlValue::Bool(get::<bool>(row, index)?),
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" => {
                let val = unchecked::<i64>(row, index)?;
                if type_name == "BIGINT" {
                    SqlValue::BigInt(val)
                } else {
                    SqlValue::Int(val as i32)
                }
            }
            "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED" | "YEAR" => {
                SqlValue::BigInt(unchecked::<u64>(row, index)? as i64)
            }
            "BIGINT UNSIGNED" => SqlValue::UnsignedBigInt(unchecked::<u64>(row, index)?),
            "FLOAT" => SqlValue::Float(get::<f32>(row, index)?),
            "DOUBLE" | "REAL" => SqlValue::Double(get::<f64>(row, index)?),
            "DECIMAL" | "NUMERIC" => SqlValue::Decimal(get::<rust_decimal::Decimal>(row, index)?),
            "JSON" => SqlValue::Json(get::<JsonValue>(row, index)?),
            "DATE" => SqlValue::Date(get::<NaiveDate>(row, index)?.to_string()),
            "TIME" => SqlValue::Time(get::<NaiveTime>(row, index)?.to_string()),
            "DATETIME" => SqlValue::DateTime(
                get::<NaiveDateTime>(row, index)?
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string(),
            ),
            "TIMESTAMP" => SqlValue::DateTime(
                get::<DateTime<Utc>>(row, index)?
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string(),
            ),
            "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT" => {
                // Binary collations report text columns as binary
                match row.try_get_unchecked::<String, _>(index) {
                    Ok(text) => SqlValue::String(text),
                    Err(_) => SqlValue::Bytes(get::<Vec<u8>>(row, index)?),
                }
            }
            _ => SqlValue::String(unchecked::<String>(row, index)?),
        };
        Ok(value)
    }

    /// Convert a row to a JSON object keyed by column name
    pub fn row_to_json(&self, row: &MySqlRow) -> Result<JsonValue> {
        let mut obj = serde_json::Map::new();
        for (i, column) in row.columns().iter().enumerate() {
            let value = self.extract_column_value(row, i)?;
            obj.insert(column.name().to_string(), value.to_json());
        }
        Ok(JsonValue::Object(obj))
    }
}

fn get<'r, T>(row: &'r MySqlRow, index: usize) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::MySql> + sqlx::Type<sqlx::MySql>,
{
    row.try_get::<T, _>(index).map_err(|e| decode_error(index, e))
}

/// Decode without the column type check; integer widths are read from the value
fn unchecked<'r, T>(row: &'r MySqlRow, index: usize) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::MySql>,
{
    row.try_get_unchecked::<T, _>(index)
        .map_err(|e| decode_error(index, e))
}

fn decode_error(index: usize, err: sqlx::Error) -> Error {
    Error::database_query(format!("Failed to decode column {}: {}", index, err))
}
