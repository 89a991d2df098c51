//! Values exchanged with the drivers
//!
//! [`SqlValue`] is what the query builder binds; each driver module knows how
//! to hand those values to sqlx and how to turn result rows back into JSON
//! objects keyed by column name.

pub mod mysql_converter;
pub mod postgres_converter;
pub mod sqlite_converter;
pub mod value;

pub use mysql_converter::MySqlTypeConverter;
pub use postgres_converter::PostgresTypeConverter;
pub use sqlite_converter::SqliteTypeConverter;
pub use value::SqlValue;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

pub(crate) fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

pub(crate) fn parse_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S%.f"))
        .ok()
}

/// Parse a timestamp, normalizing offsets to UTC
pub(crate) fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
}

/// JSON text for values a driver cannot bind natively
pub(crate) fn json_text(value: &SqlValue) -> String {
    value.to_json().to_string()
}
