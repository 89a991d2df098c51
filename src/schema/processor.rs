//! Catalog row normalization
//!
//! Introspection queries return rows shaped by each engine's catalog. The
//! [`Processor`] maps them onto the records in [`info`](super::info):
//! enum-like fields are lowercased, comma-joined aggregates are split and
//! SQL Server's separate length/precision/scale fields are folded back into
//! a full type string.

use super::info::{ColumnInfo, ForeignKeyInfo, Generation, IndexInfo, TableInfo, TypeInfo, ViewInfo};
use crate::query::DatabaseBackend;
use serde_json::Value as JsonValue;

/// String form of a scalar field; null and missing fields are `None`
pub fn text(row: &JsonValue, key: &str) -> Option<String> {
    match row.get(key)? {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Like [`text`] but empty strings are `None` too
fn non_empty(row: &JsonValue, key: &str) -> Option<String> {
    text(row, key).filter(|s| !s.is_empty())
}

/// Truthiness of a catalog flag: booleans, numbers, `YES`/`t`/`1` strings
pub fn flag(row: &JsonValue, key: &str) -> bool {
    match row.get(key) {
        Some(JsonValue::Bool(b)) => *b,
        Some(JsonValue::Number(n)) => n.as_f64().map_or(false, |f| f != 0.0),
        Some(JsonValue::String(s)) => matches!(
            s.to_ascii_lowercase().as_str(),
            "yes" | "y" | "t" | "true" | "1"
        ),
        _ => false,
    }
}

pub fn number(row: &JsonValue, key: &str) -> Option<i64> {
    match row.get(key)? {
        JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        JsonValue::String(s) => s
            .parse::<i64>()
            .ok()
            .or_else(|| s.parse::<f64>().ok().map(|f| f as i64)),
        _ => None,
    }
}

/// Split a `group_concat`/`string_agg` column list
pub fn split_columns(value: Option<String>) -> Vec<String> {
    value
        .map(|joined| {
            joined
                .split(',')
                .map(|column| column.trim().to_string())
                .filter(|column| !column.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// `SET_NULL` / `SET NULL` / `set null` all become `set null`
pub fn referential_action(value: Option<String>) -> String {
    value
        .map(|action| action.to_lowercase().replace('_', " "))
        .unwrap_or_else(|| "no action".to_string())
}

/// PostgreSQL `confupdtype`/`confdeltype` codes
pub fn pg_referential_action(code: Option<String>) -> String {
    match code.as_deref() {
        Some("a") => "no action",
        Some("r") => "restrict",
        Some("c") => "cascade",
        Some("n") => "set null",
        Some("d") => "set default",
        _ => "no action",
    }
    .to_string()
}

fn pg_type_kind(code: &str) -> &str {
    match code {
        "b" => "base",
        "c" => "composite",
        "d" => "domain",
        "e" => "enum",
        "p" => "pseudo",
        "r" => "range",
        "m" => "multirange",
        other => other,
    }
}

fn pg_type_category(code: &str) -> &str {
    match code {
        "A" => "array",
        "B" => "boolean",
        "C" => "composite",
        "D" => "date_time",
        "E" => "enum",
        "G" => "geometric",
        "I" => "network_address",
        "N" => "numeric",
        "P" => "pseudo",
        "R" => "range",
        "S" => "string",
        "T" => "timespan",
        "U" => "user_defined",
        "V" => "bit_string",
        "X" => "unknown",
        "Z" => "internal_use",
        other => other,
    }
}

/// Full SQL Server type from `sys.columns` sizing fields
pub fn sqlserver_type(type_name: &str, length: Option<i64>, precision: Option<i64>, places: Option<i64>) -> String {
    let size = |value: Option<i64>| value.map(|v| v.to_string()).unwrap_or_default();
    match type_name {
        "binary" | "varbinary" | "char" | "varchar" | "nchar" | "nvarchar" => match length {
            Some(-1) => format!("{}(max)", type_name),
            _ => format!("{}({})", type_name, size(length)),
        },
        "decimal" | "numeric" => format!("{}({},{})", type_name, size(precision), size(places)),
        "float" | "datetime2" | "datetimeoffset" | "time" => {
            format!("{}({})", type_name, size(precision))
        }
        _ => type_name.to_string(),
    }
}

/// Maps one dialect's catalog rows onto the info records
#[derive(Debug, Clone, Copy)]
pub struct Processor {
    backend: DatabaseBackend,
}

impl Processor {
    pub fn new(backend: DatabaseBackend) -> Self {
        Self { backend }
    }

    pub fn tables(&self, rows: &[JsonValue]) -> Vec<TableInfo> {
        rows.iter()
            .map(|row| TableInfo {
                name: text(row, "name").unwrap_or_default(),
                schema: text(row, "schema"),
                size: number(row, "size"),
                comment: non_empty(row, "comment"),
                engine: text(row, "engine"),
                collation: text(row, "collation"),
            })
            .collect()
    }

    pub fn views(&self, rows: &[JsonValue]) -> Vec<ViewInfo> {
        rows.iter()
            .map(|row| ViewInfo {
                name: text(row, "name").unwrap_or_default(),
                schema: text(row, "schema"),
                definition: text(row, "definition"),
            })
            .collect()
    }

    pub fn types(&self, rows: &[JsonValue]) -> Vec<TypeInfo> {
        rows.iter()
            .map(|row| {
                let kind = text(row, "type").unwrap_or_default();
                let category = text(row, "category");
                match self.backend {
                    DatabaseBackend::Postgres => TypeInfo {
                        name: text(row, "name").unwrap_or_default(),
                        schema: text(row, "schema"),
                        kind: pg_type_kind(&kind).to_string(),
                        category: category.map(|c| pg_type_category(&c).to_string()),
                        implicit: flag(row, "implicit"),
                    },
                    _ => TypeInfo {
                        name: text(row, "name").unwrap_or_default(),
                        schema: text(row, "schema"),
                        kind: kind.to_lowercase(),
                        category,
                        implicit: flag(row, "implicit"),
                    },
                }
            })
            .collect()
    }

    pub fn columns(&self, rows: &[JsonValue]) -> Vec<ColumnInfo> {
        match self.backend {
            DatabaseBackend::MySQL | DatabaseBackend::MariaDB => rows.iter().map(mysql_column).collect(),
            DatabaseBackend::Postgres => rows.iter().map(postgres_column).collect(),
            DatabaseBackend::SqlServer => rows.iter().map(sqlserver_column).collect(),
            DatabaseBackend::SQLite => {
                let primaries = rows.iter().filter(|row| flag(row, "primary")).count();
                rows.iter()
                    .map(|row| sqlite_column(row, primaries == 1))
                    .collect()
            }
        }
    }

    pub fn indexes(&self, rows: &[JsonValue]) -> Vec<IndexInfo> {
        rows.iter()
            .map(|row| {
                let name = text(row, "name").unwrap_or_default().to_lowercase();
                let primary = match self.backend {
                    DatabaseBackend::MySQL | DatabaseBackend::MariaDB => name == "primary",
                    _ => flag(row, "primary"),
                };
                IndexInfo {
                    columns: split_columns(text(row, "columns")),
                    kind: text(row, "type").map(|kind| kind.to_lowercase()),
                    unique: flag(row, "unique"),
                    primary,
                    name,
                }
            })
            .collect()
    }

    pub fn foreign_keys(&self, rows: &[JsonValue]) -> Vec<ForeignKeyInfo> {
        rows.iter()
            .map(|row| {
                let (on_update, on_delete) = match self.backend {
                    DatabaseBackend::Postgres => (
                        pg_referential_action(text(row, "on_update")),
                        pg_referential_action(text(row, "on_delete")),
                    ),
                    _ => (
                        referential_action(text(row, "on_update")),
                        referential_action(text(row, "on_delete")),
                    ),
                };
                ForeignKeyInfo {
                    name: text(row, "name"),
                    columns: split_columns(text(row, "columns")),
                    foreign_schema: text(row, "foreign_schema"),
                    foreign_table: text(row, "foreign_table").unwrap_or_default(),
                    foreign_columns: split_columns(text(row, "foreign_columns")),
                    on_update,
                    on_delete,
                }
            })
            .collect()
    }
}

fn mysql_column(row: &JsonValue) -> ColumnInfo {
    let extra = text(row, "extra").unwrap_or_default().to_lowercase();
    let generation = if extra.contains("stored generated") {
        Some("stored")
    } else if extra.contains("virtual generated") {
        Some("virtual")
    } else {
        None
    };

    ColumnInfo {
        name: text(row, "name").unwrap_or_default(),
        type_name: text(row, "type_name").unwrap_or_default().to_lowercase(),
        full_type: text(row, "type").unwrap_or_default(),
        collation: text(row, "collation"),
        nullable: flag(row, "nullable"),
        default: text(row, "default"),
        auto_increment: extra == "auto_increment",
        comment: non_empty(row, "comment"),
        generation: generation.map(|kind| Generation {
            kind: kind.to_string(),
            expression: text(row, "expression"),
        }),
    }
}

fn postgres_column(row: &JsonValue) -> ColumnInfo {
    let default = text(row, "default");
    let generated = text(row, "generated").filter(|g| !g.is_empty() && g != "\0");
    let auto_increment = default
        .as_deref()
        .map_or(false, |value| value.starts_with("nextval("));

    ColumnInfo {
        name: text(row, "name").unwrap_or_default(),
        type_name: text(row, "type_name").unwrap_or_default(),
        full_type: text(row, "type").unwrap_or_default(),
        collation: text(row, "collation"),
        nullable: flag(row, "nullable"),
        default: if generated.is_some() { None } else { default.clone() },
        auto_increment,
        comment: text(row, "comment"),
        generation: generated.map(|code| Generation {
            kind: if code == "s" { "stored" } else { "virtual" }.to_string(),
            expression: default,
        }),
    }
}

fn sqlite_column(row: &JsonValue, single_primary: bool) -> ColumnInfo {
    let full_type = text(row, "type").unwrap_or_default().to_lowercase();
    let type_name = full_type
        .split('(')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();
    let generation = match number(row, "extra") {
        Some(2) => Some("virtual"),
        Some(3) => Some("stored"),
        _ => None,
    };

    ColumnInfo {
        name: text(row, "name").unwrap_or_default(),
        auto_increment: single_primary && flag(row, "primary") && type_name == "integer",
        type_name,
        full_type,
        collation: None,
        nullable: flag(row, "nullable"),
        default: text(row, "default"),
        comment: None,
        generation: generation.map(|kind| Generation {
            kind: kind.to_string(),
            expression: None,
        }),
    }
}

fn sqlserver_column(row: &JsonValue) -> ColumnInfo {
    let type_name = text(row, "type_name").unwrap_or_default().to_lowercase();
    let full_type = sqlserver_type(
        &type_name,
        number(row, "length"),
        number(row, "precision"),
        number(row, "places"),
    );
    let expression = text(row, "expression");

    ColumnInfo {
        name: text(row, "name").unwrap_or_default(),
        type_name,
        full_type,
        collation: text(row, "collation"),
        nullable: flag(row, "nullable"),
        default: text(row, "default"),
        auto_increment: flag(row, "autoincrement"),
        comment: text(row, "comment"),
        generation: expression.map(|expression| Generation {
            kind: if flag(row, "persisted") { "stored" } else { "virtual" }.to_string(),
            expression: Some(expression),
        }),
    }
}
