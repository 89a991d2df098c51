//! Normalized catalog records
//!
//! Every dialect's introspection rows are mapped onto these shapes by
//! [`processor`](super::processor), so callers never see the driver's
//! column naming.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub schema: Option<String>,
    /// Bytes on disk, where the catalog reports it
    pub size: Option<i64>,
    pub comment: Option<String>,
    pub engine: Option<String>,
    pub collation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewInfo {
    pub name: String,
    pub schema: Option<String>,
    pub definition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeInfo {
    pub name: String,
    pub schema: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub category: Option<String>,
    /// Created by the engine alongside another object (array types, multiranges)
    pub implicit: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    /// `stored` or `virtual`
    #[serde(rename = "type")]
    pub kind: String,
    pub expression: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Bare type name, e.g. `varchar`
    pub type_name: String,
    /// Full type, e.g. `varchar(255)`
    #[serde(rename = "type")]
    pub full_type: String,
    pub collation: Option<String>,
    pub nullable: bool,
    pub default: Option<String>,
    pub auto_increment: bool,
    pub comment: Option<String>,
    pub generation: Option<Generation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub unique: bool,
    pub primary: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyInfo {
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub foreign_schema: Option<String>,
    pub foreign_table: String,
    pub foreign_columns: Vec<String>,
    pub on_update: String,
    pub on_delete: String,
}
