//! Table definitions for `create`
//!
//! A [`Blueprint`] collects column, index and foreign key definitions; the
//! connection's schema grammar turns it into dialect DDL.
//!
//! ```
//! use rustf_sql::schema::Blueprint;
//!
//! let mut table = Blueprint::new("posts");
//! table.id();
//! table.string("title", 200);
//! table.big_integer("user_id").unsigned();
//! table.foreign(&["user_id"]).references(&["id"]).on("users").on_delete("cascade");
//! table.timestamps();
//! ```

use crate::database::types::SqlValue;

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnType {
    Increments,
    BigIncrements,
    Integer,
    BigInteger,
    String(u32),
    Text,
    Boolean,
    Decimal { precision: u8, scale: u8 },
    Float,
    Date,
    DateTime,
    Timestamp,
    Json,
    Uuid,
    Binary,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// Rendered as an escaped literal
    Value(SqlValue),
    /// Inserted verbatim, e.g. `CURRENT_TIMESTAMP`
    Raw(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub default: Option<DefaultValue>,
    pub unique: bool,
    pub primary: bool,
    pub unsigned: bool,
    pub auto_increment: bool,
}

impl ColumnDefinition {
    fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
            nullable: false,
            default: None,
            unique: false,
            primary: false,
            unsigned: false,
            auto_increment: false,
        }
    }

    pub fn nullable(&mut self) -> &mut Self {
        self.nullable = true;
        self
    }

    pub fn default(&mut self, value: impl Into<SqlValue>) -> &mut Self {
        self.default = Some(DefaultValue::Value(value.into()));
        self
    }

    pub fn default_raw(&mut self, sql: impl Into<String>) -> &mut Self {
        self.default = Some(DefaultValue::Raw(sql.into()));
        self
    }

    /// Default to the current timestamp
    pub fn use_current(&mut self) -> &mut Self {
        self.default_raw("CURRENT_TIMESTAMP")
    }

    pub fn unique(&mut self) -> &mut Self {
        self.unique = true;
        self
    }

    pub fn primary(&mut self) -> &mut Self {
        self.primary = true;
        self
    }

    pub fn unsigned(&mut self) -> &mut Self {
        self.unsigned = true;
        self
    }

    pub fn auto_increment(&mut self) -> &mut Self {
        self.auto_increment = true;
        self
    }

    /// Increment columns and integers flagged with `auto_increment`
    pub fn is_auto_increment(&self) -> bool {
        matches!(self.column_type, ColumnType::Increments | ColumnType::BigIncrements) || self.auto_increment
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyDefinition {
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub references: Vec<String>,
    pub on: String,
    pub on_delete: Option<String>,
    pub on_update: Option<String>,
}

impl ForeignKeyDefinition {
    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    pub fn references(&mut self, columns: &[&str]) -> &mut Self {
        self.references = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn on(&mut self, table: impl Into<String>) -> &mut Self {
        self.on = table.into();
        self
    }

    pub fn on_delete(&mut self, action: impl Into<String>) -> &mut Self {
        self.on_delete = Some(action.into());
        self
    }

    pub fn on_update(&mut self, action: impl Into<String>) -> &mut Self {
        self.on_update = Some(action.into());
        self
    }

    pub fn cascade_on_delete(&mut self) -> &mut Self {
        self.on_delete("cascade")
    }

    pub fn null_on_delete(&mut self) -> &mut Self {
        self.on_delete("set null")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexDefinition {
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub unique: bool,
}

/// Conventional `{prefix}{table}_{columns}_{kind}` index name
pub fn index_name(prefix: &str, table: &str, columns: &[String], kind: &str) -> String {
    format!("{}{}_{}_{}", prefix, table, columns.join("_"), kind)
        .to_lowercase()
        .replace(['-', '.'], "_")
}

#[derive(Debug, Clone, PartialEq)]
pub struct Blueprint {
    table: String,
    columns: Vec<ColumnDefinition>,
    foreign_keys: Vec<ForeignKeyDefinition>,
    indexes: Vec<IndexDefinition>,
    primary: Option<Vec<String>>,
}

impl Blueprint {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
            primary: None,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    pub fn foreign_keys(&self) -> &[ForeignKeyDefinition] {
        &self.foreign_keys
    }

    pub fn primary_key(&self) -> Option<&[String]> {
        self.primary.as_deref()
    }

    /// Explicit indexes followed by those implied by `unique()` columns
    pub fn indexes(&self) -> Vec<IndexDefinition> {
        let mut indexes = self.indexes.clone();
        indexes.extend(self.columns.iter().filter(|c| c.unique).map(|c| IndexDefinition {
            name: None,
            columns: vec![c.name.clone()],
            unique: true,
        }));
        indexes
    }

    fn add_column(&mut self, name: &str, column_type: ColumnType) -> &mut ColumnDefinition {
        self.columns.push(ColumnDefinition::new(name, column_type));
        let last = self.columns.len() - 1;
        &mut self.columns[last]
    }

    /// Auto-incrementing big integer `id` primary key
    pub fn id(&mut self) -> &mut ColumnDefinition {
        self.big_increments("id")
    }

    pub fn increments(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Increments)
    }

    pub fn big_increments(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::BigIncrements)
    }

    pub fn integer(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Integer)
    }

    pub fn big_integer(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::BigInteger)
    }

    pub fn string(&mut self, name: &str, length: u32) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::String(length))
    }

    pub fn text(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Text)
    }

    pub fn boolean(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Boolean)
    }

    pub fn decimal(&mut self, name: &str, precision: u8, scale: u8) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Decimal { precision, scale })
    }

    pub fn float(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Float)
    }

    pub fn date(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Date)
    }

    pub fn date_time(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::DateTime)
    }

    pub fn timestamp(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Timestamp)
    }

    /// Nullable `created_at` and `updated_at`
    pub fn timestamps(&mut self) {
        self.timestamp("created_at").nullable();
        self.timestamp("updated_at").nullable();
    }

    pub fn json(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Json)
    }

    pub fn uuid(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Uuid)
    }

    pub fn binary(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Binary)
    }

    /// Composite primary key
    pub fn primary(&mut self, columns: &[&str]) {
        self.primary = Some(columns.iter().map(|c| c.to_string()).collect());
    }

    pub fn unique(&mut self, columns: &[&str]) -> &mut IndexDefinition {
        self.add_index(columns, true)
    }

    pub fn index(&mut self, columns: &[&str]) -> &mut IndexDefinition {
        self.add_index(columns, false)
    }

    fn add_index(&mut self, columns: &[&str], unique: bool) -> &mut IndexDefinition {
        self.indexes.push(IndexDefinition {
            name: None,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique,
        });
        let last = self.indexes.len() - 1;
        &mut self.indexes[last]
    }

    pub fn foreign(&mut self, columns: &[&str]) -> &mut ForeignKeyDefinition {
        self.foreign_keys.push(ForeignKeyDefinition {
            name: None,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            references: Vec::new(),
            on: String::new(),
            on_delete: None,
            on_update: None,
        });
        let last = self.foreign_keys.len() - 1;
        &mut self.foreign_keys[last]
    }
}

impl IndexDefinition {
    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }
}
