//! Schema grammars
//!
//! A [`SchemaGrammar`] compiles DDL and catalog introspection statements.
//! Identifier quoting and the table prefix come from the dialect's query
//! [`Grammar`], which every schema grammar wraps.

use super::blueprint::{index_name, Blueprint, ColumnDefinition, ColumnType, DefaultValue, ForeignKeyDefinition, IndexDefinition};
use crate::database::config::ConnectionConfig;
use crate::query::grammar::{CompileResult, Grammar, MySqlGrammar, PostgresGrammar, SQLiteGrammar, SqlServerGrammar};
use crate::query::{DatabaseBackend, QueryError};
use std::fmt;
use std::sync::Arc;

pub mod mysql;
pub mod postgres;
pub mod sqlite;
pub mod sqlserver;

pub use mysql::MySqlSchemaGrammar;
pub use postgres::PostgresSchemaGrammar;
pub use sqlite::SQLiteSchemaGrammar;
pub use sqlserver::SqlServerSchemaGrammar;

/// A user-defined type for `create_type`
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDefinition {
    /// Enumerated labels, e.g. PostgreSQL `create type .. as enum`
    Enum(Vec<String>),
    /// An alias over a base type, e.g. SQL Server `create type .. from`
    Alias(String),
}

pub trait SchemaGrammar: Send + Sync + fmt::Debug {
    /// The query grammar used for quoting
    fn grammar(&self) -> &dyn Grammar;

    fn backend(&self) -> DatabaseBackend {
        self.grammar().backend()
    }

    fn unsupported(&self, feature: &str) -> QueryError {
        self.grammar().unsupported(feature)
    }

    fn wrap(&self, value: &str) -> String {
        self.grammar().wrap_str(value)
    }

    fn wrap_table(&self, table: &str) -> String {
        self.grammar().wrap_table_str(table)
    }

    fn quote_string(&self, value: &str) -> String {
        self.grammar().quote_string(value)
    }

    fn columnize(&self, columns: &[String]) -> String {
        self.grammar().columnize_names(columns)
    }

    /// Quote catalog names, which already carry any table prefix
    fn escape_names(&self, names: &[String]) -> String {
        names
            .iter()
            .map(|name| {
                name.split('.')
                    .map(|segment| self.grammar().wrap_value(segment))
                    .collect::<Vec<_>>()
                    .join(".")
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    // Databases

    fn compile_create_database(&self, _name: &str) -> CompileResult {
        Err(self.unsupported("creating databases"))
    }

    fn compile_drop_database_if_exists(&self, _name: &str) -> CompileResult {
        Err(self.unsupported("dropping databases"))
    }

    // Introspection

    /// A single-row, single-column statement that is truthy when the table exists
    fn compile_table_exists(&self, schema: Option<&str>, table: &str) -> CompileResult;

    fn compile_tables(&self, schema: Option<&str>) -> CompileResult;

    fn compile_views(&self, schema: Option<&str>) -> CompileResult;

    fn compile_types(&self, _schema: Option<&str>) -> CompileResult {
        Err(self.unsupported("user-defined types"))
    }

    fn compile_columns(&self, schema: Option<&str>, table: &str) -> CompileResult;

    fn compile_indexes(&self, schema: Option<&str>, table: &str) -> CompileResult;

    fn compile_foreign_keys(&self, schema: Option<&str>, table: &str) -> CompileResult;

    // Bulk drops

    fn compile_drop_all_tables(&self, tables: &[String]) -> CompileResult;

    fn compile_drop_all_views(&self, views: &[String]) -> CompileResult;

    fn compile_drop_all_types(&self, _types: &[String]) -> CompileResult {
        Err(self.unsupported("dropping all types"))
    }

    fn compile_drop_all_domains(&self, _domains: &[String]) -> CompileResult {
        Err(self.unsupported("dropping all domains"))
    }

    // Views and types

    fn compile_create_view(&self, name: &str, definition: &str) -> CompileResult {
        Ok(format!("create view {} as {}", self.wrap_table(name), definition))
    }

    fn compile_create_type(&self, _name: &str, _definition: &TypeDefinition) -> CompileResult {
        Err(self.unsupported("user-defined types"))
    }

    // Foreign key checks

    fn compile_enable_foreign_key_constraints(&self) -> CompileResult;

    fn compile_disable_foreign_key_constraints(&self) -> CompileResult;

    // Tables

    fn type_for(&self, column: &ColumnDefinition) -> String;

    fn compile_default(&self, column: &ColumnDefinition) -> Option<String> {
        column.default.as_ref().map(|default| match default {
            DefaultValue::Value(value) => self.grammar().escape(value),
            DefaultValue::Raw(sql) => sql.clone(),
        })
    }

    fn compile_nullable(&self, column: &ColumnDefinition) -> &'static str {
        if column.nullable {
            "null"
        } else {
            "not null"
        }
    }

    /// Column definition: type, nullability, default, key
    fn compile_column(&self, column: &ColumnDefinition) -> String {
        let mut sql = vec![
            self.wrap(&column.name),
            self.type_for(column),
            self.compile_nullable(column).to_string(),
        ];
        sql.extend(self.compile_default(column).map(|default| format!("default {}", default)));
        if column.primary || column.is_auto_increment() {
            sql.push("primary key".to_string());
        }
        sql.join(" ")
    }

    fn compile_foreign(&self, blueprint: &Blueprint, foreign: &ForeignKeyDefinition) -> CompileResult {
        if foreign.on.is_empty() || foreign.references.is_empty() {
            return Err(QueryError::InvalidArgument(format!(
                "Foreign key on [{}] needs a referenced table and columns.",
                foreign.columns.join(", ")
            )));
        }
        let name = foreign.name.clone().unwrap_or_else(|| {
            index_name(self.grammar().table_prefix(), blueprint.table(), &foreign.columns, "foreign")
        });
        let mut sql = format!(
            "constraint {} foreign key ({}) references {} ({})",
            self.grammar().wrap_value(&name),
            self.columnize(&foreign.columns),
            self.wrap_table(&foreign.on),
            self.columnize(&foreign.references)
        );
        if let Some(action) = &foreign.on_delete {
            sql.push_str(&format!(" on delete {}", action));
        }
        if let Some(action) = &foreign.on_update {
            sql.push_str(&format!(" on update {}", action));
        }
        Ok(sql)
    }

    fn compile_index(&self, blueprint: &Blueprint, index: &IndexDefinition) -> String {
        let kind = if index.unique { "unique" } else { "index" };
        let name = index.name.clone().unwrap_or_else(|| {
            index_name(self.grammar().table_prefix(), blueprint.table(), &index.columns, kind)
        });
        format!(
            "create {}index {} on {} ({})",
            if index.unique { "unique " } else { "" },
            self.grammar().wrap_value(&name),
            self.wrap_table(blueprint.table()),
            self.columnize(&index.columns)
        )
    }

    /// `create table` followed by its index statements
    fn compile_create(&self, blueprint: &Blueprint) -> Result<Vec<String>, QueryError> {
        let mut definitions: Vec<String> = blueprint
            .columns()
            .iter()
            .map(|column| self.compile_column(column))
            .collect();
        if let Some(columns) = blueprint.primary_key() {
            definitions.push(format!("primary key ({})", self.columnize(columns)));
        }
        for foreign in blueprint.foreign_keys() {
            definitions.push(self.compile_foreign(blueprint, foreign)?);
        }

        let mut statements = vec![self.compile_create_table(blueprint, &definitions.join(", "))];
        statements.extend(
            blueprint
                .indexes()
                .iter()
                .map(|index| self.compile_index(blueprint, index)),
        );
        Ok(statements)
    }

    fn compile_create_table(&self, blueprint: &Blueprint, definitions: &str) -> String {
        format!("create table {} ({})", self.wrap_table(blueprint.table()), definitions)
    }

    fn compile_drop(&self, table: &str) -> String {
        format!("drop table {}", self.wrap_table(table))
    }

    fn compile_drop_if_exists(&self, table: &str) -> String {
        format!("drop table if exists {}", self.wrap_table(table))
    }

    fn compile_rename(&self, from: &str, to: &str) -> String {
        format!("alter table {} rename to {}", self.wrap_table(from), self.wrap_table(to))
    }
}

/// `varchar(n)`-style helper for the column types most dialects share
pub(crate) fn common_type(column: &ColumnDefinition) -> Option<String> {
    let sql = match column.column_type {
        ColumnType::String(length) => format!("varchar({})", length),
        ColumnType::Decimal { precision, scale } => format!("decimal({}, {})", precision, scale),
        ColumnType::Date => "date".to_string(),
        _ => return None,
    };
    Some(sql)
}

/// The schema grammar for `backend` configured from `config`
pub fn schema_grammar_for(backend: DatabaseBackend, config: &ConnectionConfig) -> Arc<dyn SchemaGrammar> {
    let prefix = config.prefix.clone();
    match backend {
        DatabaseBackend::MySQL => Arc::new(
            MySqlSchemaGrammar::new(MySqlGrammar::new().with_table_prefix(prefix))
                .with_charset(config.charset.clone(), config.collation.clone()),
        ),
        DatabaseBackend::MariaDB => Arc::new(
            MySqlSchemaGrammar::new(MySqlGrammar::mariadb().with_table_prefix(prefix))
                .with_charset(config.charset.clone(), config.collation.clone()),
        ),
        DatabaseBackend::Postgres => Arc::new(
            PostgresSchemaGrammar::new(PostgresGrammar::new().with_table_prefix(prefix))
                .with_charset(config.charset.clone()),
        ),
        DatabaseBackend::SQLite => {
            Arc::new(SQLiteSchemaGrammar::new(SQLiteGrammar::new().with_table_prefix(prefix)))
        }
        DatabaseBackend::SqlServer => Arc::new(SqlServerSchemaGrammar::new(
            SqlServerGrammar::new().with_table_prefix(prefix),
        )),
    }
}
