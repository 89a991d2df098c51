//! Schema inspection and DDL
//!
//! [`SchemaBuilder`] is the entry point, usually obtained from
//! [`Connection::schema`](crate::database::Connection::schema).

pub mod blueprint;
pub mod builder;
pub mod grammar;
pub mod info;
pub mod processor;

pub use blueprint::{Blueprint, ColumnDefinition, ColumnType, DefaultValue, ForeignKeyDefinition, IndexDefinition};
pub use builder::{parse_schema_and_table, SchemaBuilder};
pub use grammar::{
    schema_grammar_for, MySqlSchemaGrammar, PostgresSchemaGrammar, SQLiteSchemaGrammar, SchemaGrammar,
    SqlServerSchemaGrammar, TypeDefinition,
};
pub use info::{ColumnInfo, ForeignKeyInfo, Generation, IndexInfo, TableInfo, TypeInfo, ViewInfo};
pub use processor::Processor;
