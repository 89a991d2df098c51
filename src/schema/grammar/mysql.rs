//! MySQL / MariaDB schema grammar

use super::{common_type, SchemaGrammar};
use crate::query::grammar::{CompileResult, Grammar, MySqlGrammar};
use crate::schema::blueprint::{Blueprint, ColumnDefinition, ColumnType};

#[derive(Debug, Clone, Default)]
pub struct MySqlSchemaGrammar {
    grammar: MySqlGrammar,
    charset: Option<String>,
    collation: Option<String>,
}

impl MySqlSchemaGrammar {
    pub fn new(grammar: MySqlGrammar) -> Self {
        Self {
            grammar,
            charset: None,
            collation: None,
        }
    }

    pub fn with_charset(mut self, charset: Option<String>, collation: Option<String>) -> Self {
        self.charset = charset;
        self.collation = collation;
        self
    }

    /// `schema()` unless a schema is named
    fn schema(&self, schema: Option<&str>) -> String {
        schema
            .map(|schema| self.quote_string(schema))
            .unwrap_or_else(|| "schema()".to_string())
    }
}

impl SchemaGrammar for MySqlSchemaGrammar {
    fn grammar(&self) -> &dyn Grammar {
        &self.grammar
    }

    fn compile_create_database(&self, name: &str) -> CompileResult {
        let mut sql = format!("create database {}", self.grammar.wrap_value(name));
        if let Some(charset) = &self.charset {
            sql.push_str(&format!(" default character set {}", self.grammar.wrap_value(charset)));
        }
        if let Some(collation) = &self.collation {
            sql.push_str(&format!(" default collate {}", self.grammar.wrap_value(collation)));
        }
        Ok(sql)
    }

    fn compile_drop_database_if_exists(&self, name: &str) -> CompileResult {
        Ok(format!("drop database if exists {}", self.grammar.wrap_value(name)))
    }

    fn compile_table_exists(&self, schema: Option<&str>, table: &str) -> CompileResult {
        Ok(format!(
            "select exists (select 1 from information_schema.tables where table_schema = {} and table_name = {} and table_type in ('BASE TABLE', 'SYSTEM VERSIONED')) as `exists`",
            self.schema(schema),
            self.quote_string(table)
        ))
    }

    fn compile_tables(&self, schema: Option<&str>) -> CompileResult {
        Ok(format!(
            "select table_name as `name`, table_schema as `schema`, (data_length + index_length) as `size`, \
             table_comment as `comment`, engine as `engine`, table_collation as `collation` \
             from information_schema.tables where table_schema = {} and table_type in ('BASE TABLE', 'SYSTEM VERSIONED') \
             order by table_name",
            self.schema(schema)
        ))
    }

    fn compile_views(&self, schema: Option<&str>) -> CompileResult {
        Ok(format!(
            "select table_name as `name`, table_schema as `schema`, view_definition as `definition` \
             from information_schema.views where table_schema = {} order by table_name",
            self.schema(schema)
        ))
    }

    fn compile_columns(&self, schema: Option<&str>, table: &str) -> CompileResult {
        Ok(format!(
            "select column_name as `name`, data_type as `type_name`, column_type as `type`, \
             collation_name as `collation`, is_nullable as `nullable`, column_default as `default`, \
             column_comment as `comment`, generation_expression as `expression`, extra as `extra` \
             from information_schema.columns where table_schema = {} and table_name = {} \
             order by ordinal_position asc",
            self.schema(schema),
            self.quote_string(table)
        ))
    }

    fn compile_indexes(&self, schema: Option<&str>, table: &str) -> CompileResult {
        Ok(format!(
            "select index_name as `name`, group_concat(column_name order by seq_in_index) as `columns`, \
             index_type as `type`, not non_unique as `unique` \
             from information_schema.statistics where table_schema = {} and table_name = {} \
             group by index_name, index_type, non_unique",
            self.schema(schema),
            self.quote_string(table)
        ))
    }

    fn compile_foreign_keys(&self, schema: Option<&str>, table: &str) -> CompileResult {
        Ok(format!(
            "select kc.constraint_name as `name`, \
             group_concat(kc.column_name order by kc.ordinal_position) as `columns`, \
             kc.referenced_table_schema as `foreign_schema`, kc.referenced_table_name as `foreign_table`, \
             group_concat(kc.referenced_column_name order by kc.ordinal_position) as `foreign_columns`, \
             rc.update_rule as `on_update`, rc.delete_rule as `on_delete` \
             from information_schema.key_column_usage kc join information_schema.referential_constraints rc \
             on kc.constraint_schema = rc.constraint_schema and kc.constraint_name = rc.constraint_name \
             where kc.table_schema = {} and kc.table_name = {} and kc.referenced_table_name is not null \
             group by kc.constraint_name, kc.referenced_table_schema, kc.referenced_table_name, rc.update_rule, rc.delete_rule",
            self.schema(schema),
            self.quote_string(table)
        ))
    }

    fn compile_drop_all_tables(&self, tables: &[String]) -> CompileResult {
        Ok(format!("drop table {}", self.escape_names(tables)))
    }

    fn compile_drop_all_views(&self, views: &[String]) -> CompileResult {
        Ok(format!("drop view {}", self.escape_names(views)))
    }

    fn compile_enable_foreign_key_constraints(&self) -> CompileResult {
        Ok("SET FOREIGN_KEY_CHECKS=1;".to_string())
    }

    fn compile_disable_foreign_key_constraints(&self) -> CompileResult {
        Ok("SET FOREIGN_KEY_CHECKS=0;".to_string())
    }

    fn type_for(&self, column: &ColumnDefinition) -> String {
        if let Some(sql) = common_type(column) {
            return sql;
        }
        match column.column_type {
            ColumnType::Increments | ColumnType::Integer => "int",
            ColumnType::BigIncrements | ColumnType::BigInteger => "bigint",
            ColumnType::Text => "text",
            ColumnType::Boolean => "tinyint(1)",
            ColumnType::Float => "double",
            ColumnType::DateTime => "datetime",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Json => "json",
            ColumnType::Uuid => "char(36)",
            ColumnType::Binary => "blob",
            _ => "text",
        }
        .to_string()
    }

    fn compile_column(&self, column: &ColumnDefinition) -> String {
        let mut sql = vec![self.wrap(&column.name), self.type_for(column)];
        if column.unsigned || column.is_auto_increment() {
            sql.push("unsigned".to_string());
        }
        sql.push(self.compile_nullable(column).to_string());
        sql.extend(self.compile_default(column).map(|default| format!("default {}", default)));
        if column.is_auto_increment() {
            sql.push("auto_increment primary key".to_string());
        } else if column.primary {
            sql.push("primary key".to_string());
        }
        sql.join(" ")
    }

    fn compile_create_table(&self, blueprint: &Blueprint, definitions: &str) -> String {
        let mut sql = format!("create table {} ({})", self.wrap_table(blueprint.table()), definitions);
        if let Some(charset) = &self.charset {
            sql.push_str(&format!(" default character set {}", charset));
        }
        if let Some(collation) = &self.collation {
            sql.push_str(&format!(" collate {}", self.quote_string(collation)));
        }
        sql
    }

    fn compile_rename(&self, from: &str, to: &str) -> String {
        format!("rename table {} to {}", self.wrap_table(from), self.wrap_table(to))
    }
}
