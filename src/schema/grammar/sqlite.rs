//! SQLite schema grammar
//!
//! Introspection goes through the `pragma_*` table-valued functions. SQLite
//! databases are files, so creating and dropping them is left to the schema
//! builder.

use super::SchemaGrammar;
use crate::query::grammar::{CompileResult, Grammar, SQLiteGrammar};
use crate::schema::blueprint::{ColumnDefinition, ColumnType};

#[derive(Debug, Clone, Default)]
pub struct SQLiteSchemaGrammar {
    grammar: SQLiteGrammar,
}

impl SQLiteSchemaGrammar {
    pub fn new(grammar: SQLiteGrammar) -> Self {
        Self { grammar }
    }

    /// One `drop <kind> if exists` per name, run as a single script
    fn drop_each(&self, kind: &str, names: &[String]) -> String {
        names
            .iter()
            .map(|name| format!("drop {} if exists {}", kind, self.escape_names(&[name.clone()])))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl SchemaGrammar for SQLiteSchemaGrammar {
    fn grammar(&self) -> &dyn Grammar {
        &self.grammar
    }

    fn compile_table_exists(&self, _schema: Option<&str>, table: &str) -> CompileResult {
        Ok(format!(
            "select exists (select 1 from sqlite_master where name = {} and type = 'table') as \"exists\"",
            self.quote_string(table)
        ))
    }

    fn compile_tables(&self, _schema: Option<&str>) -> CompileResult {
        Ok("select name from sqlite_master where type = 'table' and name not like 'sqlite_%' order by name".to_string())
    }

    fn compile_views(&self, _schema: Option<&str>) -> CompileResult {
        Ok("select name, sql as definition from sqlite_master where type = 'view' order by name".to_string())
    }

    fn compile_columns(&self, _schema: Option<&str>, table: &str) -> CompileResult {
        Ok(format!(
            "select name, type, not \"notnull\" as \"nullable\", dflt_value as \"default\", pk as \"primary\", hidden as \"extra\" \
             from pragma_table_xinfo({}) order by cid asc",
            self.quote_string(table)
        ))
    }

    fn compile_indexes(&self, _schema: Option<&str>, table: &str) -> CompileResult {
        let table = self.quote_string(table);
        Ok(format!(
            "select 'primary' as name, group_concat(col) as columns, 1 as \"unique\", 1 as \"primary\" \
             from (select name as col from pragma_table_info({table}) where pk > 0 order by pk, cid) group by name \
             union select name, group_concat(col) as columns, \"unique\", origin = 'pk' as \"primary\" \
             from (select il.*, ii.name as col from pragma_index_list({table}) il, pragma_index_info(il.name) ii order by il.seq, ii.seqno) \
             group by name, \"unique\", \"primary\"",
            table = table
        ))
    }

    fn compile_foreign_keys(&self, _schema: Option<&str>, table: &str) -> CompileResult {
        Ok(format!(
            "select group_concat(\"from\") as columns, \"table\" as foreign_table, group_concat(\"to\") as foreign_columns, \
             on_update, on_delete from (select * from pragma_foreign_key_list({}) order by id desc, seq) \
             group by id, \"table\", on_update, on_delete",
            self.quote_string(table)
        ))
    }

    fn compile_drop_all_tables(&self, tables: &[String]) -> CompileResult {
        Ok(self.drop_each("table", tables))
    }

    fn compile_drop_all_views(&self, views: &[String]) -> CompileResult {
        Ok(self.drop_each("view", views))
    }

    fn compile_enable_foreign_key_constraints(&self) -> CompileResult {
        Ok("PRAGMA foreign_keys = ON;".to_string())
    }

    fn compile_disable_foreign_key_constraints(&self) -> CompileResult {
        Ok("PRAGMA foreign_keys = OFF;".to_string())
    }

    fn type_for(&self, column: &ColumnDefinition) -> String {
        match column.column_type {
            ColumnType::Increments
            | ColumnType::BigIncrements
            | ColumnType::Integer
            | ColumnType::BigInteger => "integer",
            ColumnType::String(_) | ColumnType::Uuid => "varchar",
            ColumnType::Text | ColumnType::Json => "text",
            ColumnType::Boolean => "tinyint(1)",
            ColumnType::Decimal { .. } => "numeric",
            ColumnType::Float => "double",
            ColumnType::Date => "date",
            ColumnType::DateTime | ColumnType::Timestamp => "datetime",
            ColumnType::Binary => "blob",
        }
        .to_string()
    }

    /// Row id aliases need `integer primary key` with the key right after the type
    fn compile_column(&self, column: &ColumnDefinition) -> String {
        let mut sql = vec![self.wrap(&column.name), self.type_for(column)];
        if column.is_auto_increment() {
            sql.push("primary key autoincrement".to_string());
        } else if column.primary {
            sql.push("primary key".to_string());
        }
        sql.push(self.compile_nullable(column).to_string());
        sql.extend(self.compile_default(column).map(|default| format!("default {}", default)));
        sql.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_all_views_is_one_script() {
        let grammar = SQLiteSchemaGrammar::new(SQLiteGrammar::new());
        assert_eq!(
            grammar
                .compile_drop_all_views(&["active_users".into(), "totals".into()])
                .unwrap(),
            "drop view if exists \"active_users\"; drop view if exists \"totals\""
        );
    }

    #[test]
    fn test_databases_are_files() {
        let grammar = SQLiteSchemaGrammar::new(SQLiteGrammar::new());
        assert!(grammar.compile_create_database("app.sqlite").is_err());
    }
}
