//! SQL Server schema grammar
//!
//! Catalog queries read `sys.*` views and return comma-joined column lists.
//! Bulk drops are a single `sp_executesql` batch assembled by the server from
//! the catalog, so the names collected by the builder only gate the call.

use super::{SchemaGrammar, TypeDefinition};
use crate::query::grammar::{CompileResult, Grammar, SqlServerGrammar};
use crate::schema::blueprint::{ColumnDefinition, ColumnType};

#[derive(Debug, Clone, Default)]
pub struct SqlServerSchemaGrammar {
    grammar: SqlServerGrammar,
}

/// Wrap a `SELECT @sql += ...` statement in the dynamic SQL batch
fn batch(statements: &[&str]) -> String {
    format!(
        "DECLARE @sql NVARCHAR(MAX) = N'';\n{}\nEXEC sp_executesql @sql;",
        statements.join("\n")
    )
}

const DROP_FOREIGN_KEYS: &str = "SELECT @sql += 'ALTER TABLE ' + QUOTENAME(OBJECT_SCHEMA_NAME(parent_object_id)) + '.' + QUOTENAME(OBJECT_NAME(parent_object_id)) + ' DROP CONSTRAINT ' + QUOTENAME(name) + ';' FROM sys.foreign_keys;";
const DROP_TABLES: &str = "SELECT @sql += 'DROP TABLE ' + QUOTENAME(OBJECT_SCHEMA_NAME(object_id)) + '.' + QUOTENAME(name) + ';' FROM sys.tables;";
const DROP_VIEWS: &str = "SELECT @sql += 'DROP VIEW ' + QUOTENAME(OBJECT_SCHEMA_NAME(object_id)) + '.' + QUOTENAME(name) + ';' FROM sys.views;";
const DROP_TYPES: &str = "SELECT @sql += 'DROP TYPE ' + QUOTENAME(SCHEMA_NAME(schema_id)) + '.' + QUOTENAME(name) + ';' FROM sys.types WHERE is_user_defined = 1;";

impl SqlServerSchemaGrammar {
    pub fn new(grammar: SqlServerGrammar) -> Self {
        Self { grammar }
    }

    fn schema(&self, schema: Option<&str>) -> String {
        schema
            .map(|schema| self.quote_string(schema))
            .unwrap_or_else(|| "schema_name()".to_string())
    }

    fn schema_filter(&self, column: &str, schema: Option<&str>) -> String {
        schema
            .map(|schema| format!(" where {} = {}", column, self.quote_string(schema)))
            .unwrap_or_default()
    }
}

impl SchemaGrammar for SqlServerSchemaGrammar {
    fn grammar(&self) -> &dyn Grammar {
        &self.grammar
    }

    fn compile_create_database(&self, name: &str) -> CompileResult {
        Ok(format!("create database {}", self.grammar.wrap_value(name)))
    }

    fn compile_drop_database_if_exists(&self, name: &str) -> CompileResult {
        Ok(format!("drop database if exists {}", self.grammar.wrap_value(name)))
    }

    fn compile_table_exists(&self, schema: Option<&str>, table: &str) -> CompileResult {
        let object = match schema {
            Some(schema) => format!("{}.{}", schema, table),
            None => table.to_string(),
        };
        Ok(format!(
            "select (case when object_id({}, 'U') is null then 0 else 1 end) as [exists]",
            self.quote_string(&object)
        ))
    }

    fn compile_tables(&self, schema: Option<&str>) -> CompileResult {
        Ok(format!(
            "select t.name as name, schema_name(t.schema_id) as [schema], sum(u.total_pages) * 8 * 1024 as size \
             from sys.tables as t \
             join sys.partitions as p on p.object_id = t.object_id \
             join sys.allocation_units as u on u.container_id = p.hobt_id{} \
             group by t.name, t.schema_id order by t.name",
            self.schema_filter("schema_name(t.schema_id)", schema)
        ))
    }

    fn compile_views(&self, schema: Option<&str>) -> CompileResult {
        Ok(format!(
            "select name, schema_name(v.schema_id) as [schema], definition from sys.views as v \
             inner join sys.sql_modules as m on v.object_id = m.object_id{} order by name",
            self.schema_filter("schema_name(v.schema_id)", schema)
        ))
    }

    fn compile_types(&self, schema: Option<&str>) -> CompileResult {
        let filter = schema
            .map(|schema| format!(" and schema_name(t.schema_id) = {}", self.quote_string(schema)))
            .unwrap_or_default();
        Ok(format!(
            "select t.name as name, schema_name(t.schema_id) as [schema], type_name(t.system_type_id) as [type], \
             null as category, 0 as implicit from sys.types as t where t.is_user_defined = 1{} order by t.name",
            filter
        ))
    }

    fn compile_columns(&self, schema: Option<&str>, table: &str) -> CompileResult {
        Ok(format!(
            "select col.name, type.name as type_name, col.max_length as length, col.precision as precision, \
             col.scale as places, col.is_nullable as nullable, def.definition as [default], \
             col.is_identity as autoincrement, col.collation_name as collation, com.definition as [expression], \
             is_persisted as [persisted], cast(prop.value as nvarchar(max)) as comment \
             from sys.columns as col \
             join sys.types as type on col.user_type_id = type.user_type_id \
             join sys.objects as obj on col.object_id = obj.object_id \
             join sys.schemas as scm on obj.schema_id = scm.schema_id \
             left join sys.default_constraints def on col.default_object_id = def.object_id and col.object_id = def.parent_object_id \
             left join sys.extended_properties as prop on obj.object_id = prop.major_id and col.column_id = prop.minor_id and prop.name = 'MS_Description' \
             left join sys.computed_columns as com on col.column_id = com.column_id and col.object_id = com.object_id \
             where obj.type in ('U', 'V') and obj.name = {} and scm.name = {} \
             order by col.column_id",
            self.quote_string(table),
            self.schema(schema)
        ))
    }

    fn compile_indexes(&self, schema: Option<&str>, table: &str) -> CompileResult {
        Ok(format!(
            "select idx.name as name, string_agg(col.name, ',') within group (order by idxcol.key_ordinal) as columns, \
             idx.type_desc as [type], idx.is_unique as [unique], idx.is_primary_key as [primary] \
             from sys.indexes as idx \
             join sys.tables as tbl on idx.object_id = tbl.object_id \
             join sys.schemas as scm on tbl.schema_id = scm.schema_id \
             join sys.index_columns as idxcol on idx.object_id = idxcol.object_id and idx.index_id = idxcol.index_id \
             join sys.columns as col on idxcol.object_id = col.object_id and idxcol.column_id = col.column_id \
             where tbl.name = {} and scm.name = {} \
             group by idx.name, idx.type_desc, idx.is_unique, idx.is_primary_key",
            self.quote_string(table),
            self.schema(schema)
        ))
    }

    fn compile_foreign_keys(&self, schema: Option<&str>, table: &str) -> CompileResult {
        Ok(format!(
            "select fk.name as name, \
             string_agg(lc.name, ',') within group (order by fkc.constraint_column_id) as columns, \
             fs.name as foreign_schema, ft.name as foreign_table, \
             string_agg(fc.name, ',') within group (order by fkc.constraint_column_id) as foreign_columns, \
             fk.update_referential_action_desc as on_update, fk.delete_referential_action_desc as on_delete \
             from sys.foreign_keys as fk \
             join sys.foreign_key_columns as fkc on fkc.constraint_object_id = fk.object_id \
             join sys.tables as lt on lt.object_id = fk.parent_object_id \
             join sys.schemas as ls on lt.schema_id = ls.schema_id \
             join sys.columns as lc on fkc.parent_object_id = lc.object_id and fkc.parent_column_id = lc.column_id \
             join sys.tables as ft on ft.object_id = fk.referenced_object_id \
             join sys.schemas as fs on ft.schema_id = fs.schema_id \
             join sys.columns as fc on fkc.referenced_object_id = fc.object_id and fkc.referenced_column_id = fc.column_id \
             where lt.name = {} and ls.name = {} \
             group by fk.name, fs.name, ft.name, fk.update_referential_action_desc, fk.delete_referential_action_desc",
            self.quote_string(table),
            self.schema(schema)
        ))
    }

    /// Foreign keys go first so tables drop in any order
    fn compile_drop_all_tables(&self, _tables: &[String]) -> CompileResult {
        Ok(batch(&[DROP_FOREIGN_KEYS, DROP_TABLES]))
    }

    fn compile_drop_all_views(&self, _views: &[String]) -> CompileResult {
        Ok(batch(&[DROP_VIEWS]))
    }

    fn compile_drop_all_types(&self, _types: &[String]) -> CompileResult {
        Ok(batch(&[DROP_TYPES]))
    }

    fn compile_create_type(&self, name: &str, definition: &TypeDefinition) -> CompileResult {
        match definition {
            TypeDefinition::Alias(base) => Ok(format!(
                "create type {} from {}",
                self.escape_names(&[name.to_string()]),
                base
            )),
            TypeDefinition::Enum(_) => Err(self.unsupported("enum types")),
        }
    }

    fn compile_enable_foreign_key_constraints(&self) -> CompileResult {
        Ok("EXEC sp_msforeachtable @command1=\"print '?'\", @command2=\"ALTER TABLE ? WITH CHECK CHECK CONSTRAINT all\";".to_string())
    }

    fn compile_disable_foreign_key_constraints(&self) -> CompileResult {
        Ok("EXEC sp_msforeachtable \"ALTER TABLE ? NOCHECK CONSTRAINT all\";".to_string())
    }

    fn type_for(&self, column: &ColumnDefinition) -> String {
        match column.column_type {
            ColumnType::Increments | ColumnType::Integer => "int".to_string(),
            ColumnType::BigIncrements | ColumnType::BigInteger => "bigint".to_string(),
            ColumnType::String(length) => format!("nvarchar({})", length),
            ColumnType::Text | ColumnType::Json => "nvarchar(max)".to_string(),
            ColumnType::Boolean => "bit".to_string(),
            ColumnType::Decimal { precision, scale } => format!("decimal({}, {})", precision, scale),
            ColumnType::Float => "float".to_string(),
            ColumnType::Date => "date".to_string(),
            ColumnType::DateTime | ColumnType::Timestamp => "datetime".to_string(),
            ColumnType::Uuid => "uniqueidentifier".to_string(),
            ColumnType::Binary => "varbinary(max)".to_string(),
        }
    }

    fn compile_column(&self, column: &ColumnDefinition) -> String {
        let mut sql = vec![
            self.wrap(&column.name),
            self.type_for(column),
            self.compile_nullable(column).to_string(),
        ];
        sql.extend(self.compile_default(column).map(|default| format!("default {}", default)));
        if column.is_auto_increment() {
            sql.push("identity primary key".to_string());
        } else if column.primary {
            sql.push("primary key".to_string());
        }
        sql.join(" ")
    }

    fn compile_drop_if_exists(&self, table: &str) -> String {
        let wrapped = self.wrap_table(table);
        format!(
            "if object_id({}, 'U') is not null drop table {}",
            self.quote_string(&wrapped),
            wrapped
        )
    }

    fn compile_rename(&self, from: &str, to: &str) -> String {
        format!(
            "sp_rename {}, {}",
            self.quote_string(&self.wrap_table(from)),
            self.wrap_table(to)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_all_tables_batch() {
        let grammar = SqlServerSchemaGrammar::new(SqlServerGrammar::new());
        let sql = grammar.compile_drop_all_tables(&["users".into()]).unwrap();
        assert!(sql.starts_with("DECLARE @sql NVARCHAR(MAX) = N'';\n"));
        assert!(sql.contains("FROM sys.foreign_keys;\nSELECT @sql += 'DROP TABLE '"));
        assert!(sql.ends_with("EXEC sp_executesql @sql;"));
    }

    #[test]
    fn test_alias_type() {
        let grammar = SqlServerSchemaGrammar::new(SqlServerGrammar::new());
        assert_eq!(
            grammar
                .compile_create_type("Phone", &TypeDefinition::Alias("varchar(20) not null".into()))
                .unwrap(),
            "create type [Phone] from varchar(20) not null"
        );
        assert!(grammar
            .compile_create_type("mood", &TypeDefinition::Enum(vec!["sad".into()]))
            .is_err());
    }

    #[test]
    fn test_table_exists_with_schema() {
        let grammar = SqlServerSchemaGrammar::new(SqlServerGrammar::new());
        assert_eq!(
            grammar.compile_table_exists(Some("dbo"), "users").unwrap(),
            "select (case when object_id('dbo.users', 'U') is null then 0 else 1 end) as [exists]"
        );
    }
}
