//! PostgreSQL schema grammar

use super::{common_type, SchemaGrammar, TypeDefinition};
use crate::query::grammar::{CompileResult, Grammar, PostgresGrammar};
use crate::schema::blueprint::{ColumnDefinition, ColumnType};

#[derive(Debug, Clone, Default)]
pub struct PostgresSchemaGrammar {
    grammar: PostgresGrammar,
    charset: Option<String>,
}

impl PostgresSchemaGrammar {
    pub fn new(grammar: PostgresGrammar) -> Self {
        Self { grammar, charset: None }
    }

    pub fn with_charset(mut self, charset: Option<String>) -> Self {
        self.charset = charset;
        self
    }

    fn schema(&self, schema: Option<&str>) -> String {
        schema
            .map(|schema| self.quote_string(schema))
            .unwrap_or_else(|| "current_schema()".to_string())
    }

    /// `and <column> = 'schema'` when a schema is named
    fn schema_filter(&self, column: &str, schema: Option<&str>) -> String {
        schema
            .map(|schema| format!(" and {} = {}", column, self.quote_string(schema)))
            .unwrap_or_default()
    }
}

impl SchemaGrammar for PostgresSchemaGrammar {
    fn grammar(&self) -> &dyn Grammar {
        &self.grammar
    }

    fn compile_create_database(&self, name: &str) -> CompileResult {
        Ok(format!(
            "create database {} encoding {}",
            self.grammar.wrap_value(name),
            self.grammar.wrap_value(self.charset.as_deref().unwrap_or("utf8"))
        ))
    }

    fn compile_drop_database_if_exists(&self, name: &str) -> CompileResult {
        Ok(format!("drop database if exists {}", self.grammar.wrap_value(name)))
    }

    fn compile_table_exists(&self, schema: Option<&str>, table: &str) -> CompileResult {
        Ok(format!(
            "select exists (select 1 from pg_class c, pg_namespace n where n.nspname = {} and c.relname = {} \
             and c.relkind in ('r', 'p') and n.oid = c.relnamespace) as \"exists\"",
            self.schema(schema),
            self.quote_string(table)
        ))
    }

    fn compile_tables(&self, schema: Option<&str>) -> CompileResult {
        Ok(format!(
            "select c.relname as name, n.nspname as schema, pg_total_relation_size(c.oid) as size, \
             obj_description(c.oid, 'pg_class') as comment from pg_class c, pg_namespace n \
             where c.relkind in ('r', 'p') and n.oid = c.relnamespace \
             and n.nspname not in ('pg_catalog', 'information_schema'){} order by c.relname",
            self.schema_filter("n.nspname", schema)
        ))
    }

    fn compile_views(&self, schema: Option<&str>) -> CompileResult {
        Ok(format!(
            "select viewname as name, schemaname as schema, definition from pg_views \
             where schemaname not in ('pg_catalog', 'information_schema'){} order by viewname",
            self.schema_filter("schemaname", schema)
        ))
    }

    fn compile_types(&self, schema: Option<&str>) -> CompileResult {
        Ok(format!(
            "select t.typname as name, n.nspname as schema, t.typtype as type, t.typcategory as category, \
             ((t.typinput = 'array_in'::regproc and t.typoutput = 'array_out'::regproc) or t.typtype = 'm') as implicit \
             from pg_type t join pg_namespace n on n.oid = t.typnamespace \
             left join pg_class c on c.oid = t.typrelid \
             left join pg_type el on el.oid = t.typelem \
             left join pg_class ce on ce.oid = el.typrelid \
             where ((t.typrelid = 0 and (ce.relkind = 'c' or ce.relkind is null)) or c.relkind = 'c') \
             and not exists (select 1 from pg_depend d where d.objid in (t.oid, t.typelem) and d.deptype = 'e') \
             and n.nspname not in ('pg_catalog', 'information_schema'){}",
            self.schema_filter("n.nspname", schema)
        ))
    }

    fn compile_columns(&self, schema: Option<&str>, table: &str) -> CompileResult {
        Ok(format!(
            "select a.attname as name, t.typname as type_name, format_type(a.atttypid, a.atttypmod) as type, \
             (select tc.collcollate from pg_catalog.pg_collation tc where tc.oid = a.attcollation) as collation, \
             not a.attnotnull as nullable, \
             (select pg_get_expr(adbin, adrelid) from pg_attrdef where c.oid = pg_attrdef.adrelid and pg_attrdef.adnum = a.attnum) as default, \
             a.attgenerated as generated, col_description(c.oid, a.attnum) as comment \
             from pg_attribute a, pg_class c, pg_type t, pg_namespace n \
             where c.relname = {} and n.nspname = {} and a.attnum > 0 and a.attrelid = c.oid \
             and a.atttypid = t.oid and n.oid = c.relnamespace and not a.attisdropped \
             order by a.attnum",
            self.quote_string(table),
            self.schema(schema)
        ))
    }

    fn compile_indexes(&self, schema: Option<&str>, table: &str) -> CompileResult {
        Ok(format!(
            "select ic.relname as name, string_agg(a.attname, ',' order by indseq.ord) as columns, \
             am.amname as \"type\", i.indisunique as \"unique\", i.indisprimary as \"primary\" \
             from pg_index i \
             join pg_class tc on tc.oid = i.indrelid \
             join pg_namespace tn on tn.oid = tc.relnamespace \
             join pg_class ic on ic.oid = i.indexrelid \
             join pg_am am on am.oid = ic.relam \
             join lateral unnest(i.indkey) with ordinality as indseq(num, ord) on true \
             left join pg_attribute a on a.attrelid = i.indrelid and a.attnum = indseq.num \
             where tc.relname = {} and tn.nspname = {} \
             group by ic.relname, am.amname, i.indisunique, i.indisprimary",
            self.quote_string(table),
            self.schema(schema)
        ))
    }

    fn compile_foreign_keys(&self, schema: Option<&str>, table: &str) -> CompileResult {
        Ok(format!(
            "select c.conname as name, string_agg(la.attname, ',' order by conseq.ord) as columns, \
             fn.nspname as foreign_schema, fc.relname as foreign_table, \
             string_agg(fa.attname, ',' order by conseq.ord) as foreign_columns, \
             c.confupdtype as on_update, c.confdeltype as on_delete \
             from pg_constraint c \
             join pg_class tc on c.conrelid = tc.oid \
             join pg_namespace tn on tn.oid = tc.relnamespace \
             join pg_class fc on c.confrelid = fc.oid \
             join pg_namespace fn on fn.oid = fc.relnamespace \
             join lateral unnest(c.conkey) with ordinality as conseq(num, ord) on true \
             join pg_attribute la on la.attrelid = c.conrelid and la.attnum = conseq.num \
             join pg_attribute fa on fa.attrelid = c.confrelid and fa.attnum = c.confkey[conseq.ord] \
             where c.contype = 'f' and tc.relname = {} and tn.nspname = {} \
             group by c.conname, fn.nspname, fc.relname, c.confupdtype, c.confdeltype",
            self.quote_string(table),
            self.schema(schema)
        ))
    }

    fn compile_drop_all_tables(&self, tables: &[String]) -> CompileResult {
        Ok(format!("drop table {} cascade", self.escape_names(tables)))
    }

    fn compile_drop_all_views(&self, views: &[String]) -> CompileResult {
        Ok(format!("drop view {} cascade", self.escape_names(views)))
    }

    fn compile_drop_all_types(&self, types: &[String]) -> CompileResult {
        Ok(format!("drop type {} cascade", self.escape_names(types)))
    }

    fn compile_drop_all_domains(&self, domains: &[String]) -> CompileResult {
        Ok(format!("drop domain {} cascade", self.escape_names(domains)))
    }

    fn compile_create_type(&self, name: &str, definition: &TypeDefinition) -> CompileResult {
        let name = self.escape_names(&[name.to_string()]);
        match definition {
            TypeDefinition::Enum(labels) => Ok(format!(
                "create type {} as enum ({})",
                name,
                labels
                    .iter()
                    .map(|label| self.quote_string(label))
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
            TypeDefinition::Alias(base) => Ok(format!("create domain {} as {}", name, base)),
        }
    }

    fn compile_enable_foreign_key_constraints(&self) -> CompileResult {
        Ok("SET CONSTRAINTS ALL IMMEDIATE;".to_string())
    }

    fn compile_disable_foreign_key_constraints(&self) -> CompileResult {
        Ok("SET CONSTRAINTS ALL DEFERRED;".to_string())
    }

    fn type_for(&self, column: &ColumnDefinition) -> String {
        if let Some(sql) = common_type(column) {
            return sql;
        }
        match column.column_type {
            ColumnType::Increments => "serial",
            ColumnType::BigIncrements => "bigserial",
            ColumnType::Integer if column.auto_increment => "serial",
            ColumnType::BigInteger if column.auto_increment => "bigserial",
            ColumnType::Integer => "integer",
            ColumnType::BigInteger => "bigint",
            ColumnType::Text => "text",
            ColumnType::Boolean => "boolean",
            ColumnType::Float => "double precision",
            ColumnType::DateTime | ColumnType::Timestamp => "timestamp(0) without time zone",
            ColumnType::Json => "json",
            ColumnType::Uuid => "uuid",
            ColumnType::Binary => "bytea",
            _ => "text",
        }
        .to_string()
    }
}
