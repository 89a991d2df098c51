//! Schema operations against a connection
//!
//! Statements come from the connection's [`SchemaGrammar`]; catalog rows are
//! normalized through a [`Processor`] before they are returned.

use super::blueprint::Blueprint;
use super::grammar::{SchemaGrammar, TypeDefinition};
use super::info::{ColumnInfo, ForeignKeyInfo, IndexInfo, TableInfo, TypeInfo, ViewInfo};
use super::processor::Processor;
use crate::database::config::SearchPath;
use crate::database::connectors::parse_search_path;
use crate::database::Connection;
use crate::error::{Error, Result};
use crate::query::DatabaseBackend;
use serde_json::Value as JsonValue;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

/// Split `"schema.table"`; a bare name has no schema
pub fn parse_schema_and_table(reference: &str) -> (Option<&str>, &str) {
    match reference.split_once('.') {
        Some((schema, table)) => (Some(schema), table),
        None => (None, reference),
    }
}

fn truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        JsonValue::String(s) => !s.is_empty() && s != "0",
        _ => false,
    }
}

#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    connection: Connection,
    grammar: Arc<dyn SchemaGrammar>,
    processor: Processor,
}

impl SchemaBuilder {
    pub fn new(connection: Connection) -> Self {
        let grammar = connection.schema_grammar();
        let processor = Processor::new(connection.backend());
        Self {
            connection,
            grammar,
            processor,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn grammar(&self) -> &Arc<dyn SchemaGrammar> {
        &self.grammar
    }

    fn backend(&self) -> DatabaseBackend {
        self.connection.backend()
    }

    fn prefixed(&self, table: &str) -> String {
        format!("{}{}", self.connection.table_prefix(), table)
    }

    /// Schemas on the PostgreSQL search path, `$user` resolved to the username
    fn search_path(&self) -> Vec<String> {
        let config = self.connection.config();
        let default = SearchPath::from("public");
        let schemas = parse_search_path(config.search_path.as_ref().unwrap_or(&default));
        let schemas: Vec<String> = schemas
            .into_iter()
            .map(|schema| match (schema.as_str(), &config.username) {
                ("$user", Some(username)) => username.clone(),
                _ => schema,
            })
            .collect();
        if schemas.is_empty() {
            vec!["public".to_string()]
        } else {
            schemas
        }
    }

    /// The schema unqualified names resolve to
    ///
    /// PostgreSQL reports the first search path entry; other engines use the
    /// connection's current database and return `None`.
    pub fn default_schema(&self) -> Option<String> {
        match self.backend() {
            DatabaseBackend::Postgres => self.search_path().into_iter().next(),
            _ => None,
        }
    }

    /// Schema for an optionally qualified reference, falling back to the default
    fn schema_for(&self, schema: Option<&str>) -> Option<String> {
        schema.map(str::to_string).or_else(|| self.default_schema())
    }

    async fn select(&self, sql: String) -> Result<Vec<JsonValue>> {
        self.connection.select(&sql, Vec::new()).await
    }

    async fn run(&self, sql: String) -> Result<bool> {
        self.connection.statement(&sql, Vec::new()).await
    }

    // Databases

    /// Create a database; for SQLite this creates an empty file at `name`
    pub async fn create_database(&self, name: &str) -> Result<bool> {
        if self.backend() == DatabaseBackend::SQLite {
            tokio::fs::File::create(name).await?;
            return Ok(true);
        }
        self.run(self.grammar.compile_create_database(name)?).await
    }

    /// Drop a database; for SQLite this removes the file at `name`
    pub async fn drop_database_if_exists(&self, name: &str) -> Result<bool> {
        if self.backend() == DatabaseBackend::SQLite {
            if !Path::new(name).exists() {
                return Ok(true);
            }
            tokio::fs::remove_file(name).await?;
            return Ok(true);
        }
        self.run(self.grammar.compile_drop_database_if_exists(name)?).await
    }

    // Tables

    pub async fn has_table(&self, table: &str) -> Result<bool> {
        let (schema, table) = parse_schema_and_table(table);
        let schema = self.schema_for(schema);
        let sql = self
            .grammar
            .compile_table_exists(schema.as_deref(), &self.prefixed(table))?;
        let value = self.connection.scalar(&sql, Vec::new()).await?;
        Ok(value.as_ref().map_or(false, truthy))
    }

    pub async fn get_tables(&self, schema: Option<&str>) -> Result<Vec<TableInfo>> {
        let rows = self.select(self.grammar.compile_tables(schema)?).await?;
        Ok(self.processor.tables(&rows))
    }

    /// Table names, `schema.name` when `schema_qualified` and the engine reports one
    pub async fn get_table_listing(&self, schema: Option<&str>, schema_qualified: bool) -> Result<Vec<String>> {
        Ok(self
            .get_tables(schema)
            .await?
            .into_iter()
            .map(|table| match (schema_qualified, table.schema) {
                (true, Some(schema)) => format!("{}.{}", schema, table.name),
                _ => table.name,
            })
            .collect())
    }

    pub async fn has_view(&self, view: &str) -> Result<bool> {
        let (schema, view) = parse_schema_and_table(view);
        let view = self.prefixed(view).to_lowercase();
        Ok(self
            .get_views(schema)
            .await?
            .iter()
            .any(|candidate| candidate.name.to_lowercase() == view))
    }

    pub async fn get_views(&self, schema: Option<&str>) -> Result<Vec<ViewInfo>> {
        let rows = self.select(self.grammar.compile_views(schema)?).await?;
        Ok(self.processor.views(&rows))
    }

    pub async fn has_type(&self, name: &str) -> Result<bool> {
        let (schema, name) = parse_schema_and_table(name);
        let name = name.to_lowercase();
        Ok(self
            .get_types(schema)
            .await?
            .iter()
            .any(|candidate| candidate.name.to_lowercase() == name))
    }

    pub async fn get_types(&self, schema: Option<&str>) -> Result<Vec<TypeInfo>> {
        let rows = self.select(self.grammar.compile_types(schema)?).await?;
        Ok(self.processor.types(&rows))
    }

    // Columns, indexes, foreign keys

    pub async fn get_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let (schema, table) = parse_schema_and_table(table);
        let schema = self.schema_for(schema);
        let sql = self
            .grammar
            .compile_columns(schema.as_deref(), &self.prefixed(table))?;
        let rows = self.select(sql).await?;
        Ok(self.processor.columns(&rows))
    }

    pub async fn get_column_listing(&self, table: &str) -> Result<Vec<String>> {
        Ok(self
            .get_columns(table)
            .await?
            .into_iter()
            .map(|column| column.name)
            .collect())
    }

    pub async fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        self.has_columns(table, &[column]).await
    }

    /// Whether every one of `columns` exists, compared case-insensitively
    pub async fn has_columns(&self, table: &str, columns: &[&str]) -> Result<bool> {
        let listing: Vec<String> = self
            .get_column_listing(table)
            .await?
            .into_iter()
            .map(|name| name.to_lowercase())
            .collect();
        Ok(columns
            .iter()
            .all(|column| listing.contains(&column.to_lowercase())))
    }

    /// The column's type name, or its full type with `full_definition`
    pub async fn get_column_type(&self, table: &str, column: &str, full_definition: bool) -> Result<String> {
        let wanted = column.to_lowercase();
        self.get_columns(table)
            .await?
            .into_iter()
            .find(|info| info.name.to_lowercase() == wanted)
            .map(|info| if full_definition { info.full_type } else { info.type_name })
            .ok_or_else(|| {
                Error::not_found(format!(
                    "There is no column with name '{}' on table '{}'.",
                    column, table
                ))
            })
    }

    pub async fn get_indexes(&self, table: &str) -> Result<Vec<IndexInfo>> {
        let (schema, table) = parse_schema_and_table(table);
        let schema = self.schema_for(schema);
        let sql = self
            .grammar
            .compile_indexes(schema.as_deref(), &self.prefixed(table))?;
        let rows = self.select(sql).await?;
        Ok(self.processor.indexes(&rows))
    }

    /// Look an index up by name, or by its comma-separated column list
    pub async fn has_index(&self, table: &str, index: &str) -> Result<bool> {
        let wanted = index.to_lowercase();
        let columns: Vec<String> = wanted.split(',').map(|c| c.trim().to_string()).collect();
        Ok(self.get_indexes(table).await?.iter().any(|info| {
            info.name == wanted
                || info
                    .columns
                    .iter()
                    .map(|c| c.to_lowercase())
                    .eq(columns.iter().cloned())
        }))
    }

    pub async fn get_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyInfo>> {
        let (schema, table) = parse_schema_and_table(table);
        let schema = self.schema_for(schema);
        let sql = self
            .grammar
            .compile_foreign_keys(schema.as_deref(), &self.prefixed(table))?;
        let rows = self.select(sql).await?;
        Ok(self.processor.foreign_keys(&rows))
    }

    // Bulk drops

    /// Names to drop; PostgreSQL keeps to the search path and qualifies each name
    fn droppable<I>(&self, items: I) -> Vec<String>
    where
        I: IntoIterator<Item = (String, Option<String>)>,
    {
        match self.backend() {
            DatabaseBackend::Postgres => {
                let schemas = self.search_path();
                items
                    .into_iter()
                    .filter_map(|(name, schema)| {
                        let schema = schema?;
                        schemas
                            .contains(&schema)
                            .then(|| format!("{}.{}", schema, name))
                    })
                    .collect()
            }
            _ => items.into_iter().map(|(name, _)| name).collect(),
        }
    }

    async fn run_script(&self, sql: String) -> Result<()> {
        match self.backend() {
            DatabaseBackend::SqlServer | DatabaseBackend::SQLite => {
                self.connection.unprepared(&sql).await?;
            }
            _ => {
                self.run(sql).await?;
            }
        }
        Ok(())
    }

    pub async fn drop_all_tables(&self) -> Result<()> {
        let tables = self.get_tables(None).await?;
        let names = self.droppable(tables.into_iter().map(|t| (t.name, t.schema)));
        if names.is_empty() {
            return Ok(());
        }
        log::info!("Dropping {} tables on [{}]", names.len(), self.connection.name());
        self.run_script(self.grammar.compile_drop_all_tables(&names)?).await
    }

    pub async fn drop_all_views(&self) -> Result<()> {
        let views = self.get_views(None).await?;
        let names = self.droppable(views.into_iter().map(|v| (v.name, v.schema)));
        if names.is_empty() {
            return Ok(());
        }
        self.run_script(self.grammar.compile_drop_all_views(&names)?).await
    }

    /// Drop user-defined types; PostgreSQL domains are dropped separately
    pub async fn drop_all_types(&self) -> Result<()> {
        let types: Vec<TypeInfo> = self
            .get_types(None)
            .await?
            .into_iter()
            .filter(|info| !info.implicit)
            .collect();
        let (domains, types): (Vec<TypeInfo>, Vec<TypeInfo>) =
            types.into_iter().partition(|info| info.kind == "domain");

        let types = self.droppable(types.into_iter().map(|t| (t.name, t.schema)));
        if !types.is_empty() {
            self.run_script(self.grammar.compile_drop_all_types(&types)?).await?;
        }
        let domains = self.droppable(domains.into_iter().map(|d| (d.name, d.schema)));
        if !domains.is_empty() {
            self.run_script(self.grammar.compile_drop_all_domains(&domains)?).await?;
        }
        Ok(())
    }

    // Views and types

    /// Create a view over a select statement
    pub async fn create_view(&self, name: &str, definition: &str) -> Result<bool> {
        self.run(self.grammar.compile_create_view(name, definition)?).await
    }

    pub async fn create_type(&self, name: &str, definition: TypeDefinition) -> Result<bool> {
        self.run(self.grammar.compile_create_type(name, &definition)?).await
    }

    // Foreign key checks

    pub async fn enable_foreign_key_constraints(&self) -> Result<bool> {
        let sql = self.grammar.compile_enable_foreign_key_constraints()?;
        self.connection.unprepared(&sql).await
    }

    pub async fn disable_foreign_key_constraints(&self) -> Result<bool> {
        let sql = self.grammar.compile_disable_foreign_key_constraints()?;
        self.connection.unprepared(&sql).await
    }

    /// Run `callback` with constraint checks off, re-enabling them afterwards
    ///
    /// Checks are session state, so this is only reliable when the pool hands
    /// out a single connection.
    pub async fn without_foreign_key_constraints<F, Fut, T>(&self, callback: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.disable_foreign_key_constraints().await?;
        let result = callback().await;
        self.enable_foreign_key_constraints().await?;
        result
    }

    // Tables from blueprints

    /// Build a table definition and create it
    pub async fn create<F>(&self, table: &str, define: F) -> Result<()>
    where
        F: FnOnce(&mut Blueprint),
    {
        let mut blueprint = Blueprint::new(table);
        define(&mut blueprint);
        self.build(&blueprint).await
    }

    /// Run the statements for an already built blueprint
    pub async fn build(&self, blueprint: &Blueprint) -> Result<()> {
        for statement in self.grammar.compile_create(blueprint)? {
            self.run(statement).await?;
        }
        Ok(())
    }

    pub async fn drop(&self, table: &str) -> Result<bool> {
        self.run(self.grammar.compile_drop(table)).await
    }

    pub async fn drop_if_exists(&self, table: &str) -> Result<bool> {
        self.run(self.grammar.compile_drop_if_exists(table)).await
    }

    pub async fn rename(&self, from: &str, to: &str) -> Result<bool> {
        self.run(self.grammar.compile_rename(from, to)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::ConnectionConfig;

    async fn memory() -> SchemaBuilder {
        let config = ConnectionConfig::new("sqlite").database(":memory:");
        Connection::connect("schema", &config).await.unwrap().schema()
    }

    #[test]
    fn test_parse_schema_and_table() {
        assert_eq!(parse_schema_and_table("audit.log"), (Some("audit"), "log"));
        assert_eq!(parse_schema_and_table("users"), (None, "users"));
    }

    #[tokio::test]
    async fn test_create_and_introspect() {
        let schema = memory().await;
        schema
            .create("users", |table| {
                table.id();
                table.string("email", 255).unique();
                table.boolean("active").default(true);
            })
            .await
            .unwrap();

        assert!(schema.has_table("users").await.unwrap());
        assert!(!schema.has_table("posts").await.unwrap());
        assert!(schema.has_columns("users", &["ID", "email"]).await.unwrap());
        assert_eq!(schema.get_column_type("users", "email", true).await.unwrap(), "varchar");
        assert!(schema.has_index("users", "users_email_unique").await.unwrap());
        assert!(schema.has_index("users", "email").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_column_type() {
        let schema = memory().await;
        schema.create("users", |table| { table.id(); }).await.unwrap();

        let err = schema.get_column_type("users", "nickname", false).await.unwrap_err();
        assert_eq!(err.to_string(), "There is no column with name 'nickname' on table 'users'.");
    }

    #[tokio::test]
    async fn test_foreign_keys_and_drop_all() {
        let schema = memory().await;
        schema.create("users", |table| { table.id(); }).await.unwrap();
        schema
            .create("posts", |table| {
                table.id();
                table.big_integer("user_id");
                table.foreign(&["user_id"]).references(&["id"]).on("users").on_delete("cascade");
            })
            .await
            .unwrap();

        let keys = schema.get_foreign_keys("posts").await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].columns, vec!["user_id"]);
        assert_eq!(keys[0].foreign_table, "users");
        assert_eq!(keys[0].on_delete, "cascade");
        assert_eq!(keys[0].on_update, "no action");

        schema.drop_all_tables().await.unwrap();
        assert!(schema.get_table_listing(None, false).await.unwrap().is_empty());
    }
}
