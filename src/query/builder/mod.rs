//! Fluent query builder
//!
//! Builders are consumed and returned by every clause method, so a query reads
//! as one chain:
//!
//! ```ignore
//! let users = conn
//!     .table("users")
//!     .select(["id", "email"])
//!     .where_("votes", ">", 100)
//!     .order_by("email", Direction::Asc)
//!     .get()
//!     .await?;
//! ```
//!
//! Closures that build sub-queries receive a fresh builder sharing the parent's
//! grammar and connection; its registry is captured as soon as the closure
//! returns and its bindings are copied into the parent's matching slot.

mod execute;
mod joins;
mod wheres;

use crate::database::types::SqlValue;
use crate::database::Connection;
use crate::error::{Error, Result};
use crate::query::expression::{Column, Expression};
use crate::query::grammar::{grammar_for, Grammar};
use crate::query::registry::{
    BindingKind, Bindings, Direction, Distinct, IndexHint, IndexHintKind, Lock, OrderClause,
    Registry, Section, UnionClause, WhereClause,
};
use crate::query::{DatabaseBackend, QueryError, Truthy};
use std::fmt;
use std::sync::Arc;

/// Deferred mutation applied right before the query is compiled
pub type BeforeQuery = Arc<dyn Fn(QueryBuilder) -> QueryBuilder + Send + Sync>;

/// Main query builder that works with any supported database
#[derive(Clone)]
pub struct QueryBuilder {
    grammar: Arc<dyn Grammar>,
    connection: Option<Connection>,
    registry: Registry,
    before_query: Vec<BeforeQuery>,
    /// First failure from a sub-query compiled while building
    error: Option<QueryError>,
}

impl fmt::Debug for QueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("backend", &self.grammar.backend())
            .field("connection", &self.connection.as_ref().map(Connection::name))
            .field("registry", &self.registry)
            .field("before_query", &self.before_query.len())
            .finish()
    }
}

impl QueryBuilder {
    /// Create a builder compiling with `grammar`, not bound to a connection
    pub fn new(grammar: Arc<dyn Grammar>) -> Self {
        Self {
            grammar,
            connection: None,
            registry: Registry::new(),
            before_query: Vec::new(),
            error: None,
        }
    }

    /// Create a builder with the default grammar of `backend`
    pub fn for_backend(backend: DatabaseBackend) -> Self {
        Self::new(grammar_for(backend))
    }

    /// Create a builder that executes through `connection`
    pub fn with_connection(connection: Connection) -> Self {
        let mut builder = Self::new(connection.grammar());
        builder.connection = Some(connection);
        builder
    }

    /// A fresh builder sharing this one's grammar and connection
    pub fn new_query(&self) -> Self {
        Self {
            grammar: self.grammar.clone(),
            connection: self.connection.clone(),
            registry: Registry::new(),
            before_query: Vec::new(),
            error: None,
        }
    }

    pub fn grammar(&self) -> &Arc<dyn Grammar> {
        &self.grammar
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.grammar.backend()
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    // Sub-queries

    /// Run `callback` on a fresh builder and apply its deferred callbacks
    fn sub_query<F>(&mut self, callback: F) -> QueryBuilder
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        let mut sub = callback(self.new_query());
        sub.apply_before_query_callbacks();
        if self.error.is_none() {
            self.error = sub.error.take();
        }
        sub
    }

    /// Compile a sub-query to `(sql, bindings)`, remembering a failure
    fn compile_sub<F>(&mut self, callback: F) -> (String, Vec<SqlValue>)
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        let sub = self.sub_query(callback);
        match sub.compile() {
            Ok(sql) => (sql, sub.get_bindings()),
            Err(err) => {
                self.error.get_or_insert(err);
                (String::new(), Vec::new())
            }
        }
    }

    // Selection

    /// Replace the selected columns
    pub fn select<I, C>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Column>,
    {
        self.registry.columns = columns.into_iter().map(Into::into).collect();
        self.registry.bindings.clear(BindingKind::Select);
        self
    }

    /// Append to the selected columns
    pub fn add_select<I, C>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Column>,
    {
        self.registry
            .columns
            .extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn select_raw<I, V>(mut self, sql: &str, bindings: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        self.registry
            .columns
            .push(Column::Raw(Expression::new(sql.to_string())));
        self.push_bindings(BindingKind::Select, bindings);
        self
    }

    /// Select `(sub-query) as alias`
    pub fn select_sub<F>(mut self, callback: F, alias: &str) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        let (sql, bindings) = self.compile_sub(callback);
        let expression = format!("({}) as {}", sql, self.grammar.wrap_str(alias));
        self.select_raw(&expression, bindings)
    }

    pub fn distinct(mut self) -> Self {
        self.registry.distinct = Distinct::Yes;
        self
    }

    /// `distinct on (...)`, honored by PostgreSQL
    pub fn distinct_on<I, C>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Column>,
    {
        self.registry.distinct = Distinct::On(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Set the table to query from
    pub fn from(mut self, table: impl Into<Column>) -> Self {
        self.registry.from = Some(table.into());
        self
    }

    /// Alias of [`from`](Self::from)
    pub fn table(self, table: impl Into<Column>) -> Self {
        self.from(table)
    }

    pub fn from_raw<I, V>(mut self, sql: &str, bindings: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        self.registry.from = Some(Column::Raw(Expression::new(sql.to_string())));
        self.push_bindings(BindingKind::From, bindings);
        self
    }

    /// Select from `(sub-query) as alias`
    pub fn from_sub<F>(mut self, callback: F, alias: &str) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        let (sql, bindings) = self.compile_sub(callback);
        let expression = format!("({}) as {}", sql, self.grammar.wrap_table_str(alias));
        self.from_raw(&expression, bindings)
    }

    pub fn use_index(self, index: &str) -> Self {
        self.index_hint(IndexHintKind::Hint, index)
    }

    pub fn force_index(self, index: &str) -> Self {
        self.index_hint(IndexHintKind::Force, index)
    }

    pub fn ignore_index(self, index: &str) -> Self {
        self.index_hint(IndexHintKind::Ignore, index)
    }

    fn index_hint(mut self, kind: IndexHintKind, index: &str) -> Self {
        self.registry.index_hint = Some(IndexHint {
            kind,
            index: index.to_string(),
        });
        self
    }

    // Grouping and ordering

    pub fn group_by<I, C>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Column>,
    {
        self.registry
            .groups
            .extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn group_by_raw<I, V>(mut self, sql: &str, bindings: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        self.registry
            .groups
            .push(Column::Raw(Expression::new(sql.to_string())));
        self.push_bindings(BindingKind::GroupBy, bindings);
        self
    }

    /// Order by a column; after a union this orders the combined result
    pub fn order_by(mut self, column: impl Into<Column>, direction: Direction) -> Self {
        let order = OrderClause::Column {
            column: column.into(),
            direction,
        };
        if self.registry.has_unions() {
            self.registry.union_orders.push(order);
        } else {
            self.registry.orders.push(order);
        }
        self
    }

    pub fn order_by_desc(self, column: impl Into<Column>) -> Self {
        self.order_by(column, Direction::Desc)
    }

    /// Newest first by `column`, `created_at` when `None`
    pub fn latest(self, column: Option<&str>) -> Self {
        self.order_by(column.unwrap_or("created_at"), Direction::Desc)
    }

    pub fn oldest(self, column: Option<&str>) -> Self {
        self.order_by(column.unwrap_or("created_at"), Direction::Asc)
    }

    pub fn order_by_raw<I, V>(mut self, sql: &str, bindings: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        let order = OrderClause::Raw {
            sql: sql.to_string(),
        };
        if self.registry.has_unions() {
            self.registry.union_orders.push(order);
            self.push_bindings(BindingKind::UnionOrder, bindings);
        } else {
            self.registry.orders.push(order);
            self.push_bindings(BindingKind::Order, bindings);
        }
        self
    }

    /// Random order, seeded where the dialect supports it
    pub fn in_random_order(self, seed: Option<&str>) -> Self {
        let sql = self.grammar.compile_random(seed);
        self.order_by_raw(&sql, Vec::<SqlValue>::new())
    }

    /// Drop every existing order
    pub fn reorder(mut self) -> Self {
        self.registry.orders.clear();
        self.registry.union_orders.clear();
        self.registry.bindings.clear(BindingKind::Order);
        self.registry.bindings.clear(BindingKind::UnionOrder);
        self
    }

    /// Drop every existing order and order by `column` instead
    pub fn reorder_by(self, column: impl Into<Column>, direction: Direction) -> Self {
        self.reorder().order_by(column, direction)
    }

    // Limits

    pub fn limit(mut self, limit: u64) -> Self {
        if self.registry.has_unions() {
            self.registry.union_limit = Some(limit);
        } else {
            self.registry.limit = Some(limit);
        }
        self
    }

    pub fn take(self, limit: u64) -> Self {
        self.limit(limit)
    }

    pub fn offset(mut self, offset: u64) -> Self {
        if self.registry.has_unions() {
            self.registry.union_offset = Some(offset);
        } else {
            self.registry.offset = Some(offset);
        }
        self
    }

    pub fn skip(self, offset: u64) -> Self {
        self.offset(offset)
    }

    /// Limit and offset for a 1-based page
    pub fn for_page(self, page: u64, per_page: u64) -> Self {
        self.offset(page.saturating_sub(1) * per_page).limit(per_page)
    }

    // Unions

    pub fn union(self, query: QueryBuilder) -> Self {
        self.add_union(query, false)
    }

    pub fn union_all(self, query: QueryBuilder) -> Self {
        self.add_union(query, true)
    }

    fn add_union(mut self, mut query: QueryBuilder, all: bool) -> Self {
        query.apply_before_query_callbacks();
        if self.error.is_none() {
            self.error = query.error.take();
        }
        let bindings = query.get_bindings();
        self.registry.unions.push(UnionClause {
            query: Box::new(query.registry),
            all,
        });
        self.registry.bindings.extend(BindingKind::Union, bindings);
        self
    }

    // Locks

    pub fn lock_for_update(mut self) -> Self {
        self.registry.lock = Some(Lock::Exclusive);
        self
    }

    pub fn shared_lock(mut self) -> Self {
        self.registry.lock = Some(Lock::Shared);
        self
    }

    /// A raw lock clause such as `for update skip locked`
    pub fn lock(mut self, sql: &str) -> Self {
        self.registry.lock = Some(Lock::Raw(sql.to_string()));
        self
    }

    // Bindings

    fn push_bindings<I, V>(&mut self, kind: BindingKind, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        self.registry
            .bindings
            .extend(kind, values.into_iter().map(Into::into));
    }

    /// Append values to the binding slot named `kind`
    pub fn add_binding<I, V>(mut self, values: I, kind: &str) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        let kind: BindingKind = kind.parse()?;
        self.push_bindings(kind, values);
        Ok(self)
    }

    /// Replace the binding slot named `kind`
    pub fn set_bindings<I, V>(mut self, values: I, kind: &str) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        let kind: BindingKind = kind.parse()?;
        self.registry
            .bindings
            .set(kind, values.into_iter().map(Into::into).collect());
        Ok(self)
    }

    /// Append every binding slot of `other` onto this builder's
    pub fn merge_bindings(mut self, other: &QueryBuilder) -> Self {
        self.registry.bindings.merge(&other.registry.bindings);
        self
    }

    /// Append where clauses and their bindings from another query
    pub fn merge_wheres(mut self, wheres: Vec<WhereClause>, bindings: Vec<SqlValue>) -> Self {
        self.registry.wheres.extend(wheres);
        self.registry.bindings.extend(BindingKind::Where, bindings);
        self
    }

    /// All bindings flattened in placeholder order
    pub fn get_bindings(&self) -> Vec<SqlValue> {
        self.registry.bindings.flatten()
    }

    pub fn get_raw_bindings(&self) -> &Bindings {
        &self.registry.bindings
    }

    // Cloning

    /// Copy without the given registry sections
    pub fn clone_without(&self, sections: &[Section]) -> Self {
        let mut clone = self.clone();
        for section in sections {
            clone.registry.clear(*section);
        }
        clone
    }

    /// Copy with the given binding slots emptied; clauses are kept
    pub fn clone_without_bindings(&self, kinds: &[BindingKind]) -> Self {
        let mut clone = self.clone();
        for kind in kinds {
            clone.registry.bindings.clear(*kind);
        }
        clone
    }

    // Conditional building

    /// Apply `callback` when `value` is truthy
    pub fn when<T, F>(self, value: T, callback: F) -> Self
    where
        T: Truthy,
        F: FnOnce(Self, T) -> Self,
    {
        if value.is_truthy() {
            callback(self, value)
        } else {
            self
        }
    }

    /// Apply `callback` when `value` is truthy, `default` otherwise
    pub fn when_else<T, F, D>(self, value: T, callback: F, default: D) -> Self
    where
        T: Truthy,
        F: FnOnce(Self, T) -> Self,
        D: FnOnce(Self, T) -> Self,
    {
        if value.is_truthy() {
            callback(self, value)
        } else {
            default(self, value)
        }
    }

    /// Evaluate `predicate` against the builder and branch on its result
    pub fn when_fn<T, P, F>(self, predicate: P, callback: F) -> Self
    where
        T: Truthy,
        P: FnOnce(&Self) -> T,
        F: FnOnce(Self, T) -> Self,
    {
        let value = predicate(&self);
        self.when(value, callback)
    }

    /// Apply `callback` when `value` is falsy
    pub fn unless<T, F>(self, value: T, callback: F) -> Self
    where
        T: Truthy,
        F: FnOnce(Self, T) -> Self,
    {
        if value.is_truthy() {
            self
        } else {
            callback(self, value)
        }
    }

    pub fn unless_else<T, F, D>(self, value: T, callback: F, default: D) -> Self
    where
        T: Truthy,
        F: FnOnce(Self, T) -> Self,
        D: FnOnce(Self, T) -> Self,
    {
        if value.is_truthy() {
            default(self, value)
        } else {
            callback(self, value)
        }
    }

    /// Inspect the builder without changing it
    pub fn tap<F>(self, callback: F) -> Self
    where
        F: FnOnce(&Self),
    {
        callback(&self);
        self
    }

    /// Register a mutation to run once, right before the query is compiled
    pub fn before_query<F>(mut self, callback: F) -> Self
    where
        F: Fn(QueryBuilder) -> QueryBuilder + Send + Sync + 'static,
    {
        self.before_query.push(Arc::new(callback));
        self
    }

    /// Run and drain the pending before-query callbacks
    pub fn apply_before_query_callbacks(&mut self) {
        let callbacks = std::mem::take(&mut self.before_query);
        if callbacks.is_empty() {
            return;
        }
        let shell = self.new_query();
        let mut builder = std::mem::replace(self, shell);
        for callback in callbacks {
            builder = callback(builder);
        }
        *self = builder;
    }

    // SQL output

    /// Compile the current registry without running callbacks
    fn compile(&self) -> std::result::Result<String, QueryError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        self.grammar.compile_select(&self.registry)
    }

    /// Compile to SQL with `?` placeholders
    pub fn to_sql(&mut self) -> Result<String> {
        self.apply_before_query_callbacks();
        Ok(self.compile()?)
    }

    /// Compile to SQL with bindings inlined as literals, for debugging
    pub fn to_raw_sql(&mut self) -> Result<String> {
        let sql = self.to_sql()?;
        Ok(self
            .grammar
            .substitute_bindings_into_raw_sql(&sql, &self.get_bindings()))
    }

    /// Log the compiled SQL and its bindings
    pub fn log(mut self) -> Self {
        match self.to_sql() {
            Ok(sql) => {
                let bindings = self.get_bindings();
                log::info!("{} {:?}", sql, bindings);
                log::debug!(
                    "{}",
                    self.grammar.substitute_bindings_into_raw_sql(&sql, &bindings)
                );
            }
            Err(err) => log::warn!("Query could not be compiled: {}", err),
        }
        self
    }

    fn bound_connection(&self) -> Result<&Connection> {
        self.connection.as_ref().ok_or_else(|| {
            Error::configuration("Query builder is not bound to a database connection.")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::grammar::PostgresGrammar;

    fn builder() -> QueryBuilder {
        QueryBuilder::new(Arc::new(PostgresGrammar::new()))
    }

    #[test]
    fn test_select_replaces_and_add_select_appends() {
        let mut query = builder()
            .select(["id"])
            .select(["email"])
            .add_select(["name"])
            .from("users");
        assert_eq!(query.to_sql().unwrap(), "select \"email\", \"name\" from \"users\"");
    }

    #[test]
    fn test_before_query_runs_once() {
        let mut query = builder()
            .from("users")
            .before_query(|q| q.where_("active", "=", true));

        assert_eq!(
            query.to_sql().unwrap(),
            "select * from \"users\" where \"active\" = ?"
        );
        assert_eq!(
            query.to_sql().unwrap(),
            "select * from \"users\" where \"active\" = ?"
        );
        assert_eq!(query.get_bindings(), vec![SqlValue::Bool(true)]);
    }

    #[test]
    fn test_order_after_union_targets_union() {
        let mut query = builder()
            .from("a")
            .union(builder().from("b"))
            .order_by("id", Direction::Asc)
            .limit(5);
        assert_eq!(
            query.to_sql().unwrap(),
            "(select * from \"a\") union (select * from \"b\") order by \"id\" asc limit 5"
        );
    }

    #[test]
    fn test_for_page() {
        let mut query = builder().from("users").for_page(3, 15);
        assert_eq!(
            query.to_sql().unwrap(),
            "select * from \"users\" limit 15 offset 30"
        );
    }
}
