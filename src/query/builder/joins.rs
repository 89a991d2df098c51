//! Join clauses

use super::QueryBuilder;
use crate::query::expression::{Column, Expression, QueryValue};
use crate::query::registry::{BindingKind, JoinClause, JoinKind};

impl QueryBuilder {
    /// `inner join table on first operator second`
    pub fn join(self, table: impl Into<Column>, first: impl Into<Column>, operator: &str, second: impl Into<Column>) -> Self {
        self.join_on(JoinKind::Inner, table.into(), first.into(), operator, second.into())
    }

    pub fn left_join(
        self,
        table: impl Into<Column>,
        first: impl Into<Column>,
        operator: &str,
        second: impl Into<Column>,
    ) -> Self {
        self.join_on(JoinKind::Left, table.into(), first.into(), operator, second.into())
    }

    pub fn right_join(
        self,
        table: impl Into<Column>,
        first: impl Into<Column>,
        operator: &str,
        second: impl Into<Column>,
    ) -> Self {
        self.join_on(JoinKind::Right, table.into(), first.into(), operator, second.into())
    }

    pub fn cross_join(self, table: impl Into<Column>) -> Self {
        self.add_join(JoinClause::new(JoinKind::Cross, table))
    }

    /// Join comparing a column with a bound value
    pub fn join_where(
        self,
        table: impl Into<Column>,
        first: impl Into<Column>,
        operator: &str,
        value: impl Into<QueryValue>,
    ) -> Self {
        let mut join = JoinClause::new(JoinKind::Inner, table);
        join.where_(first, operator, value);
        self.add_join(join)
    }

    /// Join with conditions built on the [`JoinClause`]
    pub fn join_with<F>(self, table: impl Into<Column>, kind: JoinKind, callback: F) -> Self
    where
        F: FnOnce(&mut JoinClause),
    {
        let mut join = JoinClause::new(kind, table);
        callback(&mut join);
        self.add_join(join)
    }

    pub fn left_join_with<F>(self, table: impl Into<Column>, callback: F) -> Self
    where
        F: FnOnce(&mut JoinClause),
    {
        self.join_with(table, JoinKind::Left, callback)
    }

    /// Join `(sub-query) as alias`
    pub fn join_sub<F>(
        mut self,
        callback: F,
        alias: &str,
        first: impl Into<Column>,
        operator: &str,
        second: impl Into<Column>,
        kind: JoinKind,
    ) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        let (sql, bindings) = self.compile_sub(callback);
        let table = Expression::new(format!("({}) as {}", sql, self.grammar.wrap_table_str(alias)));
        self.registry.bindings.extend(BindingKind::Join, bindings);
        self.join_on(kind, Column::Raw(table), first.into(), operator, second.into())
    }

    fn join_on(self, kind: JoinKind, table: Column, first: Column, operator: &str, second: Column) -> Self {
        let mut join = JoinClause::new(kind, table);
        join.on(first, operator, second);
        self.add_join(join)
    }

    fn add_join(mut self, join: JoinClause) -> Self {
        self.registry
            .bindings
            .extend(BindingKind::Join, join.bindings.iter().cloned());
        self.registry.joins.push(join);
        self
    }
}
