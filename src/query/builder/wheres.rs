//! Where and having clauses

use super::QueryBuilder;
use crate::database::types::SqlValue;
use crate::query::expression::{Column, QueryValue};
use crate::query::registry::{
    BindingKind, Boolean, DatePart, FulltextOptions, WhereClause, WhereKind,
};
use serde_json::Value as JsonValue;

impl QueryBuilder {
    fn push_where(mut self, or: bool, not: bool, kind: WhereKind) -> Self {
        self.registry.wheres.push(WhereClause {
            boolean: Boolean::new(or, not),
            kind,
        });
        self
    }

    fn push_having(mut self, or: bool, kind: WhereKind) -> Self {
        self.registry.havings.push(WhereClause {
            boolean: Boolean::new(or, false),
            kind,
        });
        self
    }

    fn bind(&mut self, kind: BindingKind, value: &QueryValue) {
        if let Some(binding) = value.binding() {
            self.registry.bindings.push(kind, binding.clone());
        }
    }

    // Basic comparisons

    /// `column operator ?`; comparing with null becomes `is [not] null`
    pub fn where_(self, column: impl Into<Column>, operator: &str, value: impl Into<QueryValue>) -> Self {
        self.basic_where(false, column.into(), operator, value.into())
    }

    pub fn or_where(self, column: impl Into<Column>, operator: &str, value: impl Into<QueryValue>) -> Self {
        self.basic_where(true, column.into(), operator, value.into())
    }

    /// Shorthand for `where_(column, "=", value)`
    pub fn where_eq(self, column: impl Into<Column>, value: impl Into<QueryValue>) -> Self {
        self.where_(column, "=", value)
    }

    fn basic_where(mut self, or: bool, column: Column, operator: &str, value: QueryValue) -> Self {
        if value.is_null() {
            match operator {
                "=" => return self.null_where(or, column, false),
                "!=" | "<>" => return self.null_where(or, column, true),
                _ => {}
            }
        }
        self.bind(BindingKind::Where, &value);
        self.push_where(
            or,
            false,
            WhereKind::Basic {
                column,
                operator: operator.to_string(),
                value,
            },
        )
    }

    pub fn where_column(self, first: impl Into<Column>, operator: &str, second: impl Into<Column>) -> Self {
        self.push_where(
            false,
            false,
            WhereKind::Column {
                first: first.into(),
                operator: operator.to_string(),
                second: second.into(),
            },
        )
    }

    pub fn or_where_column(self, first: impl Into<Column>, operator: &str, second: impl Into<Column>) -> Self {
        self.push_where(
            true,
            false,
            WhereKind::Column {
                first: first.into(),
                operator: operator.to_string(),
                second: second.into(),
            },
        )
    }

    pub fn where_raw<I, V>(self, sql: &str, bindings: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        self.raw_where(false, sql, bindings)
    }

    pub fn or_where_raw<I, V>(self, sql: &str, bindings: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        self.raw_where(true, sql, bindings)
    }

    fn raw_where<I, V>(mut self, or: bool, sql: &str, bindings: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        self.push_bindings(BindingKind::Where, bindings);
        self.push_where(
            or,
            false,
            WhereKind::Raw {
                sql: sql.to_string(),
            },
        )
    }

    // Nested groups

    /// `( ... )` built by `callback`
    pub fn where_nested<F>(self, callback: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.nested_where(false, false, callback)
    }

    pub fn or_where_nested<F>(self, callback: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.nested_where(true, false, callback)
    }

    /// `not ( ... )` built by `callback`
    pub fn where_not<F>(self, callback: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.nested_where(false, true, callback)
    }

    pub fn or_where_not<F>(self, callback: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.nested_where(true, true, callback)
    }

    fn nested_where<F>(mut self, or: bool, not: bool, callback: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        let from = self.registry.from.clone();
        let sub = self.sub_query(|q| {
            let q = match from {
                Some(table) => q.from(table),
                None => q,
            };
            callback(q)
        });
        if sub.registry.wheres.is_empty() {
            return self;
        }
        let bindings = sub.registry.bindings.get(BindingKind::Where).to_vec();
        self.registry.bindings.extend(BindingKind::Where, bindings);
        self.push_where(
            or,
            not,
            WhereKind::Nested {
                query: Box::new(sub.registry),
            },
        )
    }

    // Null checks

    pub fn where_null(self, column: impl Into<Column>) -> Self {
        self.null_where(false, column.into(), false)
    }

    pub fn or_where_null(self, column: impl Into<Column>) -> Self {
        self.null_where(true, column.into(), false)
    }

    pub fn where_not_null(self, column: impl Into<Column>) -> Self {
        self.null_where(false, column.into(), true)
    }

    pub fn or_where_not_null(self, column: impl Into<Column>) -> Self {
        self.null_where(true, column.into(), true)
    }

    fn null_where(self, or: bool, column: Column, not: bool) -> Self {
        self.push_where(or, false, WhereKind::Null { column, not })
    }

    // Ranges

    pub fn where_between(
        self,
        column: impl Into<Column>,
        min: impl Into<QueryValue>,
        max: impl Into<QueryValue>,
    ) -> Self {
        self.between_where(false, column.into(), min.into(), max.into(), false)
    }

    pub fn or_where_between(
        self,
        column: impl Into<Column>,
        min: impl Into<QueryValue>,
        max: impl Into<QueryValue>,
    ) -> Self {
        self.between_where(true, column.into(), min.into(), max.into(), false)
    }

    pub fn where_not_between(
        self,
        column: impl Into<Column>,
        min: impl Into<QueryValue>,
        max: impl Into<QueryValue>,
    ) -> Self {
        self.between_where(false, column.into(), min.into(), max.into(), true)
    }

    pub fn or_where_not_between(
        self,
        column: impl Into<Column>,
        min: impl Into<QueryValue>,
        max: impl Into<QueryValue>,
    ) -> Self {
        self.between_where(true, column.into(), min.into(), max.into(), true)
    }

    fn between_where(mut self, or: bool, column: Column, min: QueryValue, max: QueryValue, not: bool) -> Self {
        self.bind(BindingKind::Where, &min);
        self.bind(BindingKind::Where, &max);
        self.push_where(
            or,
            false,
            WhereKind::Between {
                column,
                min,
                max,
                not,
            },
        )
    }

    // Membership

    pub fn where_in<I, V>(self, column: impl Into<Column>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<QueryValue>,
    {
        self.in_where(false, column.into(), values, false)
    }

    pub fn or_where_in<I, V>(self, column: impl Into<Column>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<QueryValue>,
    {
        self.in_where(true, column.into(), values, false)
    }

    pub fn where_not_in<I, V>(self, column: impl Into<Column>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<QueryValue>,
    {
        self.in_where(false, column.into(), values, true)
    }

    pub fn or_where_not_in<I, V>(self, column: impl Into<Column>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<QueryValue>,
    {
        self.in_where(true, column.into(), values, true)
    }

    fn in_where<I, V>(mut self, or: bool, column: Column, values: I, not: bool) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<QueryValue>,
    {
        let values: Vec<QueryValue> = values.into_iter().map(Into::into).collect();
        for value in &values {
            if let Some(binding) = value.binding() {
                let mut flat = Vec::new();
                binding.clone().flatten_into(&mut flat);
                self.registry.bindings.extend(BindingKind::Where, flat);
            }
        }
        self.push_where(or, false, WhereKind::In { column, values, not })
    }

    /// `column in (sub-query)`
    pub fn where_in_sub<F>(self, column: impl Into<Column>, callback: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.in_sub_where(false, column.into(), callback, false)
    }

    pub fn or_where_in_sub<F>(self, column: impl Into<Column>, callback: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.in_sub_where(true, column.into(), callback, false)
    }

    pub fn where_not_in_sub<F>(self, column: impl Into<Column>, callback: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.in_sub_where(false, column.into(), callback, true)
    }

    fn in_sub_where<F>(mut self, or: bool, column: Column, callback: F, not: bool) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        let sub = self.sub_query(callback);
        self.registry
            .bindings
            .extend(BindingKind::Where, sub.get_bindings());
        self.push_where(
            or,
            false,
            WhereKind::InSub {
                column,
                query: Box::new(sub.registry),
                not,
            },
        )
    }

    // Sub-queries

    pub fn where_exists<F>(self, callback: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.exists_where(false, callback, false)
    }

    pub fn or_where_exists<F>(self, callback: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.exists_where(true, callback, false)
    }

    pub fn where_not_exists<F>(self, callback: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.exists_where(false, callback, true)
    }

    pub fn or_where_not_exists<F>(self, callback: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.exists_where(true, callback, true)
    }

    fn exists_where<F>(mut self, or: bool, callback: F, not: bool) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        let sub = self.sub_query(callback);
        self.registry
            .bindings
            .extend(BindingKind::Where, sub.get_bindings());
        self.push_where(
            or,
            false,
            WhereKind::Exists {
                query: Box::new(sub.registry),
                not,
            },
        )
    }

    /// `column operator (sub-query)`
    pub fn where_sub<F>(mut self, column: impl Into<Column>, operator: &str, callback: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        let sub = self.sub_query(callback);
        self.registry
            .bindings
            .extend(BindingKind::Where, sub.get_bindings());
        self.push_where(
            false,
            false,
            WhereKind::Sub {
                column: column.into(),
                operator: operator.to_string(),
                query: Box::new(sub.registry),
            },
        )
    }

    // Dates

    pub fn where_date(self, column: impl Into<Column>, operator: &str, value: impl Into<QueryValue>) -> Self {
        self.date_where(false, DatePart::Date, column.into(), operator, value.into())
    }

    pub fn or_where_date(self, column: impl Into<Column>, operator: &str, value: impl Into<QueryValue>) -> Self {
        self.date_where(true, DatePart::Date, column.into(), operator, value.into())
    }

    pub fn where_time(self, column: impl Into<Column>, operator: &str, value: impl Into<QueryValue>) -> Self {
        self.date_where(false, DatePart::Time, column.into(), operator, value.into())
    }

    /// Day of month; plain numbers are bound zero-padded
    pub fn where_day(self, column: impl Into<Column>, operator: &str, value: impl Into<QueryValue>) -> Self {
        self.date_where(false, DatePart::Day, column.into(), operator, value.into())
    }

    pub fn where_month(self, column: impl Into<Column>, operator: &str, value: impl Into<QueryValue>) -> Self {
        self.date_where(false, DatePart::Month, column.into(), operator, value.into())
    }

    pub fn where_year(self, column: impl Into<Column>, operator: &str, value: impl Into<QueryValue>) -> Self {
        self.date_where(false, DatePart::Year, column.into(), operator, value.into())
    }

    fn date_where(mut self, or: bool, part: DatePart, column: Column, operator: &str, value: QueryValue) -> Self {
        let value = match (part, value) {
            (DatePart::Day | DatePart::Month, QueryValue::Param(param)) => {
                match param.as_i64() {
                    Some(n) => QueryValue::Param(SqlValue::String(format!("{:02}", n))),
                    None => QueryValue::Param(param),
                }
            }
            (_, value) => value,
        };
        self.bind(BindingKind::Where, &value);
        self.push_where(
            or,
            false,
            WhereKind::Date {
                part,
                column,
                operator: operator.to_string(),
                value,
            },
        )
    }

    // Pattern matching

    pub fn where_like(self, column: impl Into<Column>, value: impl Into<QueryValue>, case_sensitive: bool) -> Self {
        self.like_where(false, column.into(), value.into(), case_sensitive, false)
    }

    pub fn or_where_like(self, column: impl Into<Column>, value: impl Into<QueryValue>, case_sensitive: bool) -> Self {
        self.like_where(true, column.into(), value.into(), case_sensitive, false)
    }

    pub fn where_not_like(self, column: impl Into<Column>, value: impl Into<QueryValue>, case_sensitive: bool) -> Self {
        self.like_where(false, column.into(), value.into(), case_sensitive, true)
    }

    pub fn or_where_not_like(
        self,
        column: impl Into<Column>,
        value: impl Into<QueryValue>,
        case_sensitive: bool,
    ) -> Self {
        self.like_where(true, column.into(), value.into(), case_sensitive, true)
    }

    fn like_where(mut self, or: bool, column: Column, value: QueryValue, case_sensitive: bool, not: bool) -> Self {
        self.bind(BindingKind::Where, &value);
        self.push_where(
            or,
            false,
            WhereKind::Like {
                column,
                value,
                case_sensitive,
                not,
            },
        )
    }

    // JSON

    pub fn where_json_contains(self, column: impl Into<Column>, value: JsonValue) -> Self {
        self.json_contains_where(false, column.into(), value, false)
    }

    pub fn or_where_json_contains(self, column: impl Into<Column>, value: JsonValue) -> Self {
        self.json_contains_where(true, column.into(), value, false)
    }

    pub fn where_json_doesnt_contain(self, column: impl Into<Column>, value: JsonValue) -> Self {
        self.json_contains_where(false, column.into(), value, true)
    }

    fn json_contains_where(mut self, or: bool, column: Column, value: JsonValue, not: bool) -> Self {
        let binding = self.grammar.prepare_binding_for_json_contains(&value);
        let value = QueryValue::Param(binding);
        self.bind(BindingKind::Where, &value);
        self.push_where(or, false, WhereKind::JsonContains { column, value, not })
    }

    pub fn where_json_contains_key(self, column: impl Into<Column>) -> Self {
        self.push_where(
            false,
            false,
            WhereKind::JsonContainsKey {
                column: column.into(),
                not: false,
            },
        )
    }

    pub fn where_json_doesnt_contain_key(self, column: impl Into<Column>) -> Self {
        self.push_where(
            false,
            false,
            WhereKind::JsonContainsKey {
                column: column.into(),
                not: true,
            },
        )
    }

    /// Compare the length of a JSON array
    pub fn where_json_length(mut self, column: impl Into<Column>, operator: &str, value: impl Into<QueryValue>) -> Self {
        let value = value.into();
        self.bind(BindingKind::Where, &value);
        self.push_where(
            false,
            false,
            WhereKind::JsonLength {
                column: column.into(),
                operator: operator.to_string(),
                value,
            },
        )
    }

    // Full text

    pub fn where_fulltext<I, C>(self, columns: I, value: &str, options: FulltextOptions) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Column>,
    {
        self.fulltext_where(false, columns.into_iter().map(Into::into).collect(), value, options)
    }

    pub fn or_where_fulltext<I, C>(self, columns: I, value: &str, options: FulltextOptions) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Column>,
    {
        self.fulltext_where(true, columns.into_iter().map(Into::into).collect(), value, options)
    }

    fn fulltext_where(mut self, or: bool, columns: Vec<Column>, value: &str, options: FulltextOptions) -> Self {
        self.registry
            .bindings
            .push(BindingKind::Where, SqlValue::String(value.to_string()));
        self.push_where(
            or,
            false,
            WhereKind::Fulltext {
                columns,
                value: value.to_string(),
                options,
            },
        )
    }

    // Having

    pub fn having(mut self, column: impl Into<Column>, operator: &str, value: impl Into<QueryValue>) -> Self {
        let value = value.into();
        self.bind(BindingKind::Having, &value);
        self.push_having(
            false,
            WhereKind::Basic {
                column: column.into(),
                operator: operator.to_string(),
                value,
            },
        )
    }

    pub fn or_having(mut self, column: impl Into<Column>, operator: &str, value: impl Into<QueryValue>) -> Self {
        let value = value.into();
        self.bind(BindingKind::Having, &value);
        self.push_having(
            true,
            WhereKind::Basic {
                column: column.into(),
                operator: operator.to_string(),
                value,
            },
        )
    }

    pub fn having_raw<I, V>(mut self, sql: &str, bindings: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        self.push_bindings(BindingKind::Having, bindings);
        self.push_having(
            false,
            WhereKind::Raw {
                sql: sql.to_string(),
            },
        )
    }

    pub fn or_having_raw<I, V>(mut self, sql: &str, bindings: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        self.push_bindings(BindingKind::Having, bindings);
        self.push_having(
            true,
            WhereKind::Raw {
                sql: sql.to_string(),
            },
        )
    }

    pub fn having_null(self, column: impl Into<Column>) -> Self {
        self.push_having(
            false,
            WhereKind::Null {
                column: column.into(),
                not: false,
            },
        )
    }

    pub fn having_not_null(self, column: impl Into<Column>) -> Self {
        self.push_having(
            false,
            WhereKind::Null {
                column: column.into(),
                not: true,
            },
        )
    }

    pub fn having_between(
        mut self,
        column: impl Into<Column>,
        min: impl Into<QueryValue>,
        max: impl Into<QueryValue>,
    ) -> Self {
        let (min, max) = (min.into(), max.into());
        self.bind(BindingKind::Having, &min);
        self.bind(BindingKind::Having, &max);
        self.push_having(
            false,
            WhereKind::Between {
                column: column.into(),
                min,
                max,
                not: false,
            },
        )
    }

    /// `( ... )` of having conditions built by `callback`
    pub fn having_nested<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        let sub = self.sub_query(callback);
        if sub.registry.havings.is_empty() {
            return self;
        }
        let bindings = sub.registry.bindings.get(BindingKind::Having).to_vec();
        self.registry.bindings.extend(BindingKind::Having, bindings);
        self.push_having(
            false,
            WhereKind::Nested {
                query: Box::new(sub.registry),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::database::types::SqlValue;
    use crate::query::grammar::MySqlGrammar;
    use crate::query::QueryBuilder;
    use std::sync::Arc;

    fn builder() -> QueryBuilder {
        QueryBuilder::new(Arc::new(MySqlGrammar::new())).from("users")
    }

    #[test]
    fn test_null_comparison_becomes_null_check() {
        let mut query = builder()
            .where_("deleted_at", "=", None::<String>)
            .or_where("banned_at", "<>", None::<String>);
        assert_eq!(
            query.to_sql().unwrap(),
            "select * from `users` where `deleted_at` is null or `banned_at` is not null"
        );
        assert!(query.get_bindings().is_empty());
    }

    #[test]
    fn test_nested_where_keeps_sub_bindings() {
        let mut query = builder()
            .where_("a", "=", 1)
            .or_where_nested(|q| q.where_("b", "=", 2).where_("c", "=", 3));
        assert_eq!(
            query.to_sql().unwrap(),
            "select * from `users` where `a` = ? or (`b` = ? and `c` = ?)"
        );
        assert_eq!(
            query.get_bindings(),
            vec![SqlValue::Int(1), SqlValue::Int(2), SqlValue::Int(3)]
        );
    }

    #[test]
    fn test_where_not_group() {
        let mut query = builder().where_not(|q| q.where_("a", "=", 1));
        assert_eq!(
            query.to_sql().unwrap(),
            "select * from `users` where not (`a` = ?)"
        );
    }

    #[test]
    fn test_empty_where_in() {
        let mut query = builder().where_in("id", Vec::<i32>::new());
        assert_eq!(query.to_sql().unwrap(), "select * from `users` where 0 = 1");
    }

    #[test]
    fn test_where_day_pads_value() {
        let query = builder().where_day("created_at", "=", 5);
        assert_eq!(query.get_bindings(), vec![SqlValue::String("05".into())]);
    }
}
