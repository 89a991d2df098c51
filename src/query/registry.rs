//! Structural representation of one query
//!
//! The builder accumulates clauses into a [`Registry`]; grammars read it back
//! and never mutate it. Sub-queries are stored as boxed registries captured at
//! the moment the closure building them ran.

use crate::database::types::SqlValue;
use crate::error::Error;
use crate::query::expression::{Column, QueryValue};
use indexmap::IndexMap;
use std::fmt;
use std::str::FromStr;

/// Binding slots, in the order their placeholders appear in compiled SQL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    Select,
    From,
    Join,
    Where,
    GroupBy,
    Having,
    Order,
    Union,
    UnionOrder,
}

impl BindingKind {
    pub const ALL: [BindingKind; 9] = [
        BindingKind::Select,
        BindingKind::From,
        BindingKind::Join,
        BindingKind::Where,
        BindingKind::GroupBy,
        BindingKind::Having,
        BindingKind::Order,
        BindingKind::Union,
        BindingKind::UnionOrder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BindingKind::Select => "select",
            BindingKind::From => "from",
            BindingKind::Join => "join",
            BindingKind::Where => "where",
            BindingKind::GroupBy => "groupBy",
            BindingKind::Having => "having",
            BindingKind::Order => "order",
            BindingKind::Union => "union",
            BindingKind::UnionOrder => "unionOrder",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BindingKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BindingKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::invalid_argument(format!("Invalid binding type: {}.", s)))
    }
}

/// Bindings grouped by clause kind
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    slots: [Vec<SqlValue>; 9],
}

impl Bindings {
    pub fn get(&self, kind: BindingKind) -> &[SqlValue] {
        &self.slots[kind.slot()]
    }

    pub fn push(&mut self, kind: BindingKind, value: SqlValue) {
        self.slots[kind.slot()].push(value);
    }

    pub fn extend<I>(&mut self, kind: BindingKind, values: I)
    where
        I: IntoIterator<Item = SqlValue>,
    {
        self.slots[kind.slot()].extend(values);
    }

    pub fn set(&mut self, kind: BindingKind, values: Vec<SqlValue>) {
        self.slots[kind.slot()] = values;
    }

    pub fn clear(&mut self, kind: BindingKind) {
        self.slots[kind.slot()].clear();
    }

    /// Append every slot of `other` onto the matching slot here
    pub fn merge(&mut self, other: &Bindings) {
        for kind in BindingKind::ALL {
            self.extend(kind, other.get(kind).iter().cloned());
        }
    }

    /// All bindings in emission order, nested arrays expanded
    pub fn flatten(&self) -> Vec<SqlValue> {
        self.flatten_except(&[])
    }

    /// Like [`flatten`](Self::flatten) but leaving out the given kinds
    pub fn flatten_except(&self, skip: &[BindingKind]) -> Vec<SqlValue> {
        let mut out = Vec::new();
        for kind in BindingKind::ALL {
            if skip.contains(&kind) {
                continue;
            }
            for value in self.get(kind) {
                value.clone().flatten_into(&mut out);
            }
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = (BindingKind, &[SqlValue])> + '_ {
        BindingKind::ALL
            .iter()
            .map(move |kind| (*kind, self.get(*kind)))
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Vec::is_empty)
    }
}

/// Registry sections that `clone_without` can drop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Aggregate,
    Columns,
    Distinct,
    From,
    IndexHint,
    Joins,
    Wheres,
    Groups,
    Havings,
    Orders,
    Limit,
    Offset,
    Unions,
    UnionOrders,
    UnionLimit,
    UnionOffset,
    Lock,
}

/// Connector between a clause and the one before it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boolean {
    And,
    Or,
    AndNot,
    OrNot,
}

impl Boolean {
    pub fn new(or: bool, not: bool) -> Self {
        match (or, not) {
            (false, false) => Boolean::And,
            (true, false) => Boolean::Or,
            (false, true) => Boolean::AndNot,
            (true, true) => Boolean::OrNot,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Boolean::And => "and",
            Boolean::Or => "or",
            Boolean::AndNot => "and not",
            Boolean::OrNot => "or not",
        }
    }

    /// The connector as rendered on the first clause of a list
    pub fn leading(&self) -> &'static str {
        match self {
            Boolean::And | Boolean::Or => "",
            Boolean::AndNot | Boolean::OrNot => "not",
        }
    }
}

/// Date component used by the `where_date` family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePart {
    Date,
    Time,
    Day,
    Month,
    Year,
}

impl DatePart {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatePart::Date => "date",
            DatePart::Time => "time",
            DatePart::Day => "day",
            DatePart::Month => "month",
            DatePart::Year => "year",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FulltextOptions {
    /// `boolean` on MySQL; `plain`, `phrase` or `websearch` on PostgreSQL
    pub mode: Option<String>,
    pub expanded: bool,
    pub language: Option<String>,
}

/// One where or having condition
#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    pub boolean: Boolean,
    pub kind: WhereKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WhereKind {
    Basic {
        column: Column,
        operator: String,
        value: QueryValue,
    },
    Column {
        first: Column,
        operator: String,
        second: Column,
    },
    Null {
        column: Column,
        not: bool,
    },
    Between {
        column: Column,
        min: QueryValue,
        max: QueryValue,
        not: bool,
    },
    In {
        column: Column,
        values: Vec<QueryValue>,
        not: bool,
    },
    InSub {
        column: Column,
        query: Box<Registry>,
        not: bool,
    },
    Exists {
        query: Box<Registry>,
        not: bool,
    },
    Nested {
        query: Box<Registry>,
    },
    Sub {
        column: Column,
        operator: String,
        query: Box<Registry>,
    },
    Raw {
        sql: String,
    },
    Date {
        part: DatePart,
        column: Column,
        operator: String,
        value: QueryValue,
    },
    Like {
        column: Column,
        value: QueryValue,
        case_sensitive: bool,
        not: bool,
    },
    JsonContains {
        column: Column,
        value: QueryValue,
        not: bool,
    },
    JsonContainsKey {
        column: Column,
        not: bool,
    },
    JsonLength {
        column: Column,
        operator: String,
        value: QueryValue,
    },
    Fulltext {
        columns: Vec<Column>,
        value: String,
        options: FulltextOptions,
    },
}

/// Column/value pairs for one inserted or updated row
pub type Row = IndexMap<String, QueryValue>;

/// Build a [`Row`] from column/value pairs, keeping their order
pub fn row<I, K, V>(values: I) -> Row
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<QueryValue>,
{
    values
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// What an upsert does to a row that already exists
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertUpdate {
    /// Take the column's value from the row being inserted
    Column(String),
    /// Set the column to an explicit value
    Assign(String, QueryValue),
}

impl From<&str> for UpsertUpdate {
    fn from(column: &str) -> Self {
        UpsertUpdate::Column(column.to_string())
    }
}

impl From<String> for UpsertUpdate {
    fn from(column: String) -> Self {
        UpsertUpdate::Column(column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Cross,
}

impl JoinKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinKind::Inner => "inner",
            JoinKind::Left => "left",
            JoinKind::Right => "right",
            JoinKind::Cross => "cross",
        }
    }
}

/// A join with its `on` conditions
///
/// Bindings from `where`-style join conditions live on the clause and are
/// copied into the parent's `join` slot once the join is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub kind: JoinKind,
    pub table: Column,
    pub wheres: Vec<WhereClause>,
    pub bindings: Vec<SqlValue>,
}

impl JoinClause {
    pub fn new(kind: JoinKind, table: impl Into<Column>) -> Self {
        Self {
            kind,
            table: table.into(),
            wheres: Vec::new(),
            bindings: Vec::new(),
        }
    }

    fn push(&mut self, or: bool, kind: WhereKind) -> &mut Self {
        self.wheres.push(WhereClause {
            boolean: Boolean::new(or, false),
            kind,
        });
        self
    }

    /// Compare two columns
    pub fn on(&mut self, first: impl Into<Column>, operator: &str, second: impl Into<Column>) -> &mut Self {
        self.push(
            false,
            WhereKind::Column {
                first: first.into(),
                operator: operator.to_string(),
                second: second.into(),
            },
        )
    }

    pub fn or_on(&mut self, first: impl Into<Column>, operator: &str, second: impl Into<Column>) -> &mut Self {
        self.push(
            true,
            WhereKind::Column {
                first: first.into(),
                operator: operator.to_string(),
                second: second.into(),
            },
        )
    }

    /// Compare a column with a bound value
    pub fn where_(&mut self, column: impl Into<Column>, operator: &str, value: impl Into<QueryValue>) -> &mut Self {
        self.basic(false, column.into(), operator, value.into())
    }

    pub fn or_where(&mut self, column: impl Into<Column>, operator: &str, value: impl Into<QueryValue>) -> &mut Self {
        self.basic(true, column.into(), operator, value.into())
    }

    fn basic(&mut self, or: bool, column: Column, operator: &str, value: QueryValue) -> &mut Self {
        if let Some(binding) = value.binding() {
            self.bindings.push(binding.clone());
        }
        self.push(
            or,
            WhereKind::Basic {
                column,
                operator: operator.to_string(),
                value,
            },
        )
    }

    pub fn where_null(&mut self, column: impl Into<Column>) -> &mut Self {
        self.push(
            false,
            WhereKind::Null {
                column: column.into(),
                not: false,
            },
        )
    }

    pub fn where_not_null(&mut self, column: impl Into<Column>) -> &mut Self {
        self.push(
            false,
            WhereKind::Null {
                column: column.into(),
                not: true,
            },
        )
    }

    pub fn or_where_null(&mut self, column: impl Into<Column>) -> &mut Self {
        self.push(
            true,
            WhereKind::Null {
                column: column.into(),
                not: false,
            },
        )
    }

    pub fn where_in<I, V>(&mut self, column: impl Into<Column>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<QueryValue>,
    {
        let values: Vec<QueryValue> = values.into_iter().map(Into::into).collect();
        self.bindings
            .extend(values.iter().filter_map(|v| v.binding().cloned()));
        self.push(
            false,
            WhereKind::In {
                column: column.into(),
                values,
                not: false,
            },
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        }
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Direction::Asc),
            "desc" => Ok(Direction::Desc),
            _ => Err(Error::invalid_argument(
                "Order direction must be \"asc\" or \"desc\".",
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderClause {
    Column { column: Column, direction: Direction },
    Raw { sql: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnionClause {
    pub query: Box<Registry>,
    pub all: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lock {
    Exclusive,
    Shared,
    Raw(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexHintKind {
    Hint,
    Force,
    Ignore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHint {
    pub kind: IndexHintKind,
    pub index: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub function: String,
    pub columns: Vec<Column>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Distinct {
    #[default]
    No,
    Yes,
    /// `distinct on (...)`, PostgreSQL only
    On(Vec<Column>),
}

/// The clauses of one query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Registry {
    pub aggregate: Option<Aggregate>,
    pub columns: Vec<Column>,
    pub distinct: Distinct,
    pub from: Option<Column>,
    pub index_hint: Option<IndexHint>,
    pub joins: Vec<JoinClause>,
    pub wheres: Vec<WhereClause>,
    pub groups: Vec<Column>,
    pub havings: Vec<WhereClause>,
    pub orders: Vec<OrderClause>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub unions: Vec<UnionClause>,
    pub union_orders: Vec<OrderClause>,
    pub union_limit: Option<u64>,
    pub union_offset: Option<u64>,
    pub lock: Option<Lock>,
    pub bindings: Bindings,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(table: impl Into<Column>) -> Self {
        Self {
            from: Some(table.into()),
            ..Self::default()
        }
    }

    /// Reset the given sections to their empty state
    pub fn clear(&mut self, section: Section) {
        match section {
            Section::Aggregate => self.aggregate = None,
            Section::Columns => self.columns.clear(),
            Section::Distinct => self.distinct = Distinct::No,
            Section::From => self.from = None,
            Section::IndexHint => self.index_hint = None,
            Section::Joins => self.joins.clear(),
            Section::Wheres => self.wheres.clear(),
            Section::Groups => self.groups.clear(),
            Section::Havings => self.havings.clear(),
            Section::Orders => self.orders.clear(),
            Section::Limit => self.limit = None,
            Section::Offset => self.offset = None,
            Section::Unions => self.unions.clear(),
            Section::UnionOrders => self.union_orders.clear(),
            Section::UnionLimit => self.union_limit = None,
            Section::UnionOffset => self.union_offset = None,
            Section::Lock => self.lock = None,
        }
    }

    pub fn has_unions(&self) -> bool {
        !self.unions.is_empty()
    }

    /// The `from` table as a plain name, when it is one
    pub fn table_name(&self) -> Option<&str> {
        self.from.as_ref().and_then(Column::as_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_kind_parse() {
        assert_eq!("groupBy".parse::<BindingKind>().unwrap(), BindingKind::GroupBy);
        assert_eq!("unionOrder".parse::<BindingKind>().unwrap(), BindingKind::UnionOrder);

        let err = "noway".parse::<BindingKind>().unwrap_err();
        assert_eq!(err.to_string(), "Invalid binding type: noway.");
    }

    #[test]
    fn test_flatten_follows_emission_order() {
        let mut bindings = Bindings::default();
        bindings.push(BindingKind::Having, SqlValue::from(3));
        bindings.push(BindingKind::Where, SqlValue::from(2));
        bindings.push(BindingKind::Select, SqlValue::from(1));
        bindings.push(
            BindingKind::Order,
            SqlValue::Array(vec![SqlValue::from(4), SqlValue::from(5)]),
        );

        assert_eq!(
            bindings.flatten(),
            vec![
                SqlValue::Int(1),
                SqlValue::Int(2),
                SqlValue::Int(3),
                SqlValue::Int(4),
                SqlValue::Int(5)
            ]
        );
        assert_eq!(
            bindings.flatten_except(&[BindingKind::Select, BindingKind::Order]),
            vec![SqlValue::Int(2), SqlValue::Int(3)]
        );
    }

    #[test]
    fn test_leading_boolean() {
        assert_eq!(Boolean::new(true, false).leading(), "");
        assert_eq!(Boolean::new(false, true).leading(), "not");
        assert_eq!(Boolean::new(true, true).as_str(), "or not");
    }
}
