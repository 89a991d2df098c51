//! Raw SQL fragments and the value/column inputs accepted by the builder

use crate::database::types::SqlValue;
use std::fmt;

/// The literal carried by an [`Expression`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Literal {
    Text(String),
    Integer(i64),
    BigInteger(i128),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Text(s) => f.write_str(s),
            Literal::Integer(i) => write!(f, "{}", i),
            Literal::BigInteger(i) => write!(f, "{}", i),
        }
    }
}

/// A SQL fragment emitted verbatim
///
/// Grammars never quote an expression and never register a binding for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Expression {
    value: Literal,
}

impl Expression {
    pub fn new(value: impl Into<Literal>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn value(&self) -> &Literal {
        &self.value
    }

    /// The fragment as SQL text
    pub fn sql(&self) -> String {
        self.value.to_string()
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::Text(s.to_string())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Literal::Text(s)
    }
}

impl From<i32> for Literal {
    fn from(i: i32) -> Self {
        Literal::Integer(i as i64)
    }
}

impl From<i64> for Literal {
    fn from(i: i64) -> Self {
        Literal::Integer(i)
    }
}

impl From<i128> for Literal {
    fn from(i: i128) -> Self {
        Literal::BigInteger(i)
    }
}

/// Shorthand for `Expression::new`
pub fn raw(value: impl Into<Literal>) -> Expression {
    Expression::new(value)
}

/// A value position in a clause: either a binding or a raw fragment
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Param(SqlValue),
    Expr(Expression),
}

impl QueryValue {
    pub fn is_expression(&self) -> bool {
        matches!(self, QueryValue::Expr(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, QueryValue::Param(SqlValue::Null))
    }

    /// The binding carried by this value, if any
    pub fn binding(&self) -> Option<&SqlValue> {
        match self {
            QueryValue::Param(value) => Some(value),
            QueryValue::Expr(_) => None,
        }
    }

    pub fn into_binding(self) -> Option<SqlValue> {
        match self {
            QueryValue::Param(value) => Some(value),
            QueryValue::Expr(_) => None,
        }
    }
}

impl From<Expression> for QueryValue {
    fn from(e: Expression) -> Self {
        QueryValue::Expr(e)
    }
}

impl From<SqlValue> for QueryValue {
    fn from(v: SqlValue) -> Self {
        QueryValue::Param(v)
    }
}

macro_rules! query_value_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for QueryValue {
                fn from(v: $ty) -> Self {
                    QueryValue::Param(SqlValue::from(v))
                }
            }
        )*
    };
}

query_value_from!(
    bool,
    i8,
    i16,
    i32,
    i64,
    isize,
    u8,
    u16,
    u32,
    u64,
    usize,
    f32,
    f64,
    String,
    &str,
    &String,
    Vec<u8>,
    &[u8],
    serde_json::Value,
    rust_decimal::Decimal,
    uuid::Uuid,
    chrono::NaiveDate,
    chrono::NaiveTime,
    chrono::NaiveDateTime,
    chrono::DateTime<chrono::Utc>,
);

impl<T> From<Option<T>> for QueryValue
where
    T: Into<SqlValue>,
{
    fn from(v: Option<T>) -> Self {
        QueryValue::Param(SqlValue::from(v))
    }
}

/// A column reference: a name to be wrapped, or a raw fragment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Column {
    Name(String),
    Raw(Expression),
}

impl Column {
    pub fn is_raw(&self) -> bool {
        matches!(self, Column::Raw(_))
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Column::Name(name) => Some(name),
            Column::Raw(_) => None,
        }
    }
}

impl From<&str> for Column {
    fn from(s: &str) -> Self {
        Column::Name(s.to_string())
    }
}

impl From<String> for Column {
    fn from(s: String) -> Self {
        Column::Name(s)
    }
}

impl From<&String> for Column {
    fn from(s: &String) -> Self {
        Column::Name(s.clone())
    }
}

impl From<Expression> for Column {
    fn from(e: Expression) -> Self {
        Column::Raw(e)
    }
}
