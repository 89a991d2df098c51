//! Truthiness used by `when` / `unless`
//!
//! Only `false` and numeric zero are falsy; an empty string is truthy.
//! `None` is falsy and `Some(v)` defers to `v`.

use crate::database::types::SqlValue;
use serde_json::Value as JsonValue;

pub trait Truthy {
    fn is_truthy(&self) -> bool;
}

impl Truthy for bool {
    fn is_truthy(&self) -> bool {
        *self
    }
}

macro_rules! truthy_number {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Truthy for $ty {
                fn is_truthy(&self) -> bool {
                    *self != (0 as $ty)
                }
            }
        )*
    };
}

truthy_number!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);

impl Truthy for str {
    fn is_truthy(&self) -> bool {
        true
    }
}

impl Truthy for String {
    fn is_truthy(&self) -> bool {
        true
    }
}

impl<T: Truthy> Truthy for Option<T> {
    fn is_truthy(&self) -> bool {
        self.as_ref().map_or(false, Truthy::is_truthy)
    }
}

impl<T: Truthy + ?Sized> Truthy for &T {
    fn is_truthy(&self) -> bool {
        (**self).is_truthy()
    }
}

impl Truthy for SqlValue {
    fn is_truthy(&self) -> bool {
        match self {
            SqlValue::Null => false,
            SqlValue::Bool(b) => *b,
            SqlValue::Int(i) => *i != 0,
            SqlValue::BigInt(i) => *i != 0,
            SqlValue::UnsignedBigInt(i) => *i != 0,
            SqlValue::Float(f) => *f != 0.0,
            SqlValue::Double(f) => *f != 0.0,
            SqlValue::Decimal(d) => !d.is_zero(),
            _ => true,
        }
    }
}

impl Truthy for JsonValue {
    fn is_truthy(&self) -> bool {
        match self {
            JsonValue::Null => false,
            JsonValue::Bool(b) => *b,
            JsonValue::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_and_false_are_falsy() {
        assert!(!false.is_truthy());
        assert!(!0i32.is_truthy());
        assert!(!0.0f64.is_truthy());
        assert!(!SqlValue::Int(0).is_truthy());
    }

    #[test]
    fn test_empty_string_is_truthy() {
        assert!("".is_truthy());
        assert!(String::new().is_truthy());
        assert!(SqlValue::String(String::new()).is_truthy());
        assert!(JsonValue::String(String::new()).is_truthy());
    }

    #[test]
    fn test_option() {
        assert!(!None::<i32>.is_truthy());
        assert!(!Some(0u8).is_truthy());
        assert!(Some("x").is_truthy());
    }
}
