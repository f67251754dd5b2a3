use std::fmt;

use crate::error::{LabError, LabResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    /// Numeric view of the value, booleans count as 0 and 1.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Str(_) | Value::List(_) => None,
        }
    }

    /// Integer view of the value. Floats are only accepted when integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(*b as i64),
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.as_f64().is_some()
    }

    /// Equality where `1`, `1.0` and `true` are the same value.
    pub fn loosely_eq(&self, other: &Value) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => match (self, other) {
                (Value::List(a), Value::List(b)) => {
                    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loosely_eq(y))
                }
                _ => self == other,
            },
        }
    }
}

fn display_float(f: &mut fmt::Formatter<'_>, v: f64) -> fmt::Result {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 {
        write!(f, "{:.1}", v)
    } else {
        write!(f, "{}", v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => display_float(f, *v),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

macro_rules! value_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(v as i64)
            }
        })*
    };
}

value_from_int!(i8, i16, i32, i64, u8, u16, u32, usize);

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

/// Conversion out of a parsed reply.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> LabResult<Self>;
}

fn mismatch(value: &Value, wanted: &str) -> LabError {
    LabError::parse(&value.to_string(), format!("expected {}", wanted))
}

impl FromValue for Value {
    fn from_value(value: Value) -> LabResult<Self> {
        Ok(value)
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> LabResult<Self> {
        match &value {
            Value::Str(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|e| LabError::parse(s, e.to_string())),
            other => other.as_f64().ok_or_else(|| mismatch(&value, "a number")),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> LabResult<Self> {
        f64::from_value(value).map(|v| v as f32)
    }
}

macro_rules! int_from_value {
    ($($t:ty),*) => {
        $(impl FromValue for $t {
            fn from_value(value: Value) -> LabResult<Self> {
                let wide = match &value {
                    Value::Str(s) => s
                        .trim()
                        .parse::<i64>()
                        .map_err(|e| LabError::parse(s, e.to_string()))?,
                    other => other.as_i64().ok_or_else(|| mismatch(&value, "an integer"))?,
                };
                <$t>::try_from(wide).map_err(|e| LabError::parse(&wide.to_string(), e.to_string()))
            }
        })*
    };
}

int_from_value!(i8, i16, i32, i64, u8, u16, u32, usize);

impl FromValue for bool {
    fn from_value(value: Value) -> LabResult<Self> {
        match &value {
            Value::Bool(b) => Ok(*b),
            Value::Str(s) => match s.trim().to_ascii_uppercase().as_str() {
                "1" | "ON" | "TRUE" => Ok(true),
                "0" | "OFF" | "FALSE" => Ok(false),
                _ => Err(mismatch(&value, "a boolean")),
            },
            other => other
                .as_f64()
                .map(|v| v != 0.0)
                .ok_or_else(|| mismatch(&value, "a boolean")),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> LabResult<Self> {
        match value {
            Value::Str(s) => Ok(s),
            other => Ok(other.to_string()),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> LabResult<Self> {
        match value {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            scalar => Ok(vec![T::from_value(scalar)?]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loose_equality_crosses_numeric_kinds() {
        assert!(Value::Int(1).loosely_eq(&Value::Float(1.0)));
        assert!(Value::Bool(true).loosely_eq(&Value::Int(1)));
        assert!(!Value::Str("1".into()).loosely_eq(&Value::Int(1)));
        assert!(Value::Str("ON".into()).loosely_eq(&Value::Str("ON".into())));
    }

    #[test]
    fn floats_display_like_reprs() {
        assert_eq!(Value::Float(500.0).to_string(), "500.0");
        assert_eq!(Value::Float(0.25).to_string(), "0.25");
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::Str("A".into())]).to_string(),
            "1,A"
        );
    }

    #[test]
    fn replies_convert_into_rust_types() {
        assert_eq!(f64::from_value(Value::Int(3)).unwrap(), 3.0);
        assert_eq!(u8::from_value(Value::Float(7.0)).unwrap(), 7);
        assert!(u8::from_value(Value::Float(7.5)).is_err());
        assert!(u8::from_value(Value::Int(300)).is_err());
        assert!(bool::from_value(Value::Str("ON".into())).unwrap());
        assert_eq!(
            Vec::<f64>::from_value(Value::List(vec![Value::Float(1.5), Value::Int(2)])).unwrap(),
            vec![1.5, 2.0]
        );
        assert_eq!(Vec::<i64>::from_value(Value::Int(4)).unwrap(), vec![4]);
    }
}
