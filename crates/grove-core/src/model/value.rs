//! Attribute values and their kinds

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// Declared type of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    String,
    Integer,
    Double,
    Boolean,
    Date,
}

impl AttributeKind {
    /// Whether values of this kind have a meaningful order
    pub fn is_ordered(&self) -> bool {
        !matches!(self, AttributeKind::Boolean)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, AttributeKind::Integer | AttributeKind::Double)
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttributeKind::String => "string",
            AttributeKind::Integer => "integer",
            AttributeKind::Double => "double",
            AttributeKind::Boolean => "boolean",
            AttributeKind::Date => "date",
        };
        f.write_str(name)
    }
}

/// A single attribute value
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Date(DateTime<Utc>),
}

impl Value {
    /// Kind of a non-null value
    pub fn kind(&self) -> Option<AttributeKind> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(AttributeKind::Boolean),
            Value::Integer(_) => Some(AttributeKind::Integer),
            Value::Double(_) => Some(AttributeKind::Double),
            Value::String(_) => Some(AttributeKind::String),
            Value::Date(_) => Some(AttributeKind::Date),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Convert into the given kind where a lossless or conventional
    /// conversion exists (integer to double, integral in-range double to
    /// integer, RFC 3339 string to date).
    ///
    /// Null coerces to Null for every kind.
    pub fn coerce_to(&self, kind: AttributeKind) -> Option<Value> {
        match (self, kind) {
            (Value::Null, _) => Some(Value::Null),
            (Value::Bool(_), AttributeKind::Boolean)
            | (Value::Integer(_), AttributeKind::Integer)
            | (Value::Double(_), AttributeKind::Double)
            | (Value::String(_), AttributeKind::String)
            | (Value::Date(_), AttributeKind::Date) => Some(self.clone()),
            (Value::Integer(i), AttributeKind::Double) => Some(Value::Double(*i as f64)),
            // 2^63 itself is out of range; -2^63 is i64::MIN
            (Value::Double(d), AttributeKind::Integer)
                if d.fract() == 0.0 && *d >= -(2f64.powi(63)) && *d < 2f64.powi(63) =>
            {
                Some(Value::Integer(*d as i64))
            }
            (Value::String(s), AttributeKind::Date) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|d| Value::Date(d.with_timezone(&Utc))),
            _ => None,
        }
    }

    /// Compare two values for predicate evaluation.
    ///
    /// Numbers compare across integer/double. Null only compares equal to
    /// Null. Values of unrelated kinds are incomparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Some(x.total_cmp(&y)),
                _ => None,
            },
        }
    }

    /// Total order used by sort descriptors: Null first, then by value,
    /// with unrelated kinds ordered by kind.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (a, b) => a
                .compare(b)
                .unwrap_or_else(|| a.kind_rank().cmp(&b.kind_rank())),
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Integer(_) | Value::Double(_) => 2,
            Value::String(_) => 3,
            Value::Date(_) => 4,
        }
    }

    /// JSON form used for persistence and CLI output
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Double(d) => serde_json::Number::from_f64(*d)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Date(d) => {
                serde_json::Value::String(d.to_rfc3339_opts(SecondsFormat::Micros, true))
            }
        }
    }

    /// Decode a persisted JSON value, guided by the declared kind.
    ///
    /// Returns `None` when the JSON cannot represent a value of that kind.
    pub fn from_json(json: &serde_json::Value, kind: AttributeKind) -> Option<Value> {
        let raw = match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Double(n.as_f64()?),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            _ => return None,
        };
        raw.coerce_to(kind)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a.total_cmp(b) == Ordering::Equal,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Double(d) => write!(f, "{}", d),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Date(d) => write!(f, "{}", d.to_rfc3339_opts(SecondsFormat::Secs, true)),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
