//! Scalar cell values and their semantic types
//!
//! Every table cell is a [`Value`]. The variant set is closed so that key
//! encoding stays deterministic: each variant has exactly one byte encoding
//! (see `keys::encoder`).

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Semantic type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Text,
    Int,
    Float,
    Decimal,
    DateTime,
    Date,
    Guid,
    Bool,
}

impl ValueType {
    /// The additive identity used when a fact column has no contribution
    pub fn zero(self) -> Value {
        match self {
            ValueType::Int => Value::Int(0),
            ValueType::Float => Value::Float(0.0),
            ValueType::Decimal => Value::Decimal(Decimal::ZERO),
            _ => Value::Null,
        }
    }
}

/// A single table cell
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    Guid(Ulid),
    Bool(bool),
}

impl Value {
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Value::Null => None,
            Value::Text(_) => Some(ValueType::Text),
            Value::Int(_) => Some(ValueType::Int),
            Value::Float(_) => Some(ValueType::Float),
            Value::Decimal(_) => Some(ValueType::Decimal),
            Value::DateTime(_) => Some(ValueType::DateTime),
            Value::Date(_) => Some(ValueType::Date),
            Value::Guid(_) => Some(ValueType::Guid),
            Value::Bool(_) => Some(ValueType::Bool),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::DateTime(dt) => Some(dt.date()),
            _ => None,
        }
    }

    /// Add `other` into this value (fact accumulation).
    ///
    /// Null is the identity on both sides. Mixed Int/Float widens to Float;
    /// any other mismatch keeps the existing value. Int and Decimal sums
    /// saturate at the bounds of their type.
    pub fn accumulate(&mut self, other: &Value) {
        let sum = match (&*self, other) {
            (_, Value::Null) => return,
            (Value::Null, v) => v.clone(),
            (Value::Int(a), Value::Int(b)) => Value::Int(a.saturating_add(*b)),
            (Value::Float(a), Value::Float(b)) => Value::Float(a + b),
            (Value::Int(a), Value::Float(b)) => Value::Float(*a as f64 + b),
            (Value::Float(a), Value::Int(b)) => Value::Float(a + *b as f64),
            (Value::Decimal(a), Value::Decimal(b)) => {
                let bound = if b.is_sign_negative() { Decimal::MIN } else { Decimal::MAX };
                Value::Decimal(a.checked_add(*b).unwrap_or(bound))
            }
            _ => return,
        };
        *self = sum;
    }

    /// Lossy 32-bit hash code, used only as the fallback byte source for types
    /// without a dedicated encoding.
    ///
    /// 64-bit integers fold their halves together (`lo ^ hi`), so distinct
    /// values can share a code; this is why keys never hash these codes for
    /// integer columns.
    pub fn generic_hash32(&self) -> i32 {
        match self {
            Value::Null => 0,
            Value::Bool(b) => i32::from(*b),
            Value::Int(n) => ((*n as u64 as u32) ^ ((*n as u64 >> 32) as u32)) as i32,
            Value::Date(d) => d.num_days_from_ce(),
            Value::Float(f) => {
                let bits = f.to_bits();
                ((bits as u32) ^ ((bits >> 32) as u32)) as i32
            }
            other => {
                // Remaining variants have a byte encoding; fold those bytes.
                let mut acc = 0u32;
                for chunk in crate::keys::encoder::encode(other).chunks(4) {
                    let mut word = [0u8; 4];
                    word[..chunk.len()].copy_from_slice(chunk);
                    acc ^= u32::from_le_bytes(word);
                }
                acc as i32
            }
        }
    }

    /// JSON rendering used by sinks
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null => Json::Null,
            Value::Text(s) => Json::String(s.clone()),
            Value::Int(n) => Json::from(*n),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Decimal(d) => Json::String(d.to_string()),
            Value::DateTime(dt) => Json::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            Value::Date(d) => Json::String(d.format("%Y-%m-%d").to_string()),
            Value::Guid(id) => Json::String(id.to_string()),
            Value::Bool(b) => Json::Bool(*b),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Text(s) => f.write_str(s),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.f")),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Guid(id) => write!(f, "{}", id),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Value::DateTime(dt)
    }
}

impl From<Ulid> for Value {
    fn from(id: Ulid) -> Self {
        Value::Guid(id)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate_null_identity() {
        let mut v = Value::Null;
        v.accumulate(&Value::Int(4));
        assert_eq!(v, Value::Int(4));

        v.accumulate(&Value::Null);
        assert_eq!(v, Value::Int(4));
    }

    #[test]
    fn test_accumulate_widens_to_float() {
        let mut v = Value::Int(2);
        v.accumulate(&Value::Float(0.5));
        assert_eq!(v, Value::Float(2.5));
    }

    #[test]
    fn test_accumulate_mismatch_keeps_existing() {
        let mut v = Value::Text("a".to_string());
        v.accumulate(&Value::Int(1));
        assert_eq!(v, Value::Text("a".to_string()));
    }

    #[test]
    fn test_accumulate_saturates() {
        let mut v = Value::Int(i64::MAX - 1);
        v.accumulate(&Value::Int(5));
        assert_eq!(v, Value::Int(i64::MAX));

        let mut v = Value::Int(i64::MIN);
        v.accumulate(&Value::Int(-1));
        assert_eq!(v, Value::Int(i64::MIN));

        let mut d = Value::Decimal(Decimal::MAX);
        d.accumulate(&Value::Decimal(Decimal::ONE));
        assert_eq!(d, Value::Decimal(Decimal::MAX));

        let mut d = Value::Decimal(Decimal::MIN);
        d.accumulate(&Value::Decimal(Decimal::NEGATIVE_ONE));
        assert_eq!(d, Value::Decimal(Decimal::MIN));
    }

    #[test]
    fn test_generic_hash_folds_int_halves() {
        let a = Value::Int(8704292282190210790);
        let b = Value::Int(2697783581641838223);
        assert_ne!(a, b);
        assert_eq!(a.generic_hash32(), b.generic_hash32());
    }

    #[test]
    fn test_fact_zero() {
        assert_eq!(ValueType::Int.zero(), Value::Int(0));
        assert_eq!(ValueType::Decimal.zero(), Value::Decimal(Decimal::ZERO));
        assert_eq!(ValueType::Text.zero(), Value::Null);
    }
}
