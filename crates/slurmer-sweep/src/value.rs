//! Parameter values.
//!
//! A value is what a single parameter takes in one binding. Values keep
//! the type they were written with so that rendering is stable: an integer
//! written as `3` renders `3`, a float written as `3.0` renders `3.0`.

use serde::de::{self, Deserialize, Deserializer, Visitor};
use serde::{Serialize, Serializer};
use std::fmt;

/// A single concrete parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// String value, rendered verbatim.
    Str(String),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Boolean value, rendered `true` / `false`.
    Bool(bool),
    /// Explicit null. Renders as the empty string; a flag parameter with a
    /// null value is emitted as a bare flag.
    Null,
}

impl ParamValue {
    /// Whether this is the null value.
    pub fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null)
    }

    /// Rendered string form used by templates and command lines.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Str(s) => f.write_str(s),
            ParamValue::Int(i) => write!(f, "{}", i),
            // Debug is the shortest round-trip form and keeps ".0" on integral floats
            ParamValue::Float(x) => write!(f, "{:?}", x),
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Null => Ok(()),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Str(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Str(s)
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        ParamValue::Int(i)
    }
}

impl From<f64> for ParamValue {
    fn from(x: f64) -> Self {
        ParamValue::Float(x)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

impl Serialize for ParamValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ParamValue::Str(s) => serializer.serialize_str(s),
            ParamValue::Int(i) => serializer.serialize_i64(*i),
            ParamValue::Float(x) => serializer.serialize_f64(*x),
            ParamValue::Bool(b) => serializer.serialize_bool(*b),
            ParamValue::Null => serializer.serialize_unit(),
        }
    }
}

struct ParamValueVisitor;

impl<'de> Visitor<'de> for ParamValueVisitor {
    type Value = ParamValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string, number, boolean or null")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<ParamValue, E> {
        Ok(ParamValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<ParamValue, E> {
        Ok(ParamValue::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<ParamValue, E> {
        i64::try_from(v)
            .map(ParamValue::Int)
            .map_err(|_| E::custom(format!("integer {} is out of range", v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<ParamValue, E> {
        Ok(ParamValue::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<ParamValue, E> {
        Ok(ParamValue::Str(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<ParamValue, E> {
        Ok(ParamValue::Str(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<ParamValue, E> {
        Ok(ParamValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<ParamValue, E> {
        Ok(ParamValue::Null)
    }
}

impl<'de> Deserialize<'de> for ParamValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ParamValueVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_scalars() {
        assert_eq!(ParamValue::from("mnist").render(), "mnist");
        assert_eq!(ParamValue::Int(42).render(), "42");
        assert_eq!(ParamValue::Int(-3).render(), "-3");
        assert_eq!(ParamValue::Bool(true).render(), "true");
        assert_eq!(ParamValue::Null.render(), "");
    }

    #[test]
    fn test_render_floats_keep_written_precision() {
        assert_eq!(ParamValue::Float(0.1).render(), "0.1");
        assert_eq!(ParamValue::Float(1.0).render(), "1.0");
        assert_eq!(ParamValue::Float(2.5e-4).render(), "0.00025");
        assert_eq!(ParamValue::Float(0.30).render(), "0.3");
    }

    #[test]
    fn test_deserialize_from_json() {
        let values: Vec<ParamValue> =
            serde_json::from_str(r#"["a", 1, 1.5, false, null]"#).unwrap();
        assert_eq!(
            values,
            vec![
                ParamValue::from("a"),
                ParamValue::Int(1),
                ParamValue::Float(1.5),
                ParamValue::Bool(false),
                ParamValue::Null,
            ]
        );
    }

    #[test]
    fn test_map_value_rejected() {
        let result: Result<ParamValue, _> = serde_json::from_str(r#"{"a": 1}"#);
        assert!(result.is_err());
    }
}
