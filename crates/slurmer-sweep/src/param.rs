//! Parameter specification types.
//!
//! A parameter is declared as one of:
//! - a scalar (`lr = 0.1`), a singleton sequence
//! - a list (`seed = [1, 2, 3]`)
//! - a range descriptor (`n = { range = [0, 10, 2] }`)
//! - a glob descriptor (`input = { glob = "data/*.csv", root_dir = "~/proj" }`)
//!
//! A group's `params` is either one table of parameters or a list of
//! tables whose expansions are concatenated.

use serde::de::value::{MapAccessDeserializer, SeqAccessDeserializer};
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::Serialize;
use std::fmt;

use crate::ordered::OrderedMap;
use crate::value::ParamValue;

/// Where a parameter's values come from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamSource {
    /// Single value.
    Scalar(ParamValue),
    /// Explicit ordered list of values.
    List(Vec<ParamValue>),
    /// Range or glob descriptor.
    Special(SpecialParam),
}

/// Range or glob descriptor.
///
/// Exactly one of `glob` / `range` must be set; this is checked at expansion
/// time so that the error can name the parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpecialParam {
    /// Glob pattern matched against the filesystem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glob: Option<String>,

    /// Directory the glob is evaluated in; matches are reported relative to it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_dir: Option<String>,

    /// Numeric range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<RangeSpec>,

    /// Include `stop` in the range.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub inclusive: bool,
}

/// Numeric range descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum RangeSpec {
    /// `[stop]`, `[start, stop]` or `[start, stop, step]`.
    Bounds(Vec<i64>),
    /// `{ start, stop, step }`.
    Explicit {
        #[serde(default)]
        start: i64,
        stop: i64,
        #[serde(default = "default_step")]
        step: i64,
    },
}

fn default_step() -> i64 {
    1
}

impl RangeSpec {
    /// Normalize to `(start, stop, step)`.
    pub fn bounds(&self) -> Result<(i64, i64, i64), String> {
        let (start, stop, step) = match self {
            RangeSpec::Bounds(b) => match b.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => {
                    return Err(format!(
                        "range takes 1 to 3 integers, got {}",
                        b.len()
                    ))
                }
            },
            RangeSpec::Explicit { start, stop, step } => (*start, *stop, *step),
        };
        if step == 0 {
            return Err("range step must not be zero".to_string());
        }
        Ok((start, stop, step))
    }
}

struct ParamSourceVisitor;

impl<'de> Visitor<'de> for ParamSourceVisitor {
    type Value = ParamSource;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a value, a list of values, or a { glob } / { range } table")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<ParamSource, E> {
        Ok(ParamSource::Scalar(ParamValue::Bool(v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<ParamSource, E> {
        Ok(ParamSource::Scalar(ParamValue::Int(v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<ParamSource, E> {
        i64::try_from(v)
            .map(|i| ParamSource::Scalar(ParamValue::Int(i)))
            .map_err(|_| E::custom(format!("integer {} is out of range", v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<ParamSource, E> {
        Ok(ParamSource::Scalar(ParamValue::Float(v)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<ParamSource, E> {
        Ok(ParamSource::Scalar(ParamValue::Str(v.to_string())))
    }

    fn visit_unit<E: de::Error>(self) -> Result<ParamSource, E> {
        Ok(ParamSource::Scalar(ParamValue::Null))
    }

    fn visit_none<E: de::Error>(self) -> Result<ParamSource, E> {
        Ok(ParamSource::Scalar(ParamValue::Null))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, seq: A) -> Result<ParamSource, A::Error> {
        Vec::<ParamValue>::deserialize(SeqAccessDeserializer::new(seq)).map(ParamSource::List)
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<ParamSource, A::Error> {
        SpecialParam::deserialize(MapAccessDeserializer::new(map)).map(ParamSource::Special)
    }
}

impl<'de> Deserialize<'de> for ParamSource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ParamSourceVisitor)
    }
}

/// One table of parameters, in declaration order.
pub type ParamSet = OrderedMap<ParamSource>;

/// A group's full parameter specification.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ParamSpec {
    sets: Vec<ParamSet>,
}

impl ParamSpec {
    /// Spec made of a single parameter table.
    pub fn single(set: ParamSet) -> Self {
        Self { sets: vec![set] }
    }

    /// Spec made of several tables, expanded one after another.
    pub fn from_sets(sets: Vec<ParamSet>) -> Self {
        Self { sets }
    }

    /// Parameter tables. An absent spec behaves as one empty table.
    pub fn sets(&self) -> &[ParamSet] {
        &self.sets
    }

    /// Keys declared by every table of this spec.
    pub fn common_keys(&self) -> Vec<&str> {
        match self.sets.split_first() {
            None => Vec::new(),
            Some((first, rest)) => first
                .keys()
                .filter(|k| rest.iter().all(|set| set.contains_key(k)))
                .collect(),
        }
    }

    /// Keys declared by any table, first occurrence order.
    pub fn all_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for set in &self.sets {
            for key in set.keys() {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }
}

struct ParamSpecVisitor;

impl<'de> Visitor<'de> for ParamSpecVisitor {
    type Value = ParamSpec;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a parameter table or a list of parameter tables")
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<ParamSpec, A::Error> {
        ParamSet::deserialize(MapAccessDeserializer::new(map)).map(ParamSpec::single)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, seq: A) -> Result<ParamSpec, A::Error> {
        Vec::<ParamSet>::deserialize(SeqAccessDeserializer::new(seq)).map(ParamSpec::from_sets)
    }

    fn visit_unit<E: de::Error>(self) -> Result<ParamSpec, E> {
        Ok(ParamSpec::default())
    }
}

impl<'de> Deserialize<'de> for ParamSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ParamSpecVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_source_kinds() {
        let spec: ParamSpec = toml::from_str(
            r#"
            lr = 0.1
            seed = [1, 2, 3]
            n = { range = [0, 10, 2] }
            input = { glob = "data/*.csv", root_dir = "~/proj" }
            "#,
        )
        .unwrap();

        let set = &spec.sets()[0];
        let keys: Vec<&str> = set.keys().collect();
        assert_eq!(keys, vec!["lr", "seed", "n", "input"]);
        assert_eq!(set.get("lr"), Some(&ParamSource::Scalar(ParamValue::Float(0.1))));
        assert!(matches!(set.get("seed"), Some(ParamSource::List(v)) if v.len() == 3));
        match set.get("n") {
            Some(ParamSource::Special(s)) => {
                assert_eq!(s.range.as_ref().unwrap().bounds().unwrap(), (0, 10, 2));
            }
            other => panic!("unexpected {:?}", other),
        }
        match set.get("input") {
            Some(ParamSource::Special(s)) => {
                assert_eq!(s.glob.as_deref(), Some("data/*.csv"));
                assert_eq!(s.root_dir.as_deref(), Some("~/proj"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_list_of_tables() {
        let spec: ParamSpec =
            serde_json::from_str(r#"[{"a": [1, 2]}, {"a": 3, "b": "x"}]"#).unwrap();
        assert_eq!(spec.sets().len(), 2);
        assert_eq!(spec.common_keys(), vec!["a"]);
        assert_eq!(spec.all_keys(), vec!["a", "b"]);
    }

    #[test]
    fn test_unknown_descriptor_field_rejected() {
        let result: Result<ParamSpec, _> = serde_json::from_str(r#"{"a": {"globb": "*.txt"}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_range_forms() {
        assert_eq!(RangeSpec::Bounds(vec![5]).bounds().unwrap(), (0, 5, 1));
        assert_eq!(RangeSpec::Bounds(vec![2, 5]).bounds().unwrap(), (2, 5, 1));
        let explicit: RangeSpec = serde_json::from_str(r#"{"start": 1, "stop": 9, "step": 4}"#).unwrap();
        assert_eq!(explicit.bounds().unwrap(), (1, 9, 4));
        assert!(RangeSpec::Bounds(vec![0, 5, 0]).bounds().is_err());
        assert!(RangeSpec::Bounds(vec![]).bounds().is_err());
    }
}
