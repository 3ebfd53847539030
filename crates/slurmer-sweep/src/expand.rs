//! Sweep expansion.
//!
//! Turns a [`ParamSpec`] into the ordered list of [`Binding`]s it describes:
//! every parameter is resolved to a value sequence, then the Cartesian
//! product is taken in declaration order with the last parameter varying
//! fastest. For sizes s1..sN a table yields exactly s1 * ... * sN bindings.
//!
//! Glob parameters are the only source of I/O and go through [`PathLister`]
//! so expansion can be tested without touching the filesystem.

use serde::Serialize;
use std::fmt;
use std::io;

use crate::param::{ParamSet, ParamSource, ParamSpec, SpecialParam};
use crate::value::ParamValue;

/// Lists filesystem entries matching a glob pattern.
pub trait PathLister {
    /// Return the entries matching `pattern`.
    ///
    /// With `root_dir` set, the pattern is evaluated inside that directory
    /// and results are relative to it.
    fn list(&self, pattern: &str, root_dir: Option<&str>) -> io::Result<Vec<String>>;
}

/// Expansion errors. All of them are configuration errors of the group.
#[derive(Debug, thiserror::Error)]
pub enum ExpandError {
    #[error("parameter '{name}' resolves to no values")]
    EmptyParameter { name: String },

    #[error("parameter '{name}': glob '{pattern}' matched no paths")]
    NoGlobMatches { name: String, pattern: String },

    #[error("parameter '{name}': glob '{pattern}' failed: {source}")]
    Glob {
        name: String,
        pattern: String,
        #[source]
        source: io::Error,
    },

    #[error("parameter '{name}': invalid range: {reason}")]
    InvalidRange { name: String, reason: String },

    #[error("parameter '{name}': {reason}")]
    InvalidDescriptor { name: String, reason: String },
}

/// One concrete assignment of values to parameters.
///
/// Entries keep declaration order; the tuple of values in that order is the
/// binding's identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Binding {
    entries: crate::ordered::OrderedMap<ParamValue>,
}

impl Binding {
    /// Build a binding from `(name, value)` pairs. Later duplicate names are ignored.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<ParamValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// The empty binding, produced by a parameter table with no entries.
    pub fn empty() -> Self {
        Self {
            entries: Default::default(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter()
    }

    /// Rendered values in declaration order.
    pub fn identity(&self) -> Vec<String> {
        self.entries.iter().map(|(_, v)| v.render()).collect()
    }

    /// Rendered values for `keys`, or the first key this binding lacks.
    pub fn project<'k>(&self, keys: &'k [String]) -> Result<Vec<String>, &'k str> {
        keys.iter()
            .map(|k| self.get(k).map(ParamValue::render).ok_or(k.as_str()))
            .collect()
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, v) in self.entries.iter() {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{}={}", k, v)?;
        }
        Ok(())
    }
}

/// Expand a full parameter spec. Tables are expanded in order and concatenated.
pub fn expand(spec: &ParamSpec, lister: &dyn PathLister) -> Result<Vec<Binding>, ExpandError> {
    if spec.sets().is_empty() {
        return Ok(vec![Binding::empty()]);
    }

    let mut bindings = Vec::new();
    for set in spec.sets() {
        bindings.extend(expand_set(set, lister)?);
    }
    Ok(bindings)
}

/// Expand one parameter table into its Cartesian product.
pub fn expand_set(set: &ParamSet, lister: &dyn PathLister) -> Result<Vec<Binding>, ExpandError> {
    let mut axes: Vec<(&str, Vec<ParamValue>)> = Vec::with_capacity(set.len());
    for (name, source) in set.iter() {
        let values = resolve_values(name, source, lister)?;
        if values.is_empty() {
            return Err(ExpandError::EmptyParameter {
                name: name.to_string(),
            });
        }
        axes.push((name, values));
    }

    let total: usize = axes.iter().map(|(_, v)| v.len()).product();
    let mut bindings = Vec::with_capacity(total);

    // Odometer over the axes; the last axis turns fastest
    let mut cursor = vec![0usize; axes.len()];
    for _ in 0..total {
        bindings.push(Binding::from_pairs(
            axes.iter()
                .zip(&cursor)
                .map(|((name, values), &i)| (*name, values[i].clone())),
        ));

        for axis in (0..axes.len()).rev() {
            cursor[axis] += 1;
            if cursor[axis] < axes[axis].1.len() {
                break;
            }
            cursor[axis] = 0;
        }
    }

    Ok(bindings)
}

/// Resolve one parameter to its ordered value sequence.
pub fn resolve_values(
    name: &str,
    source: &ParamSource,
    lister: &dyn PathLister,
) -> Result<Vec<ParamValue>, ExpandError> {
    match source {
        ParamSource::Scalar(value) => Ok(vec![value.clone()]),
        ParamSource::List(values) => Ok(values.clone()),
        ParamSource::Special(special) => resolve_special(name, special, lister),
    }
}

fn resolve_special(
    name: &str,
    special: &SpecialParam,
    lister: &dyn PathLister,
) -> Result<Vec<ParamValue>, ExpandError> {
    match (&special.glob, &special.range) {
        (Some(pattern), None) => {
            let mut paths = lister
                .list(pattern, special.root_dir.as_deref())
                .map_err(|source| ExpandError::Glob {
                    name: name.to_string(),
                    pattern: pattern.clone(),
                    source,
                })?;
            if paths.is_empty() {
                return Err(ExpandError::NoGlobMatches {
                    name: name.to_string(),
                    pattern: pattern.clone(),
                });
            }
            paths.sort();
            paths.dedup();
            Ok(paths.into_iter().map(ParamValue::Str).collect())
        }
        (None, Some(range)) => {
            if special.root_dir.is_some() {
                return Err(ExpandError::InvalidDescriptor {
                    name: name.to_string(),
                    reason: "root_dir only applies to glob parameters".to_string(),
                });
            }
            let (start, stop, step) = range.bounds().map_err(|reason| ExpandError::InvalidRange {
                name: name.to_string(),
                reason,
            })?;
            Ok(range_values(start, stop, step, special.inclusive)
                .into_iter()
                .map(ParamValue::Int)
                .collect())
        }
        (Some(_), Some(_)) => Err(ExpandError::InvalidDescriptor {
            name: name.to_string(),
            reason: "set either glob or range, not both".to_string(),
        }),
        (None, None) => Err(ExpandError::InvalidDescriptor {
            name: name.to_string(),
            reason: "descriptor needs a glob or a range".to_string(),
        }),
    }
}

/// Values of `start..stop` by `step`, including `stop` when `inclusive`.
/// `step` must be non-zero.
pub fn range_values(start: i64, stop: i64, step: i64, inclusive: bool) -> Vec<i64> {
    let in_range = |v: i64| match (step > 0, inclusive) {
        (true, false) => v < stop,
        (true, true) => v <= stop,
        (false, false) => v > stop,
        (false, true) => v >= stop,
    };

    let mut values = Vec::new();
    let mut v = start;
    while in_range(v) {
        values.push(v);
        match v.checked_add(step) {
            Some(next) => v = next,
            None => break,
        }
    }
    values
}
