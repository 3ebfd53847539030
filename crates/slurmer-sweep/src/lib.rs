//! Parameter sweeps for slurmer.
//!
//! Pure building blocks with no scheduler knowledge:
//! - [`ParamSpec`]: what a job group's parameters are declared as
//! - [`expand`]: the ordered Cartesian product of a spec as [`Binding`]s
//! - [`render`]: `{param}` substitution of a binding into a template
//!
//! The only I/O is glob resolution, which goes through the [`PathLister`]
//! trait supplied by the caller.

mod expand;
mod ordered;
mod param;
mod template;
mod value;

pub use expand::{expand, expand_set, range_values, resolve_values, Binding, ExpandError, PathLister};
pub use ordered::OrderedMap;
pub use param::{ParamSet, ParamSource, ParamSpec, RangeSpec, SpecialParam};
pub use template::{placeholders, render, render_with, TemplateError};
pub use value::ParamValue;
