//! Configuration
//!
//! Two inputs:
//! - the jobs file (`runs.yaml`): one [`JobGroupSpec`] per top-level key
//! - tool settings, merged from layers:
//!   1. Built-in defaults
//!   2. Host settings (~/.config/slurmer/settings.toml)
//!   3. Environment (SLURMER_*)
//!   4. CLI flags

mod defaults;
mod error;
mod jobs;
mod merge;
mod settings;

pub use defaults::BuiltinDefaults;
pub use error::ConfigError;
pub use jobs::{ConfigFormat, DependencySpec, GroupEntry, JobGroupSpec, JobsFile, SchedulerOptions};
pub use merge::{deep_merge, merge_layers};
pub use settings::{EffectiveSettings, Settings, SettingsOrigin, SettingsSource, DEPENDENCY_KINDS};
