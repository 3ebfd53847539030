//! Configuration errors

use std::io;
use std::path::PathBuf;

use slurmer_sweep::ExpandError;

/// Errors in the jobs file, tool settings, or a group's parameter sweep.
///
/// Group-scoped variants are fatal for that group only; the rest stop the run.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("unsupported config format '{0}' (expected .toml, .yaml, .yml or .json)")]
    UnknownFormat(String),

    #[error("group '{group}': {reason}")]
    Invalid { group: String, reason: String },

    #[error("group '{group}': {source}")]
    Sweep {
        group: String,
        #[source]
        source: ExpandError,
    },

    #[error("group '{group}': bindings ({first}) and ({second}) both render job name '{name}'")]
    DuplicateName {
        group: String,
        name: String,
        first: String,
        second: String,
    },

    #[error("unknown job group '{0}'")]
    UnknownGroup(String),

    #[error("dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("invalid setting: {0}")]
    Settings(String),
}

impl ConfigError {
    pub(crate) fn invalid(group: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            group: group.to_string(),
            reason: reason.into(),
        }
    }
}
