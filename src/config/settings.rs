//! Effective tool settings with provenance
//!
//! Settings are merged from every layer that is present and recorded
//! together with where each layer came from. File layers carry the
//! SHA-256 digest of their raw bytes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

use super::defaults::BuiltinDefaults;
use super::error::ConfigError;
use super::merge::merge_layers;

/// Slurm dependency types accepted in `--dependency=<kind>:<id>`.
///
/// `singleton` takes no job IDs, so it cannot link instances.
pub const DEPENDENCY_KINDS: &[&str] = &["after", "afterany", "afterburstbuffer", "aftercorr", "afternotok", "afterok"];

const LOG_LEVELS: &[&str] = &["off", "error", "warn", "info", "debug", "trace"];

/// Environment variables forming the environment layer.
const ENV_KEYS: &[(&str, &str)] = &[
    ("SLURMER_SQUEUE", "squeue_command"),
    ("SLURMER_SBATCH", "sbatch_command"),
    ("SLURMER_USER", "user"),
    ("SLURMER_LOG", "log_level"),
];

/// Where a settings layer came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SettingsOrigin {
    Builtin,
    Host,
    Env,
    Cli,
}

/// A contributing layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsSource {
    pub origin: SettingsOrigin,

    /// File path (host layer only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 of the raw file bytes (host layer only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Resolved settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub squeue_command: String,
    pub sbatch_command: String,

    /// Queue owner to query (default: $USER)
    pub user: Option<String>,

    pub shell: String,
    pub dependency_kind: String,
    pub chain_dependency_kind: String,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        let defaults = BuiltinDefaults::default();
        Self {
            squeue_command: defaults.squeue_command,
            sbatch_command: defaults.sbatch_command,
            user: None,
            shell: defaults.shell,
            dependency_kind: defaults.dependency_kind,
            chain_dependency_kind: defaults.chain_dependency_kind,
            log_level: defaults.log_level,
        }
    }
}

/// Settings plus the layers that produced them
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveSettings {
    pub settings: Settings,

    /// Contributing layers in precedence order
    pub sources: Vec<SettingsSource>,
}

impl EffectiveSettings {
    /// Merge builtin defaults, the host file (if it exists), the environment
    /// layer and CLI overrides, in that order.
    pub fn build(
        host_path: Option<&Path>,
        env_layer: Option<Value>,
        cli_overrides: Option<Value>,
    ) -> Result<Self, ConfigError> {
        let mut layers = vec![BuiltinDefaults::default().to_value()];
        let mut sources = vec![SettingsSource {
            origin: SettingsOrigin::Builtin,
            path: None,
            digest: None,
        }];

        if let Some(path) = host_path.filter(|p| p.exists()) {
            let (value, digest) = load_toml_file(path)?;
            log::debug!("loaded host settings from {} ({})", path.display(), &digest[..12]);
            layers.push(value);
            sources.push(SettingsSource {
                origin: SettingsOrigin::Host,
                path: Some(path.display().to_string()),
                digest: Some(digest),
            });
        }

        for (origin, layer) in [(SettingsOrigin::Env, env_layer), (SettingsOrigin::Cli, cli_overrides)] {
            if let Some(value) = layer.filter(|v| v.as_object().map_or(false, |m| !m.is_empty())) {
                layers.push(value);
                sources.push(SettingsSource {
                    origin,
                    path: None,
                    digest: None,
                });
            }
        }

        let merged = merge_layers(layers);
        let settings: Settings =
            serde_json::from_value(merged).map_err(|e| ConfigError::Settings(e.to_string()))?;
        validate(&settings)?;

        Ok(Self { settings, sources })
    }

    /// Defaults only.
    pub fn builtin() -> Self {
        Self {
            settings: Settings::default(),
            sources: vec![SettingsSource {
                origin: SettingsOrigin::Builtin,
                path: None,
                digest: None,
            }],
        }
    }

    /// `~/.config/slurmer/settings.toml`, if `$HOME` is set.
    pub fn default_host_path() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config/slurmer/settings.toml"))
    }

    /// The environment layer from the current process environment.
    pub fn env_layer() -> Option<Value> {
        Self::env_layer_from(|key| std::env::var(key).ok())
    }

    /// The environment layer from an arbitrary lookup.
    pub fn env_layer_from(lookup: impl Fn(&str) -> Option<String>) -> Option<Value> {
        let map: Map<String, Value> = ENV_KEYS
            .iter()
            .filter_map(|(var, key)| {
                lookup(var)
                    .filter(|v| !v.is_empty())
                    .map(|v| (key.to_string(), Value::String(v)))
            })
            .collect();
        if map.is_empty() {
            None
        } else {
            Some(Value::Object(map))
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
    let bytes = fs::read(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let digest = hex::encode(Sha256::digest(&bytes));

    let parse_err = |reason: String| ConfigError::Parse {
        path: path.display().to_string(),
        reason,
    };
    let contents = String::from_utf8(bytes).map_err(|e| parse_err(format!("invalid UTF-8: {}", e)))?;
    let value: Value = toml::from_str(&contents).map_err(|e| parse_err(e.to_string()))?;

    Ok((value, digest))
}

fn validate(settings: &Settings) -> Result<(), ConfigError> {
    for (field, kind) in [
        ("dependency_kind", &settings.dependency_kind),
        ("chain_dependency_kind", &settings.chain_dependency_kind),
    ] {
        if !DEPENDENCY_KINDS.contains(&kind.as_str()) {
            return Err(ConfigError::Settings(format!(
                "{} '{}' is not one of {}",
                field,
                kind,
                DEPENDENCY_KINDS.join(", ")
            )));
        }
    }

    if !LOG_LEVELS.contains(&settings.log_level.to_lowercase().as_str()) {
        return Err(ConfigError::Settings(format!(
            "log_level '{}' is not one of {}",
            settings.log_level,
            LOG_LEVELS.join(", ")
        )));
    }

    for (field, value) in [
        ("squeue_command", &settings.squeue_command),
        ("sbatch_command", &settings.sbatch_command),
        ("shell", &settings.shell),
    ] {
        if value.trim().is_empty() {
            return Err(ConfigError::Settings(format!("{} must not be empty", field)));
        }
    }

    Ok(())
}
