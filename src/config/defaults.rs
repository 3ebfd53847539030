//! Built-in defaults (layer 1)

use serde::{Deserialize, Serialize};

/// Built-in default settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Queue query executable (default: "squeue")
    pub squeue_command: String,

    /// Batch submission executable (default: "sbatch")
    pub sbatch_command: String,

    /// Shell used for environment activation and interactive commands (default: "bash")
    pub shell: String,

    /// Dependency type between dependent groups (default: "afterok")
    pub dependency_kind: String,

    /// Dependency type between chained submissions of one instance (default: "afterany")
    pub chain_dependency_kind: String,

    /// Log level (default: "info")
    pub log_level: String,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            squeue_command: "squeue".to_string(),
            sbatch_command: "sbatch".to_string(),
            shell: "bash".to_string(),
            dependency_kind: "afterok".to_string(),
            chain_dependency_kind: "afterany".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "squeue_command": self.squeue_command,
            "sbatch_command": self.sbatch_command,
            "user": null,
            "shell": self.shell,
            "dependency_kind": self.dependency_kind,
            "chain_dependency_kind": self.chain_dependency_kind,
            "log_level": self.log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let defaults = BuiltinDefaults::default();
        assert_eq!(defaults.squeue_command, "squeue");
        assert_eq!(defaults.sbatch_command, "sbatch");
        assert_eq!(defaults.dependency_kind, "afterok");
        assert_eq!(defaults.chain_dependency_kind, "afterany");
    }

    #[test]
    fn test_to_value() {
        let value = BuiltinDefaults::default().to_value();
        assert_eq!(value["shell"], "bash");
        assert_eq!(value["log_level"], "info");
        assert!(value["user"].is_null());
    }
}
