//! Settings merge logic
//!
//! Layers are merged in precedence order with:
//! - Objects: deep-merge by key
//! - Arrays: REPLACE (last wins)
//! - Scalars: override (last wins)

use serde_json::Value;

/// Deep merge two JSON values.
///
/// Objects merge recursively by key; arrays, scalars and null from
/// `overlay` replace whatever `base` held.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }

        // Arrays are replaced, never concatenated
        (Value::Array(_), overlay @ Value::Array(_)) => overlay,

        (_, overlay) => overlay,
    }
}

/// Merge layers in order (first is base, last has highest precedence)
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_override() {
        let result = deep_merge(json!({"sbatch_command": "sbatch"}), json!({"sbatch_command": "/opt/slurm/bin/sbatch"}));
        assert_eq!(result["sbatch_command"], "/opt/slurm/bin/sbatch");
    }

    #[test]
    fn test_keys_not_in_overlay_survive() {
        let base = json!({"squeue_command": "squeue", "dependency_kind": "afterok"});
        let overlay = json!({"dependency_kind": "afterany"});
        let result = deep_merge(base, overlay);

        assert_eq!(result["squeue_command"], "squeue");
        assert_eq!(result["dependency_kind"], "afterany");
    }

    #[test]
    fn test_array_replace() {
        let result = deep_merge(json!({"extra": ["a", "b", "c"]}), json!({"extra": ["x"]}));
        assert_eq!(result["extra"], json!(["x"]));
    }

    #[test]
    fn test_null_override() {
        let result = deep_merge(json!({"user": "alice"}), json!({"user": null}));
        assert!(result["user"].is_null());
    }

    #[test]
    fn test_nested_objects_merge() {
        let base = json!({"outer": {"a": 1, "b": 2}});
        let overlay = json!({"outer": {"b": 3, "c": 4}});
        assert_eq!(deep_merge(base, overlay), json!({"outer": {"a": 1, "b": 3, "c": 4}}));
    }

    #[test]
    fn test_merge_layers_precedence() {
        let builtin = json!({"log_level": "info", "shell": "bash", "user": null});
        let host = json!({"log_level": "warn", "user": "alice"});
        let env = json!({"user": "bob"});
        let cli = json!({"log_level": "debug"});

        let result = merge_layers(vec![builtin, host, env, cli]);

        assert_eq!(result["log_level"], "debug");
        assert_eq!(result["user"], "bob");
        assert_eq!(result["shell"], "bash");
    }
}
