//! Jobs file (`runs.yaml`)
//!
//! Each top-level key names a job group. Groups are parsed one by one so a
//! malformed group only takes itself out of the run; errors that make the
//! processing order undefined (unknown or cyclic `depends_on`) reject the
//! whole file.
//!
//! ```yaml
//! prepare:
//!   script: prepare.sh
//!   params: { dataset: [mnist, cifar] }
//!   completion: "data/{dataset}/.ready"
//! train:
//!   name: "train-{dataset}-{seed}"
//!   script: train.sh
//!   params: { dataset: [mnist, cifar], seed: { range: [0, 3] } }
//!   slurm: { --time: "4:00:00", --gres: "gpu:1" }
//!   depends_on: { group: prepare, on: [dataset] }
//! ```

use serde::de::value::MapAccessDeserializer;
use serde::de::{self, Deserialize, Deserializer, MapAccess, Visitor};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use slurmer_sweep::{placeholders, render, Binding, OrderedMap, ParamSpec, ParamValue, TemplateError};

use super::error::ConfigError;
use super::settings::DEPENDENCY_KINDS;

/// Jobs file syntax, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Detect the format from a path's extension.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "toml" => Ok(ConfigFormat::Toml),
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            "json" => Ok(ConfigFormat::Json),
            _ => Err(ConfigError::UnknownFormat(path.display().to_string())),
        }
    }
}

/// Scheduler options, as a raw option string or a flag → value table.
///
/// Table keys starting with `--` render as `--key=value`, other keys as
/// `-k value`; a null value renders the bare flag. Values are templates.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SchedulerOptions {
    Raw(String),
    Table(OrderedMap<ParamValue>),
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        SchedulerOptions::Table(OrderedMap::new())
    }
}

impl SchedulerOptions {
    /// Render the options for one binding into argv words.
    pub fn render(&self, binding: &Binding) -> Result<Vec<String>, TemplateError> {
        match self {
            SchedulerOptions::Raw(raw) => {
                let rendered = render(raw, binding)?;
                // Unbalanced quotes can only come from substituted values
                shlex::split(&rendered).ok_or_else(|| TemplateError::Unsplittable {
                    template: raw.clone(),
                    rendered,
                })
            }
            SchedulerOptions::Table(table) => {
                let mut words = Vec::with_capacity(table.len() * 2);
                for (flag, value) in table.iter() {
                    if value.is_null() {
                        words.push(flag.to_string());
                        continue;
                    }
                    let value = render(&value.render(), binding)?;
                    if flag.starts_with("--") {
                        words.push(format!("{}={}", flag, value));
                    } else {
                        words.push(flag.to_string());
                        words.push(value);
                    }
                }
                Ok(words)
            }
        }
    }

    /// Templates embedded in the options.
    fn templates(&self) -> Vec<String> {
        match self {
            SchedulerOptions::Raw(raw) => vec![raw.clone()],
            SchedulerOptions::Table(table) => table
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(_, v)| v.render())
                .collect(),
        }
    }
}

struct SchedulerOptionsVisitor;

impl<'de> Visitor<'de> for SchedulerOptionsVisitor {
    type Value = SchedulerOptions;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an option string or a table of flags")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<SchedulerOptions, E> {
        Ok(SchedulerOptions::Raw(v.to_string()))
    }

    fn visit_unit<E: de::Error>(self) -> Result<SchedulerOptions, E> {
        Ok(SchedulerOptions::default())
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<SchedulerOptions, A::Error> {
        OrderedMap::<ParamValue>::deserialize(MapAccessDeserializer::new(map)).map(SchedulerOptions::Table)
    }
}

impl<'de> Deserialize<'de> for SchedulerOptions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(SchedulerOptionsVisitor)
    }
}

/// Dependency of a group on another group.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependencySpec {
    /// Upstream group name
    pub group: String,

    /// Parameter keys that pair a downstream instance with its upstream instance.
    /// Empty means the upstream group must have exactly one instance.
    #[serde(default)]
    pub on: Vec<String>,

    /// Slurm dependency type (default: the `dependency_kind` setting)
    #[serde(default)]
    pub kind: Option<String>,
}

/// One job group.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobGroupSpec {
    /// Group name (the top-level key)
    #[serde(skip)]
    pub id: String,

    /// Job-name template (default: the group name)
    #[serde(default)]
    pub name: Option<String>,

    /// Batch script path template
    #[serde(default)]
    pub script: Option<String>,

    /// Inline command template, submitted with `--wrap`
    #[serde(default)]
    pub command: Option<String>,

    /// Script argument templates
    #[serde(default)]
    pub args: Vec<String>,

    /// Conda environment activated before submission
    #[serde(default)]
    pub env: Option<String>,

    #[serde(default)]
    pub params: ParamSpec,

    #[serde(default)]
    pub slurm: SchedulerOptions,

    /// Path template that must exist before an instance may run
    #[serde(default)]
    pub precondition: Option<String>,

    /// Path template whose existence marks an instance as done
    #[serde(default)]
    pub completion: Option<String>,

    /// Number of chained submissions per instance
    #[serde(default = "default_chain")]
    pub chain: u32,

    #[serde(default)]
    pub depends_on: Option<DependencySpec>,
}

fn default_chain() -> u32 {
    1
}

impl JobGroupSpec {
    /// Parse one group from its document value.
    pub fn from_value(id: &str, value: serde_json::Value) -> Result<Self, ConfigError> {
        let mut spec: JobGroupSpec =
            serde_json::from_value(value).map_err(|e| ConfigError::invalid(id, e.to_string()))?;
        spec.id = id.to_string();
        spec.validate()?;
        Ok(spec)
    }

    /// Job-name template.
    pub fn name_template(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Check everything that does not depend on other groups.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let id = self.id.as_str();

        match (&self.script, &self.command) {
            (Some(_), None) | (None, Some(_)) => {}
            (Some(_), Some(_)) => return Err(ConfigError::invalid(id, "set either script or command, not both")),
            (None, None) => return Err(ConfigError::invalid(id, "one of script or command is required")),
        }

        if self.chain == 0 {
            return Err(ConfigError::invalid(id, "chain must be at least 1"));
        }

        for key in self.params.all_keys() {
            if !key.starts_with('$') && !key.starts_with('-') && !is_env_name(key) {
                return Err(ConfigError::invalid(
                    id,
                    format!("parameter '{}' is not a valid environment variable name", key),
                ));
            }
        }

        if let SchedulerOptions::Raw(raw) = &self.slurm {
            if shlex::split(raw).is_none() {
                return Err(ConfigError::invalid(id, format!("unbalanced quotes in slurm options '{}'", raw)));
            }
        }

        let mut templates: Vec<String> = vec![self.name_template().to_string()];
        templates.extend(self.script.iter().cloned());
        templates.extend(self.command.iter().cloned());
        templates.extend(self.args.iter().cloned());
        templates.extend(self.precondition.iter().cloned());
        templates.extend(self.completion.iter().cloned());
        templates.extend(self.slurm.templates());
        for template in &templates {
            placeholders(template).map_err(|e| ConfigError::invalid(id, e.to_string()))?;
        }

        if let Some(dep) = &self.depends_on {
            if dep.group == self.id {
                return Err(ConfigError::invalid(id, "a group cannot depend on itself"));
            }
            if let Some(kind) = &dep.kind {
                if !DEPENDENCY_KINDS.contains(&kind.as_str()) {
                    return Err(ConfigError::invalid(id, format!("unknown dependency kind '{}'", kind)));
                }
            }
            let common = self.params.common_keys();
            for key in &dep.on {
                if !common.contains(&key.as_str()) {
                    return Err(ConfigError::invalid(
                        id,
                        format!("depends_on key '{}' is not a parameter of every table", key),
                    ));
                }
            }
        }

        Ok(())
    }
}

fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A group as loaded: the spec, or why it could not be used.
#[derive(Debug)]
pub struct GroupEntry {
    pub id: String,
    pub spec: Result<JobGroupSpec, ConfigError>,
}

/// A loaded jobs file.
#[derive(Debug)]
pub struct JobsFile {
    /// Source path, if loaded from disk
    pub path: Option<PathBuf>,

    groups: Vec<GroupEntry>,
}

impl JobsFile {
    /// Load a jobs file, picking the format from the extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let format = ConfigFormat::from_path(path)?;
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut file = Self::parse_named(&content, format, &path.display().to_string())?;
        file.path = Some(path.to_path_buf());
        Ok(file)
    }

    /// Parse jobs file content.
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        Self::parse_named(content, format, "<inline>")
    }

    fn parse_named(content: &str, format: ConfigFormat, origin: &str) -> Result<Self, ConfigError> {
        let parse_err = |reason: String| ConfigError::Parse {
            path: origin.to_string(),
            reason,
        };

        let document: Option<OrderedMap<serde_json::Value>> = match format {
            ConfigFormat::Toml => toml::from_str(content).map_err(|e| parse_err(e.to_string()))?,
            ConfigFormat::Yaml => serde_yaml::from_str(content).map_err(|e| parse_err(e.to_string()))?,
            ConfigFormat::Json => serde_json::from_str(content).map_err(|e| parse_err(e.to_string()))?,
        };

        let groups = document
            .unwrap_or_default()
            .into_iter()
            .map(|(id, value)| {
                let spec = JobGroupSpec::from_value(&id, value);
                GroupEntry { id, spec }
            })
            .collect();

        let mut file = Self { path: None, groups };
        file.check_dependencies()?;
        Ok(file)
    }

    /// Build from already-structured specs.
    pub fn from_specs(specs: Vec<JobGroupSpec>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        let mut groups = Vec::with_capacity(specs.len());
        for spec in specs {
            if !seen.insert(spec.id.clone()) {
                return Err(ConfigError::invalid(&spec.id, "duplicate group name"));
            }
            let id = spec.id.clone();
            let spec = spec.validate().map(|_| spec);
            groups.push(GroupEntry { id, spec });
        }
        let mut file = Self { path: None, groups };
        file.check_dependencies()?;
        Ok(file)
    }

    /// All groups in declaration order.
    pub fn groups(&self) -> &[GroupEntry] {
        &self.groups
    }

    pub fn get(&self, id: &str) -> Option<&GroupEntry> {
        self.groups.iter().find(|g| g.id == id)
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.groups.iter().position(|g| g.id == id)
    }

    fn upstream_of(&self, index: usize) -> Option<usize> {
        let dep = self.groups[index].spec.as_ref().ok()?.depends_on.as_ref()?;
        self.position(&dep.group)
    }

    /// Cross-group checks: references resolve, no cycles, linkage keys exist upstream.
    fn check_dependencies(&mut self) -> Result<(), ConfigError> {
        for entry in &self.groups {
            if let Ok(JobGroupSpec { depends_on: Some(dep), .. }) = &entry.spec {
                if self.position(&dep.group).is_none() {
                    return Err(ConfigError::invalid(
                        &entry.id,
                        format!("depends_on references unknown group '{}'", dep.group),
                    ));
                }
            }
        }

        for start in 0..self.groups.len() {
            let mut path = vec![start];
            let mut current = start;
            while let Some(next) = self.upstream_of(current) {
                if let Some(pos) = path.iter().position(|&i| i == next) {
                    let mut cycle: Vec<String> = path[pos..].iter().map(|&i| self.groups[i].id.clone()).collect();
                    cycle.push(self.groups[next].id.clone());
                    return Err(ConfigError::Cycle(cycle));
                }
                path.push(next);
                current = next;
            }
        }

        // Linkage keys must be parameters of the upstream group too
        let mut failures = Vec::new();
        for (index, entry) in self.groups.iter().enumerate() {
            let Ok(spec) = &entry.spec else { continue };
            let Some(dep) = &spec.depends_on else { continue };
            let Some(upstream) = self.upstream_of(index) else { continue };
            let Ok(upstream_spec) = &self.groups[upstream].spec else { continue };
            let upstream_keys = upstream_spec.params.common_keys();
            if let Some(key) = dep.on.iter().find(|k| !upstream_keys.contains(&k.as_str())) {
                failures.push((
                    index,
                    ConfigError::invalid(
                        &entry.id,
                        format!("depends_on key '{}' is not a parameter of group '{}'", key, dep.group),
                    ),
                ));
            }
        }
        for (index, err) in failures {
            self.groups[index].spec = Err(err);
        }

        Ok(())
    }

    /// Groups to process for a selection, upstream groups first.
    ///
    /// An empty selection means every group. Selected groups pull in their
    /// transitive upstream groups. Otherwise declaration order is kept.
    pub fn plan(&self, selection: &[String]) -> Result<Vec<&GroupEntry>, ConfigError> {
        let mut wanted = vec![selection.is_empty(); self.groups.len()];
        for name in selection {
            let mut index = self
                .position(name)
                .ok_or_else(|| ConfigError::UnknownGroup(name.clone()))?;
            wanted[index] = true;
            while let Some(up) = self.upstream_of(index) {
                if !wanted[up] {
                    log::info!("including group '{}' required by '{}'", self.groups[up].id, self.groups[index].id);
                }
                wanted[up] = true;
                index = up;
            }
        }

        let mut placed = vec![false; self.groups.len()];
        let mut order = Vec::new();
        while order.len() < wanted.iter().filter(|w| **w).count() {
            let next = (0..self.groups.len())
                .find(|&i| {
                    wanted[i]
                        && !placed[i]
                        && self.upstream_of(i).map_or(true, |up| placed[up])
                })
                .ok_or_else(|| ConfigError::Cycle(self.groups.iter().map(|g| g.id.clone()).collect()))?;
            placed[next] = true;
            order.push(&self.groups[next]);
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
prepare:
  script: prepare.sh
  params:
    dataset: [mnist, cifar]
  completion: "data/{dataset}/.ready"
train:
  name: "train-{dataset}-{seed}"
  script: train.sh
  params:
    dataset: [mnist, cifar]
    seed: { range: [0, 3] }
  slurm:
    --time: "4:00:00"
    -p: gpu
  depends_on: { group: prepare, on: [dataset] }
"#;

    fn spec_of(file: &JobsFile, id: &str) -> JobGroupSpec {
        file.get(id).unwrap().spec.as_ref().unwrap().clone()
    }

    #[test]
    fn test_parse_yaml_in_declaration_order() {
        let file = JobsFile::parse(YAML, ConfigFormat::Yaml).unwrap();
        let ids: Vec<&str> = file.groups().iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["prepare", "train"]);

        let train = spec_of(&file, "train");
        assert_eq!(train.name_template(), "train-{dataset}-{seed}");
        assert_eq!(train.params.all_keys(), vec!["dataset", "seed"]);
        assert_eq!(train.depends_on.unwrap().on, vec!["dataset"]);
        assert_eq!(spec_of(&file, "prepare").name_template(), "prepare");
    }

    #[test]
    fn test_parse_toml() {
        let file = JobsFile::parse(
            r#"
            [sweep]
            script = "run.sh"
            slurm = "--time=1:00:00 --mem 4G"
            chain = 2
            [sweep.params]
            b = [1, 2]
            a = "x"
            "#,
            ConfigFormat::Toml,
        )
        .unwrap();
        let sweep = spec_of(&file, "sweep");
        assert_eq!(sweep.chain, 2);
        assert_eq!(sweep.params.all_keys(), vec!["b", "a"]);
        assert_eq!(sweep.slurm, SchedulerOptions::Raw("--time=1:00:00 --mem 4G".to_string()));
    }

    #[test]
    fn test_unknown_field_fails_only_that_group() {
        let file = JobsFile::parse(
            r#"
good: { script: a.sh }
bad: { script: b.sh, walltime: 10 }
"#,
            ConfigFormat::Yaml,
        )
        .unwrap();
        assert!(file.get("good").unwrap().spec.is_ok());
        let err = file.get("bad").unwrap().spec.as_ref().unwrap_err();
        assert!(err.to_string().contains("walltime"), "{}", err);
    }

    #[test]
    fn test_script_or_command_required() {
        let file = JobsFile::parse("g: { params: { a: 1 } }", ConfigFormat::Yaml).unwrap();
        assert!(file.get("g").unwrap().spec.is_err());
        let file = JobsFile::parse("g: { script: a.sh, command: echo }", ConfigFormat::Yaml).unwrap();
        assert!(file.get("g").unwrap().spec.is_err());
    }

    #[test]
    fn test_invalid_env_name_rejected() {
        let file = JobsFile::parse("g: { script: a.sh, params: { my-var: 1 } }", ConfigFormat::Yaml).unwrap();
        assert!(file.get("g").unwrap().spec.is_err());
        let file = JobsFile::parse(
            "g: { script: a.sh, params: { $input: 1, --lr: 0.1, SEED: 2 } }",
            ConfigFormat::Yaml,
        )
        .unwrap();
        assert!(file.get("g").unwrap().spec.is_ok());
    }

    #[test]
    fn test_malformed_template_rejected() {
        let file = JobsFile::parse("g: { script: a.sh, name: 'job-{a' }", ConfigFormat::Yaml).unwrap();
        assert!(file.get("g").unwrap().spec.is_err());
    }

    #[test]
    fn test_unknown_dependency_rejects_file() {
        let err = JobsFile::parse("b: { script: b.sh, depends_on: { group: a } }", ConfigFormat::Yaml).unwrap_err();
        assert!(err.to_string().contains("unknown group 'a'"));
    }

    #[test]
    fn test_cycle_rejects_file() {
        let err = JobsFile::parse(
            r#"
a: { script: a.sh, depends_on: { group: b } }
b: { script: b.sh, depends_on: { group: a } }
"#,
            ConfigFormat::Yaml,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Cycle(_)));
    }

    #[test]
    fn test_linkage_key_must_exist_upstream() {
        let file = JobsFile::parse(
            r#"
up: { script: a.sh, params: { x: [1, 2] } }
down: { script: b.sh, params: { y: [1, 2] }, depends_on: { group: up, on: [y] } }
"#,
            ConfigFormat::Yaml,
        )
        .unwrap();
        let err = file.get("down").unwrap().spec.as_ref().unwrap_err();
        assert!(err.to_string().contains("not a parameter of group 'up'"), "{}", err);
    }

    #[test]
    fn test_plan_pulls_in_upstream_first() {
        let yaml = r#"
other: { script: o.sh }
train: { script: t.sh, depends_on: { group: prepare } }
prepare: { script: p.sh }
"#;
        let file = JobsFile::parse(yaml, ConfigFormat::Yaml).unwrap();

        let plan: Vec<&str> = file.plan(&["train".to_string()]).unwrap().iter().map(|g| g.id.as_str()).collect();
        assert_eq!(plan, vec!["prepare", "train"]);

        let all: Vec<&str> = file.plan(&[]).unwrap().iter().map(|g| g.id.as_str()).collect();
        assert_eq!(all, vec!["other", "prepare", "train"]);
    }

    #[test]
    fn test_plan_unknown_group() {
        let file = JobsFile::parse("a: { script: a.sh }", ConfigFormat::Yaml).unwrap();
        assert!(matches!(file.plan(&["zzz".to_string()]), Err(ConfigError::UnknownGroup(_))));
    }

    #[test]
    fn test_scheduler_options_render() {
        let binding = Binding::from_pairs([("h", ParamValue::Int(4))]);

        let mut table = OrderedMap::new();
        table.insert("--time", ParamValue::from("{h}:00:00")).unwrap();
        table.insert("-p", ParamValue::from("gpu")).unwrap();
        table.insert("--exclusive", ParamValue::Null).unwrap();
        assert_eq!(
            SchedulerOptions::Table(table).render(&binding).unwrap(),
            vec!["--time=4:00:00", "-p", "gpu", "--exclusive"]
        );

        let raw = SchedulerOptions::Raw("--mem 8G --comment 'run {h}'".to_string());
        assert_eq!(raw.render(&binding).unwrap(), vec!["--mem", "8G", "--comment", "run 4"]);
    }

    #[test]
    fn test_raw_options_with_unbalanced_value() {
        let raw = SchedulerOptions::Raw("--comment {note}".to_string());
        let binding = Binding::from_pairs([("note", ParamValue::from("it's"))]);
        assert!(matches!(
            raw.render(&binding),
            Err(TemplateError::Unsplittable { ref rendered, .. }) if rendered == "--comment it's"
        ));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ConfigFormat::from_path(Path::new("runs.yaml")).unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("runs.TOML")).unwrap(), ConfigFormat::Toml);
        assert!(ConfigFormat::from_path(Path::new("runs.ini")).is_err());
    }

    #[test]
    fn test_from_specs() {
        let a = JobGroupSpec::from_value("a", serde_json::json!({"script": "a.sh", "params": {"x": [1, 2]}})).unwrap();
        let b = JobGroupSpec::from_value(
            "b",
            serde_json::json!({"command": "echo {x}", "params": {"x": [1, 2]}, "depends_on": {"group": "a", "on": ["x"]}}),
        )
        .unwrap();

        let file = JobsFile::from_specs(vec![b.clone(), a.clone()]).unwrap();
        let order: Vec<&str> = file.plan(&[]).unwrap().iter().map(|g| g.id.as_str()).collect();
        assert_eq!(order, vec!["a", "b"]);

        let err = JobsFile::from_specs(vec![a.clone(), a]).unwrap_err();
        assert!(err.to_string().contains("duplicate group name"));
    }
}
