//! Group resolution
//!
//! Turns a [`JobGroupSpec`] into one [`JobInstance`] per binding: expand the
//! parameters, render job names, decide the skip reason against the queue
//! snapshot and the filesystem gates, and build the submit command for the
//! instances that will run.

use std::collections::HashMap;

use slurmer_sweep::{expand, render, PathLister};

use crate::check::CompletionChecker;
use crate::config::{ConfigError, JobGroupSpec};
use crate::job::{build_command, CommandContext, InstanceState, JobInstance, SkipReason};
use crate::scheduler::QueueSnapshot;

/// Instances of one group, in expansion order.
#[derive(Debug)]
pub struct ResolvedGroup {
    pub group: String,
    pub instances: Vec<JobInstance>,
}

impl ResolvedGroup {
    pub fn ready(&self) -> usize {
        self.instances.iter().filter(|i| i.is_ready()).count()
    }
}

/// Resolves groups against one queue snapshot.
pub struct GroupResolver<'a> {
    lister: &'a dyn PathLister,
    snapshot: &'a QueueSnapshot,
    context: &'a CommandContext,
}

impl<'a> GroupResolver<'a> {
    pub fn new(lister: &'a dyn PathLister, snapshot: &'a QueueSnapshot, context: &'a CommandContext) -> Self {
        Self {
            lister,
            snapshot,
            context,
        }
    }

    /// Resolve every binding of `spec`.
    ///
    /// Expansion errors and two bindings rendering the same job name fail
    /// the whole group. Template and gate errors fail only their instance.
    pub fn resolve(&self, spec: &JobGroupSpec) -> Result<ResolvedGroup, ConfigError> {
        let bindings = expand(&spec.params, self.lister).map_err(|source| ConfigError::Sweep {
            group: spec.id.clone(),
            source,
        })?;
        log::debug!("group '{}' expanded to {} binding(s)", spec.id, bindings.len());

        let mut instances: Vec<JobInstance> = bindings
            .into_iter()
            .enumerate()
            .map(|(index, binding)| JobInstance::new(&spec.id, index, binding))
            .collect();

        let mut seen: HashMap<String, usize> = HashMap::new();
        for index in 0..instances.len() {
            match render(spec.name_template(), &instances[index].binding) {
                Ok(name) => {
                    if let Some(&first) = seen.get(&name) {
                        return Err(ConfigError::DuplicateName {
                            group: spec.id.clone(),
                            name,
                            first: instances[first].binding.to_string(),
                            second: instances[index].binding.to_string(),
                        });
                    }
                    seen.insert(name.clone(), index);
                    instances[index].name = Some(name);
                }
                Err(err) => instances[index].fail(err),
            }
        }

        let checker = CompletionChecker::new(self.lister);
        for instance in instances.iter_mut() {
            let Some(name) = instance.name.clone() else { continue };

            if self.snapshot.contains(&name) {
                instance.state = InstanceState::Skipped(SkipReason::AlreadyRunning);
                continue;
            }

            match checker.check_state(spec.precondition.as_deref(), spec.completion.as_deref(), &instance.binding) {
                Ok(SkipReason::None) => {}
                Ok(reason) => {
                    instance.state = InstanceState::Skipped(reason);
                    continue;
                }
                Err(err) => {
                    instance.fail(err);
                    continue;
                }
            }

            match build_command(spec, &instance.binding, &name, self.context) {
                Ok(command) => instance.command = Some(command),
                Err(err) => instance.fail(err),
            }
        }

        Ok(ResolvedGroup {
            group: spec.id.clone(),
            instances,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigFormat, JobsFile, Settings};
    use crate::paths::FsPaths;
    use std::fs;
    use tempfile::TempDir;

    fn spec(yaml: &str) -> JobGroupSpec {
        let file = JobsFile::parse(yaml, ConfigFormat::Yaml).unwrap();
        file.groups()[0].spec.as_ref().unwrap().clone()
    }

    fn context() -> CommandContext {
        CommandContext::new(&Settings::default(), false, Vec::new())
    }

    #[test]
    fn test_names_and_running_skip() {
        let spec = spec("g: { name: 'job-{a}-{b}', script: run.sh, params: { a: [1, 2], b: [3, 4] } }");
        let paths = FsPaths::new();
        let snapshot = QueueSnapshot::new(["job-1-3"]);
        let ctx = context();
        let group = GroupResolver::new(&paths, &snapshot, &ctx).resolve(&spec).unwrap();

        let names: Vec<String> = group.instances.iter().map(|i| i.label()).collect();
        assert_eq!(names, vec!["job-1-3", "job-1-4", "job-2-3", "job-2-4"]);
        assert_eq!(group.instances[0].skip_reason(), SkipReason::AlreadyRunning);
        assert!(group.instances[0].command.is_none());
        assert_eq!(group.ready(), 3);
    }

    #[test]
    fn test_duplicate_names_fail_group() {
        let spec = spec("g: { name: 'job-{a}', script: run.sh, params: { a: [1, 2], b: [3, 4] } }");
        let paths = FsPaths::new();
        let snapshot = QueueSnapshot::default();
        let ctx = context();
        let err = GroupResolver::new(&paths, &snapshot, &ctx).resolve(&spec).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateName { ref name, .. } if name == "job-1"));
    }

    #[test]
    fn test_name_template_error_fails_instance() {
        let spec = spec(
            r#"
g:
  name: "job-{a}-{b}"
  script: run.sh
  params:
    - { a: 1, b: 2 }
    - { a: 3 }
"#,
        );
        let paths = FsPaths::new();
        let snapshot = QueueSnapshot::default();
        let ctx = context();
        let group = GroupResolver::new(&paths, &snapshot, &ctx).resolve(&spec).unwrap();
        assert!(group.instances[0].is_ready());
        assert!(group.instances[1].is_failed());
    }

    #[test]
    fn test_gates_applied() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("2.done"), "").unwrap();
        let spec = spec(
            "g: { name: 'job-{a}', script: run.sh, params: { a: [1, 2] }, precondition: '{a}.ready', completion: '{a}.done' }",
        );
        let paths = FsPaths::with_base(dir.path());
        let snapshot = QueueSnapshot::default();
        let ctx = context();
        let group = GroupResolver::new(&paths, &snapshot, &ctx).resolve(&spec).unwrap();
        assert_eq!(group.instances[0].skip_reason(), SkipReason::PreconditionUnmet);
        assert_eq!(group.instances[1].skip_reason(), SkipReason::AlreadyComplete);
        assert_eq!(group.ready(), 0);
    }

    #[test]
    fn test_empty_parameter_fails_group() {
        let spec = spec("g: { script: run.sh, params: { a: [] } }");
        let paths = FsPaths::new();
        let snapshot = QueueSnapshot::default();
        let ctx = context();
        assert!(matches!(
            GroupResolver::new(&paths, &snapshot, &ctx).resolve(&spec),
            Err(ConfigError::Sweep { .. })
        ));
    }
}
