//! Cross-group dependencies
//!
//! After a group has executed, the outcome of each of its instances is
//! recorded in the [`Ledger`]. A downstream group is linked against that
//! record: each ready downstream instance is paired with the one upstream
//! instance that agrees on the `on` keys, and inherits its fate.
//!
//! | upstream outcome            | downstream instance               |
//! |-----------------------------|-----------------------------------|
//! | submitted (job id)          | `--dependency=<kind>:<id>`        |
//! | planned (dry run)           | `--dependency=<kind>:<job-name>`  |
//! | already running / complete  | no dependency                     |
//! | precondition unmet          | skipped, precondition unmet       |
//! | failed or cancelled         | failed with a dependency error    |

use std::collections::HashMap;

use slurmer_sweep::Binding;

use crate::config::JobGroupSpec;
use crate::job::{InstanceState, JobInstance, SkipReason};

/// Dependency linking errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DependencyError {
    #[error("no instance of '{upstream}' matches {keys}")]
    NoMatch { upstream: String, keys: String },

    #[error("{count} instances of '{upstream}' match {keys}; add keys to `on` to disambiguate")]
    Ambiguous {
        upstream: String,
        keys: String,
        count: usize,
    },

    #[error("binding has no parameter '{key}' required to match '{upstream}'")]
    MissingKey { upstream: String, key: String },

    #[error("upstream job {job} of '{upstream}' failed: {reason}")]
    UpstreamFailed {
        upstream: String,
        job: String,
        reason: String,
    },

    #[error("upstream group '{upstream}' is unavailable: {reason}")]
    UpstreamUnavailable { upstream: String, reason: String },
}

/// Outcome of one upstream instance, as seen by its dependents.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamState {
    /// Running or complete already; nothing to wait for
    Satisfied,
    Submitted(String),
    /// Dry-run placeholder
    Planned(String),
    Unmet,
    Failed(String),
}

#[derive(Debug, Clone)]
struct LedgerEntry {
    binding: Binding,
    label: String,
    state: UpstreamState,
}

#[derive(Debug, Clone)]
enum GroupRecord {
    Resolved(Vec<LedgerEntry>),
    Unavailable(String),
}

/// Outcomes of the groups processed so far.
#[derive(Debug, Default)]
pub struct Ledger {
    groups: HashMap<String, GroupRecord>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the executed instances of a group.
    pub fn record(&mut self, group: &str, instances: &[JobInstance]) {
        let entries = instances
            .iter()
            .map(|instance| LedgerEntry {
                binding: instance.binding.clone(),
                label: instance.label(),
                state: upstream_state(instance),
            })
            .collect();
        self.groups.insert(group.to_string(), GroupRecord::Resolved(entries));
    }

    /// Record a group that produced no instances.
    pub fn record_unavailable(&mut self, group: &str, reason: impl Into<String>) {
        self.groups
            .insert(group.to_string(), GroupRecord::Unavailable(reason.into()));
    }
}

fn upstream_state(instance: &JobInstance) -> UpstreamState {
    match &instance.state {
        InstanceState::Skipped(SkipReason::PreconditionUnmet) => UpstreamState::Unmet,
        InstanceState::Skipped(_) => UpstreamState::Satisfied,
        InstanceState::Submitted(ids) => match ids.last() {
            Some(id) => UpstreamState::Submitted(id.clone()),
            None => UpstreamState::Failed("no job id".to_string()),
        },
        InstanceState::Planned(_) => UpstreamState::Planned(format!("<{}>", instance.label())),
        InstanceState::Failed(err) => UpstreamState::Failed(err.to_string()),
        InstanceState::Cancelled => UpstreamState::Failed("cancelled".to_string()),
        InstanceState::Ready => UpstreamState::Failed("not submitted".to_string()),
    }
}

/// Links ready instances of a group to their upstream instances.
pub struct DependencyChainer<'a> {
    ledger: &'a Ledger,
    default_kind: &'a str,
}

impl<'a> DependencyChainer<'a> {
    pub fn new(ledger: &'a Ledger, default_kind: &'a str) -> Self {
        Self { ledger, default_kind }
    }

    /// Attach dependencies to (or skip, or fail) every ready instance.
    pub fn link(&self, spec: &JobGroupSpec, instances: &mut [JobInstance]) {
        let Some(dep) = &spec.depends_on else { return };
        let kind = dep.kind.as_deref().unwrap_or(self.default_kind);

        let entries = match self.ledger.groups.get(&dep.group) {
            Some(GroupRecord::Resolved(entries)) => entries,
            Some(GroupRecord::Unavailable(reason)) => {
                self.fail_ready(instances, &dep.group, reason);
                return;
            }
            None => {
                self.fail_ready(instances, &dep.group, "not processed");
                return;
            }
        };

        for instance in instances.iter_mut().filter(|i| i.is_ready()) {
            let upstream = match find_upstream(&dep.group, &dep.on, &instance.binding, entries) {
                Ok(entry) => entry,
                Err(err) => {
                    log::warn!("{}: {}", instance.label(), err);
                    instance.fail(err);
                    continue;
                }
            };

            match &upstream.state {
                UpstreamState::Satisfied => {
                    log::debug!("{}: upstream {} needs no dependency", instance.label(), upstream.label);
                }
                UpstreamState::Submitted(id) | UpstreamState::Planned(id) => {
                    instance.command = instance
                        .command
                        .as_ref()
                        .map(|c| c.with_dependency(kind, std::slice::from_ref(id)));
                }
                UpstreamState::Unmet => {
                    instance.state = InstanceState::Skipped(SkipReason::PreconditionUnmet);
                    instance.command = None;
                }
                UpstreamState::Failed(reason) => {
                    instance.fail(DependencyError::UpstreamFailed {
                        upstream: dep.group.clone(),
                        job: upstream.label.clone(),
                        reason: reason.clone(),
                    });
                }
            }
        }
    }

    fn fail_ready(&self, instances: &mut [JobInstance], upstream: &str, reason: &str) {
        for instance in instances.iter_mut().filter(|i| i.is_ready()) {
            instance.fail(DependencyError::UpstreamUnavailable {
                upstream: upstream.to_string(),
                reason: reason.to_string(),
            });
        }
    }
}

fn find_upstream<'e>(
    upstream: &str,
    on: &[String],
    binding: &Binding,
    entries: &'e [LedgerEntry],
) -> Result<&'e LedgerEntry, DependencyError> {
    let wanted = binding.project(on).map_err(|key| DependencyError::MissingKey {
        upstream: upstream.to_string(),
        key: key.to_string(),
    })?;

    let matches: Vec<&LedgerEntry> = entries
        .iter()
        .filter(|e| e.binding.project(on).map_or(false, |values| values == wanted))
        .collect();

    let keys = || {
        if on.is_empty() {
            "(no keys)".to_string()
        } else {
            on.iter()
                .zip(&wanted)
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(", ")
        }
    };

    match matches.as_slice() {
        [single] => Ok(*single),
        [] => Err(DependencyError::NoMatch {
            upstream: upstream.to_string(),
            keys: keys(),
        }),
        many => Err(DependencyError::Ambiguous {
            upstream: upstream.to_string(),
            keys: keys(),
            count: many.len(),
        }),
    }
}
