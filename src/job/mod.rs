//! Job instances
//!
//! One [`JobInstance`] per binding of a group. Its state moves from
//! resolution (skip or ready) through dependency linking to execution.

pub mod command;

use serde::Serialize;
use std::fmt;

use slurmer_sweep::{Binding, TemplateError};

use crate::chain::DependencyError;
use crate::check::CheckError;
use crate::scheduler::SchedulerError;

pub use command::{build_command, CommandContext, CommandMode, SubmitCommand};

/// Why an instance is not submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipReason {
    /// Not skipped
    None,
    /// Job name already queued or running
    AlreadyRunning,
    /// Completion gate satisfied
    AlreadyComplete,
    /// Precondition gate not satisfied
    PreconditionUnmet,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SkipReason::None => "none",
            SkipReason::AlreadyRunning => "already submitted",
            SkipReason::AlreadyComplete => "already completed",
            SkipReason::PreconditionUnmet => "missing precondition",
        };
        f.write_str(label)
    }
}

/// Per-instance failures. None of these stop other instances.
#[derive(Debug, thiserror::Error)]
pub enum InstanceError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Check(#[from] CheckError),

    #[error(transparent)]
    Dependency(#[from] DependencyError),

    #[error("submission failed: {0}")]
    Submission(#[from] SchedulerError),
}

/// Where an instance stands.
#[derive(Debug)]
pub enum InstanceState {
    /// To be submitted
    Ready,
    Skipped(SkipReason),
    /// Could not be resolved, linked or submitted
    Failed(InstanceError),
    /// Printed only (dry run or interactive), one line per chain link
    Planned(Vec<String>),
    /// Job IDs, one per chain link
    Submitted(Vec<String>),
    /// Not submitted because the run was interrupted
    Cancelled,
}

/// One binding of a job group.
#[derive(Debug)]
pub struct JobInstance {
    pub group: String,

    /// Position in the group's expansion
    pub index: usize,

    pub binding: Binding,

    /// Rendered job name (None if the name template failed)
    pub name: Option<String>,

    /// Command without dependencies (None unless the instance is to be submitted)
    pub command: Option<SubmitCommand>,

    pub state: InstanceState,
}

impl JobInstance {
    pub fn new(group: &str, index: usize, binding: Binding) -> Self {
        Self {
            group: group.to_string(),
            index,
            binding,
            name: None,
            command: None,
            state: InstanceState::Ready,
        }
    }

    /// Name for display: the job name, or the binding if there is none.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{}[{}]", self.group, self.binding),
        }
    }

    pub fn skip_reason(&self) -> SkipReason {
        match self.state {
            InstanceState::Skipped(reason) => reason,
            _ => SkipReason::None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, InstanceState::Ready)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, InstanceState::Failed(_))
    }

    /// ID of the last submitted chain link.
    pub fn job_id(&self) -> Option<&str> {
        match &self.state {
            InstanceState::Submitted(ids) => ids.last().map(String::as_str),
            _ => None,
        }
    }

    pub fn fail(&mut self, err: impl Into<InstanceError>) {
        self.command = None;
        self.state = InstanceState::Failed(err.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slurmer_sweep::ParamValue;

    #[test]
    fn test_skip_reason_serialization() {
        assert_eq!(serde_json::to_string(&SkipReason::None).unwrap(), "\"NONE\"");
        assert_eq!(
            serde_json::to_string(&SkipReason::PreconditionUnmet).unwrap(),
            "\"PRECONDITION_UNMET\""
        );
        assert_eq!(SkipReason::AlreadyComplete.to_string(), "already completed");
    }

    #[test]
    fn test_instance_accessors() {
        let binding = Binding::from_pairs([("a", ParamValue::Int(1))]);
        let mut instance = JobInstance::new("g", 0, binding);
        assert!(instance.is_ready());
        assert_eq!(instance.skip_reason(), SkipReason::None);
        assert_eq!(instance.label(), "g[a=1]");

        instance.state = InstanceState::Submitted(vec!["10".to_string(), "11".to_string()]);
        assert_eq!(instance.job_id(), Some("11"));

        instance.state = InstanceState::Skipped(SkipReason::AlreadyRunning);
        assert_eq!(instance.skip_reason(), SkipReason::AlreadyRunning);
        assert_eq!(instance.job_id(), None);
    }
}
