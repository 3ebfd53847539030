//! Per-group and per-instance reports

use serde::Serialize;

use slurmer_sweep::Binding;

use crate::job::{InstanceState, JobInstance, SkipReason};

/// Final status of one instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Submitted,
    Planned,
    Skipped,
    Failed,
    Cancelled,
}

/// One instance in the run summary
#[derive(Debug, Clone, Serialize)]
pub struct InstanceReport {
    pub name: String,
    pub binding: Binding,
    pub status: InstanceStatus,
    pub skip_reason: SkipReason,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub job_ids: Vec<String>,

    /// Printed commands (dry run and interactive)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InstanceReport {
    pub fn from_instance(instance: &JobInstance) -> Self {
        let mut report = Self {
            name: instance.label(),
            binding: instance.binding.clone(),
            status: InstanceStatus::Skipped,
            skip_reason: instance.skip_reason(),
            job_ids: Vec::new(),
            commands: Vec::new(),
            error: None,
        };
        match &instance.state {
            InstanceState::Skipped(_) => {}
            InstanceState::Submitted(ids) => {
                report.status = InstanceStatus::Submitted;
                report.job_ids = ids.clone();
            }
            InstanceState::Planned(lines) => {
                report.status = InstanceStatus::Planned;
                report.commands = lines.clone();
            }
            InstanceState::Failed(err) => {
                report.status = InstanceStatus::Failed;
                report.error = Some(err.to_string());
            }
            InstanceState::Cancelled => report.status = InstanceStatus::Cancelled,
            InstanceState::Ready => {
                report.status = InstanceStatus::Failed;
                report.error = Some("not executed".to_string());
            }
        }
        report
    }
}

/// Instance counts of a group by skip reason
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SkipCounts {
    pub none: usize,
    pub already_running: usize,
    pub already_complete: usize,
    pub precondition_unmet: usize,
}

impl SkipCounts {
    pub fn add(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::None => self.none += 1,
            SkipReason::AlreadyRunning => self.already_running += 1,
            SkipReason::AlreadyComplete => self.already_complete += 1,
            SkipReason::PreconditionUnmet => self.precondition_unmet += 1,
        }
    }

    pub fn skipped(&self) -> usize {
        self.already_running + self.already_complete + self.precondition_unmet
    }

    /// "Skipping 3 jobs (already submitted: 1, already completed: 2)"
    pub fn describe(&self) -> String {
        let parts: Vec<String> = [
            (SkipReason::AlreadyRunning, self.already_running),
            (SkipReason::AlreadyComplete, self.already_complete),
            (SkipReason::PreconditionUnmet, self.precondition_unmet),
        ]
        .iter()
        .filter(|(_, n)| *n > 0)
        .map(|(reason, n)| format!("{}: {}", reason, n))
        .collect();

        if parts.is_empty() {
            format!("Skipping {} jobs", self.skipped())
        } else {
            format!("Skipping {} jobs ({})", self.skipped(), parts.join(", "))
        }
    }
}

/// One group in the run summary
#[derive(Debug, Clone, Serialize)]
pub struct GroupReport {
    pub group: String,

    /// Why the group produced no instances
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub counts: SkipCounts,
    pub instances: Vec<InstanceReport>,
}

impl GroupReport {
    pub fn from_instances(group: &str, instances: &[JobInstance]) -> Self {
        let mut counts = SkipCounts::default();
        for instance in instances {
            counts.add(instance.skip_reason());
        }
        Self {
            group: group.to_string(),
            error: None,
            counts,
            instances: instances.iter().map(InstanceReport::from_instance).collect(),
        }
    }

    pub fn failed(group: &str, error: impl ToString) -> Self {
        Self {
            group: group.to_string(),
            error: Some(error.to_string()),
            counts: SkipCounts::default(),
            instances: Vec::new(),
        }
    }

    pub fn count(&self, status: InstanceStatus) -> usize {
        self.instances.iter().filter(|i| i.status == status).count()
    }

    pub fn has_failures(&self) -> bool {
        self.error.is_some() || self.count(InstanceStatus::Failed) > 0
    }

    /// Human-readable lines for stderr.
    pub fn human_lines(&self) -> Vec<String> {
        let mut lines = vec![format!("[{}]", self.group)];
        if let Some(err) = &self.error {
            lines.push(format!(" - error: {}", err));
            return lines;
        }
        lines.push(format!(" - {}", self.counts.describe()));
        for instance in &self.instances {
            match instance.status {
                InstanceStatus::Submitted => {
                    lines.push(format!(" - {}: submitted {}", instance.name, instance.job_ids.join(", ")))
                }
                InstanceStatus::Failed => lines.push(format!(
                    " - {}: failed: {}",
                    instance.name,
                    instance.error.as_deref().unwrap_or("unknown error")
                )),
                InstanceStatus::Cancelled => lines.push(format!(" - {}: cancelled", instance.name)),
                InstanceStatus::Planned | InstanceStatus::Skipped => {}
            }
        }
        lines
    }
}
