//! Run summary

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::failure::{ExitCode, Status, StatusAggregator};
use super::job_summary::{GroupReport, InstanceStatus};

/// Totals across all groups
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunTotals {
    pub instances: usize,
    pub submitted: usize,
    pub planned: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Groups that produced no instances
    pub failed_groups: usize,
}

/// Outcome of one invocation
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub status: Status,
    pub exit_code: ExitCode,
    pub totals: RunTotals,
    pub groups: Vec<GroupReport>,
    pub human_summary: String,
}

impl RunSummary {
    /// Aggregate group reports.
    pub fn from_groups(run_id: String, groups: Vec<GroupReport>) -> Self {
        let mut aggregator = StatusAggregator::new();
        let mut totals = RunTotals::default();

        for group in &groups {
            if group.error.is_some() {
                totals.failed_groups += 1;
                aggregator.add_failure();
            }
            totals.instances += group.instances.len();
            totals.submitted += group.count(InstanceStatus::Submitted);
            totals.planned += group.count(InstanceStatus::Planned);
            totals.skipped += group.count(InstanceStatus::Skipped);
            totals.failed += group.count(InstanceStatus::Failed);
            totals.cancelled += group.count(InstanceStatus::Cancelled);
        }
        if totals.failed > 0 {
            aggregator.add_failure();
        }
        if totals.cancelled > 0 {
            aggregator.add_cancelled();
        }

        let status = aggregator.status();
        Self {
            human_summary: Self::generate_human_summary(status, &totals),
            run_id,
            created_at: Utc::now(),
            status,
            exit_code: status.exit_code(),
            totals,
            groups,
        }
    }

    /// New ULID run identifier.
    pub fn new_run_id() -> String {
        ulid::Ulid::new().to_string()
    }

    pub fn exit_code(&self) -> ExitCode {
        self.exit_code
    }

    fn generate_human_summary(status: Status, totals: &RunTotals) -> String {
        let mut parts = Vec::new();
        for (count, label) in [
            (totals.submitted, "submitted"),
            (totals.planned, "planned"),
            (totals.skipped, "skipped"),
            (totals.failed, "failed"),
            (totals.cancelled, "cancelled"),
        ] {
            if count > 0 {
                parts.push(format!("{} {}", count, label));
            }
        }
        if totals.failed_groups > 0 {
            parts.push(format!("{} group(s) unusable", totals.failed_groups));
        }
        let detail = if parts.is_empty() {
            "nothing to do".to_string()
        } else {
            parts.join(", ")
        };

        match status {
            Status::Success => format!("Run succeeded: {}", detail),
            Status::Failed => format!("Run failed: {}", detail),
            Status::Cancelled => format!("Run cancelled: {}", detail),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Group reports followed by the one-line summary.
    pub fn human_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.groups.iter().flat_map(GroupReport::human_lines).collect();
        lines.push(self.human_summary.clone());
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{InstanceState, JobInstance, SkipReason};
    use slurmer_sweep::Binding;

    fn group(states: Vec<InstanceState>) -> GroupReport {
        let instances: Vec<JobInstance> = states
            .into_iter()
            .enumerate()
            .map(|(i, state)| {
                let mut instance = JobInstance::new("g", i, Binding::empty());
                instance.name = Some(format!("job-{}", i));
                instance.state = state;
                instance
            })
            .collect();
        GroupReport::from_instances("g", &instances)
    }

    #[test]
    fn test_success() {
        let summary = RunSummary::from_groups(
            RunSummary::new_run_id(),
            vec![group(vec![
                InstanceState::Submitted(vec!["1".to_string()]),
                InstanceState::Skipped(SkipReason::AlreadyComplete),
            ])],
        );
        assert_eq!(summary.status, Status::Success);
        assert_eq!(summary.exit_code, ExitCode::Success);
        assert_eq!(summary.human_summary, "Run succeeded: 1 submitted, 1 skipped");
        assert_eq!(summary.run_id.len(), 26);
    }

    #[test]
    fn test_failed_group_fails_run() {
        let summary = RunSummary::from_groups(
            "r".to_string(),
            vec![
                group(vec![InstanceState::Planned(vec!["sbatch run.sh".to_string()])]),
                GroupReport::failed("h", "bad"),
            ],
        );
        assert_eq!(summary.exit_code(), ExitCode::Failures);
        assert_eq!(summary.totals.failed_groups, 1);
        assert_eq!(summary.human_summary, "Run failed: 1 planned, 1 group(s) unusable");
    }

    #[test]
    fn test_cancel_wins() {
        let summary = RunSummary::from_groups(
            "r".to_string(),
            vec![group(vec![InstanceState::Cancelled])],
        );
        assert_eq!(summary.exit_code(), ExitCode::Cancelled);
    }

    #[test]
    fn test_empty_run() {
        let summary = RunSummary::from_groups("r".to_string(), Vec::new());
        assert_eq!(summary.human_summary, "Run succeeded: nothing to do");
        let json: serde_json::Value = serde_json::from_str(&summary.to_json().unwrap()).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["exit_code"], 0);
        assert_eq!(json["totals"]["instances"], 0);
    }
}
