//! Run reporting: per-instance and per-group outcomes, the run summary and
//! stable exit codes.

mod failure;
mod job_summary;
mod run_summary;

pub use failure::{ExitCode, Status, StatusAggregator};
pub use job_summary::{GroupReport, InstanceReport, InstanceStatus, SkipCounts};
pub use run_summary::{RunSummary, RunTotals};
