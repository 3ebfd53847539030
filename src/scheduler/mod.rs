//! Scheduler boundary
//!
//! The queue is read once per run through [`Scheduler::current_job_names`]
//! and commands are handed to [`Scheduler::submit`]. Provides:
//! - [`SlurmScheduler`]: squeue/sbatch subprocesses
//! - [`MockScheduler`]: in-memory queue for tests

mod mock;
mod slurm;

use std::collections::HashSet;
use std::io;

use crate::job::SubmitCommand;

pub use mock::{MockScheduler, MockSubmission};
pub use slurm::{parse_job_id, SlurmScheduler};

/// Read-only job queue interface plus submission.
pub trait Scheduler: Send + Sync {
    /// Names of the current user's queued and running jobs.
    fn current_job_names(&self) -> Result<QueueSnapshot, SchedulerError>;

    /// Submit a command, returning the scheduler's job ID.
    fn submit(&self, command: &SubmitCommand) -> Result<String, SchedulerError>;
}

/// Job names in the queue at the start of a run. Never refreshed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    names: HashSet<String>,
}

impl QueueSnapshot {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse one job name per line, ignoring blank lines.
    pub fn parse(output: &str) -> Self {
        Self::new(output.lines().map(str::trim).filter(|l| !l.is_empty()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Scheduler errors
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduler unavailable: {command}: {reason}")]
    Unavailable { command: String, reason: String },

    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("submission rejected (exit {code}): {stderr}")]
    Rejected { code: i32, stderr: String },

    #[error("no job ID in submission output: {output:?}")]
    UnparsableResponse { output: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_parse() {
        let snapshot = QueueSnapshot::parse("job-1-3\n\n  train-mnist  \n");
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.contains("job-1-3"));
        assert!(snapshot.contains("train-mnist"));
        assert!(!snapshot.contains("job-1-4"));
    }

    #[test]
    fn test_empty_snapshot() {
        assert!(QueueSnapshot::parse("").is_empty());
    }
}
