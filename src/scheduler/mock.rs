//! In-memory scheduler for tests
//!
//! Keeps a queue of job names and hands out sequential job IDs. Submitted
//! jobs join the queue, so a second run against the same mock sees them.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use super::{QueueSnapshot, Scheduler, SchedulerError};
use crate::job::SubmitCommand;

/// A recorded submission.
#[derive(Debug, Clone, PartialEq)]
pub struct MockSubmission {
    pub job_id: String,
    pub job_name: String,
    pub dependency: Option<String>,
    /// Shell rendering of the command
    pub line: String,
}

#[derive(Debug, Default)]
struct MockQueue {
    names: HashSet<String>,
    next_id: u64,
    rejected: HashSet<String>,
    fail_queries: bool,
    queries: usize,
    submissions: Vec<MockSubmission>,
}

/// Scheduler double with failure injection.
#[derive(Debug, Clone)]
pub struct MockScheduler {
    queue: Arc<Mutex<MockQueue>>,
}

impl Default for MockScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl MockScheduler {
    /// Empty queue; IDs start at 1000.
    pub fn new() -> Self {
        Self {
            queue: Arc::new(Mutex::new(MockQueue {
                next_id: 1000,
                ..MockQueue::default()
            })),
        }
    }

    /// Jobs already queued before the run.
    pub fn with_running<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_queue(|q| q.names.extend(names.into_iter().map(Into::into)))
    }

    /// First job ID handed out.
    pub fn starting_id(self, id: u64) -> Self {
        self.with_queue(|q| q.next_id = id)
    }

    /// Reject submissions of this job name.
    pub fn reject_job(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.with_queue(|q| {
            q.rejected.insert(name);
        })
    }

    /// Make every queue query fail.
    pub fn fail_queries(self) -> Self {
        self.with_queue(|q| q.fail_queries = true)
    }

    pub fn submissions(&self) -> Vec<MockSubmission> {
        self.lock().submissions.clone()
    }

    pub fn query_count(&self) -> usize {
        self.lock().queries
    }

    fn with_queue(self, f: impl FnOnce(&mut MockQueue)) -> Self {
        f(&mut self.lock());
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockQueue> {
        // A panicking test thread must not hide the queue from the rest of the test
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Scheduler for MockScheduler {
    fn current_job_names(&self) -> Result<QueueSnapshot, SchedulerError> {
        let mut queue = self.lock();
        queue.queries += 1;
        if queue.fail_queries {
            return Err(SchedulerError::Unavailable {
                command: "squeue".to_string(),
                reason: "slurm_load_jobs error: Unable to contact slurm controller".to_string(),
            });
        }
        Ok(QueueSnapshot::new(queue.names.iter().cloned()))
    }

    fn submit(&self, command: &SubmitCommand) -> Result<String, SchedulerError> {
        let mut queue = self.lock();
        if queue.rejected.contains(&command.job_name) {
            return Err(SchedulerError::Rejected {
                code: 1,
                stderr: "sbatch: error: Batch job submission failed: Invalid account".to_string(),
            });
        }

        let job_id = queue.next_id.to_string();
        queue.next_id += 1;
        queue.names.insert(command.job_name.clone());
        queue.submissions.push(MockSubmission {
            job_id: job_id.clone(),
            job_name: command.job_name.clone(),
            dependency: command.dependency.clone(),
            line: command.to_shell(),
        });
        Ok(job_id)
    }
}
