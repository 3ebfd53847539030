//! slurmer - parameter sweeps on Slurm
//!
//! Expands each job group's parameter specification into concrete job
//! instances, skips the ones that are already queued, finished or not yet
//! ready, and submits the rest with dependencies on their upstream jobs.

pub mod chain;
pub mod check;
pub mod config;
pub mod executor;
pub mod job;
pub mod paths;
pub mod pipeline;
pub mod resolve;
pub mod scheduler;
pub mod signal;
pub mod summary;

pub use config::{ConfigError, EffectiveSettings, JobGroupSpec, JobsFile, Settings};
pub use executor::ExecutionMode;
pub use pipeline::{Pipeline, PipelineConfig, PipelineError};
pub use scheduler::{MockScheduler, QueueSnapshot, Scheduler, SchedulerError, SlurmScheduler};
pub use summary::{ExitCode, RunSummary};
