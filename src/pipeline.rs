//! Run orchestration
//!
//! One invocation:
//! - Plan the selected groups (upstream groups first)
//! - Read the queue once; abort before any submission if that fails
//! - Per group: resolve instances, link dependencies, execute, record
//! - Aggregate the run summary
//!
//! A group that cannot be resolved is reported and skipped; its dependents
//! fail with a dependency error while independent groups carry on.

use std::io::{self, Write};

use thiserror::Error;

use slurmer_sweep::PathLister;

use crate::chain::{DependencyChainer, Ledger};
use crate::config::{ConfigError, JobsFile, Settings};
use crate::executor::{ExecutionMode, Executor};
use crate::job::CommandContext;
use crate::resolve::GroupResolver;
use crate::scheduler::{Scheduler, SchedulerError};
use crate::signal::CancelFlag;
use crate::summary::{ExitCode, GroupReport, RunSummary, SkipCounts};

/// Errors that stop the whole run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    SchedulerUnavailable(SchedulerError),

    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl PipelineError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            PipelineError::Config(_) => ExitCode::Config,
            PipelineError::SchedulerUnavailable(_) => ExitCode::SchedulerUnavailable,
            PipelineError::Io(_) => ExitCode::Failures,
        }
    }
}

/// Per-invocation options
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub mode: ExecutionMode,

    /// Groups to run; empty means all
    pub selection: Vec<String>,

    /// Extra scheduler options for every submission
    pub slurm_overrides: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Live,
            selection: Vec::new(),
            slurm_overrides: Vec::new(),
        }
    }
}

pub struct Pipeline<'a> {
    settings: &'a Settings,
    scheduler: &'a dyn Scheduler,
    lister: &'a dyn PathLister,
    cancel: CancelFlag,
}

impl<'a> Pipeline<'a> {
    pub fn new(settings: &'a Settings, scheduler: &'a dyn Scheduler, lister: &'a dyn PathLister) -> Self {
        Self {
            settings,
            scheduler,
            lister,
            cancel: CancelFlag::new(),
        }
    }

    /// Use a flag shared with the signal handler.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn run(&self, jobs: &JobsFile, config: &PipelineConfig, out: &mut dyn Write) -> Result<RunSummary, PipelineError> {
        let plan = jobs.plan(&config.selection)?;
        let run_id = RunSummary::new_run_id();
        log::info!("run {}: {} group(s), mode {:?}", run_id, plan.len(), config.mode);

        let snapshot = self
            .scheduler
            .current_job_names()
            .map_err(PipelineError::SchedulerUnavailable)?;
        log::debug!("queue snapshot holds {} job name(s)", snapshot.len());

        let context = CommandContext::new(
            self.settings,
            config.mode == ExecutionMode::Interactive,
            config.slurm_overrides.clone(),
        );
        let resolver = GroupResolver::new(self.lister, &snapshot, &context);
        let executor = Executor::new(
            self.scheduler,
            config.mode,
            &self.settings.chain_dependency_kind,
            &self.cancel,
        );

        let mut ledger = Ledger::new();
        let mut reports = Vec::with_capacity(plan.len());

        for entry in plan {
            let resolved = entry
                .spec
                .as_ref()
                .map_err(|e| e.to_string())
                .and_then(|spec| resolver.resolve(spec).map(|g| (spec, g)).map_err(|e| e.to_string()));

            let (spec, mut group) = match resolved {
                Ok(resolved) => resolved,
                Err(reason) => {
                    log::error!("[{}] {}", entry.id, reason);
                    ledger.record_unavailable(&entry.id, reason.clone());
                    reports.push(GroupReport::failed(&entry.id, reason));
                    continue;
                }
            };

            DependencyChainer::new(&ledger, &self.settings.dependency_kind).link(spec, &mut group.instances);

            let mut counts = SkipCounts::default();
            for instance in &group.instances {
                counts.add(instance.skip_reason());
            }
            log::info!("[{}] {} of {} ready, {}", entry.id, group.ready(), group.instances.len(), counts.describe());

            executor.execute(spec, &mut group.instances, out)?;

            ledger.record(&entry.id, &group.instances);
            reports.push(GroupReport::from_instances(&entry.id, &group.instances));
        }

        let summary = RunSummary::from_groups(run_id, reports);
        log::info!("{}", summary.human_summary);
        Ok(summary)
    }
}
