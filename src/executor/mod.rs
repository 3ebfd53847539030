//! Submission executor
//!
//! Runs the ready instances of one group in expansion order. Dry runs and
//! interactive runs only print; live runs submit through the [`Scheduler`]
//! and keep going when a single submission fails.

use std::io::{self, Write};

use crate::config::JobGroupSpec;
use crate::job::{InstanceState, JobInstance};
use crate::scheduler::Scheduler;
use crate::signal::CancelFlag;

/// What to do with ready instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Print every submission, including chain links
    DryRun,
    /// Print the command that runs the job in the current shell
    Interactive,
    /// Submit
    Live,
}

pub struct Executor<'a> {
    scheduler: &'a dyn Scheduler,
    mode: ExecutionMode,
    chain_kind: &'a str,
    cancel: &'a CancelFlag,
}

impl<'a> Executor<'a> {
    pub fn new(scheduler: &'a dyn Scheduler, mode: ExecutionMode, chain_kind: &'a str, cancel: &'a CancelFlag) -> Self {
        Self {
            scheduler,
            mode,
            chain_kind,
            cancel,
        }
    }

    /// Execute every ready instance of `spec`.
    ///
    /// Errors are only returned for failures writing to `out`; submission
    /// failures are recorded on the instance.
    pub fn execute(&self, spec: &JobGroupSpec, instances: &mut [JobInstance], out: &mut dyn Write) -> io::Result<()> {
        for instance in instances.iter_mut().filter(|i| i.is_ready()) {
            let Some(command) = instance.command.clone() else { continue };

            if self.mode == ExecutionMode::Live && self.cancel.is_cancelled() {
                instance.state = InstanceState::Cancelled;
                continue;
            }

            match self.mode {
                ExecutionMode::Interactive => {
                    let line = command.to_shell();
                    writeln!(out, "{}", line)?;
                    instance.state = InstanceState::Planned(vec![line]);
                }
                ExecutionMode::DryRun => {
                    let placeholder = vec![format!("<{}>", command.job_name)];
                    let mut lines = Vec::with_capacity(spec.chain as usize);
                    for link in 0..spec.chain {
                        let line = if link == 0 {
                            command.to_shell()
                        } else {
                            command.with_dependency(self.chain_kind, &placeholder).to_shell()
                        };
                        writeln!(out, "{}", line)?;
                        lines.push(line);
                    }
                    instance.state = InstanceState::Planned(lines);
                }
                ExecutionMode::Live => {
                    let mut ids: Vec<String> = Vec::with_capacity(spec.chain as usize);
                    let mut failure = None;
                    for link in 0..spec.chain {
                        if link > 0 && self.cancel.is_cancelled() {
                            log::warn!("{}: chain stopped after {} of {} links", command.job_name, link, spec.chain);
                            break;
                        }
                        let cmd = match ids.last() {
                            Some(previous) => command.with_dependency(self.chain_kind, std::slice::from_ref(previous)),
                            None => command.clone(),
                        };
                        log::debug!("submitting: {}", cmd.to_shell());
                        match self.scheduler.submit(&cmd) {
                            Ok(id) => {
                                log::info!("submitted {} as job {}", cmd.job_name, id);
                                ids.push(id);
                            }
                            Err(err) => {
                                log::error!("{}: {}", cmd.job_name, err);
                                failure = Some(err);
                                break;
                            }
                        }
                    }
                    match failure {
                        Some(err) => {
                            if !ids.is_empty() {
                                log::warn!("{}: earlier chain links remain queued: {}", command.job_name, ids.join(", "));
                            }
                            instance.fail(err);
                        }
                        None => instance.state = InstanceState::Submitted(ids),
                    }
                }
            }
        }
        Ok(())
    }
}
