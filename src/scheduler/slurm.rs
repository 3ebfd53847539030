//! Slurm over subprocesses
//!
//! Queue query: `squeue -u <user> -h -o %j`. Submission runs the sbatch
//! command directly, or through `<shell> -lc` when a conda prelude has to
//! run first.

use std::process::{Command, Output};

use regex_lite::Regex;

use super::{QueueSnapshot, Scheduler, SchedulerError};
use crate::config::Settings;
use crate::job::SubmitCommand;

/// Scheduler backed by the Slurm command-line tools.
pub struct SlurmScheduler {
    user: String,
    squeue: String,
    shell: String,
}

impl SlurmScheduler {
    /// Build from settings. The queue owner defaults to `$USER`, then `$LOGNAME`.
    pub fn from_settings(settings: &Settings) -> Result<Self, SchedulerError> {
        let user = settings
            .user
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .or_else(|| std::env::var("LOGNAME").ok())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| SchedulerError::Unavailable {
                command: settings.squeue_command.clone(),
                reason: "cannot determine user (set USER or the `user` setting)".to_string(),
            })?;

        Ok(Self {
            user,
            squeue: settings.squeue_command.clone(),
            shell: settings.shell.clone(),
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    fn run(&self, label: &str, command: &mut Command) -> Result<Output, SchedulerError> {
        log::debug!("running {:?}", command);
        command.output().map_err(|source| SchedulerError::Spawn {
            command: label.to_string(),
            source,
        })
    }
}

impl Scheduler for SlurmScheduler {
    fn current_job_names(&self) -> Result<QueueSnapshot, SchedulerError> {
        let mut command = Command::new(&self.squeue);
        command.args(["-u", &self.user, "-h", "-o", "%j"]);

        let output = command.output().map_err(|e| SchedulerError::Unavailable {
            command: self.squeue.clone(),
            reason: e.to_string(),
        })?;

        if !output.status.success() {
            return Err(SchedulerError::Unavailable {
                command: self.squeue.clone(),
                reason: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        log::trace!("squeue output: [{}]", stdout);
        let snapshot = QueueSnapshot::parse(&stdout);
        log::debug!("{} job(s) in queue for {}", snapshot.len(), self.user);
        Ok(snapshot)
    }

    fn submit(&self, command: &SubmitCommand) -> Result<String, SchedulerError> {
        let output = if command.prelude.is_some() {
            let line = command.to_shell();
            self.run(&self.shell, Command::new(&self.shell).args(["-lc", &line]))?
        } else {
            self.run(
                &command.program,
                Command::new(&command.program)
                    .args(command.argv())
                    .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
            )?
        };

        if !output.status.success() {
            return Err(SchedulerError::Rejected {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        log::info!("{}", stdout.trim_end());
        parse_job_id(&stdout)
    }
}

/// Extract the job ID from sbatch output.
///
/// Accepts `Submitted batch job <id>` and the bare `<id>[;cluster]` form
/// printed with `--parsable`.
pub fn parse_job_id(output: &str) -> Result<String, SchedulerError> {
    let unparsable = || SchedulerError::UnparsableResponse {
        output: output.to_string(),
    };

    let submitted = Regex::new(r"Submitted batch job (\d+)").map_err(|_| unparsable())?;
    if let Some(caps) = submitted.captures(output) {
        return Ok(caps[1].to_string());
    }

    let first = output.lines().map(str::trim).find(|l| !l.is_empty()).ok_or_else(unparsable)?;
    let id = first.split(';').next().unwrap_or(first);
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
        Ok(id.to_string())
    } else {
        Err(unparsable())
    }
}
