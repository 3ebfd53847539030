//! slurmer CLI
//!
//! Entry point for the `slurmer` command-line tool.

use clap::Parser;
use slurmer::config::EffectiveSettings;
use slurmer::paths::FsPaths;
use slurmer::signal::CancelFlag;
use slurmer::{ExecutionMode, ExitCode, JobsFile, Pipeline, PipelineConfig, SlurmScheduler};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "slurmer")]
#[command(about = "Submit parameter sweeps to Slurm, skipping finished and queued jobs", version)]
struct Cli {
    /// Job groups to run (default: all, in file order)
    groups: Vec<String>,

    /// Jobs file (.yaml, .yml, .toml or .json)
    #[arg(long, short = 'c', default_value = "runs.yaml")]
    config: PathBuf,

    /// Print the submit commands without submitting
    #[arg(long, short = 'd')]
    dry_run: bool,

    /// Print commands that run the jobs in the current shell instead
    #[arg(long, short = 'i', conflicts_with = "dry_run")]
    interactive: bool,

    /// Extra scheduler options for every submission
    #[arg(long = "slurm-arg", num_args = 1.., allow_hyphen_values = true)]
    slurm_args: Vec<String>,

    /// Settings file (default: ~/.config/slurmer/settings.toml)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Print the effective settings and exit
    #[arg(long)]
    show_settings: bool,
}

fn main() {
    let cli = Cli::parse();
    process::exit(run(cli).as_i32());
}

fn run(cli: Cli) -> ExitCode {
    let cli_layer = cli
        .log_level
        .as_ref()
        .map(|level| serde_json::json!({ "log_level": level }));
    let host_path = cli.settings.clone().or_else(EffectiveSettings::default_host_path);

    let effective = match EffectiveSettings::build(host_path.as_deref(), EffectiveSettings::env_layer(), cli_layer) {
        Ok(effective) => effective,
        Err(e) => {
            eprintln!("Error loading settings: {}", e);
            return ExitCode::Config;
        }
    };
    init_logging(&effective.settings.log_level);

    if cli.show_settings {
        return match effective.to_json() {
            Ok(json) => {
                println!("{}", json);
                ExitCode::Success
            }
            Err(e) => {
                eprintln!("Error serializing settings: {}", e);
                ExitCode::Failures
            }
        };
    }

    let jobs = match JobsFile::load(&cli.config) {
        Ok(jobs) => jobs,
        Err(e) => {
            eprintln!("Error loading {}: {}", cli.config.display(), e);
            return ExitCode::Config;
        }
    };

    let settings = &effective.settings;
    let scheduler = match SlurmScheduler::from_settings(settings) {
        Ok(scheduler) => scheduler,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::SchedulerUnavailable;
        }
    };

    let mode = if cli.dry_run {
        ExecutionMode::DryRun
    } else if cli.interactive {
        ExecutionMode::Interactive
    } else {
        ExecutionMode::Live
    };

    let cancel = CancelFlag::new();
    if mode == ExecutionMode::Live {
        if let Err(e) = cancel.install() {
            log::warn!("failed to install signal handler: {}", e);
        }
    }

    // Relative globs and gates resolve against the working directory
    let lister = FsPaths::new();

    let config = PipelineConfig {
        mode,
        selection: cli.groups.clone(),
        slurm_overrides: cli.slurm_args.clone(),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let summary = match Pipeline::new(settings, &scheduler, &lister)
        .with_cancel(cancel)
        .run(&jobs, &config, &mut out)
    {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("Error: {}", e);
            return e.exit_code();
        }
    };

    if cli.json {
        match summary.to_json() {
            Ok(json) => {
                let _ = writeln!(out, "{}", json);
            }
            Err(e) => eprintln!("Error serializing summary: {}", e),
        }
    } else {
        for line in summary.human_lines() {
            eprintln!("{}", line);
        }
    }

    summary.exit_code()
}

fn init_logging(level: &str) {
    let filter = level.parse::<log::LevelFilter>().unwrap_or(log::LevelFilter::Info);
    let _ = env_logger::Builder::from_default_env()
        .filter_level(filter)
        .format_timestamp(None)
        .try_init();
}
