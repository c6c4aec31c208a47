// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod history;
pub mod logging;
pub mod pipeline;
pub mod schedule;
pub mod types;

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::exec::{LocalBackend, TokioProcessLauncher};
use crate::fs::RealFileSystem;
use crate::pipeline::run::Run;
use crate::schedule::{PipelineFactory, RunScheduler, dispatch_order};

/// High-level entry point used by `main.rs`. Returns the process exit code.
///
/// This wires together:
/// - config loading
/// - the pipeline factory (history store, step runner, process launcher)
/// - the local batch backend
/// - the run scheduler
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<i32> {
    let cfg = load_and_validate(&args.config)?;

    let mode = args.mode.unwrap_or(cfg.config.mode);
    let runs = select_runs(&cfg, &args.runs);
    info!(%mode, runs = runs.len(), steps = cfg.step.len(), "loaded configuration");

    let factory = PipelineFactory::new(
        &cfg,
        Arc::new(RealFileSystem),
        Arc::new(TokioProcessLauncher),
    );

    if args.dry_run {
        return Ok(print_dry_run(&factory, runs, mode));
    }

    let timeout = cfg
        .backend
        .timeout_duration()
        .map_err(|e| anyhow::anyhow!("invalid backend timeout: {e}"))?;
    let backend = LocalBackend::new().with_timeout(timeout);
    let scheduler = RunScheduler::new(backend, factory);

    tokio::select! {
        report = scheduler.schedule(runs, mode) => {
            println!("{report}");
            Ok(report.exit_code())
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            warn!("interrupted; running programs are being stopped");
            Ok(1)
        }
    }
}

/// Runs to process: every configured run, or only those named with `--run`
/// (in the order given). A requested run missing from the config gets the
/// global telescope and production ids and no inputs.
fn select_runs(cfg: &ConfigFile, requested: &[types::RunId]) -> Vec<Run> {
    let configured = Run::all_from_config(cfg);
    if requested.is_empty() {
        return configured;
    }

    requested
        .iter()
        .map(|&id| {
            configured
                .iter()
                .find(|r| r.id == id)
                .cloned()
                .unwrap_or_else(|| {
                    debug!(run = id, "run not listed in config; using defaults");
                    Run::new(id, cfg.config.tel_id.as_str(), cfg.config.prod_id.as_str())
                })
        })
        .collect()
}

/// Print what every run would execute. Returns the exit code.
fn print_dry_run(factory: &PipelineFactory, runs: Vec<Run>, mode: types::ScheduleMode) -> i32 {
    println!("sequencer dry-run ({mode})");
    println!("steps ({}):", factory.template().len());
    for step in factory.template().steps() {
        println!("  - {}", step.name);
    }
    println!();

    let (ordered, duplicates) = dispatch_order(runs, mode, &schedule::activity_priority);
    let mut failed = false;

    for run in ordered {
        let run_id = run.id;
        match factory.plan(run) {
            Ok(plan) => println!("{plan}"),
            Err(err) => {
                failed = true;
                println!("run {run_id}: cannot resume: {err}");
            }
        }
    }
    for run_id in duplicates {
        println!("run {run_id}: duplicate, skipped");
    }

    debug!("dry-run complete (no execution)");
    i32::from(failed)
}
