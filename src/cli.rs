// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::loader::default_config_path;
use crate::types::{RunId, ScheduleMode};

/// Command-line arguments for `sequencer`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "sequencer",
    version,
    about = "Run the calibration pipeline for a batch of runs, resuming from their history logs.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, short = 'c', value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Schedule mode: P (parallel), S (sequential) or T (temperature-aware).
    ///
    /// Overrides `[config] mode`.
    #[arg(long, short = 'm', value_name = "MODE", value_parser = parse_mode)]
    pub mode: Option<ScheduleMode>,

    /// Only process these runs (repeatable). Default: every `[[run]]`.
    #[arg(long = "run", short = 'r', value_name = "RUN_ID")]
    pub runs: Vec<RunId>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SEQUENCER_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Shorthand for `--log-level debug`.
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Show each run's resume level and the commands it would execute, but
    /// don't launch anything.
    #[arg(long, short = 's', visible_alias = "simulate")]
    pub dry_run: bool,
}

impl CliArgs {
    /// Level requested on the command line, if any.
    pub fn effective_log_level(&self) -> Option<LogLevel> {
        match self.log_level {
            Some(level) => Some(level),
            None if self.verbose => Some(LogLevel::Debug),
            None => None,
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

fn parse_mode(s: &str) -> Result<ScheduleMode, String> {
    s.parse()
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
