// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::types::{RunId, ScheduleMode};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [config]
/// mode = "sequential"
/// tel_id = "LST1"
/// prod_id = "v0.10"
/// analysis_dir = "/data/running_analysis/20261017/v0.10"
///
/// [vars]
/// pedestal_file = "{directory}/drs4_pedestal.Run{run_id_padded}.0000.h5"
///
/// [[step]]
/// name = "drs4_pedestal"
/// program = "lstchain_data_create_drs4_pedestal_file"
/// args = ["--input-file={input.raw}", "--output-file={pedestal_file}"]
/// outputs = ["{pedestal_file}"]
///
/// [[run]]
/// run_id = 1808
/// inputs = { raw = "/data/R0/LST-1.1.Run01808.0000.fits.fz" }
/// ```
///
/// `[[step]]` order is the pipeline order.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    pub config: ConfigSection,

    #[serde(default)]
    pub backend: BackendSection,

    /// Extra placeholder values, resolved once per run.
    #[serde(default)]
    pub vars: BTreeMap<String, String>,

    #[serde(default)]
    pub step: Vec<StepConfig>,

    #[serde(default)]
    pub run: Vec<RunConfig>,
}

/// Validated configuration.
///
/// Only obtainable through `TryFrom<RawConfigFile>` (see `validate.rs`), so
/// holding one means the step list, run list and templates are consistent.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub backend: BackendSection,
    pub vars: BTreeMap<String, String>,
    pub step: Vec<StepConfig>,
    pub run: Vec<RunConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            config: raw.config,
            backend: raw.backend,
            vars: raw.vars,
            step: raw.step,
            run: raw.run,
        }
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Default schedule mode; the CLI `--mode` flag overrides it.
    #[serde(default)]
    pub mode: ScheduleMode,

    /// Telescope identifier used when a run does not set its own.
    #[serde(default = "default_tel_id")]
    pub tel_id: String,

    /// Production identifier used when a run does not set its own.
    pub prod_id: String,

    /// Root of the per-night analysis directory. History logs and step
    /// outputs live here.
    pub analysis_dir: String,
}

fn default_tel_id() -> String {
    "LST1".to_string()
}

/// `[backend]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct BackendSection {
    /// Optional wall-clock limit per run pipeline, e.g. `"6h"` or `"90m"`.
    #[serde(default)]
    pub timeout: Option<String>,
}

impl BackendSection {
    pub fn timeout_duration(&self) -> Result<Option<Duration>, String> {
        self.timeout.as_deref().map(parse_duration).transpose()
    }
}

/// `[[step]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct StepConfig {
    /// Step name; also the "program" column in history logs.
    pub name: String,

    /// Executable to run (template).
    pub program: String,

    /// Arguments, passed in this order (templates).
    #[serde(default)]
    pub args: Vec<String>,

    /// Artifacts the step produces (templates). The first one is the artifact
    /// reference written to the history log.
    #[serde(default)]
    pub outputs: Vec<String>,

    /// Artifacts that must exist before the step is launched (templates).
    #[serde(default)]
    pub requires: Vec<String>,

    /// Check that every output exists after a zero exit.
    #[serde(default)]
    pub verify_outputs: bool,

    /// Configuration file handed to the program; its basename is recorded
    /// in the history log.
    #[serde(default)]
    pub config_ref: Option<String>,

    /// Best-effort summary/plot command run after a successful step.
    #[serde(default)]
    pub plot: Option<CommandConfig>,

    #[serde(default)]
    pub fallback: Option<FallbackConfig>,
}

/// Program plus arguments, used for auxiliary commands.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// `[step.fallback]` table: link a known-good default artifact when the
/// program fails with `trigger_code`.
#[derive(Debug, Clone, Deserialize)]
pub struct FallbackConfig {
    #[serde(default = "default_trigger_code")]
    pub trigger_code: i32,

    /// Run whose artifact is used as the default.
    pub default_run: RunId,

    /// Directory searched recursively for the default artifact (template).
    pub search_dir: String,

    /// Glob, relative to `search_dir`, matching the default artifact
    /// (template; `{default_run}` and `{default_run_padded}` are available).
    pub pattern: String,

    /// Where the link is created (template). Defaults to the step's first
    /// output.
    #[serde(default)]
    pub link: Option<String>,
}

fn default_trigger_code() -> i32 {
    1
}

/// `[[run]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub run_id: RunId,

    #[serde(default)]
    pub tel_id: Option<String>,

    #[serde(default)]
    pub prod_id: Option<String>,

    /// Priority key for `temperature_aware` scheduling; higher goes first.
    #[serde(default)]
    pub priority: Option<i64>,

    /// Named input artifacts, available as `{input.<name>}`.
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
}

/// Parse `"500ms"`, `"30s"`, `"15m"` or `"6h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}
