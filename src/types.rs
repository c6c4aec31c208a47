use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Observation run number, as it appears in raw file names and history logs.
pub type RunId = u32;

/// Policy governing the order and concurrency with which runs are released
/// to their pipelines. It never changes the step order inside a run.
///
/// - `Parallel`: every run is submitted at once; no inter-run ordering.
/// - `Sequential`: one run at a time, strictly in input order.
/// - `TemperatureAware`: runs are sorted by a priority key first, then
///   released one at a time like `Sequential`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleMode {
    #[default]
    Parallel,
    Sequential,
    TemperatureAware,
}

impl FromStr for ScheduleMode {
    type Err = String;

    /// Accepts the historical single-letter codes (`P`, `S`, `T`) as well as
    /// the full names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "p" | "parallel" => Ok(ScheduleMode::Parallel),
            "s" | "sequential" => Ok(ScheduleMode::Sequential),
            "t" | "temperature_aware" | "temperature-aware" => {
                Ok(ScheduleMode::TemperatureAware)
            }
            other => Err(format!(
                "invalid schedule mode: {other} (expected P, S, T or parallel, sequential, temperature_aware)"
            )),
        }
    }
}

impl fmt::Display for ScheduleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScheduleMode::Parallel => "parallel",
            ScheduleMode::Sequential => "sequential",
            ScheduleMode::TemperatureAware => "temperature_aware",
        };
        f.write_str(s)
    }
}
