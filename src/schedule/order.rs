// src/schedule/order.rs

//! Dispatch order of runs for each schedule mode.

use std::collections::HashSet;

use tracing::warn;

use crate::pipeline::run::Run;
use crate::types::{RunId, ScheduleMode};

/// Priority key used by temperature-aware scheduling. Higher runs first.
pub type PriorityFn = dyn Fn(&Run) -> i64 + Send + Sync;

/// Default key: the run's configured `priority`, otherwise its run number.
///
/// Run numbers grow over a night, so without an explicit priority the most
/// recent calibration run goes first.
pub fn activity_priority(run: &Run) -> i64 {
    run.priority.unwrap_or_else(|| i64::from(run.id))
}

/// Split `runs` into the order they are released in and the duplicates that
/// are rejected. Only the first occurrence of a run id is kept.
pub fn dispatch_order(
    runs: Vec<Run>,
    mode: ScheduleMode,
    priority: &PriorityFn,
) -> (Vec<Run>, Vec<RunId>) {
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    let mut ordered = Vec::with_capacity(runs.len());

    for run in runs {
        if seen.insert(run.id) {
            ordered.push(run);
        } else {
            warn!(run = run.id, "duplicate run in batch; ignoring");
            duplicates.push(run.id);
        }
    }

    if mode == ScheduleMode::TemperatureAware {
        // Stable: equal keys keep input order.
        ordered.sort_by_key(|run| std::cmp::Reverse(priority(run)));
    }

    (ordered, duplicates)
}
