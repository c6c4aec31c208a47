// src/schedule/report.rs

//! Summary of a scheduler pass.

use std::fmt;

use crate::pipeline::outcome::{RunOutcome, RunStatus};
use crate::types::ScheduleMode;

const REPORT_WIDTH: usize = 60;

/// Terminal outcome of every run handed to the scheduler, in dispatch order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleReport {
    pub mode: ScheduleMode,
    pub outcomes: Vec<RunOutcome>,
}

impl ScheduleReport {
    pub fn new(mode: ScheduleMode) -> Self {
        Self {
            mode,
            outcomes: Vec::new(),
        }
    }

    pub fn push(&mut self, outcome: RunOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn completed(&self) -> impl Iterator<Item = &RunOutcome> {
        self.outcomes.iter().filter(|o| o.is_done())
    }

    pub fn aborted(&self) -> impl Iterator<Item = &RunOutcome> {
        self.outcomes.iter().filter(|o| !o.is_done())
    }

    pub fn outcome_for(&self, run_id: crate::types::RunId) -> Option<&RunOutcome> {
        self.outcomes.iter().find(|o| o.run_id == run_id)
    }

    /// Process exit code: 0 when at least one run finished or there was
    /// nothing to do, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.outcomes.is_empty() || self.completed().next().is_some() {
            0
        } else {
            1
        }
    }
}

impl fmt::Display for ScheduleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = format!(" Sequencer report ({}) ", self.mode);
        let pad = REPORT_WIDTH.saturating_sub(title.len()) / 2;
        writeln!(f, "{}{}{}", "=".repeat(pad), title, "=".repeat(pad))?;

        for outcome in &self.outcomes {
            let resumed = outcome
                .start_level
                .map(|l| format!(" (resumed at level {l})"))
                .unwrap_or_default();
            match &outcome.status {
                RunStatus::Done => writeln!(f, "run {:>6}  DONE{resumed}", outcome.run_id)?,
                RunStatus::Aborted(abort) => {
                    writeln!(f, "run {:>6}  ABORTED {abort}{resumed}", outcome.run_id)?
                }
            }
        }

        writeln!(f, "{}", "-".repeat(REPORT_WIDTH))?;
        write!(
            f,
            "{} of {} runs completed",
            self.completed().count(),
            self.outcomes.len()
        )
    }
}
