// src/pipeline/outcome.rs

//! Terminal results of a run's pipeline.

use std::fmt;

use crate::errors::SequencerError;
use crate::types::RunId;

/// Why a run stopped before completing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Abort {
    /// Failing step; `None` when the run stopped outside a step (corrupt
    /// history, cancellation, bad context).
    pub step: Option<String>,
    /// Return code of the failing attempt, when one was executed.
    pub return_code: Option<i32>,
    pub reason: String,
}

impl Abort {
    pub fn from_error(step: Option<&str>, err: &SequencerError) -> Self {
        Self {
            step: step.map(str::to_string),
            return_code: err.return_code(),
            reason: err.to_string(),
        }
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self {
            step: None,
            return_code: None,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Abort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.step, self.return_code) {
            (Some(step), Some(code)) => write!(f, "at {step} (code {code}): {}", self.reason),
            (Some(step), None) => write!(f, "at {step}: {}", self.reason),
            (None, _) => write!(f, "{}", self.reason),
        }
    }
}

/// Terminal state of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Done,
    Aborted(Abort),
}

/// What happened to one run during a scheduler pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub status: RunStatus,
    /// Level the run resumed from, if the history could be read.
    pub start_level: Option<usize>,
    /// Steps attempted during this pass, in order.
    pub executed: Vec<String>,
}

impl RunOutcome {
    pub fn aborted(run_id: RunId, abort: Abort) -> Self {
        Self {
            run_id,
            status: RunStatus::Aborted(abort),
            start_level: None,
            executed: Vec::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.status, RunStatus::Done)
    }

    pub fn abort(&self) -> Option<&Abort> {
        match &self.status {
            RunStatus::Aborted(a) => Some(a),
            RunStatus::Done => None,
        }
    }
}
