// src/pipeline/controller.rs

//! Per-run pipeline state machine.
//!
//! [`PipelineState`] is the pure part: it consumes step results and decides
//! what happens next, with no IO. [`PipelineController`] is the async shell
//! that loads the history, drives the [`StepRunner`] and feeds the results
//! back into the state.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::errors::Result;
use crate::exec::step_runner::{StepResult, StepRunner};
use crate::history::HistoryStore;
use crate::pipeline::outcome::{Abort, RunOutcome, RunStatus};
use crate::pipeline::run::RunContext;
use crate::pipeline::step::PipelineTemplate;

/// Where a run's pipeline currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    /// Steps remaining; the next step is `template.step_at_level(n)`.
    Level(usize),
    Done,
    Aborted(Abort),
}

impl PipelineState {
    /// Fold the terminal level into `Done`.
    pub fn settle(self) -> Self {
        match self {
            PipelineState::Level(0) => PipelineState::Done,
            other => other,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PipelineState::Level(_))
    }

    /// Apply the result of the step run at the current level.
    ///
    /// Success lowers the level by one. Any failure aborts the run with the
    /// step's name, return code and reason. Terminal states are unchanged.
    pub fn advance(self, step: &str, result: &StepResult) -> Self {
        match self {
            PipelineState::Level(level) if level > 0 => match result {
                Ok(_) => PipelineState::Level(level - 1).settle(),
                Err(err) => PipelineState::Aborted(Abort::from_error(Some(step), err)),
            },
            other => other.settle(),
        }
    }
}

/// Drives one run through its remaining steps.
#[derive(Debug, Clone)]
pub struct PipelineController {
    ctx: Arc<RunContext>,
    template: Arc<PipelineTemplate>,
    store: HistoryStore,
    runner: Arc<StepRunner>,
}

impl PipelineController {
    pub fn new(
        ctx: Arc<RunContext>,
        template: Arc<PipelineTemplate>,
        store: HistoryStore,
        runner: Arc<StepRunner>,
    ) -> Self {
        Self {
            ctx,
            template,
            store,
            runner,
        }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Level to resume from, computed from the run's history log.
    pub fn resume_level(&self) -> Result<usize> {
        let log = self.store.load(self.ctx.history_file())?;
        log.resume_level(&self.template)
    }

    /// Initial state from the history, already settled.
    pub fn initial_state(&self) -> Result<PipelineState> {
        Ok(PipelineState::Level(self.resume_level()?).settle())
    }

    /// Run the pipeline to a terminal state.
    ///
    /// A run whose history already shows every step succeeded returns
    /// `Done` without launching anything.
    pub async fn run(self) -> RunOutcome {
        let run_id = self.ctx.run().id;

        let start_level = match self.resume_level() {
            Ok(level) => level,
            Err(err) => {
                error!(run = run_id, error = %err, "cannot determine resume level");
                return RunOutcome::aborted(run_id, Abort::from_error(None, &err));
            }
        };

        info!(
            run = run_id,
            level = start_level,
            steps = self.template.len(),
            "starting pipeline"
        );

        let mut state = PipelineState::Level(start_level).settle();
        let mut executed = Vec::new();

        while let PipelineState::Level(level) = state {
            let Some(step) = self.template.step_at_level(level) else {
                warn!(run = run_id, level, "level outside the pipeline");
                state = PipelineState::Aborted(Abort::cancelled(format!(
                    "level {level} outside a {}-step pipeline",
                    self.template.len()
                )));
                break;
            };

            debug!(run = run_id, level, step = %step.name, "next step");
            let result = self.runner.execute(step, &self.ctx).await;
            executed.push(step.name.clone());
            state = state.advance(&step.name, &result);
        }

        let status = match state {
            PipelineState::Aborted(abort) => {
                error!(run = run_id, %abort, "pipeline aborted");
                RunStatus::Aborted(abort)
            }
            _ => {
                info!(run = run_id, "pipeline done");
                RunStatus::Done
            }
        };

        RunOutcome {
            run_id,
            status,
            start_level: Some(start_level),
            executed,
        }
    }
}
