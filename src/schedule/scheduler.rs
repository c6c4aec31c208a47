// src/schedule/scheduler.rs

//! Releases runs to the batch backend according to a schedule mode.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};

use crate::config::model::ConfigFile;
use crate::errors::Result;
use crate::exec::backend::{BatchBackend, JobHandle, PipelineJob};
use crate::exec::process::ProcessLauncher;
use crate::exec::step_runner::StepRunner;
use crate::fs::FileSystem;
use crate::history::HistoryStore;
use crate::pipeline::controller::PipelineController;
use crate::pipeline::outcome::{Abort, RunOutcome};
use crate::pipeline::run::{Run, RunContext};
use crate::pipeline::step::{BoundCommand, PipelineTemplate};
use crate::schedule::order::{PriorityFn, activity_priority, dispatch_order};
use crate::schedule::report::ScheduleReport;
use crate::types::{RunId, ScheduleMode};

/// Builds one [`PipelineController`] per run, all sharing the same template,
/// history store and step runner.
#[derive(Debug, Clone)]
pub struct PipelineFactory {
    template: Arc<PipelineTemplate>,
    analysis_dir: PathBuf,
    vars: BTreeMap<String, String>,
    store: HistoryStore,
    runner: Arc<StepRunner>,
}

impl PipelineFactory {
    pub fn new(
        cfg: &ConfigFile,
        fs: Arc<dyn FileSystem>,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        let store = HistoryStore::new(fs.clone());
        let runner = Arc::new(StepRunner::new(launcher, store.clone(), fs));
        Self {
            template: Arc::new(PipelineTemplate::from_config(cfg)),
            analysis_dir: PathBuf::from(&cfg.config.analysis_dir),
            vars: cfg.vars.clone(),
            store,
            runner,
        }
    }

    pub fn template(&self) -> &PipelineTemplate {
        &self.template
    }

    pub fn context_for(&self, run: Run) -> Result<RunContext> {
        RunContext::build(run, &self.analysis_dir, &self.vars)
    }

    pub fn controller_for(&self, run: Run) -> Result<PipelineController> {
        let ctx = self.context_for(run)?;
        Ok(PipelineController::new(
            Arc::new(ctx),
            self.template.clone(),
            self.store.clone(),
            self.runner.clone(),
        ))
    }

    /// What `run` would execute from its current history, without launching
    /// anything.
    pub fn plan(&self, run: Run) -> Result<RunPlan> {
        let controller = self.controller_for(run)?;
        let level = controller.resume_level()?;
        let ctx = controller.context();

        let commands = self
            .template
            .remaining(level)
            .iter()
            .map(|step| -> Result<(String, BoundCommand)> {
                Ok((step.name.clone(), step.command.bind(ctx)?))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(RunPlan {
            run_id: ctx.run().id,
            history_file: ctx.history_file().to_path_buf(),
            level,
            commands,
        })
    }
}

/// Dry-run view of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub run_id: RunId,
    pub history_file: PathBuf,
    pub level: usize,
    /// Remaining steps with their resolved commands, in execution order.
    pub commands: Vec<(String, BoundCommand)>,
}

impl fmt::Display for RunPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run {} at level {} ({})",
            self.run_id,
            self.level,
            self.history_file.display()
        )?;
        if self.commands.is_empty() {
            write!(f, "\n  nothing to do")?;
        }
        for (step, command) in &self.commands {
            write!(f, "\n  [{step}] {command}")?;
        }
        Ok(())
    }
}

enum Slot {
    Submitted(JobHandle),
    Finished(RunOutcome),
}

/// Submits each run's pipeline to a backend and collects the outcomes.
///
/// Failures are isolated: whatever happens to one run, every other run in
/// the batch is still dispatched and reported. Nothing is retried.
pub struct RunScheduler<B: BatchBackend> {
    backend: B,
    factory: PipelineFactory,
    priority: Box<PriorityFn>,
}

impl<B: BatchBackend> RunScheduler<B> {
    pub fn new(backend: B, factory: PipelineFactory) -> Self {
        Self {
            backend,
            factory,
            priority: Box::new(activity_priority),
        }
    }

    /// Replace the temperature-aware priority key.
    pub fn with_priority<F>(mut self, priority: F) -> Self
    where
        F: Fn(&Run) -> i64 + Send + Sync + 'static,
    {
        self.priority = Box::new(priority);
        self
    }

    pub fn factory(&self) -> &PipelineFactory {
        &self.factory
    }

    pub async fn schedule(&self, runs: Vec<Run>, mode: ScheduleMode) -> ScheduleReport {
        let (ordered, duplicates) = dispatch_order(runs, mode, &*self.priority);
        info!(%mode, runs = ordered.len(), "scheduling runs");

        let mut report = ScheduleReport::new(mode);

        match mode {
            ScheduleMode::Parallel => {
                let mut slots = Vec::with_capacity(ordered.len());
                for run in ordered {
                    slots.push(match self.submit(run).await {
                        Ok(handle) => Slot::Submitted(handle),
                        Err(outcome) => Slot::Finished(outcome),
                    });
                }
                for slot in slots {
                    let outcome = match slot {
                        Slot::Submitted(handle) => self.wait(handle).await,
                        Slot::Finished(outcome) => outcome,
                    };
                    report.push(outcome);
                }
            }
            ScheduleMode::Sequential | ScheduleMode::TemperatureAware => {
                for run in ordered {
                    let outcome = match self.submit(run).await {
                        Ok(handle) => self.wait(handle).await,
                        Err(outcome) => outcome,
                    };
                    report.push(outcome);
                }
            }
        }

        for run_id in duplicates {
            report.push(RunOutcome::aborted(
                run_id,
                Abort::cancelled("duplicate run id in batch"),
            ));
        }

        info!(
            completed = report.completed().count(),
            total = report.outcomes.len(),
            "schedule finished"
        );
        report
    }

    async fn submit(&self, run: Run) -> std::result::Result<JobHandle, RunOutcome> {
        let run_id = run.id;
        let controller = self.factory.controller_for(run).map_err(|err| {
            error!(run = run_id, error = %err, "cannot prepare run");
            RunOutcome::aborted(run_id, Abort::from_error(None, &err))
        })?;

        self.backend
            .submit(PipelineJob::from_controller(controller))
            .await
            .map_err(|err| {
                error!(run = run_id, error = %err, "backend rejected run");
                RunOutcome::aborted(run_id, Abort::from_error(None, &err))
            })
    }

    async fn wait(&self, handle: JobHandle) -> RunOutcome {
        match self.backend.wait(handle).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(run = handle.run_id, error = %err, "lost track of run");
                RunOutcome::aborted(handle.run_id, Abort::from_error(None, &err))
            }
        }
    }
}
