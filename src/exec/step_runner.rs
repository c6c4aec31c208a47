// src/exec/step_runner.rs

//! Execution of a single pipeline step, including its fallback.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use globset::Glob;
use tracing::{debug, error, info, warn};

use crate::errors::{Result, SequencerError};
use crate::exec::process::ProcessLauncher;
use crate::fs::FileSystem;
use crate::history::{HistoryRecord, HistoryStore, LAUNCH_FAILURE_CODE, MISSING_OUTPUT_CODE};
use crate::pipeline::run::RunContext;
use crate::pipeline::step::{FallbackPolicy, StepDefinition};

/// A step that completed, either directly or through its fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSuccess {
    pub step: String,
    /// Declared outputs, resolved to absolute paths.
    pub artifacts: Vec<PathBuf>,
    pub fallback_used: bool,
}

/// Either the produced artifacts or the typed reason the step failed.
pub type StepResult = Result<StepSuccess>;

/// History fields that are the same for every attempt of a step.
struct AttemptInfo {
    input_artifact: String,
    config_reference: Option<String>,
}

/// Runs steps and records each attempt in the run's history log.
///
/// Every launch attempt appends exactly one record, written after the
/// process has exited. An attempt that is cancelled while the process runs
/// therefore leaves no trace in the log.
#[derive(Debug, Clone)]
pub struct StepRunner {
    launcher: Arc<dyn ProcessLauncher>,
    store: HistoryStore,
    fs: Arc<dyn FileSystem>,
}

impl StepRunner {
    pub fn new(
        launcher: Arc<dyn ProcessLauncher>,
        store: HistoryStore,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            launcher,
            store,
            fs,
        }
    }

    /// Execute `step` for the run described by `ctx`.
    pub async fn execute(&self, step: &StepDefinition, ctx: &RunContext) -> StepResult {
        let run_id = ctx.run().id;

        for required in &step.requires {
            let path = ctx.bind_path(required)?;
            if !self.fs.exists(&path) {
                error!(run = run_id, step = %step.name, path = ?path, "required artifact not found");
                return Err(SequencerError::DataUnavailable {
                    step: step.name.clone(),
                    path,
                    code: None,
                });
            }
        }

        let command = step.command.bind(ctx)?;
        let artifacts = step
            .outputs
            .iter()
            .map(|o| ctx.bind_path(o))
            .collect::<Result<Vec<_>>>()?;
        let attempt = AttemptInfo {
            input_artifact: artifacts.first().map(|p| basename(p)).unwrap_or_default(),
            config_reference: step
                .config_ref
                .as_deref()
                .map(|t| ctx.bind_path(t))
                .transpose()?
                .map(|p| basename(&p)),
        };

        info!(run = run_id, step = %step.name, %command, "executing step");

        let code = match self.launcher.launch(&command.program, &command.args).await {
            Ok(code) => code,
            Err(source) => {
                error!(
                    run = run_id,
                    step = %step.name,
                    program = %command.program,
                    error = %source,
                    "could not launch step program"
                );
                self.record(step, ctx, &attempt, LAUNCH_FAILURE_CODE)?;
                return Err(SequencerError::Launch {
                    step: step.name.clone(),
                    program: command.program,
                    source,
                });
            }
        };

        if code == 0 {
            if step.verify_outputs {
                if let Some(missing) = artifacts.iter().find(|p| !self.fs.exists(p)) {
                    error!(
                        run = run_id,
                        step = %step.name,
                        path = ?missing,
                        "program exited 0 but a declared output is missing"
                    );
                    self.record(step, ctx, &attempt, MISSING_OUTPUT_CODE)?;
                    return Err(SequencerError::DataUnavailable {
                        step: step.name.clone(),
                        path: missing.clone(),
                        code: Some(MISSING_OUTPUT_CODE),
                    });
                }
            }

            self.record(step, ctx, &attempt, 0)?;
            info!(run = run_id, step = %step.name, "step finished successfully");
            self.plot(step, ctx).await;

            return Ok(StepSuccess {
                step: step.name.clone(),
                artifacts,
                fallback_used: false,
            });
        }

        self.record(step, ctx, &attempt, code)?;

        match &step.fallback {
            Some(policy) if policy.trigger_code == code => {
                self.apply_fallback(step, policy, ctx, &attempt, artifacts, code)
                    .await
            }
            _ => {
                error!(run = run_id, step = %step.name, exit_code = code, "step failed");
                Err(SequencerError::ExternalProcess {
                    step: step.name.clone(),
                    code,
                })
            }
        }
    }

    /// Link the default artifact in place of the failed step's product and
    /// record the recovery as a second, successful attempt.
    ///
    /// Search and link errors carry `code`, the return code already recorded
    /// for the failed attempt.
    async fn apply_fallback(
        &self,
        step: &StepDefinition,
        policy: &FallbackPolicy,
        ctx: &RunContext,
        attempt: &AttemptInfo,
        artifacts: Vec<PathBuf>,
        code: i32,
    ) -> StepResult {
        let run_id = ctx.run().id;
        warn!(
            run = run_id,
            step = %step.name,
            default_run = policy.default_run,
            "step failed with fallback trigger code; linking default artifact"
        );

        let failed = |source: SequencerError| SequencerError::FallbackFailed {
            step: step.name.clone(),
            code,
            source: Box::new(source),
        };

        let Some(default) = self.find_default_artifact(policy, ctx).map_err(failed)? else {
            error!(
                run = run_id,
                step = %step.name,
                default_run = policy.default_run,
                "default artifact not found; create it first"
            );
            return Err(SequencerError::FallbackUnavailable {
                step: step.name.clone(),
                default_run: policy.default_run,
                code,
            });
        };

        let link = self
            .link_default(step, policy, ctx, &default, &artifacts)
            .map_err(failed)?;
        info!(run = run_id, step = %step.name, from = ?default, to = ?link, "linked default artifact");

        self.record(step, ctx, attempt, 0)?;

        Ok(StepSuccess {
            step: step.name.clone(),
            artifacts,
            fallback_used: true,
        })
    }

    /// Create the fallback link to `default` and return its path.
    fn link_default(
        &self,
        step: &StepDefinition,
        policy: &FallbackPolicy,
        ctx: &RunContext,
        default: &Path,
        artifacts: &[PathBuf],
    ) -> Result<PathBuf> {
        let link = match &policy.link {
            Some(template) => ctx.bind_path(template)?,
            None => artifacts.first().cloned().ok_or_else(|| {
                SequencerError::ConfigError(format!(
                    "step '{}' has no output to link the default artifact to",
                    step.name
                ))
            })?,
        };

        if let Some(parent) = link.parent() {
            self.fs.create_dir_all(parent)?;
        }
        self.fs.symlink(default, &link)?;
        Ok(link)
    }

    /// First file (in sorted order) under the policy's search root whose
    /// relative path matches its pattern.
    fn find_default_artifact(
        &self,
        policy: &FallbackPolicy,
        ctx: &RunContext,
    ) -> Result<Option<PathBuf>> {
        let extra = [
            ("default_run", policy.default_run.to_string()),
            ("default_run_padded", format!("{:05}", policy.default_run)),
        ];
        let search_dir = ctx.directory().join(ctx.bind_with(&policy.search_dir, &extra)?);
        let pattern = ctx.bind_with(&policy.pattern, &extra)?;

        let matcher = Glob::new(&pattern)
            .map_err(|e| {
                SequencerError::ConfigError(format!("invalid fallback pattern '{pattern}': {e}"))
            })?
            .compile_matcher();

        if !self.fs.is_dir(&search_dir) {
            debug!(dir = ?search_dir, "fallback search directory does not exist");
            return Ok(None);
        }

        let files = self.fs.walk_files(&search_dir)?;
        Ok(files.into_iter().find(|path| {
            path.strip_prefix(&search_dir)
                .is_ok_and(|rel| matcher.is_match(rel))
        }))
    }

    /// Produce the step's plots. Failures here never affect the pipeline.
    async fn plot(&self, step: &StepDefinition, ctx: &RunContext) {
        let Some(plot) = &step.plot else {
            return;
        };
        let run_id = ctx.run().id;

        let command = match plot.bind(ctx) {
            Ok(c) => c,
            Err(e) => {
                warn!(run = run_id, step = %step.name, error = %e, "skipping plots");
                return;
            }
        };

        info!(run = run_id, step = %step.name, %command, "producing plots");
        match self.launcher.launch(&command.program, &command.args).await {
            Ok(0) => debug!(run = run_id, step = %step.name, "plots produced"),
            Ok(code) => warn!(
                run = run_id,
                step = %step.name,
                exit_code = code,
                "plot command failed; continuing"
            ),
            Err(e) => warn!(
                run = run_id,
                step = %step.name,
                error = %e,
                "could not launch plot command; continuing"
            ),
        }
    }

    fn record(
        &self,
        step: &StepDefinition,
        ctx: &RunContext,
        attempt: &AttemptInfo,
        return_code: i32,
    ) -> Result<()> {
        let run = ctx.run();
        let record = HistoryRecord::new(
            run.id,
            step.name.as_str(),
            run.prod_id.as_str(),
            attempt.input_artifact.as_str(),
            attempt.config_reference.clone(),
            return_code,
        );
        self.store.append(ctx.history_file(), &record)
    }
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
