// src/pipeline/step.rs

//! Static step definitions and the ordered pipeline template.

use std::fmt;

use crate::config::model::{CommandConfig, ConfigFile, FallbackConfig, StepConfig};
use crate::errors::Result;
use crate::pipeline::run::RunContext;
use crate::types::RunId;

/// Executable plus ordered `--flag=value` argument templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandTemplate {
    /// Resolve program and arguments for one run, keeping argument order.
    pub fn bind(&self, ctx: &RunContext) -> Result<BoundCommand> {
        let program = ctx.bind(&self.program)?;
        let args = self
            .args
            .iter()
            .map(|a| ctx.bind(a))
            .collect::<Result<Vec<_>>>()?;
        Ok(BoundCommand { program, args })
    }
}

/// A command ready to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl fmt::Display for BoundCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

impl From<&CommandConfig> for CommandTemplate {
    fn from(cfg: &CommandConfig) -> Self {
        Self {
            program: cfg.program.clone(),
            args: cfg.args.clone(),
        }
    }
}

/// Substitute a known-good default artifact when the program fails with a
/// recognised exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackPolicy {
    pub trigger_code: i32,
    pub default_run: RunId,
    pub search_dir: String,
    pub pattern: String,
    /// Link location template; `None` means the step's first output.
    pub link: Option<String>,
}

impl From<&FallbackConfig> for FallbackPolicy {
    fn from(cfg: &FallbackConfig) -> Self {
        Self {
            trigger_code: cfg.trigger_code,
            default_run: cfg.default_run,
            search_dir: cfg.search_dir.clone(),
            pattern: cfg.pattern.clone(),
            link: cfg.link.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDefinition {
    pub name: String,
    pub command: CommandTemplate,
    pub outputs: Vec<String>,
    pub requires: Vec<String>,
    pub verify_outputs: bool,
    pub config_ref: Option<String>,
    pub plot: Option<CommandTemplate>,
    pub fallback: Option<FallbackPolicy>,
}

impl StepDefinition {
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: CommandTemplate {
                program: program.into(),
                args: Vec::new(),
            },
            outputs: Vec::new(),
            requires: Vec::new(),
            verify_outputs: false,
            config_ref: None,
            plot: None,
            fallback: None,
        }
    }
}

impl From<&StepConfig> for StepDefinition {
    fn from(cfg: &StepConfig) -> Self {
        Self {
            name: cfg.name.clone(),
            command: CommandTemplate {
                program: cfg.program.clone(),
                args: cfg.args.clone(),
            },
            outputs: cfg.outputs.clone(),
            requires: cfg.requires.clone(),
            verify_outputs: cfg.verify_outputs,
            config_ref: cfg.config_ref.clone(),
            plot: cfg.plot.as_ref().map(CommandTemplate::from),
            fallback: cfg.fallback.as_ref().map(FallbackPolicy::from),
        }
    }
}

/// Totally ordered list of steps, first-to-run first.
///
/// Levels count steps still to run: level `len()` is a fresh run, level 0 a
/// finished one. The step run at level `n` is `steps()[len() - n]`, so the
/// mapping follows the list and never depends on a fixed step count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineTemplate {
    steps: Vec<StepDefinition>,
}

impl PipelineTemplate {
    pub fn new(steps: Vec<StepDefinition>) -> Self {
        Self { steps }
    }

    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self::new(cfg.step.iter().map(StepDefinition::from).collect())
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// 0-based position of the step called `name`.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name == name)
    }

    /// Step executed when the pipeline is at `level`.
    pub fn step_at_level(&self, level: usize) -> Option<&StepDefinition> {
        if level == 0 || level > self.steps.len() {
            return None;
        }
        self.steps.get(self.steps.len() - level)
    }

    /// Steps still to run from `level`, in execution order.
    pub fn remaining(&self, level: usize) -> &[StepDefinition] {
        let start = self.steps.len().saturating_sub(level);
        &self.steps[start..]
    }
}
