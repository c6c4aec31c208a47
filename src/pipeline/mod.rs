// src/pipeline/mod.rs

//! Runs, steps and the per-run pipeline controller.
//!
//! - [`step`] holds the static step definitions and the ordered template.
//! - [`run`] resolves a run into its immutable [`RunContext`].
//! - [`placeholder`] expands `{name}` templates.
//! - [`controller`] advances one run from its resume level to a terminal
//!   state.
//! - [`outcome`] describes how a run ended.

pub mod controller;
pub mod outcome;
pub mod placeholder;
pub mod run;
pub mod step;

pub use controller::{PipelineController, PipelineState};
pub use outcome::{Abort, RunOutcome, RunStatus};
pub use run::{Run, RunContext};
pub use step::{BoundCommand, CommandTemplate, FallbackPolicy, PipelineTemplate, StepDefinition};
