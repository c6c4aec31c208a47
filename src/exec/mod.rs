// src/exec/mod.rs

//! Execution layer.
//!
//! - [`process`] launches external programs with `tokio::process::Command`.
//! - [`step_runner`] runs a single step: preconditions, launch, history
//!   record, fallback and plots.
//! - [`backend`] provides the `BatchBackend` trait and the `LocalBackend`
//!   that runs whole pipelines as tokio tasks.

pub mod backend;
pub mod process;
pub mod step_runner;

pub use backend::{BatchBackend, JobHandle, LocalBackend, PipelineJob};
pub use process::{ProcessLauncher, TokioProcessLauncher};
pub use step_runner::{StepResult, StepRunner, StepSuccess};
