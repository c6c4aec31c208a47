// src/schedule/mod.rs

//! Inter-run scheduling.
//!
//! - [`order`] decides the dispatch order for a mode.
//! - [`scheduler`] builds controllers and hands them to a backend.
//! - [`report`] summarises the outcome of a pass.

pub mod order;
pub mod report;
pub mod scheduler;

pub use order::{PriorityFn, activity_priority, dispatch_order};
pub use report::ScheduleReport;
pub use scheduler::{PipelineFactory, RunPlan, RunScheduler};
