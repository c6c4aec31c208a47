// src/history/mod.rs

//! Append-only per-run history of step attempts.
//!
//! - [`record`] is the line format.
//! - [`log`] is the loaded log and the resume-level computation.
//! - [`store`] reads and appends log files.

pub mod log;
pub mod record;
pub mod store;

pub use log::HistoryLog;
pub use record::HistoryRecord;
pub use store::HistoryStore;

/// Return code recorded when the external program could not be started.
pub const LAUNCH_FAILURE_CODE: i32 = -1;

/// Return code recorded when a program exited 0 but its declared outputs are
/// missing.
pub const MISSING_OUTPUT_CODE: i32 = 1;
