// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Run-level variants (`DataUnavailable`, `ExternalProcess`,
//! `FallbackUnavailable`, `FallbackFailed`, `Storage`, `Launch`) abort a single run only; the
//! scheduler turns them into an [`Abort`](crate::pipeline::Abort) and keeps
//! going with the other runs.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SequencerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// A required raw or intermediate artifact is absent. `code` is set when
    /// the absence was found after an attempt and recorded with that code.
    #[error("step '{step}': required artifact {path:?} is not available")]
    DataUnavailable {
        step: String,
        path: PathBuf,
        code: Option<i32>,
    },

    /// The external program ran but exited non-zero.
    #[error("step '{step}': external program exited with code {code}")]
    ExternalProcess { step: String, code: i32 },

    /// A fallback was triggered but no default artifact could be found.
    #[error("step '{step}': no default artifact found for fallback run {default_run}")]
    FallbackUnavailable {
        step: String,
        default_run: u32,
        code: i32,
    },

    /// The default artifact could not be linked after the step failed with
    /// `code`.
    #[error("step '{step}': fallback after code {code} failed: {source}")]
    FallbackFailed {
        step: String,
        code: i32,
        #[source]
        source: Box<SequencerError>,
    },

    /// The history log cannot be read, parsed or appended to.
    #[error("history log {path:?}: {reason}")]
    Storage { path: PathBuf, reason: String },

    /// The external program could not be started at all.
    #[error("step '{step}': could not launch '{program}': {source}")]
    Launch {
        step: String,
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SequencerError {
    /// Return code that ends up in the history log for this failure, if the
    /// failure corresponds to an executed attempt.
    pub fn return_code(&self) -> Option<i32> {
        match self {
            SequencerError::ExternalProcess { code, .. }
            | SequencerError::FallbackUnavailable { code, .. }
            | SequencerError::FallbackFailed { code, .. } => Some(*code),
            SequencerError::DataUnavailable { code, .. } => *code,
            SequencerError::Launch { .. } => Some(crate::history::LAUNCH_FAILURE_CODE),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SequencerError>;
