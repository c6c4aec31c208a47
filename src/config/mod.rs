// src/config/mod.rs

//! Configuration loading and validation for the sequencer.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate steps, runs and templates (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    BackendSection, CommandConfig, ConfigFile, ConfigSection, FallbackConfig, RawConfigFile,
    RunConfig, StepConfig,
};
pub use validate::validate_config;
