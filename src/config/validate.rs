// src/config/validate.rs

use std::collections::HashSet;

use globset::Glob;

use crate::config::model::{ConfigFile, RawConfigFile, StepConfig};
use crate::errors::{Result, SequencerError};
use crate::pipeline::placeholder::{self, BUILTINS, INPUT_PREFIX};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::SequencerError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

/// Run every semantic check on a raw config.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_steps(cfg)?;
    validate_global_config(cfg)?;
    validate_vars(cfg)?;
    validate_steps(cfg)?;
    validate_runs(cfg)?;
    Ok(())
}

fn config_error(msg: impl Into<String>) -> SequencerError {
    SequencerError::ConfigError(msg.into())
}

fn ensure_has_steps(cfg: &RawConfigFile) -> Result<()> {
    if cfg.step.is_empty() {
        return Err(config_error(
            "config must contain at least one [[step]] section",
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.analysis_dir.trim().is_empty() {
        return Err(config_error("[config].analysis_dir must not be empty"));
    }
    if !is_token(&cfg.config.tel_id) {
        return Err(config_error(format!(
            "[config].tel_id '{}' must be a single non-empty word",
            cfg.config.tel_id
        )));
    }
    if !is_token(&cfg.config.prod_id) {
        return Err(config_error(format!(
            "[config].prod_id '{}' must be a single non-empty word",
            cfg.config.prod_id
        )));
    }

    cfg.backend
        .timeout_duration()
        .map_err(|e| config_error(format!("[backend].timeout: {e}")))?;

    Ok(())
}

/// Vars may only refer to builtins and run inputs, never to other vars.
fn validate_vars(cfg: &RawConfigFile) -> Result<()> {
    for (name, template) in &cfg.vars {
        if BUILTINS.contains(&name.as_str()) || name.starts_with(INPUT_PREFIX) {
            return Err(config_error(format!(
                "[vars].{name} shadows a builtin placeholder"
            )));
        }
        for used in placeholder::placeholders(template) {
            if !BUILTINS.contains(&used) && !used.starts_with(INPUT_PREFIX) {
                return Err(config_error(format!(
                    "[vars].{name} uses '{{{used}}}'; vars may only use builtins and inputs"
                )));
            }
        }
    }
    Ok(())
}

fn validate_steps(cfg: &RawConfigFile) -> Result<()> {
    let mut seen = HashSet::new();

    for step in &cfg.step {
        if !is_token(&step.name) {
            return Err(config_error(format!(
                "step name '{}' must be a single non-empty word",
                step.name
            )));
        }
        if !seen.insert(step.name.as_str()) {
            return Err(config_error(format!(
                "step '{}' is defined more than once",
                step.name
            )));
        }
        if step.program.trim().is_empty() {
            return Err(config_error(format!(
                "step '{}' has an empty program",
                step.name
            )));
        }
        validate_step_templates(cfg, step)?;
    }

    Ok(())
}

fn validate_step_templates(cfg: &RawConfigFile, step: &StepConfig) -> Result<()> {
    let known = |name: &str| {
        BUILTINS.contains(&name) || name.starts_with(INPUT_PREFIX) || cfg.vars.contains_key(name)
    };

    let mut templates: Vec<&str> = vec![step.program.as_str()];
    templates.extend(step.args.iter().map(String::as_str));
    templates.extend(step.outputs.iter().map(String::as_str));
    templates.extend(step.requires.iter().map(String::as_str));
    templates.extend(step.config_ref.as_deref());
    if let Some(plot) = &step.plot {
        templates.push(plot.program.as_str());
        templates.extend(plot.args.iter().map(String::as_str));
    }

    for template in &templates {
        check_placeholders(&step.name, template, &known)?;
    }

    if let Some(fallback) = &step.fallback {
        let known_fb =
            |name: &str| matches!(name, "default_run" | "default_run_padded") || known(name);
        check_placeholders(&step.name, &fallback.search_dir, &known_fb)?;
        check_placeholders(&step.name, &fallback.pattern, &known_fb)?;

        match &fallback.link {
            Some(link) => check_placeholders(&step.name, link, &known)?,
            None if step.outputs.is_empty() => {
                return Err(config_error(format!(
                    "step '{}' has a fallback but neither `fallback.link` nor `outputs`",
                    step.name
                )));
            }
            None => {}
        }

        // Placeholders are substituted per run; check the glob shape with
        // dummy values.
        let sample = placeholder::render(&fallback.pattern, |_| Some("x".to_string()))?;
        Glob::new(&sample).map_err(|e| {
            config_error(format!(
                "step '{}' has an invalid fallback pattern '{}': {e}",
                step.name, fallback.pattern
            ))
        })?;
    }

    Ok(())
}

fn check_placeholders(step: &str, template: &str, known: &dyn Fn(&str) -> bool) -> Result<()> {
    for used in placeholder::placeholders(template) {
        if !known(used) {
            return Err(config_error(format!(
                "step '{step}' uses unknown placeholder '{{{used}}}' in '{template}'"
            )));
        }
    }
    Ok(())
}

/// At most one pipeline per run: a batch may not name the same run twice.
fn validate_runs(cfg: &RawConfigFile) -> Result<()> {
    let mut seen = HashSet::new();
    for run in &cfg.run {
        if !seen.insert(run.run_id) {
            return Err(config_error(format!(
                "run {} is listed more than once",
                run.run_id
            )));
        }
        for name in run.inputs.keys() {
            if !is_token(name) {
                return Err(config_error(format!(
                    "run {} has an invalid input name '{name}'",
                    run.run_id
                )));
            }
        }
    }
    Ok(())
}

fn is_token(s: &str) -> bool {
    !s.is_empty() && !s.chars().any(char::is_whitespace)
}
