// src/pipeline/run.rs

//! Runs and their immutable per-run execution context.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RunConfig};
use crate::errors::Result;
use crate::pipeline::placeholder::{self, INPUT_PREFIX};
use crate::types::RunId;

/// One observation or calibration unit processed through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub id: RunId,
    pub tel_id: String,
    pub prod_id: String,
    /// Named input artifacts (raw files, prior calibration products).
    pub inputs: BTreeMap<String, PathBuf>,
    /// Caller-supplied ordering key for temperature-aware scheduling.
    pub priority: Option<i64>,
}

impl Run {
    pub fn new(id: RunId, tel_id: impl Into<String>, prod_id: impl Into<String>) -> Self {
        Self {
            id,
            tel_id: tel_id.into(),
            prod_id: prod_id.into(),
            inputs: BTreeMap::new(),
            priority: None,
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.inputs.insert(name.into(), path.into());
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Build a run from its `[[run]]` entry, falling back to `[config]` for
    /// the telescope and production ids.
    pub fn from_config(rc: &RunConfig, cfg: &ConfigFile) -> Self {
        Self {
            id: rc.run_id,
            tel_id: rc.tel_id.clone().unwrap_or_else(|| cfg.config.tel_id.clone()),
            prod_id: rc.prod_id.clone().unwrap_or_else(|| cfg.config.prod_id.clone()),
            inputs: rc
                .inputs
                .iter()
                .map(|(k, v)| (k.clone(), PathBuf::from(v)))
                .collect(),
            priority: rc.priority,
        }
    }

    /// Every run listed in the config, in file order.
    pub fn all_from_config(cfg: &ConfigFile) -> Vec<Run> {
        cfg.run.iter().map(|rc| Run::from_config(rc, cfg)).collect()
    }

    /// File name of this run's history log.
    pub fn history_file_name(&self) -> String {
        format!("sequence_{}_{}.history", self.tel_id, self.id)
    }
}

/// Everything a pipeline needs to know about one run, resolved once before
/// the controller is built and never mutated afterwards.
///
/// All paths in here are absolute.
#[derive(Debug, Clone)]
pub struct RunContext {
    run: Run,
    directory: PathBuf,
    history_file: PathBuf,
    bindings: BTreeMap<String, String>,
}

impl RunContext {
    /// Resolve the context for `run`.
    ///
    /// `vars` may use builtins and `{input.<name>}`; a var that references a
    /// missing input fails here, so a broken run is rejected before anything
    /// is launched.
    pub fn build(
        run: Run,
        analysis_dir: &Path,
        vars: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let directory = std::path::absolute(analysis_dir)?;
        let history_file = directory.join(run.history_file_name());

        let mut bindings = BTreeMap::new();
        bindings.insert("run_id".to_string(), run.id.to_string());
        bindings.insert("run_id_padded".to_string(), format!("{:05}", run.id));
        bindings.insert("tel_id".to_string(), run.tel_id.clone());
        bindings.insert("prod_id".to_string(), run.prod_id.clone());
        bindings.insert("directory".to_string(), path_string(&directory));
        bindings.insert("history_file".to_string(), path_string(&history_file));

        let mut inputs = BTreeMap::new();
        for (name, path) in &run.inputs {
            let abs = absolute_under(&directory, path);
            bindings.insert(format!("{INPUT_PREFIX}{name}"), path_string(&abs));
            inputs.insert(name.clone(), abs);
        }

        let mut resolved_vars = BTreeMap::new();
        for (name, template) in vars {
            let value = placeholder::render(template, |key| bindings.get(key).cloned())?;
            resolved_vars.insert(name.clone(), value);
        }
        bindings.extend(resolved_vars);

        let run = Run { inputs, ..run };

        Ok(Self {
            run,
            directory,
            history_file,
            bindings,
        })
    }

    pub fn run(&self) -> &Run {
        &self.run
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn history_file(&self) -> &Path {
        &self.history_file
    }

    /// Expand `template` with this run's bindings.
    pub fn bind(&self, template: &str) -> Result<String> {
        placeholder::render(template, |key| self.bindings.get(key).cloned())
    }

    /// Expand `template` with this run's bindings plus `extra`.
    pub fn bind_with(&self, template: &str, extra: &[(&str, String)]) -> Result<String> {
        placeholder::render(template, |key| {
            extra
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
                .or_else(|| self.bindings.get(key).cloned())
        })
    }

    /// Expand `template` as a path; relative results are taken relative to
    /// the run's analysis directory.
    pub fn bind_path(&self, template: &str) -> Result<PathBuf> {
        let bound = self.bind(template)?;
        Ok(absolute_under(&self.directory, Path::new(&bound)))
    }
}

fn absolute_under(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
