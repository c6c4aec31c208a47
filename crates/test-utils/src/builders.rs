#![allow(dead_code)]

use std::collections::BTreeMap;

use sequencer::config::{
    BackendSection, CommandConfig, ConfigFile, ConfigSection, FallbackConfig, RawConfigFile,
    RunConfig, StepConfig,
};
use sequencer::types::{RunId, ScheduleMode};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new(analysis_dir: &str) -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection {
                    mode: ScheduleMode::default(),
                    tel_id: "LST1".to_string(),
                    prod_id: "v0.10".to_string(),
                    analysis_dir: analysis_dir.to_string(),
                },
                backend: BackendSection::default(),
                vars: BTreeMap::new(),
                step: Vec::new(),
                run: Vec::new(),
            },
        }
    }

    pub fn mode(mut self, mode: ScheduleMode) -> Self {
        self.config.config.mode = mode;
        self
    }

    pub fn prod_id(mut self, prod_id: &str) -> Self {
        self.config.config.prod_id = prod_id.to_string();
        self
    }

    pub fn timeout(mut self, timeout: &str) -> Self {
        self.config.backend.timeout = Some(timeout.to_string());
        self
    }

    pub fn var(mut self, name: &str, template: &str) -> Self {
        self.config.vars.insert(name.to_string(), template.to_string());
        self
    }

    pub fn with_step(mut self, step: StepConfig) -> Self {
        self.config.step.push(step);
        self
    }

    pub fn with_run(mut self, run: RunConfig) -> Self {
        self.config.run.push(run);
        self
    }

    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

/// Builder for `StepConfig`.
pub struct StepConfigBuilder {
    step: StepConfig,
}

impl StepConfigBuilder {
    pub fn new(name: &str, program: &str) -> Self {
        Self {
            step: StepConfig {
                name: name.to_string(),
                program: program.to_string(),
                args: vec![],
                outputs: vec![],
                requires: vec![],
                verify_outputs: false,
                config_ref: None,
                plot: None,
                fallback: None,
            },
        }
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.step.args.push(arg.to_string());
        self
    }

    pub fn output(mut self, path: &str) -> Self {
        self.step.outputs.push(path.to_string());
        self
    }

    pub fn requires(mut self, path: &str) -> Self {
        self.step.requires.push(path.to_string());
        self
    }

    pub fn verify_outputs(mut self, val: bool) -> Self {
        self.step.verify_outputs = val;
        self
    }

    pub fn config_ref(mut self, path: &str) -> Self {
        self.step.config_ref = Some(path.to_string());
        self
    }

    pub fn plot(mut self, program: &str, args: &[&str]) -> Self {
        self.step.plot = Some(CommandConfig {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        });
        self
    }

    pub fn fallback(mut self, default_run: RunId, search_dir: &str, pattern: &str) -> Self {
        self.step.fallback = Some(FallbackConfig {
            trigger_code: 1,
            default_run,
            search_dir: search_dir.to_string(),
            pattern: pattern.to_string(),
            link: None,
        });
        self
    }

    /// Set the fallback link location. Call after `fallback`.
    pub fn fallback_link(mut self, link: &str) -> Self {
        if let Some(fb) = self.step.fallback.as_mut() {
            fb.link = Some(link.to_string());
        }
        self
    }

    /// Set the fallback trigger code. Call after `fallback`.
    pub fn trigger_code(mut self, code: i32) -> Self {
        if let Some(fb) = self.step.fallback.as_mut() {
            fb.trigger_code = code;
        }
        self
    }

    pub fn build(self) -> StepConfig {
        self.step
    }
}

/// Builder for `RunConfig`.
pub struct RunConfigBuilder {
    run: RunConfig,
}

impl RunConfigBuilder {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run: RunConfig {
                run_id,
                tel_id: None,
                prod_id: None,
                priority: None,
                inputs: BTreeMap::new(),
            },
        }
    }

    pub fn input(mut self, name: &str, path: &str) -> Self {
        self.run.inputs.insert(name.to_string(), path.to_string());
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.run.priority = Some(priority);
        self
    }

    pub fn tel_id(mut self, tel_id: &str) -> Self {
        self.run.tel_id = Some(tel_id.to_string());
        self
    }

    pub fn build(self) -> RunConfig {
        self.run
    }
}
