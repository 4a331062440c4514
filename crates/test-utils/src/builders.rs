#![allow(dead_code)]

use std::path::PathBuf;

use taskpipe::config::{validate_config, PipelineConfig, StageConfig};

/// Builder for `PipelineConfig` to simplify test setup.
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.config.config.name = name.to_string();
        self
    }

    pub fn with_output(mut self, output: &str) -> Self {
        self.config.config.output = output.to_string();
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.config.config.chunk_size = chunk_size;
        self
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.config.log_dir = Some(dir.into());
        self
    }

    pub fn with_default_dir(mut self, dir: &str) -> Self {
        self.config.default.dir = Some(dir.to_string());
        self
    }

    pub fn with_default_env(mut self, key: &str, value: &str) -> Self {
        self.config.default.env.set(key, value);
        self
    }

    pub fn with_default_variable(mut self, key: &str, value: &str) -> Self {
        self.config.default.variables.set(key, value);
        self
    }

    pub fn with_stage(mut self, name: &str, stage: StageConfig) -> Self {
        self.config.stage.insert(name.to_string(), stage);
        self
    }

    /// Build and validate; panics on an invalid pipeline.
    pub fn build(self) -> PipelineConfig {
        validate_config(&self.config).expect("Failed to build valid pipeline from builder");
        self.config
    }

    /// Build without validation, for tests of the validator itself.
    pub fn build_unchecked(self) -> PipelineConfig {
        self.config
    }
}

impl Default for PipelineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `StageConfig`.
pub struct StageConfigBuilder {
    stage: StageConfig,
}

impl StageConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            stage: StageConfig {
                cmd: cmd.to_string(),
                ..StageConfig::default()
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.stage.after.push(dep.to_string());
        self
    }

    pub fn dir(mut self, dir: &str) -> Self {
        self.stage.dir = Some(dir.to_string());
        self
    }

    pub fn condition(mut self, condition: &str) -> Self {
        self.stage.condition = Some(condition.to_string());
        self
    }

    pub fn allow_failure(mut self, allow: bool) -> Self {
        self.stage.allow_failure = allow;
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.stage.env.set(key, value);
        self
    }

    pub fn variable(mut self, key: &str, value: &str) -> Self {
        self.stage.variables.set(key, value);
        self
    }

    pub fn build(self) -> StageConfig {
        self.stage
    }
}
