// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::output::DEFAULT_CHUNK_SIZE;
use crate::variables::Variables;

/// Top-level pipeline file as read from TOML.
///
/// ```toml
/// [config]
/// output = "prefixed"
///
/// [default]
/// env = { RUST_LOG = "info" }
///
/// [stage.lint]
/// cmd = "cargo clippy"
///
/// [stage.build]
/// cmd = "cargo build"
/// after = ["lint"]
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PipelineConfig {
    /// Run-wide settings from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// Bindings inherited by every stage, from `[default]`.
    #[serde(default)]
    pub default: DefaultSection,

    /// All stages from `[stage.<name>]`, keyed by stage name.
    #[serde(default)]
    pub stage: BTreeMap<String, StageConfig>,
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Pipeline name used in logs.
    #[serde(default = "default_name")]
    pub name: String,

    /// Output mode tag: `"raw"` (default), `"prefixed"` or `"cockpit"`.
    ///
    /// Kept as a string so an unknown tag is reported by validation with the
    /// offending value.
    #[serde(default = "default_output")]
    pub output: String,

    /// Maximum bytes per read from a stage's stdout or stderr.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Directory for per-stage `<name>.stdout.log` / `<name>.stderr.log`.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_name() -> String {
    "pipeline".to_string()
}

fn default_output() -> String {
    "raw".to_string()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            name: default_name(),
            output: default_output(),
            chunk_size: default_chunk_size(),
            log_dir: None,
        }
    }
}

/// `[default]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DefaultSection {
    /// Working directory for stages that do not set their own.
    #[serde(default)]
    pub dir: Option<String>,

    #[serde(default)]
    pub env: Variables,

    #[serde(default)]
    pub variables: Variables,
}

/// `[stage.<name>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StageConfig {
    /// Shell command to run. `{{ name }}` placeholders are replaced with
    /// the stage's variables.
    pub cmd: String,

    /// This stage waits for every stage listed here.
    #[serde(default)]
    pub after: Vec<String>,

    /// Working directory; falls back to `default.dir`.
    #[serde(default)]
    pub dir: Option<String>,

    /// Shell command deciding whether the stage runs (exit 0 = run).
    #[serde(default)]
    pub condition: Option<String>,

    /// If true, a failure of this stage does not stop its dependents.
    #[serde(default)]
    pub allow_failure: bool,

    /// Environment entries layered over `default.env`.
    #[serde(default)]
    pub env: Variables,

    /// Variables layered over `default.variables`.
    #[serde(default)]
    pub variables: Variables,
}
