// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskpipeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("unknown decorator \"{0}\" requested (expected raw, prefixed or cockpit)")]
    UnknownOutputFormat(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Stage not found: {0}")]
    StageNotFound(String),

    #[error("Duplicate stage name: {0}")]
    DuplicateStage(String),

    #[error("Cycle detected in pipeline: {0}")]
    DagCycle(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskpipeError>;
