// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::config::model::PipelineConfig;
use crate::config::validate::validate_config;
use crate::errors::Result;

/// Load a pipeline file from a given path.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<PipelineConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading pipeline file at {:?}", path))?;

    let config = load_from_str(&contents)
        .with_context(|| format!("parsing TOML pipeline from {:?}", path))?;

    Ok(config)
}

/// Parse a pipeline from TOML text.
pub fn load_from_str(contents: &str) -> std::result::Result<PipelineConfig, toml::de::Error> {
    toml::from_str(contents)
}

/// Load a pipeline file and run validation.
///
/// This is the entry point for the rest of the application:
/// - reads TOML,
/// - applies defaults (handled by `serde` + `Default` impls),
/// - checks stages, dependencies, cycles and `[config]` values.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<PipelineConfig> {
    let config = load_from_path(&path)?;
    validate_config(&config)?;
    Ok(config)
}

/// `Taskpipe.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Taskpipe.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sections_with_defaults() {
        let cfg = load_from_str(
            r#"
            [stage.a]
            cmd = "echo a"

            [stage.b]
            cmd = "echo b"
            after = ["a"]
            allow_failure = true
            env = { MODE = "ci" }
            "#,
        )
        .unwrap();

        assert_eq!(cfg.config.name, "pipeline");
        assert_eq!(cfg.config.output, "raw");
        assert_eq!(cfg.config.chunk_size, 1024);
        assert!(cfg.config.log_dir.is_none());
        assert!(cfg.default.dir.is_none());

        let b = &cfg.stage["b"];
        assert_eq!(b.after, vec!["a".to_string()]);
        assert!(b.allow_failure);
        assert_eq!(b.env.get("MODE"), Some("ci"));
        assert!(!cfg.stage["a"].allow_failure);
    }

    #[test]
    fn missing_cmd_is_a_parse_error() {
        assert!(load_from_str("[stage.a]\nafter = []\n").is_err());
    }

    #[test]
    fn default_path_is_in_working_directory() {
        assert_eq!(default_config_path(), PathBuf::from("Taskpipe.toml"));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = load_from_path("/definitely/not/here/Taskpipe.toml").unwrap_err();
        assert!(err.to_string().contains("reading pipeline file"));
    }
}
