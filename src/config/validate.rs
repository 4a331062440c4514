// src/config/validate.rs

use crate::config::model::PipelineConfig;
use crate::errors::{Result, TaskpipeError};
use crate::scheduler::graph::topological_order;
use crate::types::OutputFormat;

/// Run semantic validation against a loaded pipeline.
///
/// This checks:
/// - there is at least one stage, and no stage has an empty `cmd`
/// - `[config].output` names a known output mode
/// - `[config].chunk_size >= 1`
/// - all `after` dependencies refer to existing stages
/// - the stage graph has no cycles
pub fn validate_config(cfg: &PipelineConfig) -> Result<()> {
    ensure_has_stages(cfg)?;
    validate_global_config(cfg)?;
    validate_stage_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_stages(cfg: &PipelineConfig) -> Result<()> {
    if cfg.stage.is_empty() {
        return Err(TaskpipeError::ConfigError(
            "pipeline must contain at least one [stage.<name>] section".to_string(),
        ));
    }

    for (name, stage) in cfg.stage.iter() {
        if stage.cmd.trim().is_empty() {
            return Err(TaskpipeError::ConfigError(format!(
                "stage '{name}' has an empty `cmd`"
            )));
        }
    }
    Ok(())
}

fn validate_global_config(cfg: &PipelineConfig) -> Result<()> {
    cfg.config.output.parse::<OutputFormat>()?;

    if cfg.config.chunk_size == 0 {
        return Err(TaskpipeError::ConfigError(
            "[config].chunk_size must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn validate_stage_dependencies(cfg: &PipelineConfig) -> Result<()> {
    for (name, stage) in cfg.stage.iter() {
        for dep in stage.after.iter() {
            if dep == name {
                return Err(TaskpipeError::ConfigError(format!(
                    "stage '{name}' cannot depend on itself in `after`"
                )));
            }
            if !cfg.stage.contains_key(dep) {
                return Err(TaskpipeError::ConfigError(format!(
                    "stage '{name}' has unknown dependency '{dep}' in `after`"
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &PipelineConfig) -> Result<()> {
    topological_order(
        cfg.stage.keys().map(String::as_str),
        cfg.stage.iter().flat_map(|(name, stage)| {
            stage
                .after
                .iter()
                .map(move |dep| (dep.as_str(), name.as_str()))
        }),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::load_from_str;

    fn parse(toml: &str) -> PipelineConfig {
        load_from_str(toml).unwrap()
    }

    #[test]
    fn accepts_a_simple_chain() {
        let cfg = parse(
            r#"
            [config]
            output = "prefixed"

            [stage.a]
            cmd = "echo a"

            [stage.b]
            cmd = "echo b"
            after = ["a"]
            "#,
        );
        validate_config(&cfg).unwrap();
    }

    #[test]
    fn rejects_empty_pipeline() {
        let err = validate_config(&PipelineConfig::default()).unwrap_err();
        assert!(err.to_string().contains("at least one"));
    }

    #[test]
    fn rejects_blank_cmd() {
        let cfg = parse("[stage.a]\ncmd = \"  \"\n");
        assert!(matches!(
            validate_config(&cfg),
            Err(TaskpipeError::ConfigError(msg)) if msg.contains("empty `cmd`")
        ));
    }

    #[test]
    fn rejects_unknown_output_mode() {
        let cfg = parse("[config]\noutput = \"bogus\"\n\n[stage.a]\ncmd = \"true\"\n");
        assert!(matches!(
            validate_config(&cfg),
            Err(TaskpipeError::UnknownOutputFormat(tag)) if tag == "bogus"
        ));
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let cfg = parse("[config]\nchunk_size = 0\n\n[stage.a]\ncmd = \"true\"\n");
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn rejects_unknown_and_self_dependencies() {
        let unknown = parse("[stage.a]\ncmd = \"true\"\nafter = [\"zzz\"]\n");
        assert!(validate_config(&unknown)
            .unwrap_err()
            .to_string()
            .contains("unknown dependency 'zzz'"));

        let own = parse("[stage.a]\ncmd = \"true\"\nafter = [\"a\"]\n");
        assert!(validate_config(&own)
            .unwrap_err()
            .to_string()
            .contains("cannot depend on itself"));
    }

    #[test]
    fn rejects_cycles() {
        let cfg = parse(
            r#"
            [stage.a]
            cmd = "true"
            after = ["b"]

            [stage.b]
            cmd = "true"
            after = ["a"]
            "#,
        );
        assert!(matches!(validate_config(&cfg), Err(TaskpipeError::DagCycle(_))));
    }
}
