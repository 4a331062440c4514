// src/scheduler/graph.rs

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::PipelineConfig;
use crate::errors::{Result, TaskpipeError};
use crate::output::sink::LogSink;
use crate::scheduler::stage::{Stage, StageLog};

/// Order `nodes` so every dependency comes before its dependents.
///
/// `edges` are `(dependency, dependent)` pairs.
pub(crate) fn topological_order<'a>(
    nodes: impl IntoIterator<Item = &'a str>,
    edges: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Result<Vec<String>> {
    // Edge direction: dep -> stage. For `after = ["A"]` on B we add A -> B.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for node in nodes {
        graph.add_node(node);
    }
    for (dep, stage) in edges {
        graph.add_edge(dep, stage, ());
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
        Err(cycle) => Err(TaskpipeError::DagCycle(format!(
            "cycle detected in pipeline involving stage '{}'",
            cycle.node_id()
        ))),
    }
}

/// The stages of one pipeline run and their dependency structure.
///
/// Stages are owned here for the whole run so that final reporting can
/// inspect every outcome. Each stage holds a non-owning reference back to
/// its graph.
#[derive(Debug)]
pub struct ExecutionGraph {
    name: String,
    stages: HashMap<String, Arc<Stage>>,
    /// Stage names in topological order.
    order: Vec<String>,
    dependents: HashMap<String, Vec<String>>,
}

impl ExecutionGraph {
    /// Build a graph, rejecting duplicate names, unknown or self
    /// dependencies, and cycles.
    pub fn new(name: impl Into<String>, stages: Vec<Stage>) -> Result<Arc<Self>> {
        let mut seen = HashSet::new();
        for stage in &stages {
            if !seen.insert(stage.name.as_str()) {
                return Err(TaskpipeError::DuplicateStage(stage.name.clone()));
            }
        }

        for stage in &stages {
            for dep in &stage.depends_on {
                if dep == &stage.name {
                    return Err(TaskpipeError::ConfigError(format!(
                        "stage '{}' cannot depend on itself",
                        stage.name
                    )));
                }
                if !seen.contains(dep.as_str()) {
                    return Err(TaskpipeError::ConfigError(format!(
                        "stage '{}' has unknown dependency '{}'",
                        stage.name, dep
                    )));
                }
            }
        }

        let order = topological_order(
            stages.iter().map(|s| s.name.as_str()),
            stages.iter().flat_map(|s| {
                s.depends_on
                    .iter()
                    .map(move |dep| (dep.as_str(), s.name.as_str()))
            }),
        )?;

        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        for stage in &stages {
            for dep in &stage.depends_on {
                dependents
                    .entry(dep.clone())
                    .or_default()
                    .push(stage.name.clone());
            }
        }

        let name = name.into();
        Ok(Arc::new_cyclic(|weak| {
            let stages = stages
                .into_iter()
                .map(|stage| {
                    stage.attach(weak.clone());
                    (stage.name.clone(), Arc::new(stage))
                })
                .collect();
            Self {
                name,
                stages,
                order,
                dependents,
            }
        }))
    }

    /// Materialize a validated pipeline file.
    ///
    /// `[default]` bindings are merged under each stage's own, and log sinks
    /// are teed into `<log_dir>/<stage>.{stdout,stderr}.log` when
    /// `[config].log_dir` is set. The files are created when a stage starts,
    /// never here.
    pub fn from_config(cfg: &PipelineConfig) -> Result<Arc<Self>> {
        let mut stages = Vec::with_capacity(cfg.stage.len());

        for (name, sc) in cfg.stage.iter() {
            let log = match cfg.config.log_dir.as_ref() {
                Some(dir) => StageLog {
                    stdout: LogSink::to_file(dir.join(format!("{name}.stdout.log"))),
                    stderr: LogSink::to_file(dir.join(format!("{name}.stderr.log"))),
                },
                None => StageLog::default(),
            };

            let mut stage = Stage::new(name.clone(), sc.cmd.clone())
                .with_dir(
                    sc.dir
                        .clone()
                        .or_else(|| cfg.default.dir.clone())
                        .unwrap_or_default(),
                )
                .with_allow_failure(sc.allow_failure)
                .with_env(cfg.default.env.merge(&sc.env))
                .with_variables(cfg.default.variables.merge(&sc.variables))
                .with_log(log);
            if let Some(condition) = sc.condition.as_ref() {
                stage = stage.with_condition(condition.clone());
            }
            for dep in &sc.after {
                stage = stage.after(dep.clone());
            }
            stages.push(stage);
        }

        Self::new(cfg.config.name.clone(), stages)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage(&self, name: &str) -> Option<&Arc<Stage>> {
        self.stages.get(name)
    }

    /// Like [`stage`](Self::stage), as an error when missing.
    pub fn require(&self, name: &str) -> Result<&Arc<Stage>> {
        self.stage(name)
            .ok_or_else(|| TaskpipeError::StageNotFound(name.to_string()))
    }

    /// All stages, dependencies first.
    pub fn stages(&self) -> impl Iterator<Item = &Arc<Stage>> {
        self.order.iter().filter_map(|name| self.stages.get(name))
    }

    /// Direct dependencies of a stage (its `after` list).
    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.stages
            .get(name)
            .map(|s| s.depends_on.as_slice())
            .unwrap_or(&[])
    }

    /// Stages listing `name` in their `after`.
    pub fn dependents_of(&self, name: &str) -> &[String] {
        self.dependents
            .get(name)
            .map(|d| d.as_slice())
            .unwrap_or(&[])
    }

    /// Stages without dependencies.
    pub fn roots(&self) -> Vec<&str> {
        self.stages()
            .filter(|s| s.depends_on.is_empty())
            .map(|s| s.name.as_str())
            .collect()
    }

    /// True once no stage is Waiting or Running.
    pub fn is_done(&self) -> bool {
        self.stages.values().all(|s| s.read_status().is_terminal())
    }
}
