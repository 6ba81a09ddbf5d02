//! Turning a loaded plan file into a target graph

use tracing::{debug, instrument};

use cinder_core::config::Config;

use crate::command::{CommandError, CommandRegistry};
use crate::graph::{GraphError, TargetGraph};
use crate::target::Target;

/// Errors while building a graph from a plan
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// A target's command definition is unusable
    #[error("Target '{target}': {source}")]
    Command {
        target: String,
        #[source]
        source: CommandError,
    },

    /// The declared targets do not form a valid graph
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Build the target graph declared by `config`, in declaration order
#[instrument(skip_all, fields(targets = config.targets.len()))]
pub fn build_graph(config: &Config, registry: &CommandRegistry) -> Result<TargetGraph, PlanError> {
    let mut graph = TargetGraph::new();

    for declared in &config.targets {
        let command = registry
            .build(&declared.command)
            .map_err(|source| PlanError::Command {
                target: declared.name.clone(),
                source,
            })?;

        let mut target = Target::new(&declared.name, command).with_trigger(declared.trigger);
        for read in &declared.reads {
            target = target.with_read(read);
        }
        target.writes = declared.writes.clone();
        target.depends_on = declared.depends_on.clone();

        graph.add_target(target)?;
    }

    graph.validate()?;
    debug!(targets = graph.len(), "graph built from plan");
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_core::config::{CommandConfig, TargetConfig, Trigger, DEFAULT_CONFIG_TEMPLATE};
    use serde_json::json;

    fn config(targets: Vec<TargetConfig>) -> Config {
        Config {
            targets,
            ..Default::default()
        }
    }

    #[test]
    fn test_build_graph_from_template() {
        let config: Config = serde_yaml::from_str(DEFAULT_CONFIG_TEMPLATE).unwrap();
        let graph = build_graph(&config, &CommandRegistry::new()).unwrap();

        assert_eq!(
            graph.topological_order().unwrap(),
            vec!["raw_data", "prepare", "summary"]
        );
        assert_eq!(graph.get("prepare").unwrap().command.kind(), "shell");
        assert_eq!(graph.get("raw_data").unwrap().reads, vec!["data/churn.csv"]);
    }

    #[test]
    fn test_forward_reference_allowed() {
        let config = config(vec![
            TargetConfig::new("report", CommandConfig::new("collect")).with_depends_on("fit"),
            TargetConfig::new("fit", CommandConfig::shell("echo fit"))
                .with_write("model.bin")
                .with_trigger(Trigger::Always),
        ]);

        let graph = build_graph(&config, &CommandRegistry::new()).unwrap();
        assert_eq!(graph.topological_order().unwrap(), vec!["fit", "report"]);
        assert_eq!(graph.get("fit").unwrap().trigger, Trigger::Always);
        assert_eq!(graph.get("fit").unwrap().writes, vec!["model.bin"]);
    }

    #[test]
    fn test_unknown_kind() {
        let config = config(vec![TargetConfig::new("x", CommandConfig::new("python"))]);

        let err = build_graph(&config, &CommandRegistry::new()).unwrap_err();
        match err {
            PlanError::Command { target, source } => {
                assert_eq!(target, "x");
                assert!(matches!(source, CommandError::UnknownKind(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_definition() {
        // `shell` requires a `run` parameter
        let config = config(vec![TargetConfig::new("x", CommandConfig::new("shell"))]);
        let err = build_graph(&config, &CommandRegistry::new()).unwrap_err();
        assert!(err.to_string().starts_with("Target 'x':"));
    }

    #[test]
    fn test_cycle_and_missing_dependency() {
        let cyclic = config(vec![
            TargetConfig::new("a", CommandConfig::new("collect")).with_depends_on("b"),
            TargetConfig::new("b", CommandConfig::new("collect")).with_depends_on("a"),
        ]);
        assert!(matches!(
            build_graph(&cyclic, &CommandRegistry::new()),
            Err(PlanError::Graph(GraphError::CycleDetected { .. }))
        ));

        let dangling = config(vec![
            TargetConfig::new("a", CommandConfig::new("collect")).with_depends_on("ghost")
        ]);
        assert!(matches!(
            build_graph(&dangling, &CommandRegistry::new()),
            Err(PlanError::Graph(GraphError::UnknownDependency { .. }))
        ));
    }

    #[test]
    fn test_read_command_path_becomes_declared_read() {
        let config = config(vec![TargetConfig::new(
            "raw",
            CommandConfig::new("read").with_param("path", json!("data/churn.csv")),
        )
        .with_read("data/churn.csv")
        .with_read("data/schema.json")]);

        let graph = build_graph(&config, &CommandRegistry::new()).unwrap();
        assert_eq!(
            graph.get("raw").unwrap().reads,
            vec!["data/churn.csv", "data/schema.json"]
        );
    }

    #[test]
    fn test_value_params_flow_into_command() {
        let config = config(vec![TargetConfig::new(
            "epochs",
            CommandConfig::new("value").with_param("value", json!(35)),
        )]);

        let graph = build_graph(&config, &CommandRegistry::new()).unwrap();
        assert_eq!(
            graph.get("epochs").unwrap().command.definition(),
            json!({ "value": 35 })
        );
    }
}
