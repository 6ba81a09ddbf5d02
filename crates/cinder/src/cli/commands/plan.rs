//! Plan command: show the execution plan without running anything

use clap::Args;
use tracing::info;

use super::Project;
use crate::cli::output;
use crate::cli::{Cli, OutputFormat};

/// Show the execution plan
#[derive(Debug, Args)]
pub struct PlanCommand;

impl PlanCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!("executing plan command");
        let project = Project::load()?;
        let graph = &project.graph;

        if cli.format == OutputFormat::Json {
            let waves: Vec<serde_json::Value> = graph
                .waves()?
                .iter()
                .enumerate()
                .map(|(i, wave)| {
                    let targets: Vec<_> = wave
                        .iter()
                        .filter_map(|name| graph.get(name))
                        .map(|t| {
                            serde_json::json!({
                                "name": t.name,
                                "kind": t.command.kind(),
                                "depends_on": t.depends_on,
                                "reads": t.reads,
                                "writes": t.writes,
                                "trigger": t.trigger,
                            })
                        })
                        .collect();
                    serde_json::json!({ "wave": i, "targets": targets })
                })
                .collect();
            let plan = serde_json::json!({
                "order": graph.topological_order()?,
                "waves": waves,
            });
            println!("{}", serde_json::to_string_pretty(&plan)?);
            return Ok(());
        }

        if cli.quiet {
            return Ok(());
        }

        if let Some(path) = &project.config_path {
            let shown = output::path_style().apply_to(path.display()).to_string();
            println!("{}", output::key_value("Plan", &shown));
        } else {
            output::warning("No plan file found; using defaults");
        }
        println!("{}", output::key_value("Targets", &graph.len().to_string()));
        println!();
        print!("{}", graph.execution_plan()?);

        Ok(())
    }
}
