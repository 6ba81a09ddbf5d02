//! Outdated command

use std::sync::Arc;

use clap::Args;
use console::style;
use tracing::info;

use cinder_targets::reporter::TracingReporter;
use cinder_targets::{Scheduler, SchedulerOptions};

use super::Project;
use crate::cli::output;
use crate::cli::{Cli, OutputFormat};
use crate::exit_codes::{self, ExitStatus};

/// List targets a run would execute, and why
#[derive(Debug, Args)]
pub struct OutdatedCommand {
    /// Exit with status 1 when anything is outdated
    #[arg(long)]
    pub check: bool,
}

impl OutdatedCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(check = self.check, "executing outdated command");
        let project = Project::load()?;
        let cache = project.open_cache(true)?;

        let scheduler = Scheduler::new(
            SchedulerOptions::from_config(&project.config.scheduler, project.root.clone()),
            Arc::new(TracingReporter),
        );
        let outdated = scheduler.outdated(&project.graph, &cache)?;

        match cli.format {
            OutputFormat::Json => {
                let entries: Vec<_> = outdated
                    .iter()
                    .map(|(name, reason)| serde_json::json!({ "name": name, "reason": reason }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&entries)?);
            }
            OutputFormat::Text if !cli.quiet => {
                if outdated.is_empty() {
                    output::success(&format!(
                        "All {} up to date",
                        output::plural(project.graph.len(), "target")
                    ));
                } else {
                    println!(
                        "{}",
                        output::header(&format!(
                            "{} of {} outdated",
                            outdated.len(),
                            output::plural(project.graph.len(), "target")
                        ))
                    );
                    println!();
                    let width = outdated.iter().map(|(n, _)| n.len()).max().unwrap_or(0);
                    for (name, reason) in &outdated {
                        println!(
                            "  {}  {}",
                            output::target_style().apply_to(format!("{:width$}", name)),
                            style(reason).yellow()
                        );
                    }
                }
            }
            OutputFormat::Text => {}
        }

        if self.check && !outdated.is_empty() {
            return Err(ExitStatus::new(
                exit_codes::ERROR,
                format!("{} outdated", output::plural(outdated.len(), "target")),
            )
            .into());
        }

        Ok(())
    }
}
