//! Report command: show the last persisted run record

use clap::Args;
use console::style;
use tracing::info;

use cinder_targets::{RunOutcome, TargetStatus};

use super::Project;
use crate::cli::output;
use crate::cli::{Cli, OutputFormat};

/// Show the last run record
#[derive(Debug, Args)]
pub struct ReportCommand {
    /// Only list targets that failed or were cancelled
    #[arg(long)]
    pub problems: bool,
}

impl ReportCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(problems = self.problems, "executing report command");
        let project = Project::load()?;
        let cache = project.open_cache(true)?;

        let Some(record) = cache.last_run_record()? else {
            if cli.format == OutputFormat::Json {
                println!("null");
            } else if !cli.quiet {
                output::info("No runs recorded yet.");
            }
            return Ok(());
        };

        if cli.format == OutputFormat::Json {
            println!("{}", serde_json::to_string_pretty(&record)?);
            return Ok(());
        }
        if cli.quiet {
            return Ok(());
        }

        let outcome = match record.outcome() {
            RunOutcome::Success => style(record.outcome().to_string()).green().bold(),
            RunOutcome::PartialFailure => style(record.outcome().to_string()).yellow().bold(),
            RunOutcome::Failure => style(record.outcome().to_string()).red().bold(),
            RunOutcome::Cancelled => style(record.outcome().to_string()).yellow(),
        };
        println!("{}", output::header("Last run"));
        println!("{}", output::key_value("Started", &record.started_at));
        println!("{}", output::key_value("Outcome", &outcome.to_string()));
        println!(
            "{}",
            output::key_value("Duration", &output::duration(record.duration()).to_string())
        );
        if record.cancelled {
            println!("{}", output::key_value("Cancelled", "yes"));
        }
        println!();

        let width = record.targets.iter().map(|t| t.name.len()).max().unwrap_or(0);
        for target in &record.targets {
            let problem = matches!(
                target.status,
                TargetStatus::Failed { .. } | TargetStatus::Cancelled
            );
            if self.problems && !problem {
                continue;
            }

            let detail = match (&target.status, &target.reason) {
                (TargetStatus::Failed { cause }, _) => style(cause.to_string()).red().dim(),
                (_, Some(reason)) => style(reason.to_string()).dim(),
                _ => style(String::new()),
            };
            println!(
                "  {} {}  {:10} {:>7}  {}",
                output::status_icon(&target.status),
                output::target_style().apply_to(format!("{:width$}", target.name)),
                target.status.label(),
                format!("{:.1}s", target.duration().as_secs_f64()),
                detail
            );
        }

        Ok(())
    }
}
