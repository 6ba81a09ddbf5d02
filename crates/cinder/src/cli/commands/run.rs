//! Run command: build every stale target in the plan

use std::sync::Arc;

use clap::Args;
use console::style;
use tracing::{info, warn};

use cinder_targets::reporter::TracingReporter;
use cinder_targets::{
    CommandExecutor, RunOutcome, Scheduler, SchedulerOptions, TargetEvent, TargetReporter,
    TargetStatus,
};

use super::Project;
use crate::cli::output;
use crate::cli::{Cli, OutputFormat};
use crate::exit_codes::{self, ExitStatus};

/// Build every stale target in the plan
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Rebuild a target even if it is up to date (repeatable)
    #[arg(long, value_name = "TARGET")]
    pub force: Vec<String>,

    /// Maximum targets executing at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Stop dispatching new targets after the first failure
    #[arg(long)]
    pub fail_fast: bool,

    /// Ignore and do not update the persistent cache
    #[arg(long)]
    pub no_cache: bool,
}

impl RunCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(force = ?self.force, no_cache = self.no_cache, "executing run command");
        let project = Project::load()?;
        project.require_targets(&self.force)?;

        if project.graph.is_empty() {
            if !cli.quiet {
                output::warning("No targets declared in the plan.");
            }
            return Ok(());
        }

        let cache = project.open_cache(!self.no_cache)?;

        let mut options =
            SchedulerOptions::from_config(&project.config.scheduler, project.root.clone())
                .with_force(self.force.iter().cloned());
        if let Some(concurrency) = self.concurrency {
            options.concurrency = concurrency.max(1);
        }
        if self.fail_fast {
            options.keep_going = false;
        }

        let reporter: Arc<dyn TargetReporter> = if cli.text_output() {
            Arc::new(ConsoleReporter::new(cli.verbose))
        } else {
            Arc::new(TracingReporter)
        };

        let scheduler = Scheduler::new(options, reporter);
        let cancel = scheduler.cancel_handle();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling remaining targets");
                cancel.cancel();
            }
        });

        let record = scheduler
            .run(&project.graph, &cache, Arc::new(CommandExecutor))
            .await?;

        if cli.format == OutputFormat::Json {
            let summary = serde_json::json!({
                "outcome": record.outcome(),
                "executed": record.executed_targets(),
                "skipped": record.skipped_targets(),
                "record": record,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        let failures = record.failures();
        if !failures.is_empty() && cli.text_output() {
            println!();
            println!(
                "  {} {} of {} failed:",
                style("✗").red().bold(),
                failures.len(),
                output::plural(record.targets.len(), "target")
            );
            for failure in &failures {
                println!("    {} {}: {}", style("✗").red(), failure.target, failure.cause);
            }
        }

        if record.cancelled {
            return Err(ExitStatus::new(exit_codes::CANCELLED, "Run cancelled").into());
        }

        match record.outcome() {
            RunOutcome::Success => Ok(()),
            RunOutcome::Cancelled => {
                Err(ExitStatus::new(exit_codes::CANCELLED, "Run cancelled").into())
            }
            RunOutcome::PartialFailure => Err(ExitStatus::new(
                exit_codes::PARTIAL_FAILURE,
                format!("{} failed", output::plural(failures.len(), "target")),
            )
            .into()),
            RunOutcome::Failure => Err(ExitStatus::new(
                exit_codes::ERROR,
                format!("All {} failed", output::plural(failures.len(), "target")),
            )
            .into()),
        }
    }
}

/// Console reporter with live output
struct ConsoleReporter {
    verbose: bool,
}

impl ConsoleReporter {
    fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl TargetReporter for ConsoleReporter {
    fn report(&self, event: &TargetEvent) {
        match event {
            TargetEvent::RunStarted {
                targets,
                concurrency,
            } => {
                println!();
                println!(
                    "{} {}{}",
                    style("→").blue(),
                    output::plural(*targets, "target"),
                    if self.verbose && *concurrency > 1 {
                        format!(" (concurrency {})", concurrency)
                    } else {
                        String::new()
                    }
                );
                println!();
            }
            TargetEvent::Started { name, kind, reason } => {
                println!(
                    "  {} {} {}",
                    style("▸").dim(),
                    output::target_style().apply_to(name),
                    if self.verbose {
                        style(format!("[{}] {}", kind, reason)).dim().to_string()
                    } else {
                        style(format!("({})", reason)).dim().to_string()
                    }
                );
            }
            TargetEvent::Completed { name, duration } => {
                println!(
                    "  {} {} {}",
                    output::status_icon(&TargetStatus::Succeeded),
                    style(name).green(),
                    output::duration(*duration)
                );
            }
            TargetEvent::Skipped { name } => {
                if self.verbose {
                    println!(
                        "  {} {} {}",
                        output::status_icon(&TargetStatus::Skipped),
                        style(name).cyan(),
                        style("(up to date)").dim()
                    );
                }
            }
            TargetEvent::Failed {
                name,
                duration,
                error,
            } => {
                println!(
                    "  {} {} {} {}",
                    style("✗").red(),
                    style(name).red(),
                    output::duration(*duration),
                    style(error).red().dim()
                );
            }
            TargetEvent::Cancelled { name } => {
                println!(
                    "  {} {} {}",
                    output::status_icon(&TargetStatus::Cancelled),
                    style(name).yellow(),
                    style("(cancelled)").dim()
                );
            }
            TargetEvent::AllCompleted {
                total,
                executed,
                skipped,
                failed,
                duration,
            } => {
                println!();
                println!(
                    "  {} {} built, {} up to date, {} failed of {} ({:.1}s)",
                    if *failed == 0 {
                        style("✓").green().bold()
                    } else {
                        style("✗").red().bold()
                    },
                    executed,
                    skipped,
                    failed,
                    total,
                    duration.as_secs_f64()
                );
            }
        }
    }
}
