//! Invalidate command: forget fingerprints and cached results

use clap::Args;
use console::style;
use tracing::info;

use super::Project;
use crate::cli::output;
use crate::cli::{Cli, OutputFormat};

/// Forget fingerprints and cached results so targets rebuild
#[derive(Debug, Args)]
pub struct InvalidateCommand {
    /// Targets to invalidate
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    pub targets: Vec<String>,

    /// Invalidate every cached target
    #[arg(long)]
    pub all: bool,
}

impl InvalidateCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(targets = ?self.targets, all = self.all, "executing invalidate command");
        let project = Project::load()?;
        let cache = project.open_cache(true)?;

        let invalidated = if self.all {
            cache.invalidate_all()?
        } else {
            project.require_targets(&self.targets)?;
            let mut invalidated = Vec::new();
            for name in &self.targets {
                if cache.invalidate(name)? {
                    invalidated.push(name.clone());
                }
            }
            invalidated
        };
        cache.flush()?;

        if cli.format == OutputFormat::Json {
            let result = serde_json::json!({ "invalidated": invalidated });
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else if !cli.quiet {
            if invalidated.is_empty() {
                output::info("Nothing cached to invalidate.");
            } else {
                output::success(&format!(
                    "Invalidated {}",
                    output::plural(invalidated.len(), "target")
                ));
                if cli.verbose {
                    for name in &invalidated {
                        println!("  {} {}", style("-").dim(), name);
                    }
                }
            }
        }

        Ok(())
    }
}
