//! Init command

use std::path::{Path, PathBuf};

use clap::Args;
use console::style;
use dialoguer::{Confirm, Select};
use tracing::info;

use cinder_core::config::defaults::{
    DEFAULT_CONFIG_TEMPLATE, DEFAULT_CONFIG_TEMPLATE_TOML, DEFAULT_CONFIG_YAML,
};
use cinder_core::config::{validate_config, Config};

use crate::cli::Cli;

/// Write a starter plan file
#[derive(Debug, Args)]
pub struct InitCommand {
    /// Force overwrite an existing plan
    #[arg(short, long)]
    pub force: bool,

    /// Use defaults without prompting
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Output file path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl InitCommand {
    /// Execute the init command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(force = self.force, yes = self.yes, "executing init command");
        let cwd = std::env::current_dir()?;
        let requested = self
            .output
            .clone()
            .unwrap_or_else(|| cwd.join(DEFAULT_CONFIG_YAML));

        // Choose format from the extension, else ask
        let format = if requested.extension().is_some_and(|e| e == "toml") {
            "toml"
        } else if self.yes || self.output.is_some() {
            "yaml"
        } else {
            let formats = vec!["yaml", "toml"];
            let selection = Select::new()
                .with_prompt("Plan format")
                .items(&formats)
                .default(0)
                .interact()?;
            formats[selection]
        };
        let plan_path = plan_path_for(requested, format);

        if !self.may_write(&plan_path)? {
            println!("{}", style("Aborted.").yellow());
            return Ok(());
        }

        let content = if format == "toml" {
            DEFAULT_CONFIG_TEMPLATE_TOML
        } else {
            DEFAULT_CONFIG_TEMPLATE
        };

        // The template must stay loadable
        let parsed: Config = if format == "toml" {
            toml::from_str(content)?
        } else {
            serde_yaml::from_str(content)?
        };
        validate_config(&parsed)?;

        std::fs::write(&plan_path, content)?;

        if !cli.quiet {
            println!(
                "{} Created plan at {}",
                style("✓").green().bold(),
                style(plan_path.display()).cyan()
            );
            println!();
            println!("Next steps:");
            println!("  1. Edit {} to declare your targets", plan_path.display());
            println!("  2. Run {} to check the order", style("cinder plan").cyan());
            println!("  3. Run {} to build what changed", style("cinder run").cyan());
        }

        Ok(())
    }

    /// Whether `plan_path` may be written, asking before replacing a plan
    fn may_write(&self, plan_path: &Path) -> anyhow::Result<bool> {
        if !plan_path.exists() || self.force {
            return Ok(true);
        }
        if self.yes {
            anyhow::bail!(
                "Plan file already exists at {}. Use --force to overwrite.",
                plan_path.display()
            );
        }

        let overwrite = Confirm::new()
            .with_prompt(format!(
                "Plan file already exists at {}. Overwrite?",
                plan_path.display()
            ))
            .default(false)
            .interact()?;
        Ok(overwrite)
    }
}

/// Final plan path once the format is known
fn plan_path_for(requested: PathBuf, format: &str) -> PathBuf {
    if format == "toml" && requested.extension().is_some_and(|e| e == "yaml") {
        requested.with_extension("toml")
    } else {
        requested
    }
}
