//! Show command: print a target's cached result

use clap::Args;
use console::style;
use tracing::info;

use super::Project;
use crate::cli::output;
use crate::cli::{Cli, OutputFormat};

/// Print a target's cached result
#[derive(Debug, Args)]
pub struct ShowCommand {
    /// Target name
    pub target: String,
}

impl ShowCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(target_name = %self.target, "executing show command");
        let project = Project::load()?;
        project.require_targets([&self.target])?;

        let cache = project.open_cache(true)?;
        let entry = cache.results().get(&self.target)?.ok_or_else(|| {
            anyhow::anyhow!(
                "No cached result for '{}'. Run `cinder run` first.",
                self.target
            )
        })?;
        let fingerprint = cache.fingerprints().get(&self.target)?;

        if cli.format == OutputFormat::Json {
            let result = serde_json::json!({
                "entry": entry,
                "fingerprint": fingerprint,
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
            return Ok(());
        }

        if cli.verbose {
            println!("{}", output::header(&self.target));
            println!("{}", output::key_value("Built", &entry.created_at));
            println!(
                "{}",
                output::key_value("Took", &output::duration(entry.duration()).to_string())
            );
            println!("{}", output::key_value("Result id", &entry.result_id));
            if let Some(fingerprint) = &fingerprint {
                println!("{}", output::key_value("Code id", &fingerprint.code_id));
                for input in &fingerprint.input_ids {
                    println!("    {}", style(input).dim());
                }
            }
            println!();
        }

        // Strings print verbatim so shell output can be piped
        match &entry.value {
            serde_json::Value::String(s) => print!("{}", s),
            other => println!("{}", serde_json::to_string_pretty(other)?),
        }

        Ok(())
    }
}
