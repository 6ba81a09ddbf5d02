//! Cache management command

use std::path::Path;
use std::time::Duration;

use clap::{Args, Subcommand};
use console::style;
use tracing::info;

use cinder_targets::CacheStats;

use super::Project;
use crate::cli::{Cli, OutputFormat};

/// Cache management
#[derive(Debug, Args)]
pub struct CacheCommand {
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Remove old cached results
    Prune(CachePruneCommand),
    /// Show cache statistics
    Status(CacheStatusCommand),
    /// Delete the whole cache directory
    Clean(CacheCleanCommand),
}

/// Remove old cached results
#[derive(Debug, Args)]
pub struct CachePruneCommand {
    /// Maximum age in days (default: 7)
    #[arg(long, default_value = "7")]
    pub max_age_days: u64,
}

/// Show cache statistics
#[derive(Debug, Args)]
pub struct CacheStatusCommand;

/// Delete the whole cache directory
#[derive(Debug, Args)]
pub struct CacheCleanCommand {
    /// Skip confirmation
    #[arg(short = 'y', long)]
    pub yes: bool,
}

impl CacheCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        match &self.action {
            CacheAction::Prune(cmd) => cmd.execute(cli),
            CacheAction::Status(cmd) => cmd.execute(cli),
            CacheAction::Clean(cmd) => cmd.execute(cli),
        }
    }
}

impl CachePruneCommand {
    fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(max_age_days = self.max_age_days, "executing cache prune");
        let project = Project::load()?;
        let cache = project.open_cache(true)?;
        let max_age = Duration::from_secs(self.max_age_days * 24 * 60 * 60);

        if cli.format == OutputFormat::Text && !cli.quiet {
            println!(
                "{} Pruning cached results older than {} days...",
                style("→").blue(),
                self.max_age_days
            );
        }

        let stats = cache.results().prune(max_age)?;
        cache.flush()?;

        if cli.format == OutputFormat::Json {
            let result = serde_json::json!({
                "total": stats.total,
                "removed": stats.removed,
                "kept": stats.kept,
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else if !cli.quiet {
            println!(
                "  {} Removed {} of {} entries ({} kept)",
                style("✓").green(),
                stats.removed.len(),
                stats.total,
                stats.kept
            );
        }

        Ok(())
    }
}

impl CacheStatusCommand {
    fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!("executing cache status");
        let project = Project::load()?;
        let cache_dir = project.cache_dir();
        let cache = project.open_cache(true)?;

        let stats = cache.results().status()?;
        let fingerprints = cache.fingerprints().names()?.len();
        let on_disk = CacheStats {
            entries: stats.entries,
            total_size: directory_size(&cache_dir),
        };

        if cli.format == OutputFormat::Json {
            let result = serde_json::json!({
                "enabled": project.config.cache.enabled,
                "entries": stats.entries,
                "fingerprints": fingerprints,
                "total_size": stats.total_size,
                "total_size_formatted": stats.formatted_size(),
                "disk_size": on_disk.total_size,
                "cache_dir": cache_dir.display().to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else if !cli.quiet {
            println!("{}", style("Cache Status").bold());
            println!();
            println!("  Location:     {}", style(cache_dir.display()).cyan());
            if !project.config.cache.enabled {
                println!("  Enabled:      {}", style("no").yellow());
            }
            println!("  Results:      {}", stats.entries);
            println!("  Fingerprints: {}", fingerprints);
            println!("  Size:         {}", style(stats.formatted_size()).yellow());
            println!("  On disk:      {}", on_disk.formatted_size());
        }

        Ok(())
    }
}

impl CacheCleanCommand {
    fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(yes = self.yes, "executing cache clean");
        let project = Project::load()?;
        let cache_dir = project.cache_dir();

        if !cache_dir.exists() {
            if !cli.quiet {
                println!("{} Cache directory does not exist.", style("✓").green());
            }
            return Ok(());
        }

        if !self.yes {
            let confirmed = dialoguer::Confirm::new()
                .with_prompt(format!(
                    "Remove all cached results and fingerprints at {}?",
                    cache_dir.display()
                ))
                .default(false)
                .interact()?;

            if !confirmed {
                println!("{}", style("Aborted.").yellow());
                return Ok(());
            }
        }

        std::fs::remove_dir_all(&cache_dir)?;

        if !cli.quiet {
            println!(
                "{} Cache cleared at {}",
                style("✓").green(),
                style(cache_dir.display()).cyan()
            );
        }

        Ok(())
    }
}

/// Bytes used by every file under `dir`
fn directory_size(dir: &Path) -> u64 {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_directory_size() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.entry"), vec![0u8; 100]).unwrap();
        std::fs::create_dir(temp.path().join("nested")).unwrap();
        std::fs::write(temp.path().join("nested/b.entry"), vec![0u8; 28]).unwrap();

        assert_eq!(directory_size(temp.path()), 128);
        assert_eq!(directory_size(&temp.path().join("missing")), 0);
    }
}
