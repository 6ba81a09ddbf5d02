//! CLI definition and command handling

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

use commands::{
    CacheCommand, CompletionsCommand, InitCommand, InvalidateCommand, OutdatedCommand,
    PlanCommand, ReportCommand, RunCommand, ShowCommand,
};

/// Cinder - incremental target builds
#[derive(Debug, Parser)]
#[command(name = "cinder")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Working directory
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build every stale target in the plan
    Run(RunCommand),

    /// List targets a run would execute, and why
    Outdated(OutdatedCommand),

    /// Show the execution plan
    Plan(PlanCommand),

    /// Print a target's cached result
    Show(ShowCommand),

    /// Show the last run record
    Report(ReportCommand),

    /// Forget fingerprints and cached results
    Invalidate(InvalidateCommand),

    /// Cache maintenance
    Cache(CacheCommand),

    /// Write a starter plan file
    Init(InitCommand),

    /// Generate shell completions
    Completions(CompletionsCommand),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> anyhow::Result<()> {
        // Change to specified directory if provided
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir)?;
        }

        match self.command {
            Commands::Run(ref cmd) => cmd.execute(&self),
            Commands::Outdated(ref cmd) => cmd.execute(&self),
            Commands::Plan(ref cmd) => cmd.execute(&self),
            Commands::Show(ref cmd) => cmd.execute(&self),
            Commands::Report(ref cmd) => cmd.execute(&self),
            Commands::Invalidate(ref cmd) => cmd.execute(&self),
            Commands::Cache(ref cmd) => cmd.execute(&self),
            Commands::Init(ref cmd) => cmd.execute(&self),
            Commands::Completions(ref cmd) => cmd.execute(&self),
        }
    }

    /// Whether human-readable output should be printed
    pub fn text_output(&self) -> bool {
        !self.quiet && self.format == OutputFormat::Text
    }
}
