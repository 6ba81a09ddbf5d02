//! CLI commands

mod cache;
mod completions;
mod init;
mod invalidate;
mod outdated;
mod plan;
mod report;
mod run;
mod show;

pub use cache::CacheCommand;
pub use completions::CompletionsCommand;
pub use init::InitCommand;
pub use invalidate::InvalidateCommand;
pub use outdated::OutdatedCommand;
pub use plan::PlanCommand;
pub use report::ReportCommand;
pub use run::RunCommand;
pub use show::ShowCommand;

use std::path::{Path, PathBuf};

use tracing::debug;

use cinder_core::config::{load_config_or_default, plan_root, Config};
use cinder_targets::{build_graph, BuildCache, CommandRegistry, GraphError, TargetGraph};

/// The plan found from the working directory, with its graph
pub(crate) struct Project {
    pub config: Config,
    pub config_path: Option<PathBuf>,
    /// Directory relative plan paths resolve against
    pub root: PathBuf,
    pub graph: TargetGraph,
}

impl Project {
    /// Locate and load the plan; defaults apply when there is none
    pub fn load() -> anyhow::Result<Self> {
        let cwd = std::env::current_dir()?;
        Self::load_from(&cwd)
    }

    pub fn load_from(dir: &Path) -> anyhow::Result<Self> {
        let (config, config_path) = load_config_or_default(dir)?;
        let root = plan_root(config_path.as_deref(), dir);
        let graph = build_graph(&config, &CommandRegistry::new())?;
        debug!(root = %root.display(), targets = graph.len(), "project loaded");

        Ok(Self {
            config,
            config_path,
            root,
            graph,
        })
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.config.cache_dir(&self.root)
    }

    /// The persistent cache, or a throwaway in-memory one when disabled
    pub fn open_cache(&self, use_cache: bool) -> anyhow::Result<BuildCache> {
        if use_cache && self.config.cache.enabled {
            Ok(BuildCache::open(&self.cache_dir())?)
        } else {
            Ok(BuildCache::in_memory())
        }
    }

    /// Fail unless every name is a declared target
    pub fn require_targets<'a>(
        &self,
        names: impl IntoIterator<Item = &'a String>,
    ) -> anyhow::Result<()> {
        for name in names {
            if !self.graph.contains(name) {
                return Err(GraphError::UnknownTarget(name.clone()).into());
            }
        }
        Ok(())
    }
}
