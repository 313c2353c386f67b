//! CLI command implementations

pub mod add;
pub mod args;
pub mod build;
pub mod clean;
pub mod completions;
pub mod config;
pub mod init;
pub mod latest;
pub mod remove;
pub mod set_packages;
pub mod start;
pub mod status;

pub use add::execute as add;
pub use args::execute as args;
pub use build::execute as build;
pub use clean::execute as clean;
pub use completions::execute as completions;
pub use config::execute as config;
pub use init::execute as init;
pub use latest::execute as latest;
pub use remove::execute as remove;
pub use set_packages::execute as set_packages;
pub use start::execute as start;
pub use status::execute as status;

use crate::build::{BuildOrchestrator, WorkerCommand};
use crate::config::{Config, StoragePaths};
use crate::error::{JusimError, JusimResult};
use crate::project::ProjectContext;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Settings shared by every command of one invocation
#[derive(Debug, Clone)]
pub struct Invocation {
    pub config: Config,
    /// Config file in effect (may not exist)
    pub config_path: PathBuf,
    /// Whether the config path was given explicitly (`--config`/`JUSIM_CONFIG`)
    pub explicit_config: bool,
    pub paths: StoragePaths,
    /// `--project`, or `None` for the current directory
    pub project_dir: Option<PathBuf>,
}

impl Invocation {
    /// Nearest project above `--project` or the current directory
    pub fn project(&self) -> JusimResult<ProjectContext> {
        let start = match &self.project_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()
                .map_err(|e| JusimError::io("getting current directory", e))?,
        };
        ProjectContext::discover(&start)
    }

    /// Orchestrator for the active project, launching workers from this executable
    pub fn orchestrator(&self) -> JusimResult<BuildOrchestrator> {
        let ctx = self.project()?;
        debug!("Active project {} ({})", ctx.root.display(), ctx.id);

        let config = self.explicit_config.then_some(self.config_path.as_path());
        let worker = WorkerCommand::current_exe(config)?;
        Ok(BuildOrchestrator::new(ctx, &self.config, &self.paths).with_worker(worker))
    }

    /// Invocation with all state below `root`
    #[cfg(test)]
    pub(crate) fn under(root: &Path, project_dir: Option<PathBuf>) -> Self {
        Self {
            config: Config::default(),
            config_path: root.join("config.toml"),
            explicit_config: false,
            paths: StoragePaths::under(root),
            project_dir,
        }
    }
}
