//! Configuration management for jusim

pub mod schema;

pub use schema::Config;

use crate::error::{JusimError, JusimResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Environment variable overriding the data and state root
pub const HOME_ENV: &str = "JUSIM_HOME";

/// Resolved on-disk locations used by one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePaths {
    /// One image directory per project
    pub images_root: PathBuf,
    /// One usage-hint directory per project
    pub hints_root: PathBuf,
    /// Session markers
    pub sessions_dir: PathBuf,
    /// Background build logs
    pub logs_dir: PathBuf,
    /// Build journal file
    pub build_log: PathBuf,
    /// Script loaded at session start
    pub startup_hook: PathBuf,
}

impl StoragePaths {
    /// Locations for the given config, honoring `JUSIM_HOME`
    pub fn resolve(config: &Config) -> Self {
        Self {
            images_root: ConfigManager::images_root(config),
            hints_root: ConfigManager::hints_root(),
            sessions_dir: ConfigManager::sessions_dir(),
            logs_dir: ConfigManager::logs_dir(),
            build_log: ConfigManager::build_log_path(),
            startup_hook: ConfigManager::startup_hook_path(config),
        }
    }

    /// Everything below a single root, laid out like `JUSIM_HOME`
    pub fn under(root: &Path) -> Self {
        let state = root.join("state");
        Self {
            images_root: root.join("images"),
            hints_root: root.join("hints"),
            sessions_dir: state.join("sessions"),
            logs_dir: state.join("logs"),
            build_log: state.join("builds.log"),
            startup_hook: root.join("start.jl"),
        }
    }
}

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("jusim")
            .join("config.toml")
    }

    fn home_override() -> Option<PathBuf> {
        std::env::var_os(HOME_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    }

    /// Get the data directory path (images, hints, startup hook)
    pub fn data_dir() -> PathBuf {
        Self::home_override().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("jusim")
        })
    }

    /// Get the state directory path
    pub fn state_dir() -> PathBuf {
        match Self::home_override() {
            Some(home) => home.join("state"),
            None => dirs::state_dir()
                .or_else(dirs::data_local_dir)
                .unwrap_or_else(|| PathBuf::from("."))
                .join("jusim"),
        }
    }

    /// Root directory holding one image directory per project
    pub fn images_root(config: &Config) -> PathBuf {
        config
            .storage
            .images_dir
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("images"))
    }

    /// Root directory holding one usage-hint directory per project
    pub fn hints_root() -> PathBuf {
        Self::data_dir().join("hints")
    }

    /// Path of the script loaded at session start
    pub fn startup_hook_path(config: &Config) -> PathBuf {
        config
            .toolchain
            .startup_hook
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("start.jl"))
    }

    /// Get the sessions directory path
    pub fn sessions_dir() -> PathBuf {
        Self::state_dir().join("sessions")
    }

    /// Get the background build log directory
    pub fn logs_dir() -> PathBuf {
        Self::state_dir().join("logs")
    }

    /// Get the build journal path
    pub fn build_log_path() -> PathBuf {
        Self::state_dir().join("builds.log")
    }

    /// Load configuration, falling back to defaults if missing
    pub async fn load(&self) -> JusimResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> JusimResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| JusimError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| JusimError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> JusimResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            JusimError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> JusimResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| JusimError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Ensure all state directories exist
    pub async fn ensure_state_dirs(paths: &StoragePaths) -> JusimResult<()> {
        let mut dirs = vec![
            paths.images_root.clone(),
            paths.hints_root.clone(),
            paths.sessions_dir.clone(),
            paths.logs_dir.clone(),
        ];
        if let Some(parent) = paths.build_log.parent() {
            dirs.push(parent.to_path_buf());
        }

        for dir in &dirs {
            fs::create_dir_all(dir).await.map_err(|e| {
                JusimError::io(format!("creating directory {}", dir.display()), e)
            })?;
        }

        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
