//! Configuration schema for jusim
//!
//! Configuration is stored at `~/.config/jusim/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Julia snippet run by the default toolchain arguments.
///
/// Receives the output path, a comma-separated package list and the
/// precompile statements file as `ARGS`.
pub const DEFAULT_BUILD_SCRIPT: &str = r#"using PackageCompiler
out, pkgs, hints = ARGS
packages = Symbol.(filter(!isempty, split(pkgs, ",")))
kwargs = isfile(hints) && filesize(hints) > 0 ? (; precompile_statements_file = hints) : (;)
create_sysimage(packages; sysimage_path = out, kwargs...)"#;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Image compiler settings
    pub toolchain: ToolchainConfig,

    /// Rebuild policy
    pub build: BuildConfig,

    /// Retention policy for old images
    pub retention: RetentionConfig,

    /// Storage locations
    pub storage: StorageConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Record build and prune events in the build log
    pub build_log: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            build_log: true,
        }
    }
}

/// Toolchain used to compile images
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Runtime executable (also used for `--version`)
    pub executable: String,

    /// Fixed toolchain version; detected from the executable when unset
    pub version: Option<String>,

    /// Arguments passed to the executable when building.
    ///
    /// Placeholders: `{project}`, `{output}`, `{packages}`, `{hints}`.
    pub args: Vec<String>,

    /// Script loaded at session start (`-L`)
    pub startup_hook: Option<PathBuf>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            executable: "julia".to_string(),
            version: None,
            args: vec![
                "--project={project}".to_string(),
                "--startup-file=no".to_string(),
                "--quiet".to_string(),
                "-e".to_string(),
                DEFAULT_BUILD_SCRIPT.to_string(),
                "{output}".to_string(),
                "{packages}".to_string(),
                "{hints}".to_string(),
            ],
            startup_hook: None,
        }
    }
}

/// Rebuild policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Submit a background build from `start` when the packages, manifest or
    /// toolchain changed. New usage hints alone wait for `jusim build`.
    pub auto_rebuild: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self { auto_rebuild: true }
    }
}

/// Retention policy for `clean` and post-build housekeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Number of newest images to keep per project (minimum 1)
    pub keep: u32,

    /// Also keep images younger than N days (0 = disabled)
    pub max_age_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            keep: 1,
            max_age_days: 0,
        }
    }
}

/// Storage locations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for images (one subdirectory per project)
    pub images_dir: Option<PathBuf>,
}
