//! Error types for jusim
//!
//! All modules use `JusimResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for jusim operations
pub type JusimResult<T> = Result<T, JusimError>;

/// All errors that can occur in jusim
#[derive(Error, Debug)]
pub enum JusimError {
    // Project errors
    #[error("No Project.toml found in {0} or any parent directory")]
    ProjectNotFound(PathBuf),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Preference errors
    #[error("Package {0} cannot be both included and excluded")]
    PreferenceConflict(String),

    #[error("Failed to write preferences to {path}: {source}")]
    PreferenceWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Toolchain errors
    #[error("Toolchain executable not found: {0}")]
    ToolchainNotFound(String),

    #[error("Could not determine toolchain version: {0}")]
    ToolchainVersion(String),

    #[error("Image build failed (exit code {code:?}):\n{output}")]
    BuildFailed { code: Option<i32>, output: String },

    #[error("Build produced no image at {0}")]
    BuildOutputMissing(PathBuf),

    // Catalog errors
    #[error("Failed to register image {path}: {source}")]
    Register {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove image {path}: {source}")]
    Prune {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl JusimError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Whether this error came from the image build itself rather than I/O
    pub fn is_build_failure(&self) -> bool {
        matches!(
            self,
            Self::BuildFailed { .. } | Self::BuildOutputMissing(_) | Self::ToolchainNotFound(_)
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ProjectNotFound(_) => Some("Run inside a project or pass --project <dir>"),
            Self::ToolchainNotFound(_) => {
                Some("Install Julia or set toolchain.executable in the config file")
            }
            Self::ToolchainVersion(_) => Some("Set toolchain.version in the config file"),
            Self::BuildFailed { .. } => {
                Some("The previous image is still in use. Check that PackageCompiler is installed")
            }
            Self::PreferenceWrite { .. } => Some("Check permissions of LocalPreferences.toml"),
            _ => None,
        }
    }
}
