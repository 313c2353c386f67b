//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// jusim - automatic per-project runtime images
///
/// Builds precompiled system images for a project in the background and
/// tells the launcher which one to load.
#[derive(Parser, Debug)]
#[command(name = "jusim")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Project directory (defaults to the nearest project above the current directory)
    #[arg(short, long, global = true, env = "JUSIM_PROJECT")]
    pub project: Option<PathBuf>,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "JUSIM_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Session start hook: print the usage capture file and check staleness
    Start(StartArgs),

    /// Build an image for the project if it is stale
    Build(BuildArgs),

    /// Show packages, images and build state for the project
    Status,

    /// Always include a package in the image
    Add(PackageArgs),

    /// Never include a package in the image
    Remove(PackageArgs),

    /// Pick the image packages interactively
    SetPackages,

    /// Remove old images
    Clean(CleanArgs),

    /// Print runtime arguments for the launcher
    Args,

    /// Print the path of the newest image
    Latest,

    /// Write the default config and startup hook
    Init(InitArgs),

    /// Show configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Arguments for the start command
#[derive(Parser, Debug)]
pub struct StartArgs {
    /// Process id of the runtime session (defaults to the parent process)
    #[arg(long)]
    pub session_pid: Option<u32>,

    /// Run the staleness check (spawned detached by `start`)
    #[arg(long, hide = true, conflicts_with = "session_pid")]
    pub check: bool,
}

/// Arguments for the build command
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Submit a detached build and return immediately
    #[arg(short, long)]
    pub background: bool,

    /// Run as a detached background worker
    #[arg(long, hide = true, conflicts_with = "background")]
    pub worker: bool,
}

/// Package name argument for add/remove
#[derive(Parser, Debug)]
pub struct PackageArgs {
    /// Package name
    pub package: String,
}

/// Arguments for the clean command
#[derive(Parser, Debug)]
pub struct CleanArgs {
    /// Number of newest images to keep (minimum 1)
    #[arg(short, long)]
    pub keep: Option<u32>,

    /// Also keep images younger than this many days
    #[arg(short, long)]
    pub days: Option<u32>,

    /// Show what would be removed without removing it
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the init command
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Overwrite existing config and startup hook
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Show config file path
    Path,
}

/// Arguments for the completions command
#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,
}
