//! jusim - automatic per-project runtime images
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use jusim::cli::commands::{self, Invocation};
use jusim::cli::{Cli, Commands};
use jusim::config::{Config, ConfigManager, StoragePaths};
use jusim::error::{JusimError, JusimResult};
use jusim::launch;
use jusim::ui;
use std::process::ExitCode;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> JusimResult<()> {
    let cli = Cli::parse();
    ui::init_theme();

    // Completions need neither config nor state
    if let Commands::Completions(args) = cli.command {
        return commands::completions(args).await;
    }

    let explicit_config = cli.config.is_some();
    let manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };

    // Startup paths and init must work even with a broken config file
    let tolerant = matches!(cli.command, Commands::Start(_) | Commands::Args | Commands::Init(_));
    let (config, load_error) = match manager.load().await {
        Ok(config) => (config, None),
        Err(e) if tolerant => (Config::default(), Some(e)),
        Err(e) => return Err(e),
    };

    let worker = match &cli.command {
        Commands::Build(args) => args.worker,
        Commands::Start(args) => args.check,
        _ => false,
    };
    init_logging(cli.verbose, &config, worker);
    if let Some(e) = load_error {
        warn!("Using default configuration: {}", e);
    }

    let paths = StoragePaths::resolve(&config);
    let inv = Invocation {
        config,
        config_path: manager.path().to_path_buf(),
        explicit_config,
        paths,
        project_dir: cli.project,
    };

    if !matches!(cli.command, Commands::Config(_) | Commands::Args) {
        ConfigManager::ensure_state_dirs(&inv.paths).await?;
    }
    if !matches!(cli.command, Commands::Config(_) | Commands::Init(_)) {
        // `args` hands the hook path to the runtime, so it has to exist
        if let Err(e) = launch::install_hook(&inv.paths.startup_hook, false) {
            warn!("Could not install startup hook: {}", e);
        }
    }
    debug!("Storage paths: {:?}", inv.paths);

    match cli.command {
        Commands::Completions(_) => Err(JusimError::Internal("completions handled above".to_string())),
        Commands::Start(args) => commands::start(args, &inv).await,
        Commands::Build(args) => commands::build(args, &inv).await,
        Commands::Status => commands::status(&inv).await,
        Commands::Add(args) => commands::add(args, &inv).await,
        Commands::Remove(args) => commands::remove(args, &inv).await,
        Commands::SetPackages => commands::set_packages(&inv).await,
        Commands::Clean(args) => commands::clean(args, &inv).await,
        Commands::Args => commands::args(&inv).await,
        Commands::Latest => commands::latest(&inv).await,
        Commands::Init(args) => commands::init(args, &inv).await,
        Commands::Config(args) => commands::config(args, &inv).await,
    }
}

/// 0 = warn, 1 = info, 2+ = debug; workers log at info or above with timestamps.
/// Logs go to stderr so `start` and `args` keep stdout clean.
fn init_logging(verbose: u8, config: &Config, worker: bool) {
    let level = match (verbose, worker) {
        (0, false) => "warn",
        (0 | 1, _) => "info",
        _ => "debug",
    };
    let filter = EnvFilter::new(format!("jusim={}", level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if config.general.log_format == "json" {
        builder.json().init();
    } else if worker {
        builder.with_ansi(false).init();
    } else {
        builder.without_time().init();
    }
}
