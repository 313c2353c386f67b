//! Config command - show configuration

use super::Invocation;
use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::JusimResult;

/// Execute the config command
pub async fn execute(args: ConfigArgs, inv: &Invocation) -> JusimResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => {
            let toml = toml::to_string_pretty(&inv.config)?;
            println!("{}", toml);
        }
        Some(ConfigAction::Path) => println!("{}", inv.config_path.display()),
    }
    Ok(())
}
