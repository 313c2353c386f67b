//! Completions command - shell completion scripts

use crate::cli::{Cli, CompletionsArgs};
use crate::error::JusimResult;
use clap::CommandFactory;

/// Execute the completions command
pub async fn execute(args: CompletionsArgs) -> JusimResult<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(args.shell, &mut cmd, name, &mut std::io::stdout());
    Ok(())
}
