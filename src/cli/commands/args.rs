//! Args command - runtime arguments for the launcher

use super::Invocation;
use crate::error::JusimResult;
use crate::launch::StartupArgsProvider;
use tracing::debug;

/// Execute the args command. Never fails: without a project only the hook is printed.
pub async fn execute(inv: &Invocation) -> JusimResult<()> {
    let ctx = match inv.project() {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            debug!("No project: {}", e);
            None
        }
    };

    let provider = StartupArgsProvider::new(
        inv.paths.images_root.clone(),
        inv.paths.startup_hook.clone(),
    );
    let args = StartupArgsProvider::render(&provider.compute(ctx.as_ref()));
    println!("{}", args.join(" "));
    Ok(())
}
