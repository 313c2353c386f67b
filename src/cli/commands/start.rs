//! Start command - session hook entry point
//!
//! Called by the startup script inside every runtime session. Prints the
//! usage capture file (or nothing) on stdout and always succeeds. The
//! staleness check runs in a detached `start --check` process, so this
//! returns without waiting on the toolchain.

use super::Invocation;
use crate::cli::StartArgs;
use crate::error::JusimResult;
use crate::session::{check_and_submit, SessionHook};
use std::io::Write;
use tracing::debug;

/// Execute the start command
pub async fn execute(args: StartArgs, inv: &Invocation) -> JusimResult<()> {
    let orchestrator = match inv.orchestrator() {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            debug!("Not starting a session: {}", e);
            return Ok(());
        }
    };

    if args.check {
        check_and_submit(&orchestrator, inv.config.build.auto_rebuild).await;
        return Ok(());
    }

    let session_pid = args.session_pid.unwrap_or_else(parent_pid);
    let hook = SessionHook::new(inv.paths.sessions_dir.clone(), inv.config.build.auto_rebuild);
    let start = hook.init(&orchestrator, session_pid).await;

    if let Some(capture) = &start.capture_file {
        println!("{}", capture.display());
        let _ = std::io::stdout().flush();
    }
    if let Some(check) = &start.check {
        debug!("Staleness check running as pid {}", check.pid);
    }

    Ok(())
}

#[cfg(unix)]
fn parent_pid() -> u32 {
    std::os::unix::process::parent_id()
}

#[cfg(not(unix))]
fn parent_pid() -> u32 {
    std::process::id()
}
