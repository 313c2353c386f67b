//! Build command - foreground, background and worker builds

use super::Invocation;
use crate::build::{summarize_failure, BuildMode, BuildOutcome, LockHolder};
use crate::catalog::{format_bytes, SysimageArtifact};
use crate::cli::BuildArgs;
use crate::error::{JusimError, JusimResult};
use crate::ui::{self, BuildProgress, UiContext};
use std::sync::Arc;
use tracing::{error, info};

/// Execute the build command
pub async fn execute(args: BuildArgs, inv: &Invocation) -> JusimResult<()> {
    if args.worker {
        return run_worker(inv).await;
    }

    let ctx = UiContext::detect();
    let orchestrator = inv.orchestrator()?;

    if args.background {
        let outcome = orchestrator.build(BuildMode::Background).await?;
        report(&ctx, &outcome);
        return Ok(());
    }

    let report_before = orchestrator.staleness().await?;
    if let (false, Some(latest)) = (report_before.stale, report_before.latest) {
        report(&ctx, &BuildOutcome::AlreadyCurrent(latest));
        return Ok(());
    }

    let progress = Arc::new(BuildProgress::new(&ctx, &orchestrator.context().name()));
    let sink = Arc::clone(&progress);
    let orchestrator = orchestrator.with_progress(Arc::new(move |line: String| sink.on_line(line)));

    // Dropping the build future kills the toolchain; the partial stays in staging
    let result = tokio::select! {
        result = orchestrator.build(BuildMode::Foreground) => result,
        _ = tokio::signal::ctrl_c() => {
            progress.finish();
            return Err(JusimError::User("Build interrupted".to_string()));
        }
    };
    progress.finish();

    let outcome = result?;
    report(&ctx, &outcome);
    orchestrator.settle().await;
    Ok(())
}

/// Body of a detached `build --worker` process; output goes to its log file
async fn run_worker(inv: &Invocation) -> JusimResult<()> {
    let orchestrator = inv.orchestrator()?;
    info!("Worker {} building {}", std::process::id(), orchestrator.context().root.display());

    let result = orchestrator.build(BuildMode::Foreground).await;
    match &result {
        Ok(BuildOutcome::Built(image)) => info!("Registered {}", image.path.display()),
        Ok(BuildOutcome::AlreadyCurrent(image)) => info!("Already current: {}", image.path.display()),
        Ok(BuildOutcome::InProgress(holder)) => {
            info!("Another build is running: {}", describe_holder(holder.as_ref()))
        }
        Ok(BuildOutcome::Submitted(_)) => {}
        Err(e) => error!("{}", summarize_failure(e)),
    }

    orchestrator.settle().await;
    result.map(|_| ())
}

fn report(ctx: &UiContext, outcome: &BuildOutcome) {
    match outcome {
        BuildOutcome::Built(image) => {
            ui::step_ok_detail(ctx, &format!("Built {}", image.file_name()), &image_detail(image));
        }
        BuildOutcome::AlreadyCurrent(image) => {
            ui::step_info(ctx, &format!("Image is up to date: {}", image.file_name()));
        }
        BuildOutcome::InProgress(holder) => {
            ui::step_warn_hint(
                ctx,
                &format!("A build is already running ({})", describe_holder(holder.as_ref())),
                "try again when it finishes",
            );
        }
        BuildOutcome::Submitted(handle) => {
            ui::step_ok_detail(
                ctx,
                &format!("Background build started (pid {})", handle.pid),
                &handle.log.display().to_string(),
            );
        }
    }
}

fn image_detail(image: &SysimageArtifact) -> String {
    let size = image.size_bytes.map(format_bytes).unwrap_or_else(|| "unknown size".to_string());
    format!("{}, {} package(s)", size, image.packages.len())
}

fn describe_holder(holder: Option<&LockHolder>) -> String {
    match holder {
        Some(holder) => format!(
            "{} by pid {} since {}",
            holder.purpose,
            holder.pid,
            holder.started_at.format("%H:%M:%S")
        ),
        None => "holder unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn holder_description() {
        let holder = LockHolder {
            pid: 77,
            started_at: Utc::now(),
            purpose: "build".to_string(),
        };
        assert!(describe_holder(Some(&holder)).starts_with("build by pid 77 since "));
        assert_eq!(describe_holder(None), "holder unknown");
    }
}
