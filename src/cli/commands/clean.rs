//! Clean command - remove old images

use super::Invocation;
use crate::catalog::{format_bytes, RetentionPolicy};
use crate::cli::CleanArgs;
use crate::error::JusimResult;
use crate::ui::{self, UiContext};
use chrono::Utc;
use console::style;
use tracing::debug;

/// Execute the clean command
pub async fn execute(args: CleanArgs, inv: &Invocation) -> JusimResult<()> {
    let ctx = UiContext::detect().with_auto_yes(args.yes);
    let policy = policy_for(&args, inv);
    let orchestrator = inv.orchestrator()?;

    let current = match orchestrator.fingerprint().await {
        Ok(fp) => Some(fp),
        Err(e) => {
            debug!("No current fingerprint: {}", e);
            None
        }
    };
    let protected = orchestrator.housekeeper().protected(current.as_deref());
    let candidates = orchestrator.catalog().prune_candidates(&policy, &protected);

    if candidates.is_empty() {
        ui::step_info(&ctx, "No old images to remove");
        return Ok(());
    }

    let total: u64 = candidates.iter().filter_map(|a| a.size_bytes).sum();
    println!("Found {} old image(s):", candidates.len());
    for image in &candidates {
        let age_days = (Utc::now() - image.created_at).num_days();
        println!(
            "  {} {} ({} days old, {})",
            style("•").red(),
            image.file_name(),
            age_days,
            image.size_bytes.map(format_bytes).unwrap_or_else(|| "?".to_string())
        );
    }

    if args.dry_run {
        println!();
        println!("Dry run - {} would be freed.", format_bytes(total));
        return Ok(());
    }

    let message = format!("Remove {} image(s)?", candidates.len());
    if !ui::confirm(&ctx, &message, true).await? {
        ui::step_info(&ctx, "Aborted");
        return Ok(());
    }

    let report = orchestrator.clean(&policy).await?;
    ui::step_ok_detail(
        &ctx,
        &format!("Removed {} image(s), kept {}", report.removed.len(), report.kept),
        &format_bytes(total),
    );
    if report.swept > 0 {
        ui::remark(&ctx, &format!("Swept {} leftover file(s)", report.swept));
    }
    Ok(())
}

/// Command-line overrides on top of the `[retention]` config
fn policy_for(args: &CleanArgs, inv: &Invocation) -> RetentionPolicy {
    RetentionPolicy::new(
        args.keep.unwrap_or(inv.config.retention.keep),
        args.days.unwrap_or(inv.config.retention.max_age_days),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(keep: Option<u32>, days: Option<u32>) -> CleanArgs {
        CleanArgs {
            keep,
            days,
            dry_run: false,
            yes: true,
        }
    }

    #[test]
    fn flags_override_config() {
        let temp = TempDir::new().unwrap();
        let mut inv = Invocation::under(temp.path(), None);
        inv.config.retention.keep = 4;
        inv.config.retention.max_age_days = 10;

        assert_eq!(policy_for(&args(None, None), &inv), RetentionPolicy::new(4, 10));
        assert_eq!(policy_for(&args(Some(2), Some(0)), &inv), RetentionPolicy::new(2, 0));
        assert_eq!(policy_for(&args(Some(0), None), &inv).keep, 1);
    }
}
