//! Set-packages command - interactive package selection

use super::Invocation;
use crate::error::JusimResult;
use crate::prefs::{choose, initial_selection};
use crate::ui::{self, UiContext};
use std::collections::BTreeSet;

/// Execute the set-packages command
pub async fn execute(inv: &Invocation) -> JusimResult<()> {
    let ctx = UiContext::detect();
    let orchestrator = inv.orchestrator()?;
    let project = orchestrator.context();

    let candidates = orchestrator.resolver().candidates(project);
    if candidates.is_empty() {
        ui::step_warn_hint(
            &ctx,
            &format!("{} has no dependencies to choose from", project.name()),
            "add packages to the project first",
        );
        return Ok(());
    }

    if !ctx.is_interactive() {
        ui::step_info(&ctx, "Not a terminal; keeping the current package selection");
        return Ok(());
    }

    let store = orchestrator.preferences();
    let current = store.get();
    let defaults = orchestrator.default_packages();
    let initial: Vec<String> = initial_selection(&candidates, &defaults, &current)
        .into_iter()
        .collect();
    let items: Vec<(String, String)> = candidates
        .iter()
        .map(|name| {
            let hint = if defaults.contains(name) { "direct dependency" } else { "" };
            (name.clone(), hint.to_string())
        })
        .collect();

    ui::intro(&ctx, &format!("Image packages for {}", project.name()));
    let picked: BTreeSet<String> = ui::multiselect(&ctx, "Packages to compile in", &items, &initial)
        .await?
        .into_iter()
        .collect();

    let next = choose(&candidates, &current, &picked);
    if next == current {
        ui::outro_success(&ctx, "Selection unchanged");
        return Ok(());
    }

    store.set(&next)?;
    if next.packages_to_include(&defaults) == current.packages_to_include(&defaults) {
        ui::outro_success(&ctx, "Selection saved");
    } else {
        ui::outro_success(
            &ctx,
            &format!("{} package(s) selected; the image will be rebuilt", picked.len()),
        );
    }
    Ok(())
}
