//! Status command - read-only project report

use super::Invocation;
use crate::catalog::format_bytes;
use crate::error::JusimResult;
use crate::prefs::PreferenceRecord;
use crate::session::SessionRecord;
use crate::ui::{self, UiContext};
use console::style;
use std::collections::BTreeSet;

/// Execute the status command
pub async fn execute(inv: &Invocation) -> JusimResult<()> {
    let ctx = UiContext::detect();
    let orchestrator = inv.orchestrator()?;
    let project = orchestrator.context();

    ui::intro(&ctx, &format!("jusim status: {}", project.name()));

    ui::section(&ctx, "Project");
    ui::key_value(&ctx, "Root", &project.root.display().to_string());
    ui::key_value(&ctx, "Id", &project.id);
    ui::key_value_status(
        &ctx,
        "Manifest",
        if project.manifest_file().is_some() { "present" } else { "missing" },
        project.manifest_file().is_some(),
    );

    ui::section(&ctx, "Packages");
    let defaults = orchestrator.default_packages();
    let overrides = orchestrator.preferences().get();
    let lines = package_lines(&defaults, &overrides);
    if lines.is_empty() {
        ui::remark(&ctx, "No packages; the image only speeds up the base runtime");
    }
    for (marker, name, note) in lines {
        let marker = match marker {
            '+' => style(marker).green(),
            '-' => style(marker).red(),
            _ => style(marker).dim(),
        };
        match note {
            Some(note) => println!("  {} {} {}", marker, name, style(note).dim()),
            None => println!("  {} {}", marker, name),
        }
    }

    ui::section(&ctx, "Image");
    let images = orchestrator.catalog().scan();
    match images.first() {
        Some(latest) => {
            ui::key_value(&ctx, "Latest", &latest.path.display().to_string());
            ui::key_value(
                &ctx,
                "Built",
                &latest.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            );
            if let Some(size) = latest.size_bytes {
                ui::key_value(&ctx, "Size", &format_bytes(size));
            }
            if let Some(version) = &latest.toolchain_version {
                ui::key_value(&ctx, "Toolchain", version);
            }
            ui::key_value(&ctx, "Images on disk", &images.len().to_string());
        }
        None => ui::key_value_status(&ctx, "Latest", "none", false),
    }

    match orchestrator.staleness().await {
        Ok(report) if report.hints_only => {
            ui::key_value_status(&ctx, "State", "stale (new usage hints)", false)
        }
        Ok(report) if report.stale => ui::key_value_status(&ctx, "State", "stale", false),
        Ok(_) => ui::key_value_status(&ctx, "State", "current", true),
        Err(e) => ui::key_value_status(&ctx, "State", &format!("unknown ({})", e), false),
    }

    match orchestrator.running_build() {
        Some(holder) => ui::key_value_status(
            &ctx,
            "Build",
            &format!("{} running (pid {})", holder.purpose, holder.pid),
            false,
        ),
        None if orchestrator.catalog().lock_path().exists() => {
            ui::key_value_status(&ctx, "Build", "idle", true)
        }
        None => ui::key_value_status(&ctx, "Build", "never run", true),
    }

    let sessions = SessionRecord::list_all(&inv.paths.sessions_dir)
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|(_, record)| record.project_id == project.id && record.is_alive())
        .count();
    ui::key_value(&ctx, "Active sessions", &sessions.to_string());

    Ok(())
}

/// One row per known package: `+` added, `-` excluded, ` ` default
fn package_lines(
    defaults: &BTreeSet<String>,
    overrides: &PreferenceRecord,
) -> Vec<(char, String, Option<&'static str>)> {
    let names: BTreeSet<&String> = defaults
        .iter()
        .chain(&overrides.include)
        .chain(&overrides.exclude)
        .collect();

    names
        .into_iter()
        .map(|name| {
            if overrides.exclude.contains(name) {
                ('-', name.clone(), Some("(excluded)"))
            } else if overrides.include.contains(name) && !defaults.contains(name) {
                ('+', name.clone(), Some("(added)"))
            } else {
                (' ', name.clone(), None)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_lines_mark_overrides() {
        let defaults: BTreeSet<String> = ["A", "B"].iter().map(|s| s.to_string()).collect();
        let mut overrides = PreferenceRecord::default();
        overrides.add("C");
        overrides.remove("A");

        let lines = package_lines(&defaults, &overrides);
        assert_eq!(
            lines,
            vec![
                ('-', "A".to_string(), Some("(excluded)")),
                (' ', "B".to_string(), None),
                ('+', "C".to_string(), Some("(added)")),
            ]
        );
    }
}
