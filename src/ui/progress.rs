//! Foreground build progress

use super::context::UiContext;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Widest toolchain line shown next to the spinner
const MAX_LINE_CHARS: usize = 60;

/// Spinner with elapsed time for `jusim build`.
///
/// Toolchain phase lines (`PackageCompiler: <phase>`) replace the message;
/// other output lines are shown truncated. Plain mode prints phases only.
pub struct BuildProgress {
    bar: Option<ProgressBar>,
}

impl BuildProgress {
    pub fn new(ctx: &UiContext, label: &str) -> Self {
        let bar = if ctx.use_fancy_output() {
            let bar = ProgressBar::new_spinner();
            if let Ok(template) =
                ProgressStyle::with_template("  {spinner:.magenta} Building {prefix}  {msg:.dim}  {elapsed:.dim}")
            {
                bar.set_style(template.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
            }
            bar.set_prefix(label.to_string());
            bar.enable_steady_tick(Duration::from_millis(120));
            Some(bar)
        } else {
            println!("Building {}...", label);
            None
        };
        Self { bar }
    }

    /// Feed one line of toolchain output
    pub fn on_line(&self, line: String) {
        if let Some(phase) = parse_phase_line(&line) {
            match &self.bar {
                Some(bar) => bar.set_message(phase.to_string()),
                None => println!("  {} {}", style("...").dim(), phase),
            }
            return;
        }

        if let Some(bar) = &self.bar {
            let trimmed = line.trim();
            if !trimmed.is_empty() && !is_hint_echo(trimmed) {
                bar.set_message(truncate(trimmed, MAX_LINE_CHARS));
            }
        }
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}

/// `✔ [01m:12s] PackageCompiler: compiling incremental system image` -> phase
fn parse_phase_line(line: &str) -> Option<&str> {
    let (_, phase) = line.split_once("PackageCompiler: ")?;
    let phase = phase.trim();
    (!phase.is_empty()).then_some(phase)
}

/// Replayed usage hints are not worth showing
fn is_hint_echo(line: &str) -> bool {
    line.starts_with("precompile(")
}

fn truncate(line: &str, max_chars: usize) -> String {
    if line.chars().count() <= max_chars {
        return line.to_string();
    }
    let kept: String = line.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}
