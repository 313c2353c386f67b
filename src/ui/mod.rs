//! Terminal output for jusim commands
//!
//! Uses `cliclack` for interactive output and prompts, falling back to plain
//! bracketed lines when stdout is not a terminal or a CI runner is detected.
//!
//! # Example
//!
//! ```rust,ignore
//! use jusim::ui::{self, UiContext};
//!
//! let ctx = UiContext::detect().with_auto_yes(args.yes);
//!
//! ui::intro(&ctx, "Image cleanup");
//! ui::step_ok_detail(&ctx, "Removed old image", "212.4 MiB");
//! let yes = ui::confirm(&ctx, "Remove 3 images?", false).await?;
//! ui::outro_success(&ctx, "Done");
//! ```

mod context;
mod output;
mod progress;
mod prompts;
mod theme;

pub use context::UiContext;
pub use output::{
    intro, key_value, key_value_status, outro_success, outro_warn, remark, section, step_info,
    step_ok, step_ok_detail, step_warn, step_warn_hint,
};
pub use progress::BuildProgress;
pub use prompts::{confirm, multiselect};
pub use theme::{init_theme, JusimTheme};
