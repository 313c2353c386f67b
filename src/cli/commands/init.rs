//! Init command - default config and startup hook

use super::Invocation;
use crate::cli::InitArgs;
use crate::config::{Config, ConfigManager};
use crate::error::JusimResult;
use crate::launch;
use crate::ui::{self, UiContext};

/// Execute the init command
pub async fn execute(args: InitArgs, inv: &Invocation) -> JusimResult<()> {
    let ctx = UiContext::detect();
    let manager = ConfigManager::with_path(inv.config_path.clone());

    if manager.path().exists() && !args.force {
        ui::step_warn_hint(
            &ctx,
            &format!("Config already exists at {}", manager.path().display()),
            "use --force to overwrite",
        );
    } else {
        manager.save(&Config::default()).await?;
        ui::step_ok_detail(&ctx, "Wrote default config", &manager.path().display().to_string());
    }

    let hook = &inv.paths.startup_hook;
    if launch::install_hook(hook, args.force)? {
        ui::step_ok_detail(&ctx, "Installed startup hook", &hook.display().to_string());
    } else {
        ui::step_info(&ctx, &format!("Startup hook already present at {}", hook.display()));
    }

    ui::remark(&ctx, "Launch the runtime with `julia $(jusim args)` or the bundled launcher script");
    Ok(())
}
