//! Remove command - never include a package

use super::Invocation;
use crate::cli::PackageArgs;
use crate::error::{JusimError, JusimResult};
use crate::ui::{self, UiContext};

/// Execute the remove command
pub async fn execute(args: PackageArgs, inv: &Invocation) -> JusimResult<()> {
    let ctx = UiContext::detect();
    let name = args.package.trim();
    if name.is_empty() {
        return Err(JusimError::User("package name must not be empty".to_string()));
    }

    let orchestrator = inv.orchestrator()?;
    let was_included = orchestrator.packages().contains(name);
    orchestrator.preferences().remove(name)?;

    if was_included {
        ui::step_ok(&ctx, &format!("{} will be left out of the image", name));
        ui::remark(&ctx, "The image is rebuilt at the next session start, or run `jusim build`");
    } else {
        ui::step_info(&ctx, &format!("{} was not in the image; it stays excluded", name));
    }
    Ok(())
}
