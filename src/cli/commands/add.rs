//! Add command - always include a package

use super::Invocation;
use crate::cli::PackageArgs;
use crate::error::{JusimError, JusimResult};
use crate::ui::{self, UiContext};

/// Execute the add command
pub async fn execute(args: PackageArgs, inv: &Invocation) -> JusimResult<()> {
    let ctx = UiContext::detect();
    let name = args.package.trim();
    if name.is_empty() {
        return Err(JusimError::User("package name must not be empty".to_string()));
    }

    let orchestrator = inv.orchestrator()?;
    let project = orchestrator.context();
    orchestrator.preferences().add(name)?;

    ui::step_ok(&ctx, &format!("{} will be compiled into the image", name));
    if !orchestrator.resolver().candidates(project).contains(name) {
        ui::step_warn_hint(
            &ctx,
            &format!("{} is not a dependency of {}", name, project.name()),
            "add it to the project or the build will fail",
        );
    }
    ui::remark(&ctx, "The image is rebuilt at the next session start, or run `jusim build`");
    Ok(())
}
