//! Latest command - newest image path

use super::Invocation;
use crate::catalog::ImageCatalog;
use crate::error::JusimResult;
use console::style;

/// Execute the latest command
pub async fn execute(inv: &Invocation) -> JusimResult<()> {
    let ctx = inv.project()?;
    let catalog = ImageCatalog::new(&inv.paths.images_root, &ctx);

    match catalog.latest(None) {
        Some(image) => println!("{}", image.path.display()),
        None => eprintln!(
            "{} No image built for {} yet",
            style("[INFO]").cyan(),
            ctx.name()
        ),
    }
    Ok(())
}
