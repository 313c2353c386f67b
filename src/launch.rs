//! Launcher arguments and the startup hook script
//!
//! The launcher asks `jusim args` for the runtime flags, then starts the
//! runtime with them: the newest image (when one exists) and the startup
//! hook that calls `jusim start` from inside the session.

use crate::catalog::ImageCatalog;
use crate::error::{JusimError, JusimResult};
use crate::project::ProjectContext;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Startup hook installed as `start.jl`.
///
/// Asks `jusim start` for the capture file and points the runtime's
/// compile tracing at it for the rest of the session.
pub const HOOK_SCRIPT: &str = r#"# Installed by `jusim init`; loaded with -L by the jusim launcher.
let
    jusim = get(ENV, "JUSIM_BIN", "jusim")
    active = Base.active_project()
    project = active === nothing ? `` : `--project $(dirname(active))`
    capture = try
        readchomp(`$jusim $project start --session-pid $(getpid())`)
    catch err
        @debug "jusim start failed" exception = err
        ""
    end
    if !isempty(capture)
        io = open(capture, "a")
        ccall(:jl_dump_compiles, Cvoid, (Ptr{Cvoid},), io.handle)
        atexit() do
            ccall(:jl_dump_compiles, Cvoid, (Ptr{Cvoid},), C_NULL)
            close(io)
        end
    end
end
"#;

/// One launcher argument pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupArg {
    /// `-J <image>`
    LoadImage(PathBuf),
    /// `-L <hook>`
    StartupHook(PathBuf),
}

impl StartupArg {
    fn render(&self) -> [String; 2] {
        match self {
            Self::LoadImage(path) => ["-J".to_string(), path.display().to_string()],
            Self::StartupHook(path) => ["-L".to_string(), path.display().to_string()],
        }
    }
}

/// Computes the runtime arguments for a project
#[derive(Debug, Clone)]
pub struct StartupArgsProvider {
    images_root: PathBuf,
    hook: PathBuf,
}

impl StartupArgsProvider {
    pub fn new(images_root: PathBuf, hook: PathBuf) -> Self {
        Self { images_root, hook }
    }

    /// Image (if any) then hook. Never fails; an unreadable catalog means no image.
    pub fn compute(&self, ctx: Option<&ProjectContext>) -> Vec<StartupArg> {
        let mut args = Vec::with_capacity(2);

        if let Some(ctx) = ctx {
            match ImageCatalog::new(&self.images_root, ctx).latest(None) {
                Some(image) => args.push(StartupArg::LoadImage(image.path)),
                None => debug!("No image for {}", ctx.root.display()),
            }
        }

        args.push(StartupArg::StartupHook(self.hook.clone()));
        args
    }

    /// Flattened argument list, in launch order
    pub fn render(args: &[StartupArg]) -> Vec<String> {
        args.iter().flat_map(StartupArg::render).collect()
    }
}

/// Write the hook script; returns false if it exists and `force` is unset
pub fn install_hook(path: &Path, force: bool) -> JusimResult<bool> {
    if path.exists() && !force {
        debug!("Startup hook already present at {}", path.display());
        return Ok(false);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| JusimError::io(format!("creating {}", parent.display()), e))?;
    }
    fs::write(path, HOOK_SCRIPT)
        .map_err(|e| JusimError::io(format!("writing startup hook {}", path.display()), e))?;

    info!("Installed startup hook at {}", path.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project(dir: &TempDir) -> ProjectContext {
        let root = dir.path().join("project");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("Project.toml"), "").unwrap();
        ProjectContext::open(&root).unwrap()
    }

    #[test]
    fn empty_catalog_yields_hook_only() {
        let dir = TempDir::new().unwrap();
        let ctx = project(&dir);
        let hook = dir.path().join("start.jl");
        let provider = StartupArgsProvider::new(dir.path().join("images"), hook.clone());

        let args = provider.compute(Some(&ctx));
        assert_eq!(args, vec![StartupArg::StartupHook(hook.clone())]);
        assert_eq!(
            StartupArgsProvider::render(&args),
            vec!["-L".to_string(), hook.display().to_string()]
        );
    }

    #[test]
    fn image_comes_before_hook() {
        let dir = TempDir::new().unwrap();
        let ctx = project(&dir);
        let images = dir.path().join("images");
        let catalog = ImageCatalog::new(&images, &ctx);
        let staged = catalog.staging_path().unwrap();
        fs::write(&staged, b"image").unwrap();
        let image = catalog.register(&staged, "abcd", None, &[], "1.10.2").unwrap();

        let hook = dir.path().join("start.jl");
        let provider = StartupArgsProvider::new(images, hook.clone());
        let rendered = StartupArgsProvider::render(&provider.compute(Some(&ctx)));

        assert_eq!(
            rendered,
            vec![
                "-J".to_string(),
                image.path.display().to_string(),
                "-L".to_string(),
                hook.display().to_string(),
            ]
        );
    }

    #[test]
    fn no_project_yields_hook_only() {
        let provider = StartupArgsProvider::new(PathBuf::from("/nonexistent"), PathBuf::from("/h.jl"));
        assert_eq!(
            provider.compute(None),
            vec![StartupArg::StartupHook(PathBuf::from("/h.jl"))]
        );
    }

    #[test]
    fn install_hook_respects_force() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("start.jl");

        assert!(install_hook(&path, false).unwrap());
        fs::write(&path, "# custom").unwrap();
        assert!(!install_hook(&path, false).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "# custom");

        assert!(install_hook(&path, true).unwrap());
        assert!(fs::read_to_string(&path).unwrap().contains("jusim start"));
    }
}
