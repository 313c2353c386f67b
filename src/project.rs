//! Project discovery and identity
//!
//! A project is a directory holding a `Project.toml`. Its identity is a
//! hash of the canonical root path, so two checkouts of the same project
//! never share images or preferences.

use crate::error::{JusimError, JusimResult};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Project file names in lookup priority order
const PROJECT_FILES: &[&str] = &["JuliaProject.toml", "Project.toml"];

/// Manifest file names in lookup priority order
const MANIFEST_FILES: &[&str] = &["JuliaManifest.toml", "Manifest.toml"];

/// Identity of the active project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectContext {
    /// Project root directory (canonical when possible)
    pub root: PathBuf,
    /// Path to the project file
    pub project_file: PathBuf,
    /// Stable project id (first 16 hex chars of SHA256 of the root path)
    pub id: String,
    /// Digest of the project and manifest files at open time
    pub manifest_digest: String,
}

impl ProjectContext {
    /// Find the nearest project at or above `start`
    pub fn discover(start: &Path) -> JusimResult<Self> {
        let start = start.canonicalize().unwrap_or_else(|_| start.to_path_buf());

        for dir in start.ancestors() {
            if Self::find_project_file(dir).is_some() {
                debug!("Found project at {}", dir.display());
                return Self::open(dir);
            }
        }

        Err(JusimError::ProjectNotFound(start))
    }

    /// Open the project rooted exactly at `root`
    pub fn open(root: &Path) -> JusimResult<Self> {
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let project_file = Self::find_project_file(&root)
            .ok_or_else(|| JusimError::ProjectNotFound(root.clone()))?;

        let id = project_id(&root);
        let manifest_digest = digest_files(&project_file, find_first(&root, MANIFEST_FILES).as_deref())?;

        Ok(Self {
            root,
            project_file,
            id,
            manifest_digest,
        })
    }

    fn find_project_file(dir: &Path) -> Option<PathBuf> {
        find_first(dir, PROJECT_FILES)
    }

    /// Path to the resolved manifest, if the project has been instantiated
    pub fn manifest_file(&self) -> Option<PathBuf> {
        find_first(&self.root, MANIFEST_FILES)
    }

    /// Preference document stored beside the project file
    pub fn preferences_file(&self) -> PathBuf {
        let is_julia_prefixed = self
            .project_file
            .file_name()
            .is_some_and(|name| name == "JuliaProject.toml");
        if is_julia_prefixed {
            self.root.join("JuliaLocalPreferences.toml")
        } else {
            self.root.join("LocalPreferences.toml")
        }
    }

    /// Short display name (directory name)
    pub fn name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.root.display().to_string())
    }
}

fn find_first(dir: &Path, names: &[&str]) -> Option<PathBuf> {
    names
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Derive the project id from its root path
fn project_id(root: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(root.to_string_lossy().as_bytes());
    let result = hasher.finalize();

    // 8 bytes keeps file names short while staying collision-free in practice
    hex::encode(&result[..8])
}

/// Hash the project file and (optional) manifest together
fn digest_files(project_file: &Path, manifest: Option<&Path>) -> JusimResult<String> {
    let mut hasher = Sha256::new();

    for (tag, path) in [("project", Some(project_file)), ("manifest", manifest)] {
        hasher.update(tag.as_bytes());
        match path {
            Some(path) => {
                let contents = fs::read(path).map_err(|e| {
                    JusimError::io(format!("reading {}", path.display()), e)
                })?;
                hasher.update((contents.len() as u64).to_le_bytes());
                hasher.update(&contents);
            }
            None => hasher.update(u64::MAX.to_le_bytes()),
        }
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project(dir: &Path) {
        fs::write(dir.join("Project.toml"), "[deps]\nExample = \"7876af07\"\n").unwrap();
    }

    #[test]
    fn discover_walks_upwards() {
        let dir = TempDir::new().unwrap();
        project(dir.path());
        let nested = dir.path().join("src").join("deep");
        fs::create_dir_all(&nested).unwrap();

        let ctx = ProjectContext::discover(&nested).unwrap();
        assert_eq!(ctx.root, dir.path().canonicalize().unwrap());
        assert_eq!(ctx.id.len(), 16);
    }

    #[test]
    fn discover_without_project_fails() {
        let dir = TempDir::new().unwrap();
        let err = ProjectContext::open(dir.path()).unwrap_err();
        assert!(matches!(err, JusimError::ProjectNotFound(_)));
    }

    #[test]
    fn id_is_stable_and_path_scoped() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        project(a.path());
        project(b.path());

        let first = ProjectContext::open(a.path()).unwrap();
        let again = ProjectContext::open(a.path()).unwrap();
        let other = ProjectContext::open(b.path()).unwrap();

        assert_eq!(first.id, again.id);
        assert_ne!(first.id, other.id);
        // Same file contents hash identically regardless of location
        assert_eq!(first.manifest_digest, other.manifest_digest);
    }

    #[test]
    fn manifest_changes_digest() {
        let dir = TempDir::new().unwrap();
        project(dir.path());
        let before = ProjectContext::open(dir.path()).unwrap();

        fs::write(dir.path().join("Manifest.toml"), "julia_version = \"1.10.0\"\n").unwrap();
        let after = ProjectContext::open(dir.path()).unwrap();

        assert_ne!(before.manifest_digest, after.manifest_digest);
        assert!(after.manifest_file().is_some());
    }

    #[test]
    fn preferences_sit_beside_project_file() {
        let dir = TempDir::new().unwrap();
        project(dir.path());
        let ctx = ProjectContext::open(dir.path()).unwrap();
        assert_eq!(ctx.preferences_file(), ctx.root.join("LocalPreferences.toml"));

        let other = TempDir::new().unwrap();
        fs::write(other.path().join("JuliaProject.toml"), "").unwrap();
        let ctx = ProjectContext::open(other.path()).unwrap();
        assert_eq!(
            ctx.preferences_file(),
            ctx.root.join("JuliaLocalPreferences.toml")
        );
    }
}
