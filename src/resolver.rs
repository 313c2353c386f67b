//! Default package set resolution
//!
//! The package manager owns dependency resolution; jusim only reads what it
//! already recorded. Direct dependencies from `Project.toml` form the default
//! set, and everything recorded in the manifest is a selectable candidate.

use crate::project::ProjectContext;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Source of a project's default and candidate packages
pub trait DependencyResolver: Send + Sync {
    /// Packages included when the user has no overrides
    fn default_packages(&self, ctx: &ProjectContext) -> BTreeSet<String>;

    /// Packages the user may choose from
    fn candidates(&self, ctx: &ProjectContext) -> BTreeSet<String>;
}

/// Resolver reading the project and manifest TOML files
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestResolver;

impl DependencyResolver for ManifestResolver {
    fn default_packages(&self, ctx: &ProjectContext) -> BTreeSet<String> {
        read_table(&ctx.project_file)
            .and_then(|doc| doc.get("deps").and_then(|d| d.as_table()).cloned())
            .map(|deps| deps.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn candidates(&self, ctx: &ProjectContext) -> BTreeSet<String> {
        let mut names = self.default_packages(ctx);

        // Manifest format v2 keeps entries under [[deps.Name]]
        if let Some(manifest) = ctx.manifest_file() {
            if let Some(deps) = read_table(&manifest)
                .and_then(|doc| doc.get("deps").and_then(|d| d.as_table()).cloned())
            {
                names.extend(deps.keys().cloned());
            }
        }

        names
    }
}

/// Read a TOML document, degrading to `None` with a warning
fn read_table(path: &Path) -> Option<toml::Table> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Cannot read {}: {}", path.display(), e);
            return None;
        }
    };

    match content.parse::<toml::Table>() {
        Ok(table) => Some(table),
        Err(e) => {
            warn!("Ignoring malformed {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_are_direct_deps() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("Project.toml"),
            "name = \"Demo\"\n[deps]\nA = \"uuid-a\"\nB = \"uuid-b\"\n[compat]\njulia = \"1.10\"\n",
        )
        .unwrap();
        let ctx = ProjectContext::open(dir.path()).unwrap();

        assert_eq!(ManifestResolver.default_packages(&ctx), names(&["A", "B"]));
    }

    #[test]
    fn candidates_include_manifest_entries() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Project.toml"), "[deps]\nA = \"uuid-a\"\n").unwrap();
        fs::write(
            dir.path().join("Manifest.toml"),
            "manifest_format = \"2.0\"\n\n[[deps.A]]\nuuid = \"uuid-a\"\n\n[[deps.C]]\nuuid = \"uuid-c\"\n",
        )
        .unwrap();
        let ctx = ProjectContext::open(dir.path()).unwrap();

        assert_eq!(ManifestResolver.candidates(&ctx), names(&["A", "C"]));
    }

    #[test]
    fn malformed_project_degrades_to_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Project.toml"), "[deps\nbroken").unwrap();
        let ctx = ProjectContext::open(dir.path()).unwrap();

        assert!(ManifestResolver.default_packages(&ctx).is_empty());
    }
}
