//! Retention of superseded images
//!
//! Pruning never deletes the latest image or the newest image matching the
//! current fingerprint. Staging leftovers belong to whoever holds the build
//! lock, so they are only swept when the lock can be taken.

use crate::build::lock::BuildLock;
use crate::catalog::{ImageCatalog, PruneReport, RetentionPolicy};
use crate::error::JusimResult;
use crate::journal::BuildJournal;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Prunes one project's catalog
#[derive(Debug, Clone)]
pub struct Housekeeper {
    catalog: ImageCatalog,
    journal: BuildJournal,
}

impl Housekeeper {
    pub fn new(catalog: ImageCatalog, journal: BuildJournal) -> Self {
        Self { catalog, journal }
    }

    /// Images that must survive any prune
    pub fn protected(&self, current_fingerprint: Option<&str>) -> Vec<PathBuf> {
        let mut protected: Vec<PathBuf> = self
            .catalog
            .latest(None)
            .into_iter()
            .map(|a| a.path)
            .collect();

        if let Some(current) = current_fingerprint.and_then(|fp| self.catalog.latest(Some(fp))) {
            if !protected.contains(&current.path) {
                protected.push(current.path);
            }
        }
        protected
    }

    /// Delete images the policy does not retain
    pub async fn remove_old(
        &self,
        policy: &RetentionPolicy,
        current_fingerprint: Option<&str>,
    ) -> JusimResult<PruneReport> {
        let protected = self.protected(current_fingerprint);

        let lock = BuildLock::try_acquire(&self.catalog.lock_path(), "prune")?;
        if lock.is_none() {
            debug!("Build running; leaving staging area alone");
        }

        let report = self.catalog.prune(policy, &protected, lock.is_some())?;
        drop(lock);

        if !report.removed.is_empty() || report.swept > 0 {
            let removed: Vec<String> = report
                .removed
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            self.journal
                .log(
                    "prune",
                    &serde_json::json!({
                        "project_id": self.catalog.project_id(),
                        "removed": removed,
                        "kept": report.kept,
                        "swept": report.swept,
                    }),
                )
                .await;
        }

        Ok(report)
    }

    /// Run `remove_old` on a background task; failures are only logged
    pub fn schedule(self, policy: RetentionPolicy, current_fingerprint: Option<String>) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.remove_old(&policy, current_fingerprint.as_deref()).await {
                warn!("Pruning old images failed: {}", e);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::ProjectContext;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        catalog: ImageCatalog,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join("project");
        fs::create_dir_all(&project).unwrap();
        fs::write(project.join("Project.toml"), "").unwrap();
        let ctx = ProjectContext::open(&project).unwrap();
        let catalog = ImageCatalog::new(&dir.path().join("images"), &ctx);
        Fixture { _dir: dir, catalog }
    }

    fn register(catalog: &ImageCatalog, fingerprint: &str) -> crate::catalog::SysimageArtifact {
        let staged = catalog.staging_path().unwrap();
        fs::write(&staged, b"image").unwrap();
        catalog.register(&staged, fingerprint, None, &[], "1.10.2").unwrap()
    }

    #[tokio::test]
    async fn remove_old_keeps_latest() {
        let f = fixture();
        register(&f.catalog, "aaaa");
        register(&f.catalog, "bbbb");
        let newest = register(&f.catalog, "cccc");

        let keeper = Housekeeper::new(f.catalog.clone(), BuildJournal::disabled());
        let report = keeper
            .remove_old(&RetentionPolicy::latest_only(), None)
            .await
            .unwrap();

        assert_eq!(report.removed.len(), 2);
        assert_eq!(f.catalog.latest(None), Some(newest));
    }

    #[tokio::test]
    async fn current_fingerprint_is_protected() {
        let f = fixture();
        let current = register(&f.catalog, "aaaa");
        register(&f.catalog, "bbbb");
        register(&f.catalog, "cccc");

        let keeper = Housekeeper::new(f.catalog.clone(), BuildJournal::disabled());
        keeper
            .remove_old(&RetentionPolicy::latest_only(), Some("aaaa"))
            .await
            .unwrap();

        let left: Vec<String> = f.catalog.scan().into_iter().map(|a| a.fingerprint).collect();
        assert_eq!(left, vec!["cccc".to_string(), "aaaa".to_string()]);
        assert!(current.path.exists());
    }

    #[tokio::test]
    async fn staging_survives_while_build_runs() {
        let f = fixture();
        register(&f.catalog, "aaaa");
        let partial = f.catalog.staging_path().unwrap();
        fs::write(&partial, b"half").unwrap();

        let keeper = Housekeeper::new(f.catalog.clone(), BuildJournal::disabled());

        let lock = BuildLock::try_acquire(&f.catalog.lock_path(), "build")
            .unwrap()
            .unwrap();
        keeper.remove_old(&RetentionPolicy::default(), None).await.unwrap();
        assert!(partial.exists());

        drop(lock);
        keeper.remove_old(&RetentionPolicy::default(), None).await.unwrap();
        assert!(!partial.exists());
    }

    #[tokio::test]
    async fn scheduled_prune_completes() {
        let f = fixture();
        register(&f.catalog, "aaaa");
        let newest = register(&f.catalog, "bbbb");

        Housekeeper::new(f.catalog.clone(), BuildJournal::disabled())
            .schedule(RetentionPolicy::latest_only(), None)
            .await
            .unwrap();

        assert_eq!(f.catalog.scan(), vec![newest]);
    }
}
