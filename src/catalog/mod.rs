//! On-disk image catalog
//!
//! Each project owns one directory of immutable images. Builds write into a
//! private `tmp/` staging area on the same filesystem and publish with a
//! single `rename`, so readers only ever see complete images.
//!
//! # Layout
//!
//! | Path | Description |
//! |------|-------------|
//! | `<root>/<project-id>/*.so` | Registered images |
//! | `<root>/<project-id>/*.json` | Sidecar metadata |
//! | `<root>/<project-id>/tmp/` | Staging area for running builds |
//! | `<root>/<project-id>/build.lock` | Cross-process build lock |

pub mod artifact;

pub use artifact::{format_bytes, ArtifactMeta, ArtifactName, SysimageArtifact};

use crate::error::{JusimError, JusimResult};
use crate::project::ProjectContext;
use chrono::{DateTime, SubsecRound, Utc};
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const STAGING_DIR: &str = "tmp";
const LOCK_FILE: &str = "build.lock";

/// How many superseded images survive a prune
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Keep the N newest images (never less than one)
    pub keep: usize,
    /// Also keep images younger than N days
    pub max_age_days: Option<u32>,
}

impl RetentionPolicy {
    /// Keep only the newest image
    pub fn latest_only() -> Self {
        Self {
            keep: 1,
            max_age_days: None,
        }
    }

    /// Build from config values, where zero disables age retention
    pub fn new(keep: u32, max_age_days: u32) -> Self {
        Self {
            keep: (keep as usize).max(1),
            max_age_days: (max_age_days > 0).then_some(max_age_days),
        }
    }

    fn retains(&self, rank: usize, artifact: &SysimageArtifact) -> bool {
        if rank < self.keep.max(1) {
            return true;
        }
        self.max_age_days
            .is_some_and(|days| !artifact.is_older_than_days(days))
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::latest_only()
    }
}

/// Outcome of a prune pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Images deleted
    pub removed: Vec<PathBuf>,
    /// Images still present
    pub kept: usize,
    /// Orphaned sidecars and staging leftovers deleted
    pub swept: usize,
}

/// Catalog of images for one project
#[derive(Debug, Clone)]
pub struct ImageCatalog {
    dir: PathBuf,
    project_id: String,
}

impl ImageCatalog {
    /// Catalog for `ctx` under the images root
    pub fn new(images_root: &Path, ctx: &ProjectContext) -> Self {
        Self {
            dir: images_root.join(&ctx.id),
            project_id: ctx.id.clone(),
        }
    }

    /// Directory holding this project's images
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Owning project id
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Path of the build lock file
    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    fn staging_dir(&self) -> PathBuf {
        self.dir.join(STAGING_DIR)
    }

    /// All registered images, newest first.
    ///
    /// Never fails: unreadable directories mean an empty catalog and odd
    /// entries are skipped with a warning.
    pub fn scan(&self) -> Vec<SysimageArtifact> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Cannot read image directory {}: {}", self.dir.display(), e);
                return Vec::new();
            }
        };

        let mut artifacts = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let file_name = entry.file_name().to_string_lossy().into_owned();
            let is_meta = path
                .extension()
                .is_some_and(|ext| ext == artifact::META_EXTENSION);
            if is_meta || file_name == LOCK_FILE {
                continue;
            }

            let Some(name) = ArtifactName::parse(&file_name) else {
                warn!("Ignoring unexpected file in image directory: {}", file_name);
                continue;
            };

            if name.project_id != self.project_id {
                warn!("Ignoring image of another project: {}", file_name);
                continue;
            }

            let meta = read_meta(&SysimageArtifact::meta_path_for(&path));
            artifacts.push(SysimageArtifact::from_parts(path, name, meta));
        }

        artifacts.sort_by(SysimageArtifact::newest_first);
        artifacts
    }

    /// Newest image, optionally restricted to an exact fingerprint
    pub fn latest(&self, fingerprint: Option<&str>) -> Option<SysimageArtifact> {
        self.scan()
            .into_iter()
            .find(|a| fingerprint.is_none_or(|fp| a.fingerprint == fp))
    }

    /// Fresh private path for a build to write into
    pub fn staging_path(&self) -> JusimResult<PathBuf> {
        let dir = self.staging_dir();
        fs::create_dir_all(&dir)
            .map_err(|e| JusimError::io(format!("creating staging directory {}", dir.display()), e))?;

        Ok(dir.join(format!(
            "{}.partial.{}",
            uuid::Uuid::new_v4().simple(),
            artifact::image_extension()
        )))
    }

    /// Publish a fully written staged image
    pub fn register(
        &self,
        staged: &Path,
        fingerprint: &str,
        base_fingerprint: Option<&str>,
        packages: &[String],
        toolchain_version: &str,
    ) -> JusimResult<SysimageArtifact> {
        let mut created_at = Utc::now();

        // Keep "newest timestamp wins" true even if the clock stepped back
        if let Some(latest) = self.latest(None) {
            if latest.created_at >= created_at {
                created_at = latest.created_at + chrono::Duration::microseconds(1);
            }
        }

        self.publish(staged, fingerprint, base_fingerprint, packages, toolchain_version, created_at)
    }

    fn publish(
        &self,
        staged: &Path,
        fingerprint: &str,
        base_fingerprint: Option<&str>,
        packages: &[String],
        toolchain_version: &str,
        created_at: DateTime<Utc>,
    ) -> JusimResult<SysimageArtifact> {
        match fs::metadata(staged) {
            Ok(meta) if meta.is_file() && meta.len() > 0 => {}
            _ => return Err(JusimError::BuildOutputMissing(staged.to_path_buf())),
        }

        // Names carry microseconds; keep the in-memory value identical
        let created_at = created_at.trunc_subsecs(6);

        let staging = self.staging_dir();
        fs::create_dir_all(&staging).map_err(|e| JusimError::Register {
            path: staging.clone(),
            source: e,
        })?;

        let name = ArtifactName {
            project_id: self.project_id.clone(),
            fingerprint: fingerprint.to_string(),
            created_at,
        };
        let target = self.dir.join(name.file_name());
        let meta_path = SysimageArtifact::meta_path_for(&target);

        let meta = ArtifactMeta {
            fingerprint: fingerprint.to_string(),
            created_at,
            packages: packages.to_vec(),
            toolchain_version: toolchain_version.to_string(),
            base_fingerprint: base_fingerprint.map(str::to_string),
        };

        // Sidecar first: an image is only visible once its metadata exists
        let meta_tmp = staging.join(format!(
            "{}.{}",
            uuid::Uuid::new_v4().simple(),
            artifact::META_EXTENSION
        ));
        let write_meta = serde_json::to_vec_pretty(&meta)
            .map_err(JusimError::from)
            .and_then(|bytes| {
                fs::write(&meta_tmp, bytes)
                    .and_then(|()| fs::rename(&meta_tmp, &meta_path))
                    .map_err(|e| JusimError::Register {
                        path: meta_path.clone(),
                        source: e,
                    })
            });
        if let Err(e) = write_meta {
            let _ = fs::remove_file(&meta_tmp);
            return Err(e);
        }

        if let Err(e) = fs::rename(staged, &target) {
            let _ = fs::remove_file(&meta_path);
            return Err(JusimError::Register {
                path: target,
                source: e,
            });
        }

        info!("Registered image {}", target.display());
        Ok(SysimageArtifact::from_parts(target, name, Some(meta)))
    }

    /// Images a prune with these settings would delete, oldest last
    pub fn prune_candidates(
        &self,
        policy: &RetentionPolicy,
        protected: &[PathBuf],
    ) -> Vec<SysimageArtifact> {
        let protected: HashSet<&Path> = protected.iter().map(PathBuf::as_path).collect();

        self.scan()
            .into_iter()
            .enumerate()
            // rank 0 is the latest image and always survives
            .filter(|(rank, artifact)| {
                *rank > 0
                    && !protected.contains(artifact.path.as_path())
                    && !policy.retains(*rank, artifact)
            })
            .map(|(_, artifact)| artifact)
            .collect()
    }

    /// Delete superseded images.
    ///
    /// The newest image and everything in `protected` always survive. Staging
    /// leftovers are only swept when `sweep_staging` is set, i.e. when the
    /// caller holds the build lock.
    pub fn prune(
        &self,
        policy: &RetentionPolicy,
        protected: &[PathBuf],
        sweep_staging: bool,
    ) -> JusimResult<PruneReport> {
        let doomed = self.prune_candidates(policy, protected);
        let mut report = PruneReport::default();

        for artifact in &doomed {
            debug!("Pruning image {}", artifact.path.display());
            if remove_if_present(&artifact.path)? {
                report.removed.push(artifact.path.clone());
            }
            remove_if_present(&artifact.meta_path())?;
        }
        report.kept = self.scan().len();

        report.swept += self.sweep_orphaned_meta()?;
        if sweep_staging {
            report.swept += self.sweep_staging()?;
        }

        if !report.removed.is_empty() || report.swept > 0 {
            info!(
                "Pruned {} image(s), swept {} leftover file(s) in {}",
                report.removed.len(),
                report.swept,
                self.dir.display()
            );
        }

        Ok(report)
    }

    fn sweep_orphaned_meta(&self) -> JusimResult<usize> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Ok(0);
        };

        let mut swept = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let is_meta = path
                .extension()
                .is_some_and(|ext| ext == artifact::META_EXTENSION);
            if is_meta && !path.with_extension(artifact::image_extension()).exists() && remove_if_present(&path)? {
                swept += 1;
            }
        }
        Ok(swept)
    }

    fn sweep_staging(&self) -> JusimResult<usize> {
        let Ok(entries) = fs::read_dir(self.staging_dir()) else {
            return Ok(0);
        };

        let mut swept = 0;
        for entry in entries.flatten() {
            if remove_if_present(&entry.path())? {
                swept += 1;
            }
        }
        Ok(swept)
    }
}

/// Read a sidecar, warning when it is missing or unreadable
fn read_meta(path: &Path) -> Option<ArtifactMeta> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Image metadata {} unavailable: {}", path.display(), e);
            return None;
        }
    };

    match serde_json::from_str(&content) {
        Ok(meta) => Some(meta),
        Err(e) => {
            warn!("Ignoring malformed image metadata {}: {}", path.display(), e);
            None
        }
    }
}

/// Remove a file; a concurrent deletion counts as already done
fn remove_if_present(path: &Path) -> JusimResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(JusimError::Prune {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}
