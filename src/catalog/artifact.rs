//! Image artifact naming and metadata
//!
//! Artifacts are discovered purely from file names, so independent processes
//! agree on the catalog without a shared index:
//!
//! `{project-id}-{fingerprint}-{YYYYMMDDTHHMMSS.ffffffZ}.{so|dylib|dll}`
//!
//! A JSON sidecar with the same stem records the package list and toolchain.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// Timestamp layout embedded in artifact names
const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.6fZ";

/// Timestamp layout accepted when parsing (any fraction width)
const TIMESTAMP_PARSE_FORMAT: &str = "%Y%m%dT%H%M%S%.fZ";

/// Extension for metadata sidecars
pub const META_EXTENSION: &str = "json";

/// Platform shared-library extension used for images
pub fn image_extension() -> &'static str {
    std::env::consts::DLL_EXTENSION
}

/// Identity fields encoded in an artifact file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    /// Owning project id
    pub project_id: String,
    /// Fingerprint of the build inputs
    pub fingerprint: String,
    /// When the artifact was registered
    pub created_at: DateTime<Utc>,
}

impl ArtifactName {
    /// Render the file name (with extension)
    pub fn file_name(&self) -> String {
        format!(
            "{}-{}-{}.{}",
            self.project_id,
            self.fingerprint,
            self.created_at.format(TIMESTAMP_FORMAT),
            image_extension()
        )
    }

    /// Parse a file name; `None` for anything that is not an image artifact
    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(&format!(".{}", image_extension()))?;

        let mut parts = stem.splitn(3, '-');
        let project_id = parts.next()?;
        let fingerprint = parts.next()?;
        let timestamp = parts.next()?;

        if !is_hex(project_id) || !is_hex(fingerprint) {
            return None;
        }

        let created_at = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_PARSE_FORMAT)
            .ok()?
            .and_utc();

        Some(Self {
            project_id: project_id.to_string(),
            fingerprint: fingerprint.to_string(),
            created_at,
        })
    }
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Metadata stored in the sidecar file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    /// Fingerprint of the build inputs
    pub fingerprint: String,
    /// Registration time
    pub created_at: DateTime<Utc>,
    /// Packages compiled into the image
    pub packages: Vec<String>,
    /// Toolchain version used for the build
    pub toolchain_version: String,
    /// Fingerprint of the inputs other than usage hints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_fingerprint: Option<String>,
}

/// A registered image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysimageArtifact {
    /// Path to the image file
    pub path: PathBuf,
    /// Owning project id
    pub project_id: String,
    /// Fingerprint of the build inputs
    pub fingerprint: String,
    /// Registration time
    pub created_at: DateTime<Utc>,
    /// Packages compiled into the image (empty if the sidecar is missing)
    pub packages: Vec<String>,
    /// Toolchain version, when known
    pub toolchain_version: Option<String>,
    /// Fingerprint of the inputs other than usage hints, when known
    pub base_fingerprint: Option<String>,
    /// Size in bytes (if known)
    pub size_bytes: Option<u64>,
}

impl SysimageArtifact {
    /// Combine a parsed name with optional sidecar metadata
    pub fn from_parts(path: PathBuf, name: ArtifactName, meta: Option<ArtifactMeta>) -> Self {
        let size_bytes = std::fs::metadata(&path).ok().map(|m| m.len());
        let (packages, toolchain_version, base_fingerprint) = match meta {
            Some(meta) => (meta.packages, Some(meta.toolchain_version), meta.base_fingerprint),
            None => (Vec::new(), None, None),
        };

        Self {
            path,
            project_id: name.project_id,
            fingerprint: name.fingerprint,
            created_at: name.created_at,
            packages,
            toolchain_version,
            base_fingerprint,
            size_bytes,
        }
    }

    /// Sidecar path for an image path
    pub fn meta_path_for(image: &Path) -> PathBuf {
        image.with_extension(META_EXTENSION)
    }

    /// Sidecar path for this artifact
    pub fn meta_path(&self) -> PathBuf {
        Self::meta_path_for(&self.path)
    }

    /// File name of the image
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Check if this artifact is older than the given number of days
    pub fn is_older_than_days(&self, days: u32) -> bool {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
        self.created_at < cutoff
    }

    /// Newest-first ordering; equal timestamps fall back to the fingerprint
    pub fn newest_first(a: &Self, b: &Self) -> Ordering {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.fingerprint.cmp(&a.fingerprint))
    }
}

/// Format bytes as human-readable size (e.g., "1.5 GB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
