//! Usage-hint storage
//!
//! Each armed session gets its own hint file, filled by the runtime's
//! instrumentation with the statements it compiled. The accumulated set is
//! the de-duplicated union of every line across all files, which is what
//! both the fingerprint and the next build consume.
//!
//! The runtime writes `<ms>\t"<statement>"`; plain statements are accepted
//! too, so hand-written hint files work.
//!
//! After a build, files of ended sessions are folded into `compacted.jl` so
//! the directory does not grow with every session.

use crate::error::{JusimError, JusimResult};
use crate::project::ProjectContext;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashSet};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Extension of hint files
const HINT_EXTENSION: &str = "jl";

/// Hints of sessions that have ended
const COMPACTED_FILE: &str = "compacted.jl";

/// Hint files for one project
#[derive(Debug, Clone)]
pub struct UsageHints {
    dir: PathBuf,
}

impl UsageHints {
    /// Hints for `ctx` under the hints root
    pub fn new(hints_root: &Path, ctx: &ProjectContext) -> Self {
        Self {
            dir: hints_root.join(&ctx.id),
        }
    }

    /// Directory holding this project's hint files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create (or reuse) the capture file for a session
    pub fn arm(&self, session_id: &str) -> JusimResult<PathBuf> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| JusimError::io(format!("creating hints directory {}", self.dir.display()), e))?;

        let path = self.dir.join(format!("{}.{}", session_id, HINT_EXTENSION));
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| JusimError::io(format!("creating hint file {}", path.display()), e))?;

        debug!("Armed usage capture at {}", path.display());
        Ok(path)
    }

    /// Accumulated hints; unreadable files are skipped with a warning
    pub fn collect(&self) -> BTreeSet<String> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return BTreeSet::new();
        };

        let mut hints = BTreeSet::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !is_hint_file(&path) {
                continue;
            }

            match fs::read_to_string(&path) {
                Ok(content) => hints.extend(content.lines().filter_map(normalize)),
                Err(e) => warn!("Skipping unreadable hint file {}: {}", path.display(), e),
            }
        }

        hints
    }

    /// Fold every hint file not in `live` into `compacted.jl`.
    ///
    /// The accumulated set, and so the fingerprint, is unchanged. Returns the
    /// number of files folded.
    pub fn compact(&self, live: &HashSet<PathBuf>) -> JusimResult<usize> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Ok(0);
        };

        let compacted = self.dir.join(COMPACTED_FILE);
        let mut lines: BTreeSet<String> = match fs::read_to_string(&compacted) {
            Ok(content) => content.lines().filter_map(normalize).collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeSet::new(),
            Err(e) => return Err(JusimError::io(format!("reading {}", compacted.display()), e)),
        };

        let mut folded = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path == compacted || !is_hint_file(&path) || live.contains(&path) {
                continue;
            }
            match fs::read_to_string(&path) {
                Ok(content) => {
                    lines.extend(content.lines().filter_map(normalize));
                    folded.push(path);
                }
                Err(e) => warn!("Not compacting unreadable hint file {}: {}", path.display(), e),
            }
        }
        if folded.is_empty() {
            return Ok(0);
        }

        // Readers see either the old files or the merged one, never neither
        let tmp = self
            .dir
            .join(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        let written = HintSnapshot::new(lines).write_to(&tmp).and_then(|()| {
            fs::rename(&tmp, &compacted)
                .map_err(|e| JusimError::io(format!("writing {}", compacted.display()), e))
        });
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        for path in &folded {
            let _ = fs::remove_file(path);
        }
        debug!("Compacted {} hint file(s) in {}", folded.len(), self.dir.display());
        Ok(folded.len())
    }

    /// Accumulated hints together with their digest
    pub fn snapshot(&self) -> HintSnapshot {
        HintSnapshot::new(self.collect())
    }
}

/// Hints as of one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HintSnapshot {
    /// Sorted, de-duplicated statements
    pub lines: BTreeSet<String>,
    /// Digest of `lines`
    pub digest: String,
}

impl HintSnapshot {
    fn new(lines: BTreeSet<String>) -> Self {
        let mut hasher = Sha256::new();
        for line in &lines {
            hasher.update((line.len() as u64).to_le_bytes());
            hasher.update(line.as_bytes());
        }
        let digest = hex::encode(hasher.finalize());
        Self { lines, digest }
    }

    /// Write the statements into a single file for the toolchain
    pub fn write_to(&self, target: &Path) -> JusimResult<()> {
        let mut content = self.lines.iter().cloned().collect::<Vec<_>>().join("\n");
        if !content.is_empty() {
            content.push('\n');
        }

        fs::write(target, content)
            .map_err(|e| JusimError::io(format!("writing hints to {}", target.display()), e))
    }
}

fn is_hint_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == HINT_EXTENSION)
}

/// Extract the statement from one line of a hint file
fn normalize(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let statement = match line.split_once('\t') {
        Some((timing, rest)) if timing.chars().all(|c| c.is_ascii_digit()) => rest.trim(),
        _ => line,
    };
    let statement = statement
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(statement);

    (!statement.is_empty()).then(|| statement.to_string())
}
