//! Cross-process build lock
//!
//! An advisory exclusive lock on `<catalog>/build.lock`. The OS drops the
//! lock when the holder exits, so a crashed build never wedges the project.
//! The file itself is never deleted; it only carries holder details for
//! display.

use crate::error::{JusimError, JusimResult};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Who holds the lock, as written into the lock file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub purpose: String,
}

/// Held build lock; released on drop
#[derive(Debug)]
pub struct BuildLock {
    file: File,
    path: PathBuf,
}

impl BuildLock {
    /// Try to take the lock without waiting; `None` when another holder has it
    pub fn try_acquire(path: &Path, purpose: &str) -> JusimResult<Option<Self>> {
        let mut file = open_lock_file(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                debug!("Build lock {} is held elsewhere", path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(JusimError::io(format!("locking {}", path.display()), e));
            }
        }

        let holder = LockHolder {
            pid: std::process::id(),
            started_at: Utc::now(),
            purpose: purpose.to_string(),
        };
        let content = serde_json::to_vec(&holder)?;
        file.set_len(0)
            .and_then(|()| file.seek(SeekFrom::Start(0)))
            .and_then(|_| file.write_all(&content))
            .map_err(|e| JusimError::io(format!("writing {}", path.display()), e))?;

        debug!("Acquired build lock {} for {}", path.display(), purpose);
        Ok(Some(Self {
            file,
            path: path.to_path_buf(),
        }))
    }

    /// Whether some process currently holds the lock
    pub fn is_held(path: &Path) -> bool {
        let file = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => file,
            Err(_) => return false,
        };

        match file.try_lock_exclusive() {
            Ok(()) => {
                let _ = FileExt::unlock(&file);
                false
            }
            Err(e) => e.kind() == fs2::lock_contended_error().kind(),
        }
    }

    /// Holder details of a held lock
    pub fn holder(path: &Path) -> Option<LockHolder> {
        if !Self::is_held(path) {
            return None;
        }
        let content = fs::read(path).ok()?;
        serde_json::from_slice(&content).ok()
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!("Released build lock {}", self.path.display());
    }
}

fn open_lock_file(path: &Path) -> JusimResult<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| JusimError::io(format!("creating {}", parent.display()), e))?;
    }

    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| JusimError::io(format!("opening {}", path.display()), e))
}
