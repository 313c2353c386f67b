//! Session marker persistence
//!
//! One JSON marker per (project, runtime process) lives in the sessions
//! directory. It makes `start` idempotent across repeated calls from the same
//! runtime session and remembers where that session captures usage hints.

use crate::error::{JusimError, JusimResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Session marker record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Unique session ID (names the hint file)
    pub id: Uuid,

    /// Owning project id
    pub project_id: String,

    /// Project root
    pub project_dir: PathBuf,

    /// Runtime process that started the session
    pub pid: u32,

    /// Usage-hint capture file
    pub capture_file: PathBuf,

    /// When the session started
    pub started_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Marker path for a project and session pid
    pub fn marker_path(sessions_dir: &Path, project_id: &str, pid: u32) -> PathBuf {
        sessions_dir.join(format!("{}-{}.json", project_id, pid))
    }

    /// Load a marker, `None` if absent
    pub async fn load(path: &Path) -> JusimResult<Option<Self>> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(JusimError::io(
                    format!("reading session file {}", path.display()),
                    e,
                ))
            }
        };

        let record: SessionRecord = serde_json::from_str(&content)?;
        Ok(Some(record))
    }

    /// Write the marker unless one already exists; returns whether it was written
    pub async fn create(&self, sessions_dir: &Path) -> JusimResult<bool> {
        fs::create_dir_all(sessions_dir)
            .await
            .map_err(|e| JusimError::io("creating sessions directory", e))?;

        let path = Self::marker_path(sessions_dir, &self.project_id, self.pid);
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => {
                return Err(JusimError::io(
                    format!("writing session file {}", path.display()),
                    e,
                ))
            }
        };

        let content = serde_json::to_string_pretty(self)?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| JusimError::io(format!("writing session file {}", path.display()), e))?;
        file.flush()
            .await
            .map_err(|e| JusimError::io(format!("writing session file {}", path.display()), e))?;

        Ok(true)
    }

    /// List all readable markers, newest first
    pub async fn list_all(sessions_dir: &Path) -> JusimResult<Vec<(PathBuf, SessionRecord)>> {
        let mut entries = match fs::read_dir(sessions_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(JusimError::io("reading sessions directory", e)),
        };

        let mut sessions = vec![];
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| JusimError::io("reading session entry", e))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                let content = fs::read_to_string(&path).await.ok();
                if let Some(content) = content {
                    if let Ok(record) = serde_json::from_str::<SessionRecord>(&content) {
                        sessions.push((path, record));
                    }
                }
            }
        }

        sessions.sort_by(|a, b| b.1.started_at.cmp(&a.1.started_at));

        Ok(sessions)
    }

    /// Whether the runtime process is still alive
    pub fn is_alive(&self) -> bool {
        process_alive(self.pid)
    }
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: signal 0 only checks for existence and permission
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}
