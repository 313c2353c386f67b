//! Build jobs and their outcomes

use super::lock::LockHolder;
use crate::catalog::SysimageArtifact;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Where a build runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// In the calling process; the caller waits for the result
    Foreground,
    /// In a detached worker process
    Background,
}

/// Result of a build request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// A new image was registered
    Built(SysimageArtifact),
    /// The latest image already matches the current inputs
    AlreadyCurrent(SysimageArtifact),
    /// Another process holds the build lock
    InProgress(Option<LockHolder>),
    /// A background worker was started
    Submitted(JobHandle),
}

/// Handle to a detached background build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    /// Worker process id
    pub pid: u32,
    /// File receiving the worker's output
    pub log: PathBuf,
    pub submitted_at: DateTime<Utc>,
}

/// Lifecycle state of a build job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One build attempt inside the process holding the lock
#[derive(Debug, Clone)]
pub struct BuildJob {
    pub id: Uuid,
    pub project_id: String,
    pub fingerprint: String,
    pub state: JobState,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BuildJob {
    /// New queued job
    pub fn new(project_id: &str, fingerprint: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id: project_id.to_string(),
            fingerprint: fingerprint.to_string(),
            state: JobState::Queued,
            queued_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Queued -> Running
    pub fn start(&mut self) {
        if self.state == JobState::Queued {
            self.state = JobState::Running;
            self.started_at = Some(Utc::now());
        }
    }

    /// Running -> Succeeded | Failed
    pub fn finish(&mut self, success: bool) {
        if self.state == JobState::Running {
            self.state = if success {
                JobState::Succeeded
            } else {
                JobState::Failed
            };
            self.finished_at = Some(Utc::now());
        }
    }

    /// Wall time between start and finish
    pub fn duration_secs(&self) -> Option<f64> {
        let started = self.started_at?;
        let finished = self.finished_at?;
        Some((finished - started).num_milliseconds() as f64 / 1000.0)
    }

    /// Fields recorded in the build journal
    pub fn journal_data(&self) -> serde_json::Value {
        serde_json::json!({
            "job": self.id.to_string(),
            "project_id": self.project_id,
            "fingerprint": self.fingerprint,
            "state": self.state.to_string(),
            "duration_secs": self.duration_secs(),
        })
    }
}
