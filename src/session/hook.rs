//! Session start hook
//!
//! Runs once per runtime session, from the startup script. It arms usage-hint
//! capture and hands the staleness check to a detached `start --check`
//! process, so the session never waits on the toolchain. Every error is
//! logged and swallowed.

use super::state::SessionRecord;
use crate::build::{summarize_failure, BuildMode, BuildOrchestrator, BuildOutcome, JobHandle};
use crate::error::JusimResult;
use chrono::Utc;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Projects initialized by this process
static INITIALIZED: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();

/// Record `project_id` as initialized; false if it already was
fn register_in_process(project_id: &str) -> bool {
    let registry = INITIALIZED.get_or_init(Default::default);
    match registry.lock() {
        Ok(mut set) => set.insert(project_id.to_string()),
        Err(poisoned) => poisoned.into_inner().insert(project_id.to_string()),
    }
}

/// What `init` did
#[derive(Debug, Default)]
pub struct SessionStart {
    /// File the runtime should write usage hints to
    pub capture_file: Option<PathBuf>,
    /// Whether this call initialized the session
    pub first: bool,
    /// Detached staleness check (first call with auto-rebuild on)
    pub check: Option<JobHandle>,
}

/// Idempotent per-session initialization
#[derive(Debug, Clone)]
pub struct SessionHook {
    sessions_dir: PathBuf,
    auto_rebuild: bool,
}

impl SessionHook {
    pub fn new(sessions_dir: PathBuf, auto_rebuild: bool) -> Self {
        Self {
            sessions_dir,
            auto_rebuild,
        }
    }

    /// Initialize the session of runtime process `session_pid`
    pub async fn init(&self, orchestrator: &BuildOrchestrator, session_pid: u32) -> SessionStart {
        match self.try_init(orchestrator, session_pid).await {
            Ok(start) => start,
            Err(e) => {
                warn!("Session start failed, continuing without jusim: {}", e);
                SessionStart::default()
            }
        }
    }

    async fn try_init(
        &self,
        orchestrator: &BuildOrchestrator,
        session_pid: u32,
    ) -> JusimResult<SessionStart> {
        let ctx = orchestrator.context().clone();
        self.sweep_dead().await;

        let newly_registered = register_in_process(&ctx.id);
        let marker = SessionRecord::marker_path(&self.sessions_dir, &ctx.id, session_pid);

        if let Some(existing) = SessionRecord::load(&marker).await? {
            debug!("Session {} already initialized", existing.id);
            return Ok(SessionStart {
                capture_file: Some(existing.capture_file),
                first: false,
                check: None,
            });
        }
        if !newly_registered {
            debug!("Project {} already initialized by this process", ctx.id);
            return Ok(SessionStart::default());
        }

        let id = Uuid::new_v4();
        let capture_file = orchestrator.hints().arm(&id.simple().to_string())?;
        let record = SessionRecord {
            id,
            project_id: ctx.id.clone(),
            project_dir: ctx.root.clone(),
            pid: session_pid,
            capture_file: capture_file.clone(),
            started_at: Utc::now(),
        };

        if !record.create(&self.sessions_dir).await? {
            // Lost a race with a concurrent start for the same session
            let _ = tokio::fs::remove_file(&capture_file).await;
            let existing = SessionRecord::load(&marker).await?;
            return Ok(SessionStart {
                capture_file: existing.map(|r| r.capture_file),
                first: false,
                check: None,
            });
        }

        info!("Started session {} for {}", id, ctx.root.display());
        let check = if self.auto_rebuild {
            match orchestrator.spawn_check() {
                Ok(handle) => Some(handle),
                Err(e) => {
                    warn!("Could not start staleness check: {}", e);
                    None
                }
            }
        } else {
            debug!("Automatic rebuilds are off; skipping staleness check");
            None
        };

        Ok(SessionStart {
            capture_file: Some(capture_file),
            first: true,
            check,
        })
    }

    /// Drop markers of runtime processes that have exited
    async fn sweep_dead(&self) {
        let sessions = match SessionRecord::list_all(&self.sessions_dir).await {
            Ok(sessions) => sessions,
            Err(e) => {
                debug!("Cannot list sessions: {}", e);
                return;
            }
        };

        for (path, record) in sessions {
            if !record.is_alive() {
                debug!("Removing marker of exited session {}", record.id);
                let _ = tokio::fs::remove_file(&path).await;
            }
        }
    }
}

/// Staleness check, run by the detached `start --check` process
///
/// Only package, manifest or toolchain changes trigger a rebuild. Usage hints
/// grow with every session, so hint-only staleness waits for `jusim build`.
pub async fn check_and_submit(orchestrator: &BuildOrchestrator, auto_rebuild: bool) {
    match orchestrator.staleness().await {
        Err(e) => warn!("Staleness check failed: {}", e),
        Ok(report) if !report.stale => debug!("Image {} is current", report.fingerprint),
        Ok(_) if !auto_rebuild => info!("Image is stale; run `jusim build` to rebuild"),
        Ok(report) if report.hints_only => {
            info!("New usage hints since the last image; run `jusim build` to include them")
        }
        Ok(_) => match orchestrator.build(BuildMode::Background).await {
            Ok(BuildOutcome::Submitted(handle)) => info!(
                "Rebuilding image in background (pid {}, log {})",
                handle.pid,
                handle.log.display()
            ),
            Ok(BuildOutcome::InProgress(_)) => info!("An image build is already running"),
            Ok(_) => {}
            Err(e) => warn!("Could not start background build: {}", summarize_failure(&e)),
        },
    }
}
