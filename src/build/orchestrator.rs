//! Build orchestration
//!
//! Decides whether the project's latest image is still valid, and if not
//! produces a new one, either in this process or in a detached worker.
//!
//! ```text
//! Idle -> Evaluating -> Idle                      (current)
//!                    -> BuildQueued -> Building -> Succeeded | Failed -> Idle
//! ```
//!
//! At most one build runs per project across processes; contention is
//! reported as [`BuildOutcome::InProgress`], never as an error.

use super::fingerprint::FingerprintInputs;
use super::hints::{HintSnapshot, UsageHints};
use super::job::{BuildJob, BuildMode, BuildOutcome, JobHandle};
use super::lock::{BuildLock, LockHolder};
use super::toolchain::{CommandToolchain, CompileRequest, Toolchain};
use super::worker::{WorkerCommand, WorkerTask};
use crate::catalog::{ImageCatalog, PruneReport, RetentionPolicy, SysimageArtifact};
use crate::config::{Config, StoragePaths};
use crate::error::{JusimError, JusimResult};
use crate::housekeeping::Housekeeper;
use crate::journal::BuildJournal;
use crate::prefs::PreferenceStore;
use crate::project::ProjectContext;
use crate::resolver::{DependencyResolver, ManifestResolver};
use crate::session::SessionRecord;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Result of a staleness evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StalenessReport {
    /// True when no image matches the current inputs
    pub stale: bool,
    /// Fingerprint of the current inputs
    pub fingerprint: String,
    /// Stale only because new usage hints were recorded; packages, manifest
    /// and toolchain still match the latest image
    pub hints_only: bool,
    /// Newest registered image, if any
    pub latest: Option<SysimageArtifact>,
}

/// Inputs captured once per build so the image matches its fingerprint
struct BuildPlan {
    packages: BTreeSet<String>,
    toolchain_version: String,
    hints: HintSnapshot,
    fingerprint: String,
    base_fingerprint: String,
}

/// Receives toolchain output lines during foreground builds
pub type OutputSink = Arc<dyn Fn(String) + Send + Sync>;

/// Coordinates staleness checks, builds and housekeeping for one project
pub struct BuildOrchestrator {
    ctx: ProjectContext,
    catalog: ImageCatalog,
    prefs: PreferenceStore,
    hints: UsageHints,
    resolver: Arc<dyn DependencyResolver>,
    toolchain: Arc<dyn Toolchain>,
    worker: Option<WorkerCommand>,
    progress: Option<OutputSink>,
    logs_dir: PathBuf,
    sessions_dir: PathBuf,
    retention: RetentionPolicy,
    journal: BuildJournal,
    toolchain_version: OnceLock<String>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl BuildOrchestrator {
    /// Orchestrator using the configured toolchain and the manifest resolver
    pub fn new(ctx: ProjectContext, config: &Config, paths: &StoragePaths) -> Self {
        Self {
            catalog: ImageCatalog::new(&paths.images_root, &ctx),
            prefs: PreferenceStore::for_project(&ctx),
            hints: UsageHints::new(&paths.hints_root, &ctx),
            resolver: Arc::new(ManifestResolver),
            toolchain: Arc::new(CommandToolchain::from_config(&config.toolchain)),
            worker: None,
            progress: None,
            logs_dir: paths.logs_dir.clone(),
            sessions_dir: paths.sessions_dir.clone(),
            retention: RetentionPolicy::new(config.retention.keep, config.retention.max_age_days),
            journal: BuildJournal::new(config, &paths.build_log),
            toolchain_version: OnceLock::new(),
            pending: Mutex::new(Vec::new()),
            ctx,
        }
    }

    /// Replace the toolchain
    pub fn with_toolchain(mut self, toolchain: Arc<dyn Toolchain>) -> Self {
        self.toolchain = toolchain;
        self.toolchain_version = OnceLock::new();
        self
    }

    /// Replace the dependency resolver
    pub fn with_resolver(mut self, resolver: Arc<dyn DependencyResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Command used to start background builds
    pub fn with_worker(mut self, worker: WorkerCommand) -> Self {
        self.worker = Some(worker);
        self
    }

    /// Forward toolchain output (e.g. to a progress display)
    pub fn with_progress(mut self, sink: OutputSink) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn context(&self) -> &ProjectContext {
        &self.ctx
    }

    pub fn catalog(&self) -> &ImageCatalog {
        &self.catalog
    }

    pub fn preferences(&self) -> &PreferenceStore {
        &self.prefs
    }

    pub fn hints(&self) -> &UsageHints {
        &self.hints
    }

    pub fn resolver(&self) -> &dyn DependencyResolver {
        self.resolver.as_ref()
    }

    pub fn toolchain(&self) -> &dyn Toolchain {
        self.toolchain.as_ref()
    }

    /// Retention applied after successful builds
    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    /// Default package set for the project
    pub fn default_packages(&self) -> BTreeSet<String> {
        self.resolver.default_packages(&self.ctx)
    }

    /// `(defaults ∪ include) − exclude` for the project
    pub fn packages(&self) -> BTreeSet<String> {
        self.prefs.packages_to_include(&self.default_packages())
    }

    /// Toolchain version, queried once per orchestrator
    pub async fn toolchain_version(&self) -> JusimResult<String> {
        if let Some(version) = self.toolchain_version.get() {
            return Ok(version.clone());
        }
        let version = self.toolchain.version().await?;
        Ok(self.toolchain_version.get_or_init(|| version).clone())
    }

    async fn plan(&self) -> JusimResult<BuildPlan> {
        let packages = self.packages();
        let toolchain_version = self.toolchain_version().await?;
        let hints = self.hints.snapshot();

        let inputs = FingerprintInputs {
            manifest_digest: self.ctx.manifest_digest.clone(),
            packages: packages.clone(),
            toolchain_version: toolchain_version.clone(),
            hints_digest: hints.digest.clone(),
        };

        Ok(BuildPlan {
            fingerprint: inputs.fingerprint(),
            base_fingerprint: inputs.base_fingerprint(),
            packages,
            toolchain_version,
            hints,
        })
    }

    /// Fingerprint of the current build inputs
    pub async fn fingerprint(&self) -> JusimResult<String> {
        Ok(self.plan().await?.fingerprint)
    }

    /// Compare the current inputs against the latest image
    pub async fn staleness(&self) -> JusimResult<StalenessReport> {
        let plan = self.plan().await?;
        let fingerprint = plan.fingerprint;
        let latest = self.catalog.latest(None);
        let stale = latest.as_ref().is_none_or(|a| a.fingerprint != fingerprint);
        let hints_only = stale
            && latest
                .as_ref()
                .and_then(|a| a.base_fingerprint.as_deref())
                .is_some_and(|base| base == plan.base_fingerprint);

        debug!(
            "Project {} is {} (fingerprint {})",
            self.ctx.id,
            if stale { "stale" } else { "current" },
            fingerprint
        );
        Ok(StalenessReport {
            stale,
            fingerprint,
            hints_only,
            latest,
        })
    }

    /// Whether the latest image no longer matches the current inputs
    pub async fn is_stale(&self) -> JusimResult<bool> {
        Ok(self.staleness().await?.stale)
    }

    /// Holder of the build lock, if a build is running
    pub fn running_build(&self) -> Option<LockHolder> {
        BuildLock::holder(&self.catalog.lock_path())
    }

    /// Build a new image if the current one is stale
    pub async fn build(&self, mode: BuildMode) -> JusimResult<BuildOutcome> {
        let report = self.staleness().await?;
        if let (false, Some(latest)) = (report.stale, report.latest) {
            return Ok(BuildOutcome::AlreadyCurrent(latest));
        }

        match mode {
            BuildMode::Foreground => self.build_here().await,
            BuildMode::Background => self.submit().await,
        }
    }

    async fn submit(&self) -> JusimResult<BuildOutcome> {
        let lock_path = self.catalog.lock_path();
        if BuildLock::is_held(&lock_path) {
            return Ok(BuildOutcome::InProgress(BuildLock::holder(&lock_path)));
        }

        let handle = self.worker()?.spawn(&self.ctx, &self.logs_dir, WorkerTask::Build)?;

        self.journal
            .log(
                "build.submitted",
                &serde_json::json!({
                    "project_id": self.ctx.id,
                    "project": self.ctx.root.display().to_string(),
                    "worker_pid": handle.pid,
                    "log": handle.log.display().to_string(),
                }),
            )
            .await;

        Ok(BuildOutcome::Submitted(handle))
    }

    /// Run the staleness check in a detached process and return at once
    pub fn spawn_check(&self) -> JusimResult<JobHandle> {
        self.worker()?.spawn(&self.ctx, &self.logs_dir, WorkerTask::Check)
    }

    fn worker(&self) -> JusimResult<WorkerCommand> {
        match &self.worker {
            Some(worker) => Ok(worker.clone()),
            None => WorkerCommand::current_exe(None),
        }
    }

    async fn build_here(&self) -> JusimResult<BuildOutcome> {
        let lock_path = self.catalog.lock_path();
        let Some(lock) = BuildLock::try_acquire(&lock_path, "build")? else {
            return Ok(BuildOutcome::InProgress(BuildLock::holder(&lock_path)));
        };

        // Another process may have finished the same build while we waited
        let plan = self.plan().await?;
        if let Some(current) = self.catalog.latest(None) {
            if current.fingerprint == plan.fingerprint {
                return Ok(BuildOutcome::AlreadyCurrent(current));
            }
        }

        let mut job = BuildJob::new(&self.ctx.id, &plan.fingerprint);
        job.start();
        info!(
            "Building image for {} with {} package(s)",
            self.ctx.name(),
            plan.packages.len()
        );
        self.journal.log("build.started", &job.journal_data()).await;

        let result = self.compile_and_register(&plan).await;
        if result.is_ok() {
            self.compact_hints().await;
        }
        drop(lock);

        match result {
            Ok(artifact) => {
                job.finish(true);
                self.journal.log("build.succeeded", &job.journal_data()).await;
                self.schedule_housekeeping(Some(plan.fingerprint));
                Ok(BuildOutcome::Built(artifact))
            }
            Err(e) => {
                job.finish(false);
                let mut data = job.journal_data();
                data["error"] = serde_json::Value::String(e.to_string());
                self.journal.log("build.failed", &data).await;
                Err(e)
            }
        }
    }

    async fn compile_and_register(&self, plan: &BuildPlan) -> JusimResult<SysimageArtifact> {
        let staged = self.catalog.staging_path()?;
        let hints_file = staged.with_extension("jl");

        let result = async {
            plan.hints.write_to(&hints_file)?;

            let request = CompileRequest {
                project: self.ctx.root.clone(),
                output: staged.clone(),
                packages: plan.packages.iter().cloned().collect(),
                hints_file: hints_file.clone(),
            };
            let quiet = |_: String| {};
            let on_output: &(dyn Fn(String) + Send + Sync) = match &self.progress {
                Some(sink) => sink.as_ref(),
                None => &quiet,
            };
            self.toolchain.compile(&request, on_output).await?;

            self.catalog.register(
                &staged,
                &plan.fingerprint,
                Some(&plan.base_fingerprint),
                &request.packages,
                &plan.toolchain_version,
            )
        }
        .await;

        let _ = fs::remove_file(&hints_file);
        if result.is_err() {
            // Never leave a partial image behind
            let _ = fs::remove_file(&staged);
        }
        result
    }

    /// Fold hint files of ended sessions together
    async fn compact_hints(&self) {
        let live: HashSet<PathBuf> = match SessionRecord::list_all(&self.sessions_dir).await {
            Ok(sessions) => sessions
                .into_iter()
                .filter(|(_, record)| record.project_id == self.ctx.id && record.is_alive())
                .map(|(_, record)| record.capture_file)
                .collect(),
            Err(e) => {
                debug!("Skipping hint compaction: {}", e);
                return;
            }
        };

        match self.hints.compact(&live) {
            Ok(0) => {}
            Ok(folded) => debug!("Compacted {} hint file(s)", folded),
            Err(e) => warn!("Hint compaction failed: {}", e),
        }
    }

    /// Prune in the background with the configured retention
    pub fn schedule_housekeeping(&self, current_fingerprint: Option<String>) {
        let handle = self
            .housekeeper()
            .schedule(self.retention, current_fingerprint);
        match self.pending.lock() {
            Ok(mut pending) => pending.push(handle),
            Err(e) => warn!("Housekeeping registry poisoned: {}", e),
        }
    }

    /// Housekeeper for this project's catalog
    pub fn housekeeper(&self) -> Housekeeper {
        Housekeeper::new(self.catalog.clone(), self.journal.clone())
    }

    /// Prune now with an explicit policy
    pub async fn clean(&self, policy: &RetentionPolicy) -> JusimResult<PruneReport> {
        let current = match self.fingerprint().await {
            Ok(fp) => Some(fp),
            Err(e) => {
                debug!("Cleaning without current fingerprint: {}", e);
                None
            }
        };
        self.housekeeper().remove_old(policy, current.as_deref()).await
    }

    /// Wait for scheduled housekeeping to finish
    pub async fn settle(&self) {
        let handles: Vec<JoinHandle<()>> = match self.pending.lock() {
            Ok(mut pending) => pending.drain(..).collect(),
            Err(_) => return,
        };

        for result in futures_util::future::join_all(handles).await {
            if let Err(e) = result {
                warn!("Housekeeping task failed: {}", e);
            }
        }
    }
}

/// Map a build error to the one-line summary shown to users
pub fn summarize_failure(err: &JusimError) -> String {
    match err {
        JusimError::BuildFailed { code, .. } => match code {
            Some(code) => format!("image build failed (exit code {})", code),
            None => "image build was interrupted".to_string(),
        },
        other => other.to_string(),
    }
}
