//! Detached background workers
//!
//! A background build is a separate `jusim build --worker` process in its own
//! process group, so it survives the runtime session that asked for it. The
//! session start check (`jusim start --check`) runs the same way, keeping the
//! toolchain probe off the session's startup path. Output goes to a
//! per-project log file.

use super::job::JobHandle;
use crate::error::{JusimError, JusimResult};
use crate::project::ProjectContext;
use chrono::Utc;
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Environment variable carrying the config path to workers
pub const CONFIG_ENV: &str = "JUSIM_CONFIG";

/// What a detached worker does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerTask {
    /// Build the image (`build --worker`)
    Build,
    /// Check staleness and submit a build if needed (`start --check`)
    Check,
}

impl WorkerTask {
    fn args(self) -> [&'static str; 2] {
        match self {
            Self::Build => ["build", "--worker"],
            Self::Check => ["start", "--check"],
        }
    }
}

/// How to launch a worker process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<OsString>,
    config: Option<PathBuf>,
}

impl WorkerCommand {
    /// Re-run the current executable as `jusim --project <root> <task>`
    pub fn current_exe(config: Option<&Path>) -> JusimResult<Self> {
        let program = std::env::current_exe()
            .map_err(|e| JusimError::io("locating the jusim executable", e))?;
        Ok(Self {
            program,
            args: Vec::new(),
            config: config.map(Path::to_path_buf),
        })
    }

    /// Arbitrary program; the worker arguments are appended to `args`
    pub fn with_program(program: impl Into<PathBuf>, args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            args,
            config: None,
        }
    }

    /// Full argument list for a project
    pub fn args_for(&self, ctx: &ProjectContext, task: WorkerTask) -> Vec<OsString> {
        let mut args = self.args.clone();
        args.push("--project".into());
        args.push(ctx.root.clone().into_os_string());
        args.extend(task.args().map(OsString::from));
        args
    }

    /// Start a detached worker for `ctx`, logging to `<logs_dir>/<project-id>.log`
    pub fn spawn(
        &self,
        ctx: &ProjectContext,
        logs_dir: &Path,
        task: WorkerTask,
    ) -> JusimResult<JobHandle> {
        fs::create_dir_all(logs_dir)
            .map_err(|e| JusimError::io(format!("creating {}", logs_dir.display()), e))?;

        let log_path = logs_dir.join(format!("{}.log", ctx.id));
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| JusimError::io(format!("opening {}", log_path.display()), e))?;
        let log_err = log
            .try_clone()
            .map_err(|e| JusimError::io(format!("opening {}", log_path.display()), e))?;

        let mut cmd = Command::new(&self.program);
        cmd.args(self.args_for(ctx, task))
            .current_dir(&ctx.root)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));
        if let Some(config) = &self.config {
            cmd.env(CONFIG_ENV, config);
        }
        detach(&mut cmd);

        let program = self.program.display().to_string();
        let child = cmd
            .spawn()
            .map_err(|e| JusimError::command_failed(program, e))?;
        let pid = child.id();
        // The worker outlives us; it is reparented once this process exits
        drop(child);

        match task {
            WorkerTask::Build => {
                info!("Started background build (pid {}) for {}", pid, ctx.root.display())
            }
            WorkerTask::Check => {
                debug!("Started staleness check (pid {}) for {}", pid, ctx.root.display())
            }
        }
        Ok(JobHandle {
            pid,
            log: log_path,
            submitted_at: Utc::now(),
        })
    }
}

/// Put the child into its own process group so terminal signals
/// (Ctrl-C in the runtime session) do not reach it
#[cfg(unix)]
fn detach(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;

    cmd.process_group(0);
}

#[cfg(not(unix))]
fn detach(_cmd: &mut Command) {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project(dir: &TempDir) -> ProjectContext {
        fs::write(dir.path().join("Project.toml"), "").unwrap();
        ProjectContext::open(dir.path()).unwrap()
    }

    #[test]
    fn args_target_the_project() {
        let dir = TempDir::new().unwrap();
        let ctx = project(&dir);
        let worker = WorkerCommand::with_program("/usr/bin/jusim", vec!["-v".into()]);

        let args = worker.args_for(&ctx, WorkerTask::Build);
        assert_eq!(args[0], "-v");
        assert_eq!(args[1], "--project");
        assert_eq!(PathBuf::from(&args[2]), ctx.root);
        assert_eq!(&args[3..], &["build", "--worker"]);

        let args = worker.args_for(&ctx, WorkerTask::Check);
        assert_eq!(&args[3..], &["start", "--check"]);
    }

    #[test]
    fn spawn_redirects_output_to_log() {
        let dir = TempDir::new().unwrap();
        let ctx = project(&dir);
        let logs = dir.path().join("logs");
        let worker =
            WorkerCommand::with_program("/bin/sh", vec!["-c".into(), "echo worker ran".into()]);

        let handle = worker.spawn(&ctx, &logs, WorkerTask::Build).unwrap();
        assert!(handle.pid > 0);
        assert_eq!(handle.log, logs.join(format!("{}.log", ctx.id)));

        // The worker is detached; poll for its output
        let mut content = String::new();
        for _ in 0..50 {
            content = fs::read_to_string(&handle.log).unwrap_or_default();
            if !content.is_empty() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
        assert!(content.contains("worker ran"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn worker_leaves_our_process_group() {
        let dir = TempDir::new().unwrap();
        let ctx = project(&dir);
        let logs = dir.path().join("logs");
        // prints its own process group id
        let script = "read -r _ _ _ _ pgid _ < /proc/$$/stat; echo $pgid";
        let worker = WorkerCommand::with_program("/bin/sh", vec!["-c".into(), script.into()]);

        let handle = worker.spawn(&ctx, &logs, WorkerTask::Check).unwrap();

        let mut content = String::new();
        for _ in 0..50 {
            content = fs::read_to_string(&handle.log).unwrap_or_default();
            if !content.trim().is_empty() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
        assert_eq!(content.trim(), handle.pid.to_string());
    }
}
