//! Toolchain abstraction
//!
//! The image compiler is an external collaborator: jusim prepares its inputs,
//! runs it as a subprocess and checks that it left an image behind.

use crate::config::schema::ToolchainConfig;
use crate::error::{JusimError, JusimResult};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

/// Max number of output lines to include in build error messages.
const BUILD_ERROR_TAIL_LINES: usize = 50;

/// Inputs for one image compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileRequest {
    /// Project root (working directory of the compiler)
    pub project: PathBuf,
    /// Where the image must be written
    pub output: PathBuf,
    /// Packages to compile in
    pub packages: Vec<String>,
    /// File holding the merged usage hints
    pub hints_file: PathBuf,
}

/// Image compiler interface
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Version string that takes part in the fingerprint
    async fn version(&self) -> JusimResult<String>;

    /// Compile an image to `request.output`, passing each output line to `on_output`
    async fn compile(
        &self,
        request: &CompileRequest,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> JusimResult<()>;

    /// Human-readable name for display
    fn name(&self) -> &str;
}

/// Toolchain backed by an executable and an argument template.
///
/// Placeholders: `{project}`, `{output}`, `{packages}` (comma list) and
/// `{hints}`.
#[derive(Debug, Clone)]
pub struct CommandToolchain {
    executable: String,
    version: Option<String>,
    args: Vec<String>,
}

impl CommandToolchain {
    /// Create from the `[toolchain]` config section
    pub fn from_config(config: &ToolchainConfig) -> Self {
        Self {
            executable: config.executable.clone(),
            version: config.version.clone(),
            args: config.args.clone(),
        }
    }

    /// Arguments with placeholders filled in
    pub fn render_args(&self, request: &CompileRequest) -> Vec<String> {
        let packages = request.packages.join(",");
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{project}", &request.project.to_string_lossy())
                    .replace("{output}", &request.output.to_string_lossy())
                    .replace("{packages}", &packages)
                    .replace("{hints}", &request.hints_file.to_string_lossy())
            })
            .collect()
    }

    fn spawn_error(&self, e: std::io::Error) -> JusimError {
        if e.kind() == ErrorKind::NotFound {
            JusimError::ToolchainNotFound(self.executable.clone())
        } else {
            JusimError::command_failed(&self.executable, e)
        }
    }
}

#[async_trait]
impl Toolchain for CommandToolchain {
    async fn version(&self) -> JusimResult<String> {
        if let Some(version) = &self.version {
            return Ok(version.clone());
        }

        let output = Command::new(&self.executable)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(JusimError::ToolchainVersion(format!(
                "{} --version exited with {}",
                self.executable, output.status
            )));
        }

        let raw = String::from_utf8_lossy(&output.stdout);
        normalize_version(&raw).ok_or_else(|| {
            JusimError::ToolchainVersion(format!("empty output from {} --version", self.executable))
        })
    }

    async fn compile(
        &self,
        request: &CompileRequest,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> JusimResult<()> {
        let args = self.render_args(request);
        debug!("Running {} {:?}", self.executable, args);

        let mut child = Command::new(&self.executable)
            .args(&args)
            .current_dir(&request.project)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let output = stream_child_output(&mut child, &|line| {
            debug!("[{}] {}", self.executable, line);
            on_output(line);
        })
        .await?;

        let status = child
            .wait()
            .await
            .map_err(|e| JusimError::command_failed(&self.executable, e))?;

        if !status.success() {
            return Err(JusimError::BuildFailed {
                code: status.code(),
                output: build_error_output(&output),
            });
        }

        Ok(())
    }

    fn name(&self) -> &str {
        &self.executable
    }
}

/// Pull a semantic version out of `--version` output.
///
/// `julia version 1.10.2` becomes `1.10.2`; output without a parseable
/// version is kept verbatim (trimmed).
pub fn normalize_version(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let parsed = raw
        .split_whitespace()
        .map(|token| token.trim_start_matches('v'))
        .find_map(|token| semver::Version::parse(token).ok());

    Some(parsed.map_or_else(|| raw.to_string(), |v| v.to_string()))
}

/// Extract the useful tail of build output for error diagnostics.
fn build_error_output(lines: &[String]) -> String {
    let start = lines.len().saturating_sub(BUILD_ERROR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Stream stdout+stderr from a child process, calling `on_output` for each line.
///
/// Returns all collected output lines for error reporting.
async fn stream_child_output(
    child: &mut tokio::process::Child,
    on_output: &(dyn Fn(String) + Send + Sync),
) -> JusimResult<Vec<String>> {
    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Err(JusimError::Internal("toolchain output not piped".to_string()));
    };

    let mut stderr_reader = BufReader::new(stderr).lines();
    let mut stdout_reader = BufReader::new(stdout).lines();

    let mut all_output = Vec::new();
    let mut stderr_done = false;
    let mut stdout_done = false;

    while !stderr_done || !stdout_done {
        tokio::select! {
            line = stderr_reader.next_line(), if !stderr_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(line.clone());
                        all_output.push(line);
                    }
                    _ => stderr_done = true,
                }
            }
            line = stdout_reader.next_line(), if !stdout_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(line.clone());
                        all_output.push(line);
                    }
                    _ => stdout_done = true,
                }
            }
        }
    }

    Ok(all_output)
}
