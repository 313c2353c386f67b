//! Build journal
//!
//! Writes JSON lines to `<state_dir>/builds.log`, one per build or prune
//! event, across all projects.

use crate::config::schema::Config;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// File-based journal that appends JSON lines
#[derive(Debug, Clone)]
pub struct BuildJournal {
    enabled: bool,
    path: PathBuf,
}

impl BuildJournal {
    /// Create a journal from config
    pub fn new(config: &Config, path: &Path) -> Self {
        Self {
            enabled: config.general.build_log,
            path: path.to_path_buf(),
        }
    }

    /// Journal that records nothing
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            path: PathBuf::new(),
        }
    }

    /// Path of the journal file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Log an event as a JSON line
    ///
    /// IO failures are logged and dropped; journaling never fails a build.
    pub async fn log(&self, event: &str, data: &serde_json::Value) {
        if !self.enabled {
            return;
        }

        let entry = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "pid": std::process::id(),
            "event": event,
            "data": data,
        });

        let mut line = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize journal event: {}", e);
                return;
            }
        };
        line.push('\n');

        if let Err(e) = self.append(&line).await {
            warn!("Failed to write build journal: {}", e);
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn journal(dir: &TempDir, enabled: bool) -> BuildJournal {
        BuildJournal {
            enabled,
            path: dir.path().join("state").join("builds.log"),
        }
    }

    #[tokio::test]
    async fn writes_json_line() {
        let dir = TempDir::new().unwrap();
        let journal = journal(&dir, true);

        journal
            .log("build.succeeded", &serde_json::json!({"fingerprint": "abcd"}))
            .await;

        let content = tokio::fs::read_to_string(journal.path()).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();

        assert_eq!(parsed["event"], "build.succeeded");
        assert_eq!(parsed["data"]["fingerprint"], "abcd");
        assert!(parsed["timestamp"].is_string());
    }

    #[tokio::test]
    async fn appends_multiple_lines() {
        let dir = TempDir::new().unwrap();
        let journal = journal(&dir, true);

        journal.log("build.started", &serde_json::json!({})).await;
        journal.log("prune", &serde_json::json!({})).await;

        let content = tokio::fs::read_to_string(journal.path()).await.unwrap();
        assert_eq!(content.trim().lines().count(), 2);
    }

    #[tokio::test]
    async fn skips_when_disabled() {
        let dir = TempDir::new().unwrap();
        let journal = journal(&dir, false);

        journal.log("should.not.appear", &serde_json::json!({})).await;

        assert!(!journal.path().exists());
    }

    #[test]
    fn follows_config_switch() {
        let mut config = Config::default();
        config.general.build_log = false;
        let journal = BuildJournal::new(&config, Path::new("/tmp/builds.log"));
        assert!(!journal.enabled);
    }
}
