//! Audit/status log collaborator
//!
//! Records processing discrepancies with the original raw payload attached
//! so operators can replay or debug. Write failures are logged and never
//! propagate into the pipeline: audit trouble must not halt a worker.

use async_trait::async_trait;
use chrono::Utc;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::error;

/// Why a message or sample was set aside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    /// Label generation failed for a sample, dropped from the batch
    SampleFailedLabelGeneration,
    /// A sample record could not be converted to a descriptor
    SampleMissing,
    /// A request carried no CMO samples and was not republished
    RequestFiltered,
    /// An inbound payload could not be deserialized
    ParsingError,
}

impl StatusKind {
    /// Stable identifier written to the audit log
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusKind::SampleFailedLabelGeneration => "sample-failed-label-generation",
            StatusKind::SampleMissing => "sample-missing",
            StatusKind::RequestFiltered => "request-filtered",
            StatusKind::ParsingError => "parsing-error",
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status logging contract exposed to the pipeline
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Record a status entry with the original raw message text attached
    async fn log_status(&self, raw_message: &str, kind: StatusKind);
}

/// Append-only file-backed audit log
pub struct FileAuditLog {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl FileAuditLog {
    /// Open (or create) the audit log at `path`
    pub async fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    /// Path this log writes to
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditLog for FileAuditLog {
    async fn log_status(&self, raw_message: &str, kind: StatusKind) {
        // One record per line; embedded newlines in the payload would break
        // the line-oriented format
        let raw = raw_message.replace('\n', " ");
        let line = format!("{}\t{}\t{}\n", Utc::now().to_rfc3339(), kind, raw);

        let mut file = self.file.lock().await;
        if let Err(e) = file.write_all(line.as_bytes()).await {
            error!(path = %self.path.display(), error = %e, "Failed to write audit entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entries_are_appended_with_kind_and_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");

        let log = FileAuditLog::open(&path).await.unwrap();
        log.log_status("{\"requestId\":\"R1\"}", StatusKind::RequestFiltered)
            .await;
        log.log_status("bad json", StatusKind::ParsingError).await;

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("request-filtered"));
        assert!(lines[0].contains("{\"requestId\":\"R1\"}"));
        assert!(lines[1].contains("parsing-error"));
    }

    #[tokio::test]
    async fn multiline_payloads_collapse_to_one_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");

        let log = FileAuditLog::open(&path).await.unwrap();
        log.log_status("line one\nline two", StatusKind::SampleMissing)
            .await;

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains("line one line two"));
    }
}
