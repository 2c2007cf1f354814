//! Remote repository objects: files, workflow runs and artifacts.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A text file as it exists (or will exist) in the remote repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Repository-relative path.
    pub path: String,

    /// File content.
    pub content: String,

    /// Revision marker (content hash) of the current remote version.
    ///
    /// `None` means the file does not exist yet and a write creates it;
    /// `Some` means a write replaces exactly this revision.
    pub revision: Option<String>,
}

impl RemoteFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            revision: None,
        }
    }

    /// Attach the revision marker read from the remote.
    pub fn with_revision(mut self, revision: Option<String>) -> Self {
        self.revision = revision;
        self
    }

    /// True when a write will create the file rather than replace it.
    pub fn is_create(&self) -> bool {
        self.revision.is_none()
    }
}

/// Result of a successful file write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCommit {
    /// Repository-relative path that was written.
    pub path: String,

    /// Revision marker of the new content, if the API returned one.
    pub revision: Option<String>,

    /// Whether the file was created (as opposed to replaced).
    pub created: bool,
}

/// Lifecycle status of a workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    Completed,
    /// Any other status string the API reports (`waiting`, `requested`, ...).
    #[serde(untagged)]
    Other(String),
}

impl RunStatus {
    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::Completed => "completed",
            RunStatus::Other(s) => s,
        }
    }
}

/// One execution of a dispatched workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    pub status: RunStatus,

    /// `success`, `failure`, `cancelled`, ... once completed.
    #[serde(default)]
    pub conclusion: Option<String>,
}

impl WorkflowRun {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Completed with conclusion `success`.
    pub fn succeeded(&self) -> bool {
        self.is_completed() && self.conclusion.as_deref() == Some("success")
    }
}

/// A binary bundle produced by a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: u64,
    pub name: String,

    /// Time-limited download URL for the archive.
    pub download_url: String,
}

/// An artifact persisted to the local scratch directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
    pub path: PathBuf,

    /// Size of the downloaded file in bytes.
    pub size_bytes: u64,

    /// SHA-256 of the downloaded bytes (hex).
    pub sha256: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_file_create_vs_replace() {
        let file = RemoteFile::new("project.yml", "name: App");
        assert!(file.is_create());

        let file = file.with_revision(Some("abc123".to_string()));
        assert!(!file.is_create());
        assert_eq!(file.revision.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_run_status_deserializes_known_and_unknown() {
        let run: WorkflowRun =
            serde_json::from_str(r#"{"id": 1, "status": "in_progress", "conclusion": null}"#)
                .unwrap();
        assert_eq!(run.status, RunStatus::InProgress);
        assert!(!run.is_completed());

        let run: WorkflowRun = serde_json::from_str(r#"{"id": 2, "status": "waiting"}"#).unwrap();
        assert_eq!(run.status, RunStatus::Other("waiting".to_string()));
        assert_eq!(run.status.as_str(), "waiting");
    }

    #[test]
    fn test_run_succeeded_requires_completed_and_success() {
        let run = WorkflowRun {
            id: 555,
            status: RunStatus::Completed,
            conclusion: Some("success".to_string()),
        };
        assert!(run.succeeded());

        let run = WorkflowRun {
            id: 556,
            status: RunStatus::Completed,
            conclusion: Some("failure".to_string()),
        };
        assert!(run.is_completed());
        assert!(!run.succeeded());

        let run = WorkflowRun {
            id: 557,
            status: RunStatus::Queued,
            conclusion: Some("success".to_string()),
        };
        assert!(!run.succeeded());
    }
}
