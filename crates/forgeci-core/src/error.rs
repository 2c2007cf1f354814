//! Error taxonomy for forgeci.
//!
//! [`BuildError`] is the typed terminal failure of one build attempt. It is
//! the only failure shape an observer of a build ever sees; transport errors
//! are mapped into it at step boundaries by the engine.

use serde::{Deserialize, Serialize};

/// Terminal failure of a single build attempt.
///
/// Every variant is local to one attempt: the orchestrator returns to a
/// terminal phase and accepts a fresh build afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildError {
    /// Storing a file in the remote repository was rejected or could not be sent.
    #[error("upload of {path} failed: {detail}")]
    UploadFailure { path: String, detail: String },

    /// The workflow dispatch was not accepted.
    #[error("workflow dispatch failed: {detail}")]
    DispatchFailure { detail: String },

    /// The remote run completed with a non-success conclusion.
    #[error("workflow run {run_id} failed remotely (conclusion: {conclusion})")]
    BuildFailure { run_id: u64, conclusion: String },

    /// Polling exhausted its attempt budget. The remote run may still be going.
    #[error("no completed workflow run after {attempts} polls")]
    Timeout { attempts: u32 },

    /// Listing workflow runs failed.
    #[error("polling workflow runs failed: {detail}")]
    PollFailure { detail: String },

    /// The run succeeded but produced no artifact.
    #[error("workflow run {run_id} produced no artifact")]
    NoArtifactFound { run_id: u64 },

    /// The artifact could not be listed, downloaded or written locally.
    #[error("artifact download failed: {detail}")]
    DownloadFailure { detail: String },
}

impl BuildError {
    /// Stable snake_case name of the failure kind, used in logs and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            BuildError::UploadFailure { .. } => "upload_failure",
            BuildError::DispatchFailure { .. } => "dispatch_failure",
            BuildError::BuildFailure { .. } => "build_failure",
            BuildError::Timeout { .. } => "timeout",
            BuildError::PollFailure { .. } => "poll_failure",
            BuildError::NoArtifactFound { .. } => "no_artifact_found",
            BuildError::DownloadFailure { .. } => "download_failure",
        }
    }
}

/// Errors from the core services: request validation, state bookkeeping
/// and credential persistence.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid build request: {0}")]
    InvalidRequest(String),

    #[error("invalid build phase transition: {current} -> {requested}")]
    InvalidTransition { current: String, requested: String },

    #[error("credentials are incomplete: owner, repository and token are all required")]
    CredentialsNotReady,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("manifest encoding error: {0}")]
    Manifest(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
