//! Build phases and the observable build state.
//!
//! `BuildState` is owned by a single orchestrator and handed to observers
//! as snapshots. All mutation goes through the transition methods here so
//! the phase ordering and progress checkpoints hold regardless of caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::domain::remote::ArtifactFile;
use crate::error::{BuildError, CoreError, Result};

/// Phase of the build pipeline, in strict forward order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildPhase {
    #[default]
    Idle,
    Configuring,
    UploadingManifest,
    UploadingSource,
    Queuing,
    Monitoring,
    Downloading,
    Succeeded,
    Failed,
    Canceled,
}

impl BuildPhase {
    /// Progress checkpoint reported on entering this phase.
    pub fn progress(&self) -> f64 {
        match self {
            BuildPhase::Idle => 0.0,
            BuildPhase::Configuring => 0.1,
            BuildPhase::UploadingManifest => 0.2,
            BuildPhase::UploadingSource => 0.4,
            BuildPhase::Queuing => 0.5,
            BuildPhase::Monitoring => 0.5,
            BuildPhase::Downloading => 0.9,
            BuildPhase::Succeeded => 1.0,
            BuildPhase::Failed => 0.0,
            BuildPhase::Canceled => 0.0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BuildPhase::Succeeded | BuildPhase::Failed | BuildPhase::Canceled
        )
    }

    /// A build is in flight: neither idle nor terminal.
    pub fn is_running(&self) -> bool {
        !self.is_terminal() && *self != BuildPhase::Idle
    }

    pub fn label(&self) -> &'static str {
        match self {
            BuildPhase::Idle => "idle",
            BuildPhase::Configuring => "configuring",
            BuildPhase::UploadingManifest => "uploading_manifest",
            BuildPhase::UploadingSource => "uploading_source",
            BuildPhase::Queuing => "queuing",
            BuildPhase::Monitoring => "monitoring",
            BuildPhase::Downloading => "downloading",
            BuildPhase::Succeeded => "succeeded",
            BuildPhase::Failed => "failed",
            BuildPhase::Canceled => "canceled",
        }
    }

    /// Status line shown when the phase is entered.
    pub fn default_message(&self) -> &'static str {
        match self {
            BuildPhase::Idle => "Ready",
            BuildPhase::Configuring => "Generating build manifest",
            BuildPhase::UploadingManifest => "Uploading build manifest",
            BuildPhase::UploadingSource => "Uploading source",
            BuildPhase::Queuing => "Dispatching build workflow",
            BuildPhase::Monitoring => "Waiting for workflow run",
            BuildPhase::Downloading => "Downloading artifact",
            BuildPhase::Succeeded => "Build succeeded",
            BuildPhase::Failed => "Build failed",
            BuildPhase::Canceled => "Build canceled",
        }
    }

    /// The single phase that may follow this one on the success path.
    fn next(&self) -> Option<BuildPhase> {
        match self {
            BuildPhase::Configuring => Some(BuildPhase::UploadingManifest),
            BuildPhase::UploadingManifest => Some(BuildPhase::UploadingSource),
            BuildPhase::UploadingSource => Some(BuildPhase::Queuing),
            BuildPhase::Queuing => Some(BuildPhase::Monitoring),
            BuildPhase::Monitoring => Some(BuildPhase::Downloading),
            BuildPhase::Downloading => Some(BuildPhase::Succeeded),
            _ => None,
        }
    }
}

impl std::fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Observable state of the current (or last) build.
///
/// In `Succeeded` exactly `artifact` is set, in `Failed` exactly `error`;
/// neither is set while a build is running or after cancellation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildState {
    /// Correlation id of the build this state belongs to.
    pub build_id: Option<Uuid>,

    pub phase: BuildPhase,

    /// 0.0 - 1.0, non-decreasing while the build runs.
    pub progress: f64,

    pub status_message: String,

    pub error: Option<BuildError>,

    pub artifact: Option<ArtifactFile>,

    /// Workflow run id once one has been observed.
    pub run_id: Option<u64>,

    /// Poll attempts made in the monitoring phase.
    pub poll_attempts: u32,

    pub started_at: Option<DateTime<Utc>>,

    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for BuildState {
    fn default() -> Self {
        Self {
            build_id: None,
            phase: BuildPhase::Idle,
            progress: 0.0,
            status_message: BuildPhase::Idle.default_message().to_string(),
            error: None,
            artifact: None,
            run_id: None,
            poll_attempts: 0,
            started_at: None,
            finished_at: None,
        }
    }
}

impl BuildState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset every field and enter `Configuring` for a fresh build.
    ///
    /// Fails if a build is already in flight.
    pub fn begin(&mut self, build_id: Uuid) -> Result<()> {
        if self.phase.is_running() {
            return Err(self.invalid(BuildPhase::Configuring));
        }
        *self = BuildState {
            build_id: Some(build_id),
            phase: BuildPhase::Configuring,
            progress: BuildPhase::Configuring.progress(),
            status_message: BuildPhase::Configuring.default_message().to_string(),
            started_at: Some(Utc::now()),
            ..BuildState::default()
        };
        Ok(())
    }

    /// Move one step forward on the success path.
    ///
    /// `Succeeded` must be entered through [`BuildState::succeed`].
    pub fn advance(&mut self, next: BuildPhase) -> Result<()> {
        if next == BuildPhase::Succeeded || self.phase.next() != Some(next) {
            return Err(self.invalid(next));
        }
        self.phase = next;
        self.progress = self.progress.max(next.progress());
        self.status_message = next.default_message().to_string();
        Ok(())
    }

    /// Update the status line without changing phase.
    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
    }

    /// Record a poll attempt during monitoring.
    pub fn record_poll(&mut self, attempt: u32, max_attempts: u32, observed: Option<&str>) {
        self.poll_attempts = attempt;
        self.status_message = match observed {
            Some(status) => format!(
                "Waiting for workflow run ({}), attempt {}/{}",
                status, attempt, max_attempts
            ),
            None => format!(
                "Waiting for workflow run to appear, attempt {}/{}",
                attempt, max_attempts
            ),
        };
    }

    /// Terminal success with the downloaded artifact.
    pub fn succeed(&mut self, artifact: ArtifactFile) -> Result<()> {
        if self.phase != BuildPhase::Downloading {
            return Err(self.invalid(BuildPhase::Succeeded));
        }
        self.phase = BuildPhase::Succeeded;
        self.progress = BuildPhase::Succeeded.progress();
        self.status_message = BuildPhase::Succeeded.default_message().to_string();
        self.artifact = Some(artifact);
        self.error = None;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Terminal failure from any running phase.
    pub fn fail(&mut self, error: BuildError) -> Result<()> {
        if !self.phase.is_running() {
            return Err(self.invalid(BuildPhase::Failed));
        }
        self.phase = BuildPhase::Failed;
        self.progress = BuildPhase::Failed.progress();
        self.status_message = format!("{}: {}", BuildPhase::Failed.default_message(), error);
        self.error = Some(error);
        self.artifact = None;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Terminal cancellation from any running phase.
    pub fn cancel(&mut self) -> Result<()> {
        if !self.phase.is_running() {
            return Err(self.invalid(BuildPhase::Canceled));
        }
        self.phase = BuildPhase::Canceled;
        self.progress = BuildPhase::Canceled.progress();
        self.status_message = BuildPhase::Canceled.default_message().to_string();
        self.error = None;
        self.artifact = None;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Rendered failure, if the build failed.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }

    pub fn artifact_path(&self) -> Option<&Path> {
        self.artifact.as_ref().map(|a| a.path.as_path())
    }

    /// Wall-clock duration of a finished build.
    pub fn duration_ms(&self) -> Option<u64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds().max(0) as u64),
            _ => None,
        }
    }

    fn invalid(&self, requested: BuildPhase) -> CoreError {
        CoreError::InvalidTransition {
            current: self.phase.label().to_string(),
            requested: requested.label().to_string(),
        }
    }
}
