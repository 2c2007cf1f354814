//! forgeci-gateway: repository API access for remote builds
//!
//! Translates the four logical operations a build needs into authenticated
//! HTTP calls:
//!
//! - write a text file into the repository (read-modify-write on its revision)
//! - dispatch the build workflow
//! - read the most recent workflow run
//! - download a run's artifact bundle
//!
//! The gateway performs no retries; retry and timeout policy belongs to the
//! engine.

pub mod config;
pub mod error;
pub mod fakes;
pub mod github;

pub use config::GatewaySettings;
pub use error::{GatewayError, Operation};
pub use github::GithubGateway;

use async_trait::async_trait;
use forgeci_core::{ArtifactFile, BuildConfig, FileCommit, WorkflowRun};
use std::path::Path;

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Remote repository operations used by the build engine.
#[async_trait]
pub trait RepositoryGateway: Send + Sync {
    /// Create or replace the text file at `path`.
    ///
    /// The current revision marker is read immediately before the write and
    /// sent with it, so a write never reuses a marker from an earlier step.
    async fn upsert_file(
        &self,
        config: &BuildConfig,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<FileCommit>;

    /// Trigger the build workflow on the configured branch.
    async fn dispatch_workflow(&self, config: &BuildConfig) -> Result<()>;

    /// Most recent workflow run, or `None` if no run is visible yet.
    async fn latest_run(&self, config: &BuildConfig) -> Result<Option<WorkflowRun>>;

    /// Download the first artifact of `run_id` into `dest_dir`, replacing
    /// any file already at the destination.
    async fn fetch_artifact(
        &self,
        config: &BuildConfig,
        run_id: u64,
        dest_dir: &Path,
    ) -> Result<ArtifactFile>;
}
