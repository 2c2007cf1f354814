//! Domain model for remote builds.

pub mod build;
pub mod remote;
pub mod state;

pub use build::{BuildConfig, BuildRequest};
pub use remote::{Artifact, ArtifactFile, FileCommit, RemoteFile, RunStatus, WorkflowRun};
pub use state::{BuildPhase, BuildState};
