//! forgeci core library
//!
//! Domain model, error taxonomy, manifest generation, credential storage
//! and tracing setup shared by the gateway, engine and CLI crates.

pub mod credentials;
pub mod domain;
pub mod error;
pub mod manifest;
pub mod obs;
pub mod telemetry;

pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use domain::{
    Artifact, ArtifactFile, BuildConfig, BuildPhase, BuildRequest, BuildState, FileCommit,
    RemoteFile, RunStatus, WorkflowRun,
};
pub use error::{BuildError, CoreError, Result};
pub use manifest::ManifestTemplate;
pub use telemetry::init_tracing;

/// forgeci version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
