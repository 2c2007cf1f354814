//! forgeci engine - remote build orchestration
//!
//! Drives a build through the repository gateway:
//! - writes the generated manifest and the source into the repository
//! - dispatches the build workflow and polls its run with a bounded budget
//! - downloads the run's artifact into a local scratch directory
//!
//! Progress is published through a watch channel; any failure ends the
//! build in a typed terminal state.

pub mod error;
pub mod options;
pub mod orchestrator;

pub use error::EngineError;
pub use options::{BuildOptions, PollPolicy, RepositoryLayout};
pub use orchestrator::BuildOrchestrator;
