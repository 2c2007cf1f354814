//! Errors returned when a build cannot be started.
//!
//! Once a build starts, its outcome is reported through the terminal
//! `BuildState`, never through these.

use forgeci_core::BuildPhase;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("a build is already in progress (phase: {phase})")]
    BuildInProgress { phase: BuildPhase },

    #[error("credentials are incomplete: owner, repository and token are all required")]
    NotConfigured,
}

pub type Result<T> = std::result::Result<T, EngineError>;
