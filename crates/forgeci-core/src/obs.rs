//! Structured observability hooks for the build lifecycle.
//!
//! - `build_span` scopes every log line of one build to its build id
//! - `emit_*` functions log the key lifecycle events with stable field names

use tracing::{info, warn};

use crate::domain::{BuildPhase, BuildState};

/// Build-scoped span, entered by instrumenting the build future.
pub fn build_span(build_id: &str, repository: &str) -> tracing::Span {
    tracing::info_span!("forgeci.build", build_id = %build_id, repository = %repository)
}

pub fn emit_build_started(build_id: &str, application_name: &str) {
    info!(event = "build.started", build_id = %build_id, application = %application_name);
}

/// A phase transition or status update.
pub fn emit_phase(phase: BuildPhase, progress: f64, message: &str) {
    info!(
        event = "build.phase",
        phase = %phase,
        progress = progress,
        message = %message,
    );
}

pub fn emit_poll_attempt(attempt: u32, max_attempts: u32, run_status: Option<&str>) {
    info!(
        event = "build.poll",
        attempt = attempt,
        max_attempts = max_attempts,
        run_status = run_status.unwrap_or("none"),
    );
}

/// Terminal state of a build. Failures and cancellations log at `warn`.
pub fn emit_build_finished(state: &BuildState) {
    let duration_ms = state.duration_ms().unwrap_or(0);
    match state.phase {
        BuildPhase::Succeeded => info!(
            event = "build.finished",
            phase = %state.phase,
            duration_ms = duration_ms,
            artifact = %state
                .artifact_path()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        ),
        _ => warn!(
            event = "build.finished",
            phase = %state.phase,
            duration_ms = duration_ms,
            error_kind = state.error.as_ref().map(|e| e.kind()).unwrap_or("none"),
            error = %state.error_message().unwrap_or_default(),
        ),
    }
}
