//! Remote build orchestration.
//!
//! A build is a sequential pipeline of gateway calls; each step's output
//! (a revision, a run id) gates the next:
//!
//! ```text
//! idle -> configuring -> uploading_manifest -> uploading_source -> queuing
//!      -> monitoring (poll loop) -> downloading -> succeeded
//! ```
//!
//! `failed` is reachable from every running phase and `canceled` from every
//! running phase once `cancel()` is called. Gateway errors are mapped to a
//! `BuildError` at the step that produced them.

use std::future::Future;
use std::sync::Arc;

use forgeci_core::{
    obs, ArtifactFile, BuildConfig, BuildError, BuildPhase, BuildRequest, BuildState,
    CredentialStore,
};
use forgeci_gateway::{GatewayError, RepositoryGateway};
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::options::BuildOptions;

/// Why the pipeline stopped short of success.
#[derive(Debug)]
enum Halt {
    Failed(BuildError),
    Canceled,
}

impl From<BuildError> for Halt {
    fn from(err: BuildError) -> Self {
        Halt::Failed(err)
    }
}

/// Single-flight build orchestrator.
///
/// Owns the `BuildState`; observers get snapshots via [`state`] or a
/// change stream via [`subscribe`]. At most one build runs at a time:
/// `compile()` while a build is in flight is rejected without touching the
/// running build's state.
///
/// [`state`]: BuildOrchestrator::state
/// [`subscribe`]: BuildOrchestrator::subscribe
pub struct BuildOrchestrator {
    gateway: Arc<dyn RepositoryGateway>,
    options: BuildOptions,
    state: watch::Sender<BuildState>,
    cancel: watch::Sender<bool>,
}

impl BuildOrchestrator {
    pub fn new(gateway: Arc<dyn RepositoryGateway>, options: BuildOptions) -> Self {
        let (state, _) = watch::channel(BuildState::default());
        let (cancel, _) = watch::channel(false);
        Self {
            gateway,
            options,
            state,
            cancel,
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> BuildState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<BuildState> {
        self.state.subscribe()
    }

    /// Request cancellation of the running build.
    ///
    /// The build stops at its next suspension point and ends in `canceled`
    /// without downloading. Returns `false` if no build was running.
    pub fn cancel(&self) -> bool {
        let mut requested = false;
        // Evaluated under the state lock so a cancel can never land on a
        // build that starts after the one it was aimed at.
        self.state.send_if_modified(|state| {
            if state.phase.is_running() {
                self.cancel.send_replace(true);
                requested = true;
            }
            false
        });
        if requested {
            info!(event = "build.cancel_requested");
        }
        requested
    }

    /// Build with the credentials currently held by `store`.
    pub async fn compile_with_store(
        &self,
        store: &dyn CredentialStore,
        request: &BuildRequest,
    ) -> Result<BuildState> {
        let config = store
            .ready_config()
            .map_err(|_| EngineError::NotConfigured)?;
        self.compile(&config, request).await
    }

    /// Run one build to a terminal phase and return the final state.
    ///
    /// Errors only when the build cannot start: incomplete credentials or a
    /// build already in flight. Every failure after that is reported through
    /// the returned state.
    pub async fn compile(&self, config: &BuildConfig, request: &BuildRequest) -> Result<BuildState> {
        if !config.is_ready() {
            return Err(EngineError::NotConfigured);
        }

        let build_id = Uuid::new_v4();
        self.claim(build_id)?;
        let mut claim = ClaimGuard::new(self);

        let span = obs::build_span(&build_id.to_string(), &config.slug());
        let final_state = async {
            obs::emit_build_started(&build_id.to_string(), request.application_name());
            self.publish();

            let outcome = self.run_pipeline(config, request).await;
            let final_state = self.finish(outcome);
            claim.disarm();
            obs::emit_build_finished(&final_state);
            final_state
        }
        .instrument(span)
        .await;

        Ok(final_state)
    }

    /// Atomically reset the state and enter `configuring`, or reject.
    fn claim(&self, build_id: Uuid) -> Result<()> {
        let mut busy = None;
        let claimed = self.state.send_if_modified(|state| match state.begin(build_id) {
            Ok(()) => {
                self.cancel.send_replace(false);
                true
            }
            Err(_) => {
                busy = Some(state.phase);
                false
            }
        });

        if claimed {
            Ok(())
        } else {
            let phase = busy.unwrap_or(BuildPhase::Configuring);
            debug!(phase = %phase, "rejecting compile while a build is in flight");
            Err(EngineError::BuildInProgress { phase })
        }
    }

    async fn run_pipeline(
        &self,
        config: &BuildConfig,
        request: &BuildRequest,
    ) -> std::result::Result<ArtifactFile, Halt> {
        let layout = &self.options.layout;

        // configuring
        let manifest = self
            .options
            .manifest
            .render(request.application_name())
            .map_err(|e| BuildError::UploadFailure {
                path: layout.manifest_path.clone(),
                detail: e.to_string(),
            })?;

        self.transition(BuildPhase::UploadingManifest);
        self.guard(self.gateway.upsert_file(
            config,
            &layout.manifest_path,
            &manifest,
            &layout.manifest_message,
        ))
        .await?
        .map_err(|e| upload_failure(&layout.manifest_path, e))?;

        self.transition(BuildPhase::UploadingSource);
        self.guard(self.gateway.upsert_file(
            config,
            &layout.source_path,
            request.source_code(),
            &layout.source_message,
        ))
        .await?
        .map_err(|e| upload_failure(&layout.source_path, e))?;

        self.transition(BuildPhase::Queuing);
        self.guard(self.gateway.dispatch_workflow(config))
            .await?
            .map_err(|e| BuildError::DispatchFailure {
                detail: e.to_string(),
            })?;
        self.status("Workflow dispatched, waiting for the run to register");
        self.guard(tokio::time::sleep(self.options.policy.settle_delay))
            .await?;

        self.transition(BuildPhase::Monitoring);
        let run_id = self.monitor(config).await?;

        self.transition(BuildPhase::Downloading);
        let artifact = self
            .guard(
                self.gateway
                    .fetch_artifact(config, run_id, &self.options.scratch_dir),
            )
            .await?
            .map_err(|e| match e {
                GatewayError::NoArtifact { run_id } => BuildError::NoArtifactFound { run_id },
                other => BuildError::DownloadFailure {
                    detail: other.to_string(),
                },
            })?;

        info!(
            run_id = run_id,
            path = %artifact.path.display(),
            size_bytes = artifact.size_bytes,
            sha256 = %artifact.sha256,
            "artifact stored"
        );
        Ok(artifact)
    }

    /// Poll the latest run until it completes, at most `max_attempts` times.
    async fn monitor(&self, config: &BuildConfig) -> std::result::Result<u64, Halt> {
        let policy = self.options.policy;
        let max_attempts = policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                self.guard(tokio::time::sleep(policy.interval)).await?;
            }

            let run = self
                .guard(self.gateway.latest_run(config))
                .await?
                .map_err(|e| BuildError::PollFailure {
                    detail: e.to_string(),
                })?;

            let observed = run.as_ref().map(|r| r.status.as_str().to_string());
            obs::emit_poll_attempt(attempt, max_attempts, observed.as_deref());

            match run {
                Some(run) if run.is_completed() => {
                    self.state.send_modify(|s| {
                        s.run_id = Some(run.id);
                        s.poll_attempts = attempt;
                    });
                    if run.succeeded() {
                        return Ok(run.id);
                    }
                    return Err(BuildError::BuildFailure {
                        run_id: run.id,
                        conclusion: run.conclusion.unwrap_or_else(|| "unknown".to_string()),
                    }
                    .into());
                }
                Some(run) => {
                    self.state.send_modify(|s| {
                        s.run_id = Some(run.id);
                        s.record_poll(attempt, max_attempts, Some(run.status.as_str()));
                    });
                }
                None => {
                    self.state
                        .send_modify(|s| s.record_poll(attempt, max_attempts, None));
                }
            }
        }

        Err(BuildError::Timeout {
            attempts: max_attempts,
        }
        .into())
    }

    /// Run `fut` unless the build is canceled first.
    async fn guard<F: Future>(&self, fut: F) -> std::result::Result<F::Output, Halt> {
        let mut cancel = self.cancel.subscribe();
        tokio::select! {
            biased;
            _ = canceled(&mut cancel) => Err(Halt::Canceled),
            out = fut => Ok(out),
        }
    }

    fn transition(&self, next: BuildPhase) {
        let mut rejected = None;
        self.state.send_modify(|s| {
            if let Err(e) = s.advance(next) {
                rejected = Some(e);
            }
        });
        match rejected {
            Some(e) => error!(error = %e, "build phase transition rejected"),
            None => self.publish(),
        }
    }

    fn status(&self, message: &str) {
        self.state.send_modify(|s| s.set_status(message));
        self.publish();
    }

    fn publish(&self) {
        let state = self.state.borrow();
        obs::emit_phase(state.phase, state.progress, &state.status_message);
    }

    fn finish(&self, outcome: std::result::Result<ArtifactFile, Halt>) -> BuildState {
        self.state.send_modify(|s| {
            let result = match outcome {
                Ok(artifact) => s.succeed(artifact),
                Err(Halt::Failed(err)) => s.fail(err),
                Err(Halt::Canceled) => s.cancel(),
            };
            if let Err(e) = result {
                error!(error = %e, "terminal transition rejected");
            }
        });
        self.cancel.send_replace(false);
        self.state()
    }
}

/// Ends a claimed build as canceled if its `compile()` future is dropped
/// before reaching a terminal phase.
struct ClaimGuard<'a> {
    orchestrator: &'a BuildOrchestrator,
    armed: bool,
}

impl<'a> ClaimGuard<'a> {
    fn new(orchestrator: &'a BuildOrchestrator) -> Self {
        Self {
            orchestrator,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let orchestrator = self.orchestrator;
        let abandoned = orchestrator.state.send_if_modified(|s| {
            if s.phase.is_running() {
                s.cancel().is_ok()
            } else {
                false
            }
        });
        orchestrator.cancel.send_replace(false);
        if abandoned {
            warn!(event = "build.abandoned", "build dropped before completion; marked canceled");
            obs::emit_build_finished(&orchestrator.state());
        }
    }
}

/// Resolves once the cancel flag is set.
async fn canceled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone: no cancel can ever arrive.
            std::future::pending::<()>().await;
        }
    }
}

fn upload_failure(path: &str, err: GatewayError) -> BuildError {
    BuildError::UploadFailure {
        path: path.to_string(),
        detail: err.to_string(),
    }
}
