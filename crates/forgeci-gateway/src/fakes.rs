//! In-memory gateway fake (testing only)
//!
//! `ScriptedGateway` keeps a simulated repository with content-addressed
//! revisions, replays scripted poll results, writes artifacts to the real
//! destination directory, and records every call so tests can assert on
//! the exact sequence a build performed. Calls can be held for a scripted
//! delay (on tokio's clock) to leave room for cancellation.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use forgeci_core::{ArtifactFile, BuildConfig, FileCommit, RemoteFile, WorkflowRun};
use sha2::{Digest, Sha256};

use crate::error::{GatewayError, Operation};
use crate::{RepositoryGateway, Result};

/// A failure to inject into one gateway operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeFailure {
    /// The API answers with this status.
    Status(u16),
    /// The request never gets an answer.
    Transport(String),
}

impl FakeFailure {
    fn into_error(self, operation: Operation) -> GatewayError {
        match self {
            FakeFailure::Status(status) => GatewayError::status(operation, status, "scripted"),
            FakeFailure::Transport(message) => GatewayError::Http { operation, message },
        }
    }
}

/// Scripted answer to one `latest_run` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollScript {
    /// Empty run list.
    NoRun,
    Run(WorkflowRun),
    Fail(FakeFailure),
}

/// Artifact behaviour of `fetch_artifact`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactScript {
    /// The run lists one artifact with these bytes.
    Bytes(Vec<u8>),
    /// The run lists no artifacts.
    Missing,
    Fail(FakeFailure),
}

/// Gateway call as recorded by the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    ReadFile { path: String },
    WriteFile { path: String, revision: Option<String> },
    Dispatch,
    ListRuns,
    FetchArtifact { run_id: u64 },
}

#[derive(Debug, Clone)]
struct StoredFile {
    content: String,
    revision: String,
}

/// Scripted, in-memory `RepositoryGateway`.
#[derive(Debug)]
pub struct ScriptedGateway {
    files: Mutex<HashMap<String, StoredFile>>,
    upload_failures: Mutex<HashMap<String, FakeFailure>>,
    dispatch_failure: Mutex<Option<FakeFailure>>,
    polls: Mutex<VecDeque<PollScript>>,
    poll_fallback: Mutex<PollScript>,
    artifact: Mutex<ArtifactScript>,
    artifact_extension: String,
    delays: Mutex<HashMap<Operation, Duration>>,
    upload_delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<GatewayCall>>,
}

impl Default for ScriptedGateway {
    fn default() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            upload_failures: Mutex::new(HashMap::new()),
            dispatch_failure: Mutex::new(None),
            polls: Mutex::new(VecDeque::new()),
            poll_fallback: Mutex::new(PollScript::NoRun),
            artifact: Mutex::new(ArtifactScript::Bytes(b"PK\x03\x04artifact".to_vec())),
            artifact_extension: "zip".to_string(),
            delays: Mutex::new(HashMap::new()),
            upload_delays: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn revision_of(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

impl ScriptedGateway {
    /// A gateway where every operation succeeds and no run ever appears.
    pub fn new() -> Self {
        Self::default()
    }

    /// A file that already exists remotely.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        lock(&self.files).insert(
            path.to_string(),
            StoredFile {
                content: content.to_string(),
                revision: revision_of(content),
            },
        );
        self
    }

    pub fn fail_upload(self, path: &str, failure: FakeFailure) -> Self {
        lock(&self.upload_failures).insert(path.to_string(), failure);
        self
    }

    pub fn fail_dispatch(self, failure: FakeFailure) -> Self {
        *lock(&self.dispatch_failure) = Some(failure);
        self
    }

    /// Answers for successive `latest_run` calls.
    pub fn with_polls(self, polls: impl IntoIterator<Item = PollScript>) -> Self {
        lock(&self.polls).extend(polls);
        self
    }

    /// Answer once the scripted polls are used up (default: no run).
    pub fn then_always(self, poll: PollScript) -> Self {
        *lock(&self.poll_fallback) = poll;
        self
    }

    pub fn with_artifact(self, artifact: ArtifactScript) -> Self {
        *lock(&self.artifact) = artifact;
        self
    }

    /// Hold every call of `operation` for `delay` after recording it.
    pub fn delay(self, operation: Operation, delay: Duration) -> Self {
        lock(&self.delays).insert(operation, delay);
        self
    }

    /// Hold the write of `path` for `delay` after recording it.
    pub fn delay_upload(self, path: &str, delay: Duration) -> Self {
        lock(&self.upload_delays).insert(path.to_string(), delay);
        self
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<GatewayCall> {
        lock(&self.calls).clone()
    }

    pub fn poll_count(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| **c == GatewayCall::ListRuns)
            .count()
    }

    /// Current remote state of `path`.
    pub fn file(&self, path: &str) -> Option<RemoteFile> {
        lock(&self.files).get(path).map(|f| {
            RemoteFile::new(path, f.content.clone()).with_revision(Some(f.revision.clone()))
        })
    }

    fn record(&self, call: GatewayCall) {
        lock(&self.calls).push(call);
    }

    async fn hold(&self, operation: Operation, path: Option<&str>) {
        let delay = path
            .and_then(|p| lock(&self.upload_delays).get(p).copied())
            .or_else(|| lock(&self.delays).get(&operation).copied());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    /// Write with the same conflict rules as the contents API: replacing an
    /// existing file needs its current revision, creating needs none.
    fn write(&self, file: &RemoteFile) -> Result<FileCommit> {
        let mut files = lock(&self.files);
        let current = files.get(&file.path).map(|f| f.revision.clone());
        match (&current, &file.revision) {
            (Some(_), None) => {
                return Err(GatewayError::status(
                    Operation::WriteFile,
                    422,
                    "\"sha\" wasn't supplied",
                ))
            }
            (Some(cur), Some(given)) if cur != given => {
                return Err(GatewayError::status(
                    Operation::WriteFile,
                    409,
                    "revision does not match",
                ))
            }
            (None, Some(_)) => {
                return Err(GatewayError::status(Operation::WriteFile, 404, "not found"))
            }
            _ => {}
        }

        let revision = revision_of(&file.content);
        files.insert(
            file.path.clone(),
            StoredFile {
                content: file.content.clone(),
                revision: revision.clone(),
            },
        );
        Ok(FileCommit {
            path: file.path.clone(),
            revision: Some(revision),
            created: current.is_none(),
        })
    }
}

#[async_trait]
impl RepositoryGateway for ScriptedGateway {
    async fn upsert_file(
        &self,
        _config: &BuildConfig,
        path: &str,
        content: &str,
        _message: &str,
    ) -> Result<FileCommit> {
        self.record(GatewayCall::ReadFile {
            path: path.to_string(),
        });
        let revision = lock(&self.files).get(path).map(|f| f.revision.clone());

        self.record(GatewayCall::WriteFile {
            path: path.to_string(),
            revision: revision.clone(),
        });
        self.hold(Operation::WriteFile, Some(path)).await;
        if let Some(failure) = lock(&self.upload_failures).get(path).cloned() {
            return Err(failure.into_error(Operation::WriteFile));
        }

        self.write(&RemoteFile::new(path, content).with_revision(revision))
    }

    async fn dispatch_workflow(&self, _config: &BuildConfig) -> Result<()> {
        self.record(GatewayCall::Dispatch);
        self.hold(Operation::Dispatch, None).await;
        match lock(&self.dispatch_failure).clone() {
            Some(failure) => Err(failure.into_error(Operation::Dispatch)),
            None => Ok(()),
        }
    }

    async fn latest_run(&self, _config: &BuildConfig) -> Result<Option<WorkflowRun>> {
        self.record(GatewayCall::ListRuns);
        self.hold(Operation::ListRuns, None).await;
        let next = lock(&self.polls).pop_front();
        let script = next.unwrap_or_else(|| lock(&self.poll_fallback).clone());
        match script {
            PollScript::NoRun => Ok(None),
            PollScript::Run(run) => Ok(Some(run)),
            PollScript::Fail(failure) => Err(failure.into_error(Operation::ListRuns)),
        }
    }

    async fn fetch_artifact(
        &self,
        _config: &BuildConfig,
        run_id: u64,
        dest_dir: &Path,
    ) -> Result<ArtifactFile> {
        self.record(GatewayCall::FetchArtifact { run_id });
        self.hold(Operation::Download, None).await;
        let script = lock(&self.artifact).clone();
        let bytes = match script {
            ArtifactScript::Bytes(bytes) => bytes,
            ArtifactScript::Missing => return Err(GatewayError::NoArtifact { run_id }),
            ArtifactScript::Fail(failure) => return Err(failure.into_error(Operation::Download)),
        };

        tokio::fs::create_dir_all(dest_dir).await?;
        let path = dest_dir.join(format!("{}.{}", run_id, self.artifact_extension));
        tokio::fs::write(&path, &bytes).await?;

        Ok(ArtifactFile {
            path,
            size_bytes: bytes.len() as u64,
            sha256: hex::encode(Sha256::digest(&bytes)),
        })
    }
}
