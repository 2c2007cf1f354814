//! GitHub REST API gateway
//!
//! Talks to the contents, workflow dispatch, workflow runs and artifacts
//! endpoints. Works against any API root that speaks the same REST surface
//! (GitHub Enterprise, a local mock).

use crate::config::GatewaySettings;
use crate::error::{GatewayError, Operation};
use crate::{RepositoryGateway, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use forgeci_core::{Artifact, ArtifactFile, BuildConfig, FileCommit, RemoteFile, WorkflowRun};
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

const ACCEPT_JSON: &str = "application/vnd.github+json";
const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";

/// File metadata returned by the contents endpoint
#[derive(Debug, Deserialize)]
struct ContentMetadata {
    sha: String,
}

#[derive(Debug, Serialize)]
struct PutContents<'a> {
    message: &'a str,
    content: String,
    sha: &'a str,
    branch: &'a str,
}

#[derive(Debug, Deserialize)]
struct PutContentsResponse {
    #[serde(default)]
    content: Option<ContentMetadata>,
}

#[derive(Debug, Serialize)]
struct DispatchBody<'a> {
    #[serde(rename = "ref")]
    git_ref: &'a str,
}

#[derive(Debug, Deserialize)]
struct RunsPage {
    #[serde(default)]
    workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Deserialize)]
struct ArtifactsPage {
    #[serde(default)]
    artifacts: Vec<ApiArtifact>,
}

#[derive(Debug, Deserialize)]
struct ApiArtifact {
    id: u64,
    name: String,
    archive_download_url: String,
}

impl From<ApiArtifact> for Artifact {
    fn from(a: ApiArtifact) -> Self {
        Artifact {
            id: a.id,
            name: a.name,
            download_url: a.archive_download_url,
        }
    }
}

/// Repository gateway backed by the GitHub REST API
pub struct GithubGateway {
    settings: GatewaySettings,
    http: reqwest::Client,
}

impl GithubGateway {
    /// Create a gateway with the given settings
    pub fn new(settings: GatewaySettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .connect_timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| GatewayError::Client(e.to_string()))?;

        Ok(GithubGateway { settings, http })
    }

    /// Create a gateway from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(GatewaySettings::from_env())
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    fn repo_url(&self, config: &BuildConfig, tail: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.settings.api_url.trim_end_matches('/'),
            config.owner,
            config.repository,
            tail.trim_start_matches('/')
        )
    }

    /// Authenticated request with the API headers every call carries
    fn request(&self, method: Method, url: &str, config: &BuildConfig) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&config.token)
            .header(ACCEPT, ACCEPT_JSON)
            .header(API_VERSION_HEADER, &self.settings.api_version)
            .timeout(Duration::from_secs(self.settings.request_timeout_secs))
    }

    async fn send(&self, operation: Operation, builder: RequestBuilder) -> Result<Response> {
        builder.send().await.map_err(GatewayError::http(operation))
    }

    /// Turn a non-matching status into `GatewayError::Status` with the body
    async fn reject(operation: Operation, response: Response) -> GatewayError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        GatewayError::status(operation, status, &body)
    }

    /// Current revision marker of `path`, or `None` if the file does not exist.
    ///
    /// Any non-200 status is read as "no existing file".
    pub async fn read_revision(&self, config: &BuildConfig, path: &str) -> Result<Option<String>> {
        let url = self.repo_url(config, &format!("contents/{}", path));
        let builder = self
            .request(Method::GET, &url, config)
            .query(&[("ref", self.settings.branch.as_str())]);
        let response = self.send(Operation::ReadFile, builder).await?;

        if response.status() != StatusCode::OK {
            debug!(path = %path, status = response.status().as_u16(), "no existing remote file");
            return Ok(None);
        }

        let meta: ContentMetadata = response
            .json()
            .await
            .map_err(GatewayError::decode(Operation::ReadFile))?;
        Ok(Some(meta.sha))
    }

    /// Write `file`, replacing exactly `file.revision` when it is set.
    pub async fn put_file(
        &self,
        config: &BuildConfig,
        file: &RemoteFile,
        message: &str,
    ) -> Result<FileCommit> {
        let url = self.repo_url(config, &format!("contents/{}", file.path));
        let body = PutContents {
            message,
            content: BASE64.encode(file.content.as_bytes()),
            sha: file.revision.as_deref().unwrap_or(""),
            branch: &self.settings.branch,
        };
        let response = self
            .send(
                Operation::WriteFile,
                self.request(Method::PUT, &url, config).json(&body),
            )
            .await?;

        // 3xx counts as failure: the contents API never redirects a write.
        if response.status().as_u16() >= 300 {
            return Err(Self::reject(Operation::WriteFile, response).await);
        }

        let revision = response
            .json::<PutContentsResponse>()
            .await
            .ok()
            .and_then(|r| r.content)
            .map(|c| c.sha);

        Ok(FileCommit {
            path: file.path.clone(),
            revision,
            created: file.is_create(),
        })
    }

    /// Artifacts attached to `run_id`.
    pub async fn list_artifacts(&self, config: &BuildConfig, run_id: u64) -> Result<Vec<Artifact>> {
        let url = self.repo_url(config, &format!("actions/runs/{}/artifacts", run_id));
        let response = self
            .send(
                Operation::ListArtifacts,
                self.request(Method::GET, &url, config),
            )
            .await?;

        if !response.status().is_success() {
            return Err(Self::reject(Operation::ListArtifacts, response).await);
        }

        let page: ArtifactsPage = response
            .json()
            .await
            .map_err(GatewayError::decode(Operation::ListArtifacts))?;
        Ok(page.artifacts.into_iter().map(Artifact::from).collect())
    }

    /// Stream `artifact` to `dest`, hashing as it goes.
    ///
    /// Data lands in a `.part` file that is renamed over `dest` on success,
    /// so a failed download never leaves a truncated artifact behind.
    async fn download(
        &self,
        config: &BuildConfig,
        artifact: &Artifact,
        dest: &Path,
    ) -> Result<ArtifactFile> {
        let builder = self
            .request(Method::GET, &artifact.download_url, config)
            .timeout(Duration::from_secs(self.settings.download_timeout_secs));
        let response = self.send(Operation::Download, builder).await?;

        if !response.status().is_success() {
            return Err(Self::reject(Operation::Download, response).await);
        }

        let partial = part_path(dest);
        let result = stream_to_file(response, &partial).await;
        let (size_bytes, sha256) = match result {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
        };
        tokio::fs::rename(&partial, dest).await?;

        Ok(ArtifactFile {
            path: dest.to_path_buf(),
            size_bytes,
            sha256,
        })
    }
}

async fn stream_to_file(response: Response, path: &Path) -> Result<(u64, String)> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut hasher = Sha256::new();
    let mut size_bytes = 0u64;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(GatewayError::http(Operation::Download))?;
        hasher.update(&chunk);
        size_bytes += chunk.len() as u64;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    Ok((size_bytes, hex::encode(hasher.finalize())))
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

#[async_trait]
impl RepositoryGateway for GithubGateway {
    async fn upsert_file(
        &self,
        config: &BuildConfig,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<FileCommit> {
        let revision = self.read_revision(config, path).await?;
        let file = RemoteFile::new(path, content).with_revision(revision);
        debug!(path = %path, create = file.is_create(), "writing remote file");

        let commit = self.put_file(config, &file, message).await?;
        info!(path = %path, created = commit.created, "remote file written");
        Ok(commit)
    }

    async fn dispatch_workflow(&self, config: &BuildConfig) -> Result<()> {
        let url = self.repo_url(
            config,
            &format!("actions/workflows/{}/dispatches", self.settings.workflow_file),
        );
        let body = DispatchBody {
            git_ref: &self.settings.branch,
        };
        let response = self
            .send(
                Operation::Dispatch,
                self.request(Method::POST, &url, config).json(&body),
            )
            .await?;

        // 204 is the only acceptance the dispatch endpoint gives.
        if response.status() != StatusCode::NO_CONTENT {
            return Err(Self::reject(Operation::Dispatch, response).await);
        }

        info!(workflow = %self.settings.workflow_file, branch = %self.settings.branch, "workflow dispatched");
        Ok(())
    }

    async fn latest_run(&self, config: &BuildConfig) -> Result<Option<WorkflowRun>> {
        let url = self.repo_url(config, "actions/runs");
        let builder = self
            .request(Method::GET, &url, config)
            .query(&[("per_page", "1")]);
        let response = self.send(Operation::ListRuns, builder).await?;

        if !response.status().is_success() {
            return Err(Self::reject(Operation::ListRuns, response).await);
        }

        let page: RunsPage = response
            .json()
            .await
            .map_err(GatewayError::decode(Operation::ListRuns))?;
        Ok(page.workflow_runs.into_iter().next())
    }

    async fn fetch_artifact(
        &self,
        config: &BuildConfig,
        run_id: u64,
        dest_dir: &Path,
    ) -> Result<ArtifactFile> {
        let artifact = self
            .list_artifacts(config, run_id)
            .await?
            .into_iter()
            .next()
            .ok_or(GatewayError::NoArtifact { run_id })?;

        tokio::fs::create_dir_all(dest_dir).await?;
        let dest = dest_dir.join(self.settings.artifact_file_name(run_id));
        if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
            warn!(path = %dest.display(), "replacing existing artifact file");
        }

        info!(run_id = run_id, artifact = %artifact.name, "downloading artifact");
        self.download(config, &artifact, &dest).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> GithubGateway {
        GithubGateway::new(GatewaySettings::default().with_api_url("https://api.example.com/"))
            .unwrap()
    }

    #[test]
    fn test_repo_url() {
        let config = BuildConfig::new("octo", "apps", "t");
        assert_eq!(
            gateway().repo_url(&config, "contents/Sources/App.swift"),
            "https://api.example.com/repos/octo/apps/contents/Sources/App.swift"
        );
        assert_eq!(
            gateway().repo_url(&config, "/actions/runs"),
            "https://api.example.com/repos/octo/apps/actions/runs"
        );
    }

    #[test]
    fn test_part_path() {
        assert_eq!(
            part_path(Path::new("/tmp/forgeci/555.zip")),
            PathBuf::from("/tmp/forgeci/555.zip.part")
        );
    }

    #[test]
    fn test_put_body_shape() {
        let body = PutContents {
            message: "Update manifest",
            content: BASE64.encode("name: App"),
            sha: "",
            branch: "main",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["content"], "bmFtZTogQXBw");
        assert_eq!(json["sha"], "");
        assert_eq!(json["branch"], "main");

        let dispatch = serde_json::to_value(DispatchBody { git_ref: "main" }).unwrap();
        assert_eq!(dispatch, serde_json::json!({"ref": "main"}));
    }
}
