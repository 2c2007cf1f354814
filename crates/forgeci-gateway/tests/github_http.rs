//! GithubGateway against a mock REST server.

use forgeci_core::{BuildConfig, RunStatus};
use forgeci_gateway::{GatewayError, GatewaySettings, GithubGateway, Operation, RepositoryGateway};
use serde_json::json;
use tempfile::tempdir;
use wiremock::matchers::{body_json, body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config() -> BuildConfig {
    BuildConfig::new("octo", "apps", "ghp_test")
}

fn gateway(server: &MockServer) -> GithubGateway {
    GithubGateway::new(GatewaySettings::default().with_api_url(&server.uri())).unwrap()
}

#[tokio::test]
async fn upsert_replaces_existing_revision() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/octo/apps/contents/project.yml"))
        .and(query_param("ref", "main"))
        .and(header("authorization", "Bearer ghp_test"))
        .and(header("accept", "application/vnd.github+json"))
        .and(header("x-github-api-version", "2022-11-28"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sha": "abc123"})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/repos/octo/apps/contents/project.yml"))
        .and(body_partial_json(json!({
            "sha": "abc123",
            "branch": "main",
            "content": "bmFtZTogQXBw",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": {"sha": "def456"}})))
        .expect(1)
        .mount(&server)
        .await;

    let commit = gateway(&server)
        .upsert_file(&config(), "project.yml", "name: App", "Update manifest")
        .await
        .unwrap();

    assert!(!commit.created);
    assert_eq!(commit.revision.as_deref(), Some("def456"));
}

#[tokio::test]
async fn upsert_missing_file_sends_empty_revision() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/octo/apps/contents/Sources/App.swift"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/repos/octo/apps/contents/Sources/App.swift"))
        .and(body_partial_json(json!({"sha": "", "message": "Update source"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"content": {"sha": "new1"}})))
        .expect(1)
        .mount(&server)
        .await;

    let commit = gateway(&server)
        .upsert_file(&config(), "Sources/App.swift", "print(1)", "Update source")
        .await
        .unwrap();

    assert!(commit.created);
}

#[tokio::test]
async fn upsert_rereads_revision_before_every_write() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/octo/apps/contents/project.yml"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sha": "abc123"})))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/repos/octo/apps/contents/project.yml"))
        .and(body_partial_json(json!({"sha": "abc123"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": {"sha": "abc123"}})))
        .expect(2)
        .mount(&server)
        .await;

    let gw = gateway(&server);
    for _ in 0..2 {
        gw.upsert_file(&config(), "project.yml", "same", "msg")
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn upsert_rejected_put_is_status_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/octo/apps/contents/project.yml"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/repos/octo/apps/contents/project.yml"))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_json(json!({"message": "Resource not accessible by personal access token"})),
        )
        .mount(&server)
        .await;

    let err = gateway(&server)
        .upsert_file(&config(), "project.yml", "x", "msg")
        .await
        .unwrap_err();

    match err {
        GatewayError::Status {
            operation, status, body,
        } => {
            assert_eq!(operation, Operation::WriteFile);
            assert_eq!(status, 403);
            assert!(body.contains("not accessible"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn dispatch_requires_204() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/repos/octo/apps/actions/workflows/build.yml/dispatches"))
        .and(body_json(json!({"ref": "main"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    gateway(&server).dispatch_workflow(&config()).await.unwrap();
}

#[tokio::test]
async fn dispatch_200_is_still_a_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/repos/octo/apps/actions/workflows/build.yml/dispatches"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let err = gateway(&server).dispatch_workflow(&config()).await.unwrap_err();
    assert_eq!(err.status_code(), Some(200));
}

#[tokio::test]
async fn latest_run_reads_first_entry() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/octo/apps/actions/runs"))
        .and(query_param("per_page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_count": 1,
            "workflow_runs": [
                {"id": 555, "status": "completed", "conclusion": "success", "name": "build"}
            ]
        })))
        .mount(&server)
        .await;

    let run = gateway(&server).latest_run(&config()).await.unwrap().unwrap();
    assert_eq!(run.id, 555);
    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.succeeded());
}

#[tokio::test]
async fn latest_run_empty_list_is_none() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/octo/apps/actions/runs"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"total_count": 0, "workflow_runs": []})),
        )
        .mount(&server)
        .await;

    assert!(gateway(&server).latest_run(&config()).await.unwrap().is_none());
}

#[tokio::test]
async fn fetch_artifact_streams_to_run_named_file() {
    let server = MockServer::start().await;
    let payload = b"PK\x03\x04 binary bundle".to_vec();

    Mock::given(method("GET"))
        .and(path("/repos/octo/apps/actions/runs/555/artifacts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_count": 1,
            "artifacts": [{
                "id": 9,
                "name": "App",
                "archive_download_url": format!("{}/download/9", server.uri()),
            }]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/download/9"))
        .and(header("authorization", "Bearer ghp_test"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let stale = dir.path().join("555.zip");
    std::fs::write(&stale, b"old contents that are longer than the new ones, by far").unwrap();

    let file = gateway(&server)
        .fetch_artifact(&config(), 555, dir.path())
        .await
        .unwrap();

    assert_eq!(file.path, stale);
    assert_eq!(std::fs::read(&file.path).unwrap(), payload);
    assert_eq!(file.size_bytes, payload.len() as u64);
    assert_eq!(file.sha256.len(), 64);
    assert!(!dir.path().join("555.zip.part").exists());
}

#[tokio::test]
async fn fetch_artifact_without_entries_is_no_artifact() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/octo/apps/actions/runs/555/artifacts"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"total_count": 0, "artifacts": []})),
        )
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let err = gateway(&server)
        .fetch_artifact(&config(), 555, dir.path())
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::NoArtifact { run_id: 555 }));
}

#[tokio::test]
async fn failed_download_leaves_no_file() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/octo/apps/actions/runs/555/artifacts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "artifacts": [{
                "id": 9,
                "name": "App",
                "archive_download_url": format!("{}/download/9", server.uri()),
            }]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/download/9"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let err = gateway(&server)
        .fetch_artifact(&config(), 555, dir.path())
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), Some(410));
    assert!(!dir.path().join("555.zip").exists());
}

#[tokio::test]
async fn every_endpoint_sends_auth_and_api_headers() {
    let server = MockServer::start().await;
    let settings = GatewaySettings::default().with_api_url(&server.uri());
    let user_agent = settings.user_agent.clone();
    assert!(user_agent.starts_with("forgeci/"));

    let api = |verb: &str, route: String| {
        Mock::given(method(verb))
            .and(path(route))
            .and(header("authorization", "Bearer ghp_test"))
            .and(header("accept", "application/vnd.github+json"))
            .and(header("x-github-api-version", "2022-11-28"))
            .and(header("user-agent", user_agent.as_str()))
    };

    api("GET", "/repos/octo/apps/contents/project.yml".to_string())
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    api("PUT", "/repos/octo/apps/contents/project.yml".to_string())
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"content": {"sha": "n1"}})))
        .expect(1)
        .mount(&server)
        .await;
    api(
        "POST",
        "/repos/octo/apps/actions/workflows/build.yml/dispatches".to_string(),
    )
    .respond_with(ResponseTemplate::new(204))
    .expect(1)
    .mount(&server)
    .await;
    api("GET", "/repos/octo/apps/actions/runs".to_string())
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "workflow_runs": [{"id": 7, "status": "completed", "conclusion": "success"}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    api("GET", "/repos/octo/apps/actions/runs/7/artifacts".to_string())
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "artifacts": [{
                "id": 3,
                "name": "App",
                "archive_download_url": format!("{}/download/3", server.uri()),
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    api("GET", "/download/3".to_string())
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let gw = GithubGateway::new(settings).unwrap();
    let dir = tempdir().unwrap();

    gw.upsert_file(&config(), "project.yml", "name: App", "msg")
        .await
        .unwrap();
    gw.dispatch_workflow(&config()).await.unwrap();
    let run = gw.latest_run(&config()).await.unwrap().unwrap();
    let file = gw.fetch_artifact(&config(), run.id, dir.path()).await.unwrap();

    assert_eq!(file.path, dir.path().join("7.zip"));
    assert_eq!(gw.settings().api_version, "2022-11-28");
}
