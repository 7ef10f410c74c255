//! REST API over a real listener with a scripted browser engine.

mod common;

use common::{fast_timings, ScriptedPage, ScriptedRenderer, LOGIN_HTML};
use fuzzscout_runtime::config::{HarnessConfig, PipelineConfig, StageCommand};
use fuzzscout_runtime::pipeline::Orchestrator;
use fuzzscout_runtime::renderer::{NoopRenderer, Renderer};
use fuzzscout_runtime::rest::{self, AppState};
use fuzzscout_runtime::signals::never_cancelled;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;

fn pipeline_config(root: &Path) -> PipelineConfig {
    PipelineConfig {
        work_dir: root.join("work"),
        classifier: StageCommand::new("sh", &["-c", r#"cp "$0" "$1""#, "{input}", "{output}"]),
        generator: StageCommand::new("sh", &["-c", "echo 'echo hello'", "{input}"]),
        harness: HarnessConfig {
            poll_interval_ms: 20,
            show_progress: false,
            ..HarnessConfig::default()
        },
        ..PipelineConfig::default()
    }
}

async fn spawn_server(renderer: Arc<dyn Renderer>, root: &Path) -> String {
    let state = Arc::new(AppState {
        renderer,
        orchestrator: Orchestrator::new(pipeline_config(root), never_cancelled()),
        timings: fast_timings(),
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(rest::serve(listener, state));
    format!("http://{addr}")
}

async fn login_server(root: &Path) -> String {
    spawn_server(
        Arc::new(ScriptedRenderer::new(ScriptedPage::html(LOGIN_HTML))),
        root,
    )
    .await
}

#[tokio::test]
async fn test_health() {
    let dir = tempfile::tempdir().unwrap();
    let base = login_server(dir.path()).await;

    let resp = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_crawl_returns_discovery_result() {
    let dir = tempfile::tempdir().unwrap();
    let base = login_server(dir.path()).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/crawl"))
        .json(&json!({"url": "http://localhost:8080/login", "timeoutMs": 5000}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();

    assert_eq!(body["url"], "http://localhost:8080/login");
    assert_eq!(body["navigation"]["ok"], true);
    assert_eq!(body["counts"]["forms"], 1);
    assert_eq!(body["forms"][0]["params"].as_array().unwrap().len(), 2);
    assert!(body.get("pipeline").is_none());
    assert!(!dir.path().join("work").exists(), "discovery alone writes no artifacts");
}

#[tokio::test]
async fn test_crawl_rejects_remote_target() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = Arc::new(ScriptedRenderer::new(ScriptedPage::html(LOGIN_HTML)));
    let counters = Arc::clone(&renderer.counters);
    let base = spawn_server(renderer, dir.path()).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/crawl"))
        .json(&json!({"url": "https://example.com"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "E_POLICY");
    assert_eq!(counters.created.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_crawl_rejects_bad_bodies() {
    let dir = tempfile::tempdir().unwrap();
    let base = login_server(dir.path()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/crawl"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "E_INVALID_INPUT");

    let resp = client
        .post(format!("{base}/crawl"))
        .json(&json!({"url": "not a url"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_crawl_without_browser_is_server_error() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn_server(Arc::new(NoopRenderer), dir.path()).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/crawl"))
        .json(&json!({"url": "http://127.0.0.1:9/"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "E_BROWSER");
}

#[cfg(unix)]
#[tokio::test]
async fn test_crawl_with_pipeline_stays_dry() {
    let dir = tempfile::tempdir().unwrap();
    let base = login_server(dir.path()).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/crawl"))
        .json(&json!({"url": "http://localhost:8080/login", "runPipeline": true}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();

    assert_eq!(body["counts"]["forms"], 1);
    let pipeline = &body["pipeline"];
    assert_eq!(pipeline["state"]["status"], "done");
    assert_eq!(pipeline["stages"].as_array().unwrap().len(), 4);
    assert_eq!(pipeline["execution"]["mode"], "dry-run");
}
