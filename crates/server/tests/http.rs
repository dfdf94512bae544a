//! HTTP surface tests
//!
//! Drives the router in-process with a fake browser so no real browser or
//! network listener is needed.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use image::{Rgba, RgbaImage};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use shotdiff_common::{Error, Result, ScreenshotSize};
use shotdiff_server::{router, AppState, BrowserLauncher, BrowserSession, CiWatcher, ServerConfig};

/// Paints a solid page whose shade depends on the document URL
struct FakeSession {
    fail: bool,
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn screenshot(&mut self, url: &str, size: &ScreenshotSize, output: &Path) -> Result<()> {
        if self.fail {
            return Err(Error::Capture("renderer crashed".into()));
        }
        let shade = (url.len() * 40 % 256) as u8;
        RgbaImage::from_pixel(size.width, size.height, Rgba([0, shade, 0, 255]))
            .save(output)
            .map_err(Error::from)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

enum FakeLauncher {
    Working,
    Crashing,
    Missing,
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn open(&self) -> Result<Box<dyn BrowserSession>> {
        match self {
            FakeLauncher::Working => Ok(Box::new(FakeSession { fail: false })),
            FakeLauncher::Crashing => Ok(Box::new(FakeSession { fail: true })),
            FakeLauncher::Missing => Err(Error::CaptureUnavailable("no browser installed".into())),
        }
    }
}

struct TestApp {
    tmp: TempDir,
    app: Router,
}

impl TestApp {
    fn new(launcher: FakeLauncher) -> Self {
        let tmp = TempDir::new().unwrap();
        let config = ServerConfig {
            snapshots_path: tmp.path().join("snapshots"),
            tmp_dir: tmp.path().join("tmp"),
            ..Default::default()
        };
        let state = AppState::new(&config, Arc::new(launcher), CiWatcher::detached());
        Self {
            tmp,
            app: router(state),
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Option<String>, Vec<u8>) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();
        (status, content_type, body)
    }

    async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Option<String>, Vec<u8>) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let (status, _, body) = self.send(request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn leftover_artifacts(&self) -> usize {
        let root = self.tmp.path().join("tmp");
        if !root.exists() {
            return 0;
        }
        walkdir::WalkDir::new(&root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.path() != root)
            .count()
    }
}

fn list_body(snapshot: &str, css: Option<&str>, options: Value) -> Value {
    json!({
        "scenarios": [{
            "name": "Primary",
            "context": "Button",
            "snapshot": snapshot,
            "snapshotCSS": css,
            "options": options,
        }]
    })
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new(FakeLauncher::Working);
    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_resolve_accept_resolve() {
    let app = TestApp::new(FakeLauncher::Working);
    let markup = "<button>\n  Go\n</button>";

    let (status, _, body) = app.post_json("/snapshots-list", list_body(markup, None, json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["scenarios"][0]["hasDiff"], true);
    assert_eq!(body["scenarios"][0]["oldSnapshot"], Value::Null);

    let (status, _, body) = app
        .post_json(
            "/snapshots",
            json!({"name": "Primary", "context": "Button", "snapshot": markup}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
    let on_disk = std::fs::read_to_string(app.tmp.path().join("snapshots/Button/Button - Primary.html")).unwrap();
    assert_eq!(on_disk, markup);

    let (_, _, body) = app.post_json("/snapshots-list", list_body(markup, None, json!({}))).await;
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["scenarios"][0]["hasDiff"], false);
    assert_eq!(body["scenarios"][0]["diff"], Value::Null);
}

#[tokio::test]
async fn test_screenshot_data_returned_for_changed_scenario() {
    let app = TestApp::new(FakeLauncher::Working);
    let (_, _, body) = app
        .post_json(
            "/snapshots-list",
            list_body("<p>", Some("p{}"), json!({"screenshot": true})),
        )
        .await;
    let body: Value = serde_json::from_slice(&body).unwrap();
    let data = &body["scenarios"][0]["screenshotData"];
    assert!(data["after"].as_str().unwrap().contains("<style>p{}</style>"));
    assert_eq!(data["screenshotSizes"][0]["width"], 320);
    assert_eq!(data["screenshotSizes"][1]["height"], 768);
}

#[tokio::test]
async fn test_screenshot_returns_png_and_cleans_up() {
    let app = TestApp::new(FakeLauncher::Working);
    let (status, content_type, body) = app
        .post_json(
            "/screenshots",
            json!({"before": "<p>a</p>", "after": "<p>bb</p>", "size": {"width": 6, "height": 4}}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("image/png"));

    let diff = image::load_from_memory(&body).unwrap().to_rgba8();
    assert_eq!(diff.dimensions(), (6, 4));
    assert_eq!(diff.get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
    assert_eq!(app.leftover_artifacts(), 0);
}

#[tokio::test]
async fn test_screenshot_failure_cleans_up() {
    let app = TestApp::new(FakeLauncher::Crashing);
    let (status, _, body) = app
        .post_json(
            "/screenshots",
            json!({"before": "<a>", "after": "<b>", "size": {"width": 2, "height": 2}}),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert!(body["error"].as_str().unwrap().contains("renderer crashed"));
    assert_eq!(app.leftover_artifacts(), 0);
}

#[tokio::test]
async fn test_missing_browser_is_unavailable() {
    let app = TestApp::new(FakeLauncher::Missing);
    let (status, _, _) = app
        .post_json(
            "/screenshots",
            json!({"before": "<a>", "after": "<b>", "size": {"width": 2, "height": 2}}),
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(app.leftover_artifacts(), 0);

    // text diffing does not depend on the browser
    let (status, _, _) = app
        .post_json("/snapshots-list", list_body("<p>", Some("p{}"), json!({"screenshot": true})))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_meta_written_on_accept() {
    let app = TestApp::new(FakeLauncher::Working);
    let (status, body) = app.get("/meta").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Null);

    app.post_json(
        "/snapshots",
        json!({
            "name": "Alone",
            "context": null,
            "snapshot": "<x>",
            "snapshotCSS": "x{}",
            "environment": {"userAgent": "HeadlessChrome"}
        }),
    )
    .await;

    let (_, body) = app.get("/meta").await;
    assert_eq!(body, json!({"userAgent": "HeadlessChrome"}));
    assert!(app.tmp.path().join("snapshots/Alone.css").exists());
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let app = TestApp::new(FakeLauncher::Working);
    let request = Request::builder()
        .method("POST")
        .uri("/snapshots-list")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"scenarios\": 5"))
        .unwrap();
    let (status, _, _) = app.send(request).await;
    assert!(status.is_client_error());
}
