//! Client against the real resolve/accept logic
//!
//! The in-process transport calls the server's resolver directly; the HTTP
//! tests run the full router on a loopback listener.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use shotdiff_client::{
    prepare_ci_report, styled, DeepLink, HttpTransport, MemoryNotifier, Registry, SyncEngine, SyncTransport,
    WsNotifier,
};
use shotdiff_common::protocol::{AcceptRequest, CiReport, ScenarioResolution, ScenarioSnapshot, ScreenshotRequest};
use shotdiff_common::{default_screenshot_sizes, Error, Result, ScenarioKey, ScenarioOptions, ScenarioStatus};
use shotdiff_server::{
    router, serve, AppState, BrowserKind, CiOutcome, CiWatcher, PlaywrightLauncher, Resolver, ServerConfig,
    SnapshotStore,
};

struct InProcessTransport {
    resolver: Resolver,
}

#[async_trait]
impl SyncTransport for InProcessTransport {
    async fn resolve(&self, scenarios: Vec<ScenarioSnapshot>) -> Result<Vec<ScenarioResolution>> {
        self.resolver.resolve_batch(scenarios).await
    }

    async fn accept(&self, request: &AcceptRequest) -> Result<()> {
        self.resolver.accept(request).await
    }

    async fn screenshot(&self, _request: &ScreenshotRequest) -> Result<Vec<u8>> {
        Err(Error::CaptureUnavailable("no browser in tests".into()))
    }
}

fn engine(tmp: &TempDir) -> SyncEngine<InProcessTransport> {
    let resolver = Resolver::new(SnapshotStore::new(tmp.path()), default_screenshot_sizes());
    SyncEngine::new(InProcessTransport { resolver }).with_chunk_size(Some(2))
}

/// Registry whose "Toggle" scenario renders differently once `flag` is set
fn registry(flag: Arc<AtomicBool>) -> Registry {
    let mut registry = Registry::new();
    registry
        .register("Logo", || "<img src=\"logo.png\">".to_string(), ScenarioOptions::default())
        .unwrap();
    registry
        .context("Button", |scope| {
            scope.register(
                "Primary",
                styled(|| "<button>Go</button>".to_string(), || "button { color: red; }\n".to_string()),
                ScenarioOptions::screenshot(),
            )?;
            scope.register(
                "Toggle",
                move || {
                    if flag.load(Ordering::SeqCst) {
                        "<button aria-pressed=\"true\">On</button>".to_string()
                    } else {
                        "<button aria-pressed=\"false\">Off</button>".to_string()
                    }
                },
                ScenarioOptions::default(),
            )?;
            Ok(())
        })
        .unwrap();
    registry
}

#[tokio::test]
async fn test_first_run_accept_and_rerun() {
    let tmp = TempDir::new().unwrap();
    let flag = Arc::new(AtomicBool::new(false));
    let mut registry = registry(flag.clone());
    let engine = engine(&tmp);

    engine.resolve_all(&mut registry, &DeepLink::None).await.unwrap();
    assert_eq!(registry.failing().count(), 3);
    let primary = ScenarioKey::new("Primary", Some("Button"));
    let data = registry.lookup(&primary).unwrap().screenshot_data.clone().unwrap();
    assert_eq!(data.screenshot_sizes.len(), 2);

    for key in registry.keys() {
        assert!(engine.accept(&mut registry, &key).await.unwrap());
    }
    assert!(registry.scenarios().iter().all(|s| s.status == ScenarioStatus::Accepted));
    assert!(tmp.path().join("Button/Button - Primary.css").exists());

    engine.resolve_all(&mut registry, &DeepLink::None).await.unwrap();
    assert_eq!(registry.failing().count(), 0);
    assert_eq!(prepare_ci_report(&registry), CiReport::Ok);

    flag.store(true, Ordering::SeqCst);
    engine
        .resolve_all(&mut registry, &DeepLink::scenario("Toggle", Some("Button")))
        .await
        .unwrap();
    let toggle = registry.next_failing().unwrap();
    assert_eq!(toggle.name(), "Toggle");
    assert!(toggle.diff.as_ref().unwrap().has_changes());
    assert!(toggle.screenshot_data.is_none());
}

#[tokio::test]
async fn test_run_ci_reports_failures() {
    let tmp = TempDir::new().unwrap();
    let mut registry = registry(Arc::new(AtomicBool::new(false)));
    let engine = engine(&tmp);

    engine.resolve_all(&mut registry, &DeepLink::None).await.unwrap();
    engine
        .accept(&mut registry, &ScenarioKey::root("Logo"))
        .await
        .unwrap();

    let notifier = MemoryNotifier::new();
    let report = engine.run_ci(&mut registry, &notifier).await.unwrap();
    match report {
        CiReport::NotOk { scenarios } => {
            let names: Vec<&str> = scenarios.iter().map(|s| s.name.as_str()).collect();
            assert_eq!(names, vec!["Primary", "Toggle"]);
        }
        CiReport::Ok => panic!("expected failures"),
    }
    assert_eq!(
        notifier.sent(),
        vec![r#"[{"context":"Button","name":"Primary"},{"context":"Button","name":"Toggle"}]"#.to_string()]
    );
}

async fn spawn_server(tmp: &TempDir, watcher: CiWatcher) -> String {
    let config = ServerConfig {
        snapshots_path: tmp.path().join("snapshots"),
        tmp_dir: tmp.path().join("tmp"),
        ..Default::default()
    };
    let launcher = Arc::new(PlaywrightLauncher::new("/nonexistent/node", BrowserKind::Chromium));
    let app = router(AppState::new(&config, launcher, watcher));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, app, std::future::pending()));
    format!("127.0.0.1:{}", addr.port())
}

#[tokio::test]
async fn test_http_round_trip_and_ci_channel() {
    let tmp = TempDir::new().unwrap();
    let (watcher, outcome) = CiWatcher::channel();
    let addr = spawn_server(&tmp, watcher).await;

    let transport = HttpTransport::new(format!("http://{}", addr), Duration::from_secs(10)).unwrap();
    let engine = SyncEngine::new(transport).with_environment(serde_json::json!({"runner": "tests"}));
    let mut registry = registry(Arc::new(AtomicBool::new(false)));

    engine.resolve_all(&mut registry, &DeepLink::None).await.unwrap();
    assert_eq!(registry.failing().count(), 3);

    // no browser available on the server
    let primary = ScenarioKey::new("Primary", Some("Button"));
    let result = engine.fetch_screenshots(&mut registry, &primary).await;
    assert!(matches!(result, Err(Error::CaptureUnavailable(_))));

    engine.accept(&mut registry, &primary).await.unwrap();
    let meta = std::fs::read_to_string(tmp.path().join("snapshots/lastAcceptedBrowserData.json")).unwrap();
    assert!(meta.contains("\"runner\": \"tests\""));

    let notifier = WsNotifier::new(format!("ws://{}/ci", addr));
    let report = engine.run_ci(&mut registry, &notifier).await.unwrap();
    assert!(!report.is_ok());

    let outcome = tokio::time::timeout(Duration::from_secs(10), outcome)
        .await
        .unwrap()
        .unwrap();
    match outcome {
        CiOutcome::Failed(failures) => {
            let names: Vec<&str> = failures.iter().map(|f| f.name.as_str()).collect();
            assert_eq!(names, vec!["Logo", "Toggle"]);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_server_is_sync_unavailable() {
    let transport = HttpTransport::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
    let engine = SyncEngine::new(transport);
    let mut registry = registry(Arc::new(AtomicBool::new(false)));

    let result = engine.resolve_all(&mut registry, &DeepLink::None).await;
    assert!(matches!(result, Err(Error::SyncUnavailable(_))));
    assert!(registry.scenarios().iter().all(|s| s.status == ScenarioStatus::Pending));
}
