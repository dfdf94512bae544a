//! HTTP surface of the baseline server

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{ws::WebSocketUpgrade, DefaultBodyLimit, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use shotdiff_common::protocol::{
    AcceptRequest, ScreenshotRequest, SnapshotsListRequest, SnapshotsListResponse, ACCEPT_ACK,
};
use shotdiff_common::{Error, PixelDiffer};

use crate::ci::CiWatcher;
use crate::config::ServerConfig;
use crate::resolve::Resolver;
use crate::screenshot::{BrowserLauncher, CaptureService};
use crate::store::SnapshotStore;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    resolver: Resolver,
    capture: Arc<CaptureService>,
    ci: Arc<CiWatcher>,
    body_limit: usize,
}

impl AppState {
    pub fn new(config: &ServerConfig, launcher: Arc<dyn BrowserLauncher>, ci: CiWatcher) -> Self {
        let store = SnapshotStore::new(&config.snapshots_path);
        let resolver = Resolver::new(store, config.screenshot_sizes());
        let capture = CaptureService::new(launcher, Arc::new(PixelDiffer), &config.tmp_dir);
        Self {
            resolver,
            capture: Arc::new(capture),
            ci: Arc::new(ci),
            body_limit: config.body_limit_bytes,
        }
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let body_limit = state.body_limit;
    Router::new()
        .route("/snapshots-list", post(snapshots_list_handler))
        .route("/snapshots", post(accept_handler))
        .route("/screenshots", post(screenshot_handler))
        .route("/meta", get(meta_handler))
        .route("/health", get(health_handler))
        .route("/ci", get(ci_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `app` on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Baseline server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("Baseline server stopped");
    Ok(())
}

/// Error response: status derived from the error kind, body `{"error": ...}`
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            Error::CaptureUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::UnknownScenarioReference { .. } => StatusCode::NOT_FOUND,
            Error::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            warn!("Request rejected: {}", self.0);
        }
        (status, Json(serde_json::json!({"error": self.0.to_string()}))).into_response()
    }
}

async fn snapshots_list_handler(
    State(state): State<AppState>,
    Json(req): Json<SnapshotsListRequest>,
) -> Result<Json<SnapshotsListResponse>, ApiError> {
    let scenarios = state.resolver.resolve_batch(req.scenarios).await?;
    Ok(Json(SnapshotsListResponse { scenarios }))
}

async fn accept_handler(
    State(state): State<AppState>,
    Json(req): Json<AcceptRequest>,
) -> Result<&'static str, ApiError> {
    state.resolver.accept(&req).await?;
    Ok(ACCEPT_ACK)
}

async fn screenshot_handler(
    State(state): State<AppState>,
    Json(req): Json<ScreenshotRequest>,
) -> Result<Response, ApiError> {
    let diffs = state
        .capture
        .capture(&req.before, &req.after, std::slice::from_ref(&req.size))
        .await?;
    let diff = diffs
        .into_iter()
        .next()
        .ok_or_else(|| Error::Capture("no diff image produced".into()))?;
    Ok(([(header::CONTENT_TYPE, "image/png")], diff.png).into_response())
}

async fn meta_handler(State(state): State<AppState>) -> Result<Json<Option<serde_json::Value>>, ApiError> {
    Ok(Json(state.resolver.store().read_meta().await?))
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": shotdiff_common::VERSION,
    }))
}

async fn ci_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let watcher = state.ci.clone();
    ws.on_upgrade(move |socket| async move { watcher.watch(socket).await })
}
