//! Sync protocol between the scenario registry and the baseline server
//!
//! Per scenario: `Pending -> Resolved -> Accepted`, and back to `Resolved` on
//! the next resolve. Resolution happens chunk by chunk; a failed chunk leaves
//! everything merged by earlier chunks untouched.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use shotdiff_common::protocol::{
    AcceptRequest, CiReport, ScenarioResolution, ScenarioSnapshot, ScreenshotRequest, SnapshotsListRequest,
    SnapshotsListResponse,
};
use shotdiff_common::{Error, Result, ScenarioKey, ScreenshotSize};

use crate::config::ClientConfig;
use crate::notify::Notifier;
use crate::registry::Registry;
use crate::report::prepare_ci_report;
use crate::scheduler::{schedule, DeepLink};

/// Transport to the baseline server
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// `POST /snapshots-list`
    async fn resolve(&self, scenarios: Vec<ScenarioSnapshot>) -> Result<Vec<ScenarioResolution>>;

    /// `POST /snapshots`
    async fn accept(&self, request: &AcceptRequest) -> Result<()>;

    /// `POST /screenshots`, returning PNG bytes
    async fn screenshot(&self, request: &ScreenshotRequest) -> Result<Vec<u8>>;
}

/// HTTP transport
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::new(&config.server_url, config.request_timeout())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<T: serde::Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| Error::SyncUnavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or(text);
        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            Err(Error::CaptureUnavailable(message))
        } else {
            Err(Error::SyncUnavailable(format!("{} returned {}: {}", path, status, message)))
        }
    }
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn resolve(&self, scenarios: Vec<ScenarioSnapshot>) -> Result<Vec<ScenarioResolution>> {
        let response = self
            .post("/snapshots-list", &SnapshotsListRequest { scenarios })
            .await?;
        let body: SnapshotsListResponse = response
            .json()
            .await
            .map_err(|e| Error::SyncUnavailable(format!("invalid resolve response: {}", e)))?;
        Ok(body.scenarios)
    }

    async fn accept(&self, request: &AcceptRequest) -> Result<()> {
        self.post("/snapshots", request).await?;
        Ok(())
    }

    async fn screenshot(&self, request: &ScreenshotRequest) -> Result<Vec<u8>> {
        let response = self.post("/screenshots", request).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::SyncUnavailable(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Drives resolve and accept cycles for a registry
pub struct SyncEngine<T> {
    transport: T,
    chunk_size: Option<usize>,
    environment: Option<serde_json::Value>,
}

impl<T: SyncTransport> SyncEngine<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            chunk_size: None,
            environment: None,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: Option<usize>) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Environment fingerprint stored as baseline metadata on accept
    pub fn with_environment(mut self, environment: serde_json::Value) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Resolve every scenario, chunk by chunk in scheduled order.
    ///
    /// Stops at the first failed chunk; earlier chunks stay merged.
    pub async fn resolve_all(&self, registry: &mut Registry, deep_link: &DeepLink) -> Result<usize> {
        let chunks = schedule(&registry.keys(), deep_link, self.chunk_size);
        let total = chunks.len();
        for (i, keys) in chunks.iter().enumerate() {
            debug!("Resolving chunk {}/{} ({} scenario(s))", i + 1, total, keys.len());
            self.resolve_chunk(registry, keys).await?;
        }
        info!(
            "Resolved {} scenario(s) in {} chunk(s), {} failing",
            registry.len(),
            total,
            registry.failing().count()
        );
        Ok(total)
    }

    /// Render, send and merge one chunk
    pub async fn resolve_chunk(&self, registry: &mut Registry, keys: &[ScenarioKey]) -> Result<()> {
        let mut snapshots = Vec::with_capacity(keys.len());
        for key in keys {
            snapshots.push(registry.lookup(key)?.to_snapshot());
        }

        let resolutions = self.transport.resolve(snapshots).await.map_err(|e| match e {
            Error::SyncUnavailable(_) => e,
            other => Error::SyncUnavailable(other.to_string()),
        })?;

        for resolution in resolutions {
            merge(registry, resolution);
        }
        Ok(())
    }

    /// Promote a scenario's current snapshot to be its baseline.
    ///
    /// Returns false when no such scenario is registered. Transport failures
    /// leave the scenario untouched.
    pub async fn accept(&self, registry: &mut Registry, key: &ScenarioKey) -> Result<bool> {
        let mut request = match registry.lookup(key) {
            Ok(scenario) => scenario.to_accept_request(),
            Err(e @ Error::UnknownScenarioReference { .. }) => {
                warn!("Ignoring accept: {}", e);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        request.environment = self.environment.clone();

        self.transport.accept(&request).await?;
        registry.lookup_mut(key)?.apply_accept(&request);
        info!("Accepted {}", key);
        Ok(true)
    }

    /// Fetch the screenshot diff of a scenario at one viewport and attach it
    pub async fn fetch_screenshot(&self, registry: &mut Registry, key: &ScenarioKey, size: &ScreenshotSize) -> Result<bool> {
        let request = {
            let scenario = registry.lookup(key)?;
            let Some(data) = &scenario.screenshot_data else {
                debug!("{} has no screenshot data", key);
                return Ok(false);
            };
            ScreenshotRequest {
                before: data.before.clone(),
                after: data.after.clone(),
                size: size.clone(),
            }
        };
        let png = self.transport.screenshot(&request).await?;
        Ok(registry.lookup_mut(key)?.attach_screenshot_diff(size, png))
    }

    /// Fetch screenshot diffs at every configured viewport of a scenario
    pub async fn fetch_screenshots(&self, registry: &mut Registry, key: &ScenarioKey) -> Result<usize> {
        let sizes = match &registry.lookup(key)?.screenshot_data {
            Some(data) => data.screenshot_sizes.clone(),
            None => return Ok(0),
        };
        let mut attached = 0;
        for size in &sizes {
            if self.fetch_screenshot(registry, key, size).await? {
                attached += 1;
            }
        }
        Ok(attached)
    }

    /// Resolve everything, report the result to the CI watcher and return it
    pub async fn run_ci<N: Notifier + ?Sized>(&self, registry: &mut Registry, notifier: &N) -> Result<CiReport> {
        self.resolve_all(registry, &DeepLink::None).await?;
        let report = prepare_ci_report(registry);
        if let CiReport::NotOk { scenarios } = &report {
            for failure in scenarios {
                warn!("Snapshot differs: {} {}", failure.context.as_deref().unwrap_or("null"), failure.name);
            }
        }
        notifier.notify(&report.to_message()).await?;
        Ok(report)
    }
}

/// Merge a server resolution into the registry by key.
///
/// Returns false for resolutions of unknown scenarios, which are dropped.
pub fn merge(registry: &mut Registry, resolution: ScenarioResolution) -> bool {
    let key = resolution.key();
    match registry.get_mut(&key) {
        Some(scenario) => {
            scenario.apply_resolution(resolution);
            true
        }
        None => {
            warn!("Dropping resolution for unknown scenario {}", key);
            false
        }
    }
}
