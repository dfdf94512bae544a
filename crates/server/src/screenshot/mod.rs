//! Screenshot capture service
//!
//! Each comparison request walks the same pipeline:
//!
//! ```text
//! Idle -> SessionOpen -> Rendering(before) -> Rendering(after) -> Diffing -> Cleanup -> Idle
//!                        \_____________ repeated per viewport _____________/
//! ```
//!
//! A request owns one browser session for its whole duration, and requests
//! are serialized so sessions never interleave. All raster artifacts live in a
//! per-request scratch directory that is removed on every exit path,
//! including when the request future is dropped mid-flight.

pub mod playwright;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use shotdiff_common::diff::{ImageDiffer, PixelDiffSummary};
use shotdiff_common::markup::data_url;
use shotdiff_common::{Error, Result, ScreenshotSize};

pub use playwright::PlaywrightLauncher;

/// Pipeline stage, logged on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStage {
    Idle,
    SessionOpen,
    RenderingBefore,
    RenderingAfter,
    Diffing,
    Cleanup,
}

/// An open browser automation session
#[async_trait]
pub trait BrowserSession: Send {
    /// Render `url` at `size` and write a PNG to `output`
    async fn screenshot(&mut self, url: &str, size: &ScreenshotSize, output: &Path) -> Result<()>;

    /// End the session
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Starts browser sessions
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Open a session, failing with [`Error::CaptureUnavailable`] when no
    /// browser can be started
    async fn open(&self) -> Result<Box<dyn BrowserSession>>;
}

/// Diff image produced for one viewport
#[derive(Debug, Clone)]
pub struct CapturedDiff {
    pub size: ScreenshotSize,
    pub png: Vec<u8>,
    pub summary: PixelDiffSummary,
}

/// Renders before/after pages and diffs them
pub struct CaptureService {
    launcher: Arc<dyn BrowserLauncher>,
    differ: Arc<dyn ImageDiffer>,
    tmp_root: PathBuf,
    session_lock: Mutex<()>,
}

impl CaptureService {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        differ: Arc<dyn ImageDiffer>,
        tmp_root: impl AsRef<Path>,
    ) -> Self {
        Self {
            launcher,
            differ,
            tmp_root: tmp_root.as_ref().to_path_buf(),
            session_lock: Mutex::new(()),
        }
    }

    /// Scratch directory under which per-request artifacts are created
    pub fn tmp_root(&self) -> &Path {
        &self.tmp_root
    }

    /// Capture `before` and `after` at every size and return one diff image per size.
    ///
    /// Sizes are processed in order; the first failure aborts the request.
    pub async fn capture(
        &self,
        before_html: &str,
        after_html: &str,
        sizes: &[ScreenshotSize],
    ) -> Result<Vec<CapturedDiff>> {
        let _checkout = self.session_lock.lock().await;

        tokio::fs::create_dir_all(&self.tmp_root).await?;
        let workdir = tempfile::Builder::new()
            .prefix("capture-")
            .tempdir_in(&self.tmp_root)?;

        let mut session = self.launcher.open().await?;
        transition(CaptureStage::SessionOpen);

        let before_url = data_url(before_html);
        let after_url = data_url(after_html);
        let result = self
            .capture_sizes(session.as_mut(), workdir.path(), &before_url, &after_url, sizes)
            .await;

        transition(CaptureStage::Cleanup);
        if let Err(e) = session.close().await {
            warn!("Failed to close browser session: {}", e);
        }
        if let Err(e) = workdir.close() {
            warn!("Failed to remove screenshot artifacts: {}", e);
        }
        transition(CaptureStage::Idle);

        if let Ok(diffs) = &result {
            info!("Captured {} screenshot diff(s)", diffs.len());
        }
        result
    }

    async fn capture_sizes(
        &self,
        session: &mut dyn BrowserSession,
        workdir: &Path,
        before_url: &str,
        after_url: &str,
        sizes: &[ScreenshotSize],
    ) -> Result<Vec<CapturedDiff>> {
        let mut diffs = Vec::with_capacity(sizes.len());

        for (i, size) in sizes.iter().enumerate() {
            let before_path = workdir.join(format!("{}-before.png", i));
            let after_path = workdir.join(format!("{}-after.png", i));
            let diff_path = workdir.join(format!("{}-diff.png", i));

            transition(CaptureStage::RenderingBefore);
            session.screenshot(before_url, size, &before_path).await?;
            transition(CaptureStage::RenderingAfter);
            session.screenshot(after_url, size, &after_path).await?;

            transition(CaptureStage::Diffing);
            let differ = self.differ.clone();
            let output = diff_path.clone();
            let summary = tokio::task::spawn_blocking(move || {
                differ.diff_images(&before_path, &after_path, &output)
            })
            .await
            .map_err(|e| Error::Capture(format!("diff task failed: {}", e)))??;

            let png = tokio::fs::read(&diff_path).await?;
            debug!(
                "Viewport {}: {:.2}% pixels differ",
                size, summary.diff_percent
            );
            diffs.push(CapturedDiff {
                size: size.clone(),
                png,
                summary,
            });
        }

        Ok(diffs)
    }
}

fn transition(stage: CaptureStage) {
    debug!("Capture stage: {:?}", stage);
}
