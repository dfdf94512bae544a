//! Comparison and acceptance of scenario snapshots against stored baselines

use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, info};

use shotdiff_common::markup::build_screenshot_page;
use shotdiff_common::protocol::{AcceptRequest, ScenarioResolution, ScenarioSnapshot};
use shotdiff_common::{Result, ScreenshotData, ScreenshotSize, SnapshotKind, TextDiffer, TokenDiffer};

use crate::store::SnapshotStore;

/// Resolves snapshots against the baseline store
#[derive(Clone)]
pub struct Resolver {
    store: SnapshotStore,
    differ: Arc<dyn TextDiffer>,
    screenshot_sizes: Vec<ScreenshotSize>,
}

impl Resolver {
    pub fn new(store: SnapshotStore, screenshot_sizes: Vec<ScreenshotSize>) -> Self {
        Self::with_differ(store, Arc::new(TokenDiffer), screenshot_sizes)
    }

    pub fn with_differ(
        store: SnapshotStore,
        differ: Arc<dyn TextDiffer>,
        screenshot_sizes: Vec<ScreenshotSize>,
    ) -> Self {
        Self {
            store,
            differ,
            screenshot_sizes,
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn screenshot_sizes(&self) -> &[ScreenshotSize] {
        &self.screenshot_sizes
    }

    /// Compare one snapshot with its baseline.
    ///
    /// A missing baseline is a difference. Style text only takes part when the
    /// scenario enables it.
    pub async fn resolve(&self, snapshot: ScenarioSnapshot) -> Result<ScenarioResolution> {
        let key = snapshot.key();
        let old_snapshot = self.store.read(&key, SnapshotKind::Markup).await?;
        let markup_changed = old_snapshot.as_deref() != Some(snapshot.snapshot.as_str());
        let diff = markup_changed.then(|| {
            self.differ.diff(
                SnapshotKind::Markup,
                old_snapshot.as_deref().unwrap_or(""),
                &snapshot.snapshot,
            )
        });

        let mut old_snapshot_css = None;
        let mut diff_css = None;
        let mut style_changed = false;
        if snapshot.options.css_enabled() {
            old_snapshot_css = self.store.read(&key, SnapshotKind::Style).await?;
            style_changed = old_snapshot_css != snapshot.snapshot_css;
            if style_changed {
                diff_css = Some(self.differ.diff(
                    SnapshotKind::Style,
                    old_snapshot_css.as_deref().unwrap_or(""),
                    snapshot.snapshot_css.as_deref().unwrap_or(""),
                ));
            }
        }

        let has_diff = markup_changed || style_changed;
        let screenshot_data = (snapshot.options.screenshot_enabled() && has_diff).then(|| {
            ScreenshotData::new(
                build_screenshot_page(old_snapshot.as_deref(), old_snapshot_css.as_deref()),
                build_screenshot_page(Some(&snapshot.snapshot), snapshot.snapshot_css.as_deref()),
                self.screenshot_sizes.clone(),
            )
        });

        debug!("Resolved {} (diff: {})", key, has_diff);

        Ok(ScenarioResolution {
            name: snapshot.name,
            context: snapshot.context,
            has_diff,
            diff,
            diff_css,
            snapshot: snapshot.snapshot,
            snapshot_css: snapshot.snapshot_css,
            old_snapshot,
            old_snapshot_css,
            screenshot_data,
        })
    }

    /// Resolve a batch concurrently. Results keep the request order.
    pub async fn resolve_batch(&self, snapshots: Vec<ScenarioSnapshot>) -> Result<Vec<ScenarioResolution>> {
        let count = snapshots.len();
        let resolutions = try_join_all(snapshots.into_iter().map(|s| self.resolve(s))).await?;
        let failing = resolutions.iter().filter(|r| r.has_diff).count();
        info!("Resolved {} scenario(s), {} with differences", count, failing);
        Ok(resolutions)
    }

    /// Promote a snapshot to be the new baseline
    pub async fn accept(&self, request: &AcceptRequest) -> Result<()> {
        let key = request.key();
        self.store
            .write_baseline(&key, &request.snapshot, request.snapshot_css.as_deref())
            .await?;
        if let Some(environment) = &request.environment {
            self.store.write_meta(environment).await?;
        }
        Ok(())
    }
}
