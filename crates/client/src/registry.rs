//! Scenario registry
//!
//! Holds every declared scenario in registration order. Scenarios are
//! declared once at startup, either at the root or inside a context scope,
//! and are never removed. Context scopes do not nest.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use shotdiff_common::markup::format_markup;
use shotdiff_common::protocol::{AcceptRequest, ScenarioResolution, ScenarioSnapshot};
use shotdiff_common::{
    Error, Result, ScenarioKey, ScenarioOptions, ScenarioStatus, ScreenshotData, ScreenshotSize, TextDiff,
};

/// Produces a scenario's markup (and optionally its style text) on demand
pub trait RenderSource: Send + Sync {
    fn render(&self) -> String;

    fn render_css(&self) -> Option<String> {
        None
    }
}

impl<F> RenderSource for F
where
    F: Fn() -> String + Send + Sync,
{
    fn render(&self) -> String {
        self()
    }
}

/// Render source with separate markup and style producers
pub struct Styled<M, S> {
    markup: M,
    style: S,
}

/// Combine a markup producer with a style producer
pub fn styled<M, S>(markup: M, style: S) -> Styled<M, S>
where
    M: Fn() -> String + Send + Sync,
    S: Fn() -> String + Send + Sync,
{
    Styled { markup, style }
}

impl<M, S> RenderSource for Styled<M, S>
where
    M: Fn() -> String + Send + Sync,
    S: Fn() -> String + Send + Sync,
{
    fn render(&self) -> String {
        (self.markup)()
    }

    fn render_css(&self) -> Option<String> {
        Some((self.style)())
    }
}

/// A declared scenario and its latest comparison state
pub struct Scenario {
    key: ScenarioKey,
    source: Arc<dyn RenderSource>,
    pub options: ScenarioOptions,
    pub status: ScenarioStatus,
    /// Snapshot sent with the last resolve
    pub snapshot: Option<String>,
    pub snapshot_css: Option<String>,
    /// Baseline the last resolve compared against
    pub previous_snapshot: Option<String>,
    pub previous_snapshot_css: Option<String>,
    pub has_diff: bool,
    pub diff: Option<TextDiff>,
    pub diff_css: Option<TextDiff>,
    pub screenshot_data: Option<ScreenshotData>,
}

impl fmt::Debug for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenario")
            .field("key", &self.key)
            .field("options", &self.options)
            .field("status", &self.status)
            .field("has_diff", &self.has_diff)
            .finish_non_exhaustive()
    }
}

impl Scenario {
    fn new(key: ScenarioKey, source: Arc<dyn RenderSource>, options: ScenarioOptions) -> Self {
        Self {
            key,
            source,
            options,
            status: ScenarioStatus::Pending,
            snapshot: None,
            snapshot_css: None,
            previous_snapshot: None,
            previous_snapshot_css: None,
            has_diff: false,
            diff: None,
            diff_css: None,
            screenshot_data: None,
        }
    }

    pub fn key(&self) -> &ScenarioKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn context(&self) -> Option<&str> {
        self.key.context.as_deref()
    }

    /// Render the scenario. Never cached.
    pub fn get_element(&self) -> String {
        self.source.render()
    }

    /// Render and normalise the scenario's markup
    pub fn get_snapshot(&self) -> String {
        format_markup(&self.get_element())
    }

    /// Style text, only for scenarios comparing styles
    pub fn get_snapshot_css(&self) -> Option<String> {
        if self.options.css_enabled() {
            self.source.render_css()
        } else {
            None
        }
    }

    /// Fresh rendering to send for comparison
    pub fn to_snapshot(&self) -> ScenarioSnapshot {
        ScenarioSnapshot {
            name: self.key.name.clone(),
            context: self.key.context.clone(),
            snapshot: self.get_snapshot(),
            snapshot_css: self.get_snapshot_css(),
            options: self.options,
        }
    }

    /// Request promoting the last resolved snapshot, rendering one if the
    /// scenario was never resolved
    pub fn to_accept_request(&self) -> AcceptRequest {
        let (snapshot, snapshot_css) = match &self.snapshot {
            Some(snapshot) => (snapshot.clone(), self.snapshot_css.clone()),
            None => (self.get_snapshot(), self.get_snapshot_css()),
        };
        AcceptRequest {
            name: self.key.name.clone(),
            context: self.key.context.clone(),
            snapshot,
            snapshot_css,
            screenshot_data: self.screenshot_data.clone(),
            environment: None,
        }
    }

    /// Replace all comparison state with a server resolution
    pub fn apply_resolution(&mut self, resolution: ScenarioResolution) {
        self.snapshot = Some(resolution.snapshot);
        self.snapshot_css = resolution.snapshot_css;
        self.previous_snapshot = resolution.old_snapshot;
        self.previous_snapshot_css = resolution.old_snapshot_css;
        self.has_diff = resolution.has_diff;
        self.diff = resolution.diff;
        self.diff_css = resolution.diff_css;
        self.screenshot_data = resolution.screenshot_data;
        self.status = ScenarioStatus::Resolved;
    }

    /// Record that `accepted` is now the baseline
    pub fn apply_accept(&mut self, accepted: &AcceptRequest) {
        self.snapshot = Some(accepted.snapshot.clone());
        self.snapshot_css = accepted.snapshot_css.clone();
        self.previous_snapshot = Some(accepted.snapshot.clone());
        self.previous_snapshot_css = accepted.snapshot_css.clone();
        self.has_diff = false;
        self.diff = None;
        self.diff_css = None;
        self.screenshot_data = None;
        self.status = ScenarioStatus::Accepted;
    }

    /// Store a fetched screenshot diff image for `size`.
    ///
    /// Returns false when the scenario has no screenshot data or `size` is not
    /// one of its viewports.
    pub fn attach_screenshot_diff(&mut self, size: &ScreenshotSize, png: Vec<u8>) -> bool {
        let Some(data) = self.screenshot_data.as_mut() else {
            return false;
        };
        match data.screenshot_sizes.iter().position(|s| s == size) {
            Some(index) => {
                data.diffs.insert(index, png);
                true
            }
            None => false,
        }
    }
}

/// Ordered collection of declared scenarios
#[derive(Default)]
pub struct Registry {
    scenarios: Vec<Scenario>,
    index: HashMap<ScenarioKey, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a root scenario
    pub fn register<R>(&mut self, name: impl Into<String>, source: R, options: ScenarioOptions) -> Result<&Scenario>
    where
        R: RenderSource + 'static,
    {
        self.insert(ScenarioKey::root(name), Arc::new(source), options)
    }

    /// Declare scenarios inside a context.
    ///
    /// Every scenario registered through the scope is stamped with `name`.
    pub fn context<F>(&mut self, name: impl Into<String>, declare: F) -> Result<()>
    where
        F: FnOnce(&mut ContextScope<'_>) -> Result<()>,
    {
        let mut scope = ContextScope {
            registry: self,
            context: name.into(),
        };
        declare(&mut scope)
    }

    fn insert(&mut self, key: ScenarioKey, source: Arc<dyn RenderSource>, options: ScenarioOptions) -> Result<&Scenario> {
        if self.index.contains_key(&key) {
            return Err(Error::DuplicateScenario {
                name: key.name,
                context: key.context,
            });
        }
        debug!("Registered scenario {}", key);
        let position = self.scenarios.len();
        self.index.insert(key.clone(), position);
        self.scenarios.push(Scenario::new(key, source, options));
        Ok(&self.scenarios[position])
    }

    /// All scenarios in registration order
    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    pub fn keys(&self) -> Vec<ScenarioKey> {
        self.scenarios.iter().map(|s| s.key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    pub fn get(&self, key: &ScenarioKey) -> Option<&Scenario> {
        self.index.get(key).map(|&i| &self.scenarios[i])
    }

    pub fn get_mut(&mut self, key: &ScenarioKey) -> Option<&mut Scenario> {
        match self.index.get(key) {
            Some(&i) => Some(&mut self.scenarios[i]),
            None => None,
        }
    }

    /// Like [`Registry::get`], failing with `UnknownScenarioReference`
    pub fn lookup(&self, key: &ScenarioKey) -> Result<&Scenario> {
        self.get(key).ok_or_else(|| unknown(key))
    }

    pub fn lookup_mut(&mut self, key: &ScenarioKey) -> Result<&mut Scenario> {
        match self.index.get(key) {
            Some(&i) => Ok(&mut self.scenarios[i]),
            None => Err(unknown(key)),
        }
    }

    /// First scenario in registration order that differs from its baseline
    pub fn next_failing(&self) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.has_diff)
    }

    pub fn failing(&self) -> impl Iterator<Item = &Scenario> {
        self.scenarios.iter().filter(|s| s.has_diff)
    }
}

fn unknown(key: &ScenarioKey) -> Error {
    Error::UnknownScenarioReference {
        name: key.name.clone(),
        context: key.context.clone(),
    }
}

/// Registration handle for one context
pub struct ContextScope<'a> {
    registry: &'a mut Registry,
    context: String,
}

impl ContextScope<'_> {
    pub fn name(&self) -> &str {
        &self.context
    }

    pub fn register<R>(&mut self, name: impl Into<String>, source: R, options: ScenarioOptions) -> Result<&Scenario>
    where
        R: RenderSource + 'static,
    {
        let key = ScenarioKey::new(name, Some(&self.context));
        self.registry.insert(key, Arc::new(source), options)
    }
}
