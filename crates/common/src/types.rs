//! Core types for shotdiff

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identity of a scenario: its name plus the optional context it was declared in
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScenarioKey {
    pub name: String,
    #[serde(default)]
    pub context: Option<String>,
}

impl ScenarioKey {
    pub fn new(name: impl Into<String>, context: Option<&str>) -> Self {
        Self {
            name: name.into(),
            context: context.map(str::to_string),
        }
    }

    /// A scenario declared outside any context
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            context: None,
        }
    }

    pub fn matches(&self, name: &str, context: Option<&str>) -> bool {
        self.name == name && self.context.as_deref() == context
    }
}

impl fmt::Display for ScenarioKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(context) => write!(f, "{} {}", context, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Per-scenario comparison options.
///
/// Screenshot diffing needs the style snapshot, so `screenshot_enabled`
/// always implies `css_enabled`; both constructors and deserialization
/// enforce it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawScenarioOptions")]
pub struct ScenarioOptions {
    #[serde(rename = "css")]
    css_enabled: bool,
    #[serde(rename = "screenshot")]
    screenshot_enabled: bool,
}

#[derive(Deserialize)]
struct RawScenarioOptions {
    #[serde(default)]
    css: bool,
    #[serde(default)]
    screenshot: bool,
}

impl From<RawScenarioOptions> for ScenarioOptions {
    fn from(raw: RawScenarioOptions) -> Self {
        Self::new(raw.css, raw.screenshot)
    }
}

impl ScenarioOptions {
    pub fn new(css: bool, screenshot: bool) -> Self {
        Self {
            css_enabled: css || screenshot,
            screenshot_enabled: screenshot,
        }
    }

    pub fn css() -> Self {
        Self::new(true, false)
    }

    pub fn screenshot() -> Self {
        Self::new(true, true)
    }

    pub fn css_enabled(&self) -> bool {
        self.css_enabled
    }

    pub fn screenshot_enabled(&self) -> bool {
        self.screenshot_enabled
    }
}

/// What a baseline file holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    Markup,
    Style,
}

impl SnapshotKind {
    /// File extension of baselines of this kind
    pub fn extension(&self) -> &'static str {
        match self {
            SnapshotKind::Markup => "html",
            SnapshotKind::Style => "css",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SnapshotKind::Markup => "HTML",
            SnapshotKind::Style => "CSS",
        }
    }
}

/// Scenario lifecycle state on the client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioStatus {
    #[default]
    Pending,
    Resolved,
    Accepted,
}

/// A viewport to capture screenshots at
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScreenshotSize {
    pub width: u32,
    pub height: u32,
    /// Optional device name, e.g. "iPhone SE"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl ScreenshotSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

impl fmt::Display for ScreenshotSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)?;
        if let Some(alias) = &self.alias {
            write!(f, " ({})", alias)?;
        }
        Ok(())
    }
}

/// Viewports used when none are configured
pub fn default_screenshot_sizes() -> Vec<ScreenshotSize> {
    vec![
        ScreenshotSize::new(320, 568).with_alias("iPhone SE"),
        ScreenshotSize::new(1024, 768),
    ]
}

/// Pages to capture for a scenario whose snapshot differs from its baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotData {
    /// Baseline rendered as a complete HTML document
    pub before: String,

    /// Current snapshot rendered as a complete HTML document
    pub after: String,

    pub screenshot_sizes: Vec<ScreenshotSize>,

    /// Fetched diff images, keyed by index into `screenshot_sizes`
    #[serde(skip)]
    pub diffs: BTreeMap<usize, Vec<u8>>,
}

impl ScreenshotData {
    pub fn new(before: String, after: String, screenshot_sizes: Vec<ScreenshotSize>) -> Self {
        Self {
            before,
            after,
            screenshot_sizes,
            diffs: BTreeMap::new(),
        }
    }

    /// Diff image captured at `size`, if it has been fetched
    pub fn diff_for(&self, size: &ScreenshotSize) -> Option<&[u8]> {
        let index = self.screenshot_sizes.iter().position(|s| s == size)?;
        self.diffs.get(&index).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screenshot_implies_css() {
        let options = ScenarioOptions::new(false, true);
        assert!(options.css_enabled());
        assert!(options.screenshot_enabled());

        let parsed: ScenarioOptions = serde_json::from_str(r#"{"screenshot": true}"#).unwrap();
        assert_eq!(parsed, options);

        let parsed: ScenarioOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, ScenarioOptions::default());
    }

    #[test]
    fn test_options_wire_names() {
        let json = serde_json::to_value(ScenarioOptions::css()).unwrap();
        assert_eq!(json, serde_json::json!({"css": true, "screenshot": false}));
    }

    #[test]
    fn test_key_display() {
        assert_eq!(ScenarioKey::new("Open", Some("Modal")).to_string(), "Modal Open");
        assert_eq!(ScenarioKey::root("Button").to_string(), "Button");
    }

    #[test]
    fn test_default_sizes() {
        let sizes = default_screenshot_sizes();
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[0].to_string(), "320x568 (iPhone SE)");
        assert_eq!(sizes[1].to_string(), "1024x768");
    }
}
