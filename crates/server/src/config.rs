//! Server configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use shotdiff_common::{default_screenshot_sizes, Error, Result, ScreenshotSize};

/// Browser engine driven by the capture service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chromium => "chromium",
            BrowserKind::Firefox => "firefox",
            BrowserKind::Webkit => "webkit",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "chromium" => Ok(BrowserKind::Chromium),
            "firefox" => Ok(BrowserKind::Firefox),
            "webkit" => Ok(BrowserKind::Webkit),
            other => Err(Error::InvalidConfig(format!("unknown browser: {}", other))),
        }
    }
}

/// Baseline server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Root directory of the baseline store
    pub snapshots_path: PathBuf,

    /// HTTP listen address
    pub listen: String,

    /// Scratch directory for screenshot artifacts
    pub tmp_dir: PathBuf,

    /// Viewports to capture; replaces the defaults when set
    pub screenshot_sizes: Option<Vec<ScreenshotSize>>,

    /// Browser engine used for screenshots
    pub browser: BrowserKind,

    /// Node.js binary used to drive Playwright
    pub node_binary: String,

    /// Maximum accepted request body size
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            snapshots_path: PathBuf::from("snapshots"),
            listen: "127.0.0.1:5001".to_string(),
            tmp_dir: PathBuf::from("tmp"),
            screenshot_sizes: None,
            browser: BrowserKind::Chromium,
            node_binary: "node".to_string(),
            body_limit_bytes: 50 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    /// Apply `SHOTDIFF_*` environment overrides
    pub fn apply_env(mut self) -> Self {
        if let Some(v) = env_non_empty("SHOTDIFF_SNAPSHOTS_PATH") {
            self.snapshots_path = PathBuf::from(v);
        }
        if let Some(v) = env_non_empty("SHOTDIFF_ADDR") {
            self.listen = v;
        }
        if let Some(v) = env_non_empty("SHOTDIFF_TMP_DIR") {
            self.tmp_dir = PathBuf::from(v);
        }
        if let Some(v) = env_non_empty("SHOTDIFF_NODE") {
            self.node_binary = v;
        }
        self
    }

    /// Configured viewports, or the default mobile and desktop profiles
    pub fn screenshot_sizes(&self) -> Vec<ScreenshotSize> {
        match &self.screenshot_sizes {
            Some(sizes) if !sizes.is_empty() => sizes.clone(),
            _ => default_screenshot_sizes(),
        }
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.listen, "127.0.0.1:5001");
        assert_eq!(config.screenshot_sizes(), default_screenshot_sizes());
    }

    #[test]
    fn test_configured_sizes_replace_defaults() {
        let config = ServerConfig::from_toml(
            r#"
snapshots_path = "baselines"
browser = "firefox"

[[screenshot_sizes]]
width = 800
height = 600
"#,
        )
        .unwrap();
        assert_eq!(config.snapshots_path, PathBuf::from("baselines"));
        assert_eq!(config.browser, BrowserKind::Firefox);
        assert_eq!(config.screenshot_sizes(), vec![ScreenshotSize::new(800, 600)]);
        assert_eq!(config.node_binary, "node");
    }

    #[test]
    fn test_bad_browser() {
        assert!(BrowserKind::parse("lynx").is_err());
        assert!(ServerConfig::from_toml("browser = \"lynx\"").is_err());
    }
}
