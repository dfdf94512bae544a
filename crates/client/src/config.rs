//! Client configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use shotdiff_common::{Error, Result};

/// Scenario client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the baseline server
    pub server_url: String,

    /// Scenarios per resolve round trip; one chunk when unset
    pub chunk_size: Option<usize>,

    /// WebSocket URL of the CI watcher
    pub notify_url: Option<String>,

    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5001".to_string(),
            chunk_size: None,
            notify_url: None,
            request_timeout_secs: 30,
        }
    }
}

impl ClientConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == Some(0) {
            return Err(Error::InvalidConfig("chunk_size must be at least 1".into()));
        }
        if !self.server_url.starts_with("http://") && !self.server_url.starts_with("https://") {
            return Err(Error::InvalidConfig(format!(
                "server_url must be an http(s) URL: {}",
                self.server_url
            )));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// CI watcher URL, defaulting to `/ci` on the baseline server
    pub fn notify_url(&self) -> String {
        match &self.notify_url {
            Some(url) => url.clone(),
            None => {
                let base = self.server_url.trim_end_matches('/');
                let ws = base
                    .strip_prefix("https://")
                    .map(|rest| format!("wss://{}", rest))
                    .or_else(|| base.strip_prefix("http://").map(|rest| format!("ws://{}", rest)))
                    .unwrap_or_else(|| base.to_string());
                format!("{}/ci", ws)
            }
        }
    }
}
