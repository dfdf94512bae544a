//! Wire protocol between the scenario client, the baseline server and the CI watcher
//!
//! All HTTP bodies are JSON. Field names follow the browser-facing
//! convention (`snapshotCSS`, `screenshotData`, ...).

use serde::{Deserialize, Serialize};

use crate::diff::TextDiff;
use crate::error::{Error, Result};
use crate::types::{ScenarioKey, ScenarioOptions, ScreenshotData, ScreenshotSize};

/// One scenario's current rendering, sent for comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSnapshot {
    pub name: String,
    #[serde(default)]
    pub context: Option<String>,
    pub snapshot: String,
    #[serde(rename = "snapshotCSS", default, skip_serializing_if = "Option::is_none")]
    pub snapshot_css: Option<String>,
    #[serde(default)]
    pub options: ScenarioOptions,
}

impl ScenarioSnapshot {
    pub fn key(&self) -> ScenarioKey {
        ScenarioKey::new(self.name.clone(), self.context.as_deref())
    }
}

/// Body of `POST /snapshots-list`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotsListRequest {
    pub scenarios: Vec<ScenarioSnapshot>,
}

/// Server-side comparison result for one scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioResolution {
    pub name: String,
    #[serde(default)]
    pub context: Option<String>,
    pub has_diff: bool,
    /// Markup diff, absent when the markup matches its baseline
    #[serde(default)]
    pub diff: Option<TextDiff>,
    #[serde(rename = "diffCSS", default, skip_serializing_if = "Option::is_none")]
    pub diff_css: Option<TextDiff>,
    pub snapshot: String,
    #[serde(rename = "snapshotCSS", default, skip_serializing_if = "Option::is_none")]
    pub snapshot_css: Option<String>,
    /// Baseline markup the snapshot was compared against
    #[serde(default)]
    pub old_snapshot: Option<String>,
    #[serde(rename = "oldSnapshotCSS", default, skip_serializing_if = "Option::is_none")]
    pub old_snapshot_css: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_data: Option<ScreenshotData>,
}

impl ScenarioResolution {
    pub fn key(&self) -> ScenarioKey {
        ScenarioKey::new(self.name.clone(), self.context.as_deref())
    }
}

/// Response of `POST /snapshots-list`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotsListResponse {
    pub scenarios: Vec<ScenarioResolution>,
}

/// Body of `POST /snapshots`: promote a snapshot to be the new baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptRequest {
    pub name: String,
    #[serde(default)]
    pub context: Option<String>,
    pub snapshot: String,
    #[serde(rename = "snapshotCSS", default, skip_serializing_if = "Option::is_none")]
    pub snapshot_css: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_data: Option<ScreenshotData>,
    /// Fingerprint of the rendering environment, persisted as baseline metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<serde_json::Value>,
}

impl AcceptRequest {
    pub fn key(&self) -> ScenarioKey {
        ScenarioKey::new(self.name.clone(), self.context.as_deref())
    }
}

/// Acknowledgement body of `POST /snapshots`
pub const ACCEPT_ACK: &str = "OK";

/// Body of `POST /screenshots`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotRequest {
    pub before: String,
    pub after: String,
    pub size: ScreenshotSize,
}

/// One failing scenario in a CI report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CiFailure {
    pub name: String,
    pub context: Option<String>,
    pub diff: String,
}

/// Summary of a CI run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum CiReport {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "not OK")]
    NotOk { scenarios: Vec<CiFailure> },
}

impl CiReport {
    pub fn is_ok(&self) -> bool {
        matches!(self, CiReport::Ok)
    }

    /// The terminal message sent to the CI watcher
    pub fn to_message(&self) -> CiMessage {
        match self {
            CiReport::Ok => CiMessage::Ok,
            CiReport::NotOk { scenarios } => CiMessage::Failed(
                scenarios
                    .iter()
                    .map(|s| FailingScenario {
                        context: s.context.clone(),
                        name: s.name.clone(),
                    })
                    .collect(),
            ),
        }
    }
}

/// A `(context, name)` pair reported to the CI watcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailingScenario {
    pub context: Option<String>,
    pub name: String,
}

/// Terminal message on the notification channel: the literal `OK`, or a JSON
/// array of failing scenarios
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CiMessage {
    Ok,
    Failed(Vec<FailingScenario>),
}

impl CiMessage {
    pub const OK_TOKEN: &'static str = "OK";

    pub fn encode(&self) -> Result<String> {
        match self {
            CiMessage::Ok => Ok(Self::OK_TOKEN.to_string()),
            CiMessage::Failed(failures) => Ok(serde_json::to_string(failures)?),
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        if text.trim() == Self::OK_TOKEN {
            return Ok(CiMessage::Ok);
        }
        serde_json::from_str(text)
            .map(CiMessage::Failed)
            .map_err(Error::from)
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, CiMessage::Ok)
    }
}
