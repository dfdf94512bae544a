//! CI notification channel
//!
//! Carries exactly one terminal message per run to the CI watcher.

use async_trait::async_trait;
use futures::SinkExt;
use parking_lot::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

use shotdiff_common::protocol::CiMessage;
use shotdiff_common::{Error, Result};

/// Sends the terminal CI message
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &CiMessage) -> Result<()>;
}

/// Sends the message as a single WebSocket text frame, then closes
#[derive(Debug, Clone)]
pub struct WsNotifier {
    url: String,
}

impl WsNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Notifier for WsNotifier {
    async fn notify(&self, message: &CiMessage) -> Result<()> {
        let text = message.encode()?;
        let (mut socket, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| Error::SyncUnavailable(format!("CI watcher at {}: {}", self.url, e)))?;
        debug!("Connected to CI watcher at {}", self.url);

        socket
            .send(Message::Text(text))
            .await
            .map_err(|e| Error::SyncUnavailable(e.to_string()))?;
        if let Err(e) = socket.close(None).await {
            debug!("CI channel close: {}", e);
        }
        info!("Reported CI result: {}", if message.is_ok() { "OK" } else { "not OK" });
        Ok(())
    }
}

/// Records messages instead of sending them
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<String>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encoded messages in send order
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(&self, message: &CiMessage) -> Result<()> {
        let text = message.encode()?;
        self.sent.lock().push(text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shotdiff_common::protocol::FailingScenario;

    #[tokio::test]
    async fn test_memory_notifier_records_encoded_messages() {
        let notifier = MemoryNotifier::new();
        notifier.notify(&CiMessage::Ok).await.unwrap();
        notifier
            .notify(&CiMessage::Failed(vec![FailingScenario {
                context: Some("Modal".into()),
                name: "Open".into(),
            }]))
            .await
            .unwrap();
        assert_eq!(
            notifier.sent(),
            vec!["OK".to_string(), r#"[{"context":"Modal","name":"Open"}]"#.to_string()]
        );
    }

    #[tokio::test]
    async fn test_ws_notifier_unreachable() {
        let notifier = WsNotifier::new("ws://127.0.0.1:1/ci");
        let result = notifier.notify(&CiMessage::Ok).await;
        assert!(matches!(result, Err(Error::SyncUnavailable(_))));
    }
}
