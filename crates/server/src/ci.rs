//! CI watcher
//!
//! In CI mode the scenario client opens `/ci` once per run and sends a single
//! terminal message: `OK`, or a JSON array of failing `{context, name}`
//! records. The first message decides the outcome; later ones are ignored.

use axum::extract::ws::{Message, WebSocket};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use shotdiff_common::protocol::{CiMessage, FailingScenario};

/// Result of a CI run as reported by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CiOutcome {
    Passed,
    Failed(Vec<FailingScenario>),
    /// The message could not be understood
    Malformed(String),
    /// The runner went away without sending a result
    Disconnected,
}

impl CiOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, CiOutcome::Passed)
    }

    /// Process exit code for this outcome
    pub fn exit_code(&self) -> u8 {
        if self.passed() {
            0
        } else {
            1
        }
    }
}

/// Receives the terminal CI message and hands the outcome to whoever awaits it
pub struct CiWatcher {
    outcome: Mutex<Option<oneshot::Sender<CiOutcome>>>,
}

impl CiWatcher {
    /// A watcher plus the receiving end of its single outcome
    pub fn channel() -> (Self, oneshot::Receiver<CiOutcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                outcome: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// A watcher nobody listens to; outcomes are only logged
    pub fn detached() -> Self {
        Self {
            outcome: Mutex::new(None),
        }
    }

    /// Interpret one terminal message, log it and publish the outcome
    pub fn handle_message(&self, text: &str) -> CiOutcome {
        let outcome = match CiMessage::parse(text) {
            Ok(CiMessage::Ok) => {
                info!("All scenarios match their baselines");
                CiOutcome::Passed
            }
            Ok(CiMessage::Failed(failures)) => {
                error!("Failed scenarios:");
                for failure in &failures {
                    error!("- {} {}", failure.context.as_deref().unwrap_or("null"), failure.name);
                }
                CiOutcome::Failed(failures)
            }
            Err(e) => {
                error!("Malformed CI message: {}", e);
                CiOutcome::Malformed(e.to_string())
            }
        };
        self.publish(outcome.clone());
        outcome
    }

    fn publish(&self, outcome: CiOutcome) {
        match self.outcome.lock().take() {
            Some(tx) => {
                if tx.send(outcome).is_err() {
                    debug!("CI outcome receiver is gone");
                }
            }
            None => debug!("CI outcome already published or not awaited"),
        }
    }

    /// Serve one watcher connection until its terminal message arrives
    pub async fn watch(&self, mut socket: WebSocket) {
        info!("CI runner connected");
        let mut reported = false;
        while let Some(msg) = socket.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    self.handle_message(&text);
                    reported = true;
                    break;
                }
                Ok(Message::Binary(bytes)) => {
                    self.handle_message(&String::from_utf8_lossy(&bytes));
                    reported = true;
                    break;
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    warn!("CI channel error: {}", e);
                    break;
                }
            }
        }
        if !reported {
            warn!("CI runner left without a result");
            self.publish(CiOutcome::Disconnected);
        }
        let _ = socket.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ok_message_passes() {
        let (watcher, rx) = CiWatcher::channel();
        assert_eq!(watcher.handle_message("OK"), CiOutcome::Passed);
        assert_eq!(rx.await.unwrap().exit_code(), 0);
    }

    #[tokio::test]
    async fn test_failures_are_reported() {
        let (watcher, rx) = CiWatcher::channel();
        watcher.handle_message(r#"[{"context":"Modal","name":"Open"},{"context":null,"name":"Alone"}]"#);
        match rx.await.unwrap() {
            CiOutcome::Failed(failures) => {
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[0].context.as_deref(), Some("Modal"));
                assert_eq!(failures[1].context, None);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_message_fails() {
        let (watcher, rx) = CiWatcher::channel();
        watcher.handle_message("{not json");
        let outcome = rx.await.unwrap();
        assert!(matches!(outcome, CiOutcome::Malformed(_)));
        assert_eq!(outcome.exit_code(), 1);
    }

    #[test]
    fn test_only_first_outcome_is_published() {
        let (watcher, mut rx) = CiWatcher::channel();
        watcher.handle_message("[]");
        watcher.handle_message("OK");
        assert_eq!(rx.try_recv().unwrap(), CiOutcome::Failed(vec![]));
    }

    #[test]
    fn test_detached_watcher_only_logs() {
        let watcher = CiWatcher::detached();
        assert!(watcher.handle_message("OK").passed());
    }
}
