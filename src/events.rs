//! Updates pushed to the caller while an agent operation runs.

use tokio::sync::mpsc;

use crate::sandbox::OutputChannel;
use crate::stream::{MessageKind, StreamEvent, StreamingMessage};

/// An update delivered to the caller's sink.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentUpdate {
    /// Lifecycle notification synthesized by the orchestrator.
    Status(StreamingMessage),
    /// Output extracted from one of the command's channels.
    Output {
        channel: OutputChannel,
        event: StreamEvent,
    },
    /// A failure reported while the operation was running.
    Error(String),
}

/// Optional caller-side receiver of [`AgentUpdate`]s.
///
/// Sending never fails the operation: a dropped receiver only means nobody is
/// listening anymore.
#[derive(Debug, Clone, Default)]
pub struct UpdateSink {
    tx: Option<mpsc::Sender<AgentUpdate>>,
}

impl UpdateSink {
    pub fn new(tx: mpsc::Sender<AgentUpdate>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that discards everything.
    pub fn none() -> Self {
        Self { tx: None }
    }

    pub fn is_attached(&self) -> bool {
        self.tx.is_some()
    }

    pub async fn send(&self, update: AgentUpdate) {
        if let Some(tx) = &self.tx {
            if tx.send(update).await.is_err() {
                tracing::debug!("update receiver dropped");
            }
        }
    }

    pub async fn status(&self, message: StreamingMessage) {
        self.send(AgentUpdate::Status(message)).await;
    }

    /// Sends a `git` progress notification.
    pub async fn git(&self, text: impl Into<String>) {
        self.status(StreamingMessage::new(MessageKind::Git).with_output(text))
            .await;
    }

    pub async fn error(&self, text: impl Into<String>) {
        self.send(AgentUpdate::Error(text.into())).await;
    }
}

impl From<mpsc::Sender<AgentUpdate>> for UpdateSink {
    fn from(tx: mpsc::Sender<AgentUpdate>) -> Self {
        Self::new(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn git_notifications_carry_output() {
        let (tx, mut rx) = mpsc::channel(4);
        let sink = UpdateSink::new(tx);

        sink.git("Switched to branch 'main'").await;

        match rx.recv().await {
            Some(AgentUpdate::Status(msg)) => {
                assert_eq!(msg.kind, MessageKind::Git);
                assert_eq!(msg.output.as_deref(), Some("Switched to branch 'main'"));
                assert!(msg.timestamp.is_some());
            }
            other => panic!("expected git status, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn detached_sink_discards_updates() {
        let sink = UpdateSink::none();
        assert!(!sink.is_attached());
        sink.error("ignored").await;
    }

    #[tokio::test]
    async fn dropped_receiver_is_tolerated() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sink = UpdateSink::from(tx);
        sink.git("nobody listening").await;
    }
}
