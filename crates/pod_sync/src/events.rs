//! User notification events
//!
//! Insertion listeners publish here; delivery (websocket fan-out, mail) is an
//! external consumer's job. The bus is an explicit instance passed by
//! reference, with subscription lifetime tied to the receiver handle.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserEventKind {
    MessageReceived,
    LikeReceived,
}

/// A notification addressed to one local user (by pubkey).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEvent {
    pub recipient: String,
    pub kind: UserEventKind,
    pub doc_id: String,
    pub time: i64,
}

/// Broadcast bus for user events.
#[derive(Debug, Clone)]
pub struct UserEventBus {
    tx: broadcast::Sender<UserEvent>,
}

impl UserEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UserEvent> {
        self.tx.subscribe()
    }

    /// Publish, dropping the event silently when nobody is subscribed.
    pub fn publish(&self, event: UserEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::debug!("user event dropped (no subscribers): {}", e);
        }
    }
}

impl Default for UserEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
