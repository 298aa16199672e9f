//! Completion notifications.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::broadcast;

/// Emitted when a session reaches its deadline without being collected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub entity_id: String,
    pub reward_amount: f64,
    pub completed_at: OffsetDateTime,
}

/// Fire-and-forget broadcast of [`CompletionEvent`]s.
///
/// Subscribers that fall behind lose the oldest events; nothing is retried and
/// the engine never waits on delivery.
#[derive(Debug, Clone)]
pub struct CompletionNotifier {
    sender: broadcast::Sender<CompletionEvent>,
}

impl CompletionNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn notify(&self, event: CompletionEvent) {
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CompletionEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
