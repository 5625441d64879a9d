//! In-process notifications for info request resolution.

use std::collections::BTreeMap;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoEvent {
    Resolved { id: i64 },
    Cancelled { id: i64 },
}

impl InfoEvent {
    pub fn id(&self) -> i64 {
        match self {
            InfoEvent::Resolved { id } | InfoEvent::Cancelled { id } => *id,
        }
    }
}

/// How an agent's wait on an info request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfoOutcome {
    Resolved(BTreeMap<String, String>),
    Cancelled,
    Shutdown,
}

/// Broadcast hub for [`InfoEvent`]s. Waiters also poll the store, so a
/// missed or lagged event only delays them until the next poll.
#[derive(Debug, Clone)]
pub struct InfoHub {
    tx: broadcast::Sender<InfoEvent>,
}

impl Default for InfoHub {
    fn default() -> Self {
        Self::new()
    }
}

impl InfoHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InfoEvent> {
        self.tx.subscribe()
    }

    /// Publish to current subscribers; a no-op when nobody is waiting.
    pub fn publish(&self, event: InfoEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let hub = InfoHub::new();
        let mut rx = hub.subscribe();
        hub.publish(InfoEvent::Resolved { id: 4 });
        assert_eq!(rx.recv().await.unwrap(), InfoEvent::Resolved { id: 4 });
    }

    #[test]
    fn test_publish_without_subscribers() {
        let hub = InfoHub::new();
        hub.publish(InfoEvent::Cancelled { id: 1 });
        assert_eq!(InfoEvent::Cancelled { id: 1 }.id(), 1);
    }
}
