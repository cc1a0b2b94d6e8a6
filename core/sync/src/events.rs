//! Sync completion events for connected listeners.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Capacity of the listener channel; slow listeners drop the oldest events.
const EVENT_CAPACITY: usize = 64;

/// Event published to listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncEvent {
    /// A bulk write was accepted and committed locally.
    SyncCompleted {
        synced: usize,
        timestamp: DateTime<Utc>,
    },
}

/// Publish hook shared by every listener.
#[derive(Debug, Clone)]
pub struct SyncEvents {
    tx: broadcast::Sender<SyncEvent>,
}

impl SyncEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Publish to every current listener. Returns how many received it.
    pub fn publish(&self, event: SyncEvent) -> usize {
        match self.tx.send(event) {
            Ok(listeners) => listeners,
            Err(_) => {
                debug!("Sync event dropped: no listeners");
                0
            }
        }
    }
}

impl Default for SyncEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_listener_receives() {
        let events = SyncEvents::new();
        let mut a = events.subscribe();
        let mut b = events.subscribe();
        let event = SyncEvent::SyncCompleted {
            synced: 3,
            timestamp: Utc::now(),
        };

        assert_eq!(events.publish(event.clone()), 2);
        assert_eq!(a.recv().await.unwrap(), event);
        assert_eq!(b.recv().await.unwrap(), event);
    }

    #[test]
    fn test_publish_without_listeners() {
        let events = SyncEvents::new();
        let sent = events.publish(SyncEvent::SyncCompleted {
            synced: 0,
            timestamp: Utc::now(),
        });
        assert_eq!(sent, 0);
    }

    #[test]
    fn test_event_json() {
        let value = serde_json::to_value(SyncEvent::SyncCompleted {
            synced: 1,
            timestamp: Utc::now(),
        })
        .unwrap();
        assert_eq!(value["type"], "SYNC_COMPLETED");
        assert!(value["timestamp"].is_string());
    }
}
