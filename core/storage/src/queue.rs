//! Queue store trait definition.

use async_trait::async_trait;

use lantern_common::{ItemKind, QueueItem, Result};

/// Durable, ordered, append-only log of pending mutations.
///
/// Ids are assigned by the store, strictly increasing, and never reused even
/// after the queue has been cleared.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Append an item, assigning its id and enqueue timestamp.
    ///
    /// Must be safe under concurrent callers: each call yields a unique id and
    /// no insert is lost.
    ///
    /// # Errors
    /// - `Error::Storage` when the append cannot be persisted
    async fn append(&self, kind: ItemKind, payload: serde_json::Value) -> Result<QueueItem>;

    /// Every pending item in insertion order.
    async fn list_all(&self) -> Result<Vec<QueueItem>>;

    /// Remove every item.
    async fn clear(&self) -> Result<()>;

    /// Remove every item with `id <= last_id` in a single transaction.
    ///
    /// Returns the number of items removed.
    async fn clear_through(&self, last_id: u64) -> Result<usize>;

    /// Number of pending items.
    async fn len(&self) -> Result<usize>;
}
