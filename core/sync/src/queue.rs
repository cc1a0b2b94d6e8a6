//! Producer-facing offline queue.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use lantern_common::{ItemKind, QueueItem, Result};
use lantern_storage::QueueStore;

/// Durable queue of mutations awaiting sync.
///
/// `enqueue` never looks at connectivity; it succeeds or fails purely on
/// local storage.
#[derive(Clone)]
pub struct OfflineQueue {
    store: Arc<dyn QueueStore>,
}

impl OfflineQueue {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self { store }
    }

    /// Append an item and return its id.
    ///
    /// # Errors
    /// - `Error::Storage` when the write cannot be persisted
    pub async fn enqueue(&self, kind: ItemKind, payload: Value) -> Result<u64> {
        let item = self.store.append(kind, payload).await?;
        debug!("Queued {} item {}", item.kind, item.id);
        Ok(item.id)
    }

    /// Queue a form submission.
    pub async fn enqueue_form(&self, payload: Value) -> Result<u64> {
        self.enqueue(ItemKind::Form, payload).await
    }

    /// Queue an analytics event as `{action, data}`.
    pub async fn enqueue_analytics(&self, action: &str, data: Value) -> Result<u64> {
        self.enqueue(ItemKind::Analytics, json!({ "action": action, "data": data }))
            .await
    }

    /// Every pending item in insertion order.
    pub async fn list_all(&self) -> Result<Vec<QueueItem>> {
        self.store.list_all().await
    }

    /// Remove every item, unconditionally.
    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }

    /// Remove the acknowledged prefix `id <= last_id`.
    pub async fn clear_through(&self, last_id: u64) -> Result<usize> {
        self.store.clear_through(last_id).await
    }

    pub async fn len(&self) -> Result<usize> {
        self.store.len().await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lantern_storage::MemoryStore;

    fn queue() -> OfflineQueue {
        OfflineQueue::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_enqueue_then_list() {
        let queue = queue();
        let payload = json!({ "name": "Ada", "message": "hello" });

        let id = queue.enqueue_form(payload.clone()).await.unwrap();
        let items = queue.list_all().await.unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, id);
        assert_eq!(items[0].kind, ItemKind::Form);
        assert_eq!(items[0].payload, payload);
    }

    #[tokio::test]
    async fn test_ids_are_fresh_across_clear() {
        let queue = queue();
        let first = queue.enqueue_form(json!({})).await.unwrap();
        queue.clear().await.unwrap();
        let second = queue.enqueue_form(json!({})).await.unwrap();

        assert!(second > first);
        assert_eq!(queue.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_analytics_shape() {
        let queue = queue();
        queue
            .enqueue_analytics("page_view", json!({ "path": "/" }))
            .await
            .unwrap();

        let items = queue.list_all().await.unwrap();
        assert_eq!(items[0].kind, ItemKind::Analytics);
        assert_eq!(items[0].payload["action"], "page_view");
        assert_eq!(items[0].payload["data"]["path"], "/");
    }

    #[tokio::test]
    async fn test_concurrent_enqueue_keeps_every_item() {
        let queue = queue();
        let mut tasks = Vec::new();
        for i in 0..32 {
            let queue = queue.clone();
            tasks.push(tokio::spawn(async move {
                queue.enqueue_form(json!({ "n": i })).await.unwrap()
            }));
        }

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap());
        }
        ids.sort_unstable();
        ids.dedup();

        assert_eq!(ids.len(), 32);
        assert_eq!(queue.len().await.unwrap(), 32);
    }
}
