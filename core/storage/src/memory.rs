//! In-memory local store.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, RwLock};
use tracing::debug;

use lantern_common::{CacheNamespace, Error, ItemKind, QueueItem, RequestKey, Result};

use crate::cache::{CacheEntry, CacheHandle, CacheStore};
use crate::queue::QueueStore;

#[derive(Default)]
struct CacheState {
    namespaces: BTreeMap<CacheNamespace, HashMap<RequestKey, CacheEntry>>,
    bytes_used: usize,
}

#[derive(Default)]
struct QueueState {
    items: Vec<QueueItem>,
    last_id: u64,
}

/// In-memory store holding both the cache and the queue.
///
/// Useful for testing and for ephemeral sessions. All data is lost on drop.
/// An optional byte quota makes cache writes fail with `Error::Storage` the
/// way a full browser store would.
pub struct MemoryStore {
    cache: RwLock<CacheState>,
    queue: Mutex<QueueState>,
    quota: Option<usize>,
}

impl MemoryStore {
    /// Create a new empty store with no quota.
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(CacheState::default()),
            queue: Mutex::new(QueueState::default()),
            quota: None,
        }
    }

    /// Create a store whose cache partition refuses writes beyond `bytes`.
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            quota: Some(bytes),
            ..Self::new()
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::Storage("memory store lock poisoned".to_string())
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn open(&self, namespace: &CacheNamespace) -> Result<CacheHandle> {
        let mut state = self.cache.write().map_err(poisoned)?;
        state.namespaces.entry(namespace.clone()).or_default();
        Ok(CacheHandle::new(namespace.clone()))
    }

    async fn find(&self, namespace: &CacheNamespace) -> Result<Option<CacheHandle>> {
        let state = self.cache.read().map_err(poisoned)?;
        Ok(state
            .namespaces
            .contains_key(namespace)
            .then(|| CacheHandle::new(namespace.clone())))
    }

    async fn get(&self, handle: &CacheHandle, key: &RequestKey) -> Result<Option<CacheEntry>> {
        let state = self.cache.read().map_err(poisoned)?;
        Ok(state
            .namespaces
            .get(handle.namespace())
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn put(&self, handle: &CacheHandle, entry: CacheEntry) -> Result<()> {
        let mut state = self.cache.write().map_err(poisoned)?;

        let replaced = state
            .namespaces
            .get(handle.namespace())
            .and_then(|entries| entries.get(&entry.key))
            .map(CacheEntry::size)
            .unwrap_or(0);
        let projected = state.bytes_used - replaced + entry.size();

        if let Some(quota) = self.quota {
            if projected > quota {
                return Err(Error::Storage(format!(
                    "quota exceeded writing {} ({} of {} bytes)",
                    entry.key, projected, quota
                )));
            }
        }

        state.bytes_used = projected;
        state
            .namespaces
            .entry(handle.namespace().clone())
            .or_default()
            .insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn delete_namespace(&self, namespace: &CacheNamespace) -> Result<bool> {
        let mut state = self.cache.write().map_err(poisoned)?;
        match state.namespaces.remove(namespace) {
            Some(entries) => {
                let freed: usize = entries.values().map(CacheEntry::size).sum();
                state.bytes_used = state.bytes_used.saturating_sub(freed);
                debug!("Deleted namespace {} ({} entries)", namespace, entries.len());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_namespaces(&self) -> Result<BTreeSet<CacheNamespace>> {
        let state = self.cache.read().map_err(poisoned)?;
        Ok(state.namespaces.keys().cloned().collect())
    }

    async fn entry_count(&self, handle: &CacheHandle) -> Result<usize> {
        let state = self.cache.read().map_err(poisoned)?;
        Ok(state
            .namespaces
            .get(handle.namespace())
            .map(HashMap::len)
            .unwrap_or(0))
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn append(&self, kind: ItemKind, payload: serde_json::Value) -> Result<QueueItem> {
        let mut state = self.queue.lock().map_err(poisoned)?;
        state.last_id += 1;
        let item = QueueItem {
            id: state.last_id,
            kind,
            payload,
            enqueued_at: Utc::now(),
        };
        state.items.push(item.clone());
        Ok(item)
    }

    async fn list_all(&self) -> Result<Vec<QueueItem>> {
        let state = self.queue.lock().map_err(poisoned)?;
        Ok(state.items.clone())
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.queue.lock().map_err(poisoned)?;
        state.items.clear();
        Ok(())
    }

    async fn clear_through(&self, last_id: u64) -> Result<usize> {
        let mut state = self.queue.lock().map_err(poisoned)?;
        let before = state.items.len();
        state.items.retain(|item| item.id > last_id);
        Ok(before - state.items.len())
    }

    async fn len(&self) -> Result<usize> {
        let state = self.queue.lock().map_err(poisoned)?;
        Ok(state.items.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use lantern_common::{HeaderMap, Response, StatusCode};
    use serde_json::json;
    use std::sync::Arc;
    use url::Url;

    fn entry(url: &str, body: &'static [u8]) -> CacheEntry {
        let url = Url::parse(url).unwrap();
        CacheEntry::from_response(
            RequestKey::get(&url),
            &Response::new(StatusCode::OK, HeaderMap::new(), Bytes::from_static(body)),
        )
    }

    #[tokio::test]
    async fn test_put_get() {
        let store = MemoryStore::new();
        let handle = store.open(&CacheNamespace::new("static", "v1")).await.unwrap();
        let e = entry("http://localhost/app.js", b"console.log(1)");

        store.put(&handle, e.clone()).await.unwrap();
        let found = store.get(&handle, &e.key).await.unwrap();

        assert_eq!(found, Some(e));
    }

    #[tokio::test]
    async fn test_get_missing_is_miss() {
        let store = MemoryStore::new();
        let handle = store.open(&CacheNamespace::new("pages", "v1")).await.unwrap();
        let key = RequestKey::get(&Url::parse("http://localhost/nothing").unwrap());

        assert!(store.get(&handle, &key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_does_not_create() {
        let store = MemoryStore::new();
        let ns = CacheNamespace::new("pages", "v1");

        assert!(store.find(&ns).await.unwrap().is_none());
        assert!(store.list_namespaces().await.unwrap().is_empty());

        store.open(&ns).await.unwrap();
        assert_eq!(store.find(&ns).await.unwrap().unwrap().namespace(), &ns);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = MemoryStore::new();
        let handle = store.open(&CacheNamespace::new("pages", "v1")).await.unwrap();
        let first = entry("http://localhost/a", b"first");
        let second = entry("http://localhost/a", b"second");

        store.put(&handle, first).await.unwrap();
        store.put(&handle, second.clone()).await.unwrap();

        let found = store.get(&handle, &second.key).await.unwrap().unwrap();
        assert_eq!(found.body, Bytes::from_static(b"second"));
        assert_eq!(store.entry_count(&handle).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_namespace_idempotent() {
        let store = MemoryStore::new();
        let ns = CacheNamespace::new("images", "v1");
        store.open(&ns).await.unwrap();

        assert!(store.delete_namespace(&ns).await.unwrap());
        assert!(!store.delete_namespace(&ns).await.unwrap());
        assert!(store.list_namespaces().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_quota_exceeded_is_storage_error() {
        let store = MemoryStore::with_quota(40);
        let handle = store.open(&CacheNamespace::new("static", "v1")).await.unwrap();
        let big = entry("http://localhost/big.css", b"0123456789012345678901234567890123456789");

        let err = store.put(&handle, big.clone()).await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert!(store.get(&handle, &big.key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_queue_ids_survive_clear() {
        let store = MemoryStore::new();
        let a = store.append(ItemKind::Form, json!({"n": 1})).await.unwrap();
        store.clear().await.unwrap();
        let b = store.append(ItemKind::Form, json!({"n": 2})).await.unwrap();

        assert!(b.id > a.id);
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_clear_through_keeps_later_items() {
        let store = MemoryStore::new();
        let first = store.append(ItemKind::Form, json!(1)).await.unwrap();
        let second = store.append(ItemKind::Analytics, json!(2)).await.unwrap();
        let third = store.append(ItemKind::Form, json!(3)).await.unwrap();

        let removed = store.clear_through(second.id).await.unwrap();

        assert_eq!(removed, 2);
        let remaining = store.list_all().await.unwrap();
        assert_eq!(remaining, vec![third]);
        assert!(first.id < second.id);
    }

    #[tokio::test]
    async fn test_concurrent_appends_get_unique_ids() {
        let store = Arc::new(MemoryStore::new());
        let mut tasks = Vec::new();
        for n in 0..32 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.append(ItemKind::Analytics, json!(n)).await.unwrap().id
            }));
        }

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap());
        }
        ids.sort_unstable();
        ids.dedup();

        assert_eq!(ids.len(), 32);
        assert_eq!(store.len().await.unwrap(), 32);
    }
}
