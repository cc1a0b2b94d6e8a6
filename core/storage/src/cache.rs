//! Cache store trait definition.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use lantern_common::{CacheNamespace, HeaderMap, RequestKey, Response, Result, StatusCode};

/// A stored response.
///
/// A fresh network fetch produces a new entry; entries are never mutated in
/// place once handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: RequestKey,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Snapshot a response for storage under `key`.
    pub fn from_response(key: RequestKey, response: &Response) -> Self {
        Self {
            key,
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
            stored_at: Utc::now(),
        }
    }

    /// Rebuild the response this entry was taken from.
    pub fn to_response(&self) -> Response {
        Response::new(self.status, self.headers.clone(), self.body.clone())
    }

    /// Approximate footprint used for quota accounting.
    pub fn size(&self) -> usize {
        self.body.len()
            + self.key.url.len()
            + self
                .headers
                .iter()
                .map(|(name, value)| name.as_str().len() + value.len())
                .sum::<usize>()
    }
}

/// An opened namespace.
///
/// Obtained from [`CacheStore::open`]; cheap to clone and holds no lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHandle {
    namespace: CacheNamespace,
}

impl CacheHandle {
    pub(crate) fn new(namespace: CacheNamespace) -> Self {
        Self { namespace }
    }

    pub fn namespace(&self) -> &CacheNamespace {
        &self.namespace
    }
}

/// Namespaced key → entry storage.
///
/// Implementations must support concurrent readers and writers on the same
/// namespace.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Backend name (e.g. "memory", "sqlite").
    fn name(&self) -> &str;

    /// Open a namespace, creating it if it does not exist.
    async fn open(&self, namespace: &CacheNamespace) -> Result<CacheHandle>;

    /// Open a namespace only if it already exists. Never writes.
    async fn find(&self, namespace: &CacheNamespace) -> Result<Option<CacheHandle>>;

    /// Look up an entry. A missing key is `Ok(None)`, not an error.
    async fn get(&self, handle: &CacheHandle, key: &RequestKey) -> Result<Option<CacheEntry>>;

    /// Store an entry under `entry.key`, replacing any previous entry.
    ///
    /// # Errors
    /// - `Error::Storage` when the write cannot be persisted (e.g. quota)
    async fn put(&self, handle: &CacheHandle, entry: CacheEntry) -> Result<()>;

    /// Delete a namespace and all of its entries.
    ///
    /// Idempotent: returns `Ok(false)` if the namespace was already gone.
    async fn delete_namespace(&self, namespace: &CacheNamespace) -> Result<bool>;

    /// Every namespace currently present.
    async fn list_namespaces(&self) -> Result<BTreeSet<CacheNamespace>>;

    /// Number of entries in an opened namespace.
    async fn entry_count(&self, handle: &CacheHandle) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn test_entry_round_trip_to_response() {
        let url = Url::parse("http://localhost/index.html").unwrap();
        let response = Response::with_content_type(
            StatusCode::OK,
            "text/html",
            Bytes::from_static(b"<html></html>"),
        );
        let entry = CacheEntry::from_response(RequestKey::get(&url), &response);

        assert_eq!(entry.to_response(), response);
        assert!(entry.size() >= response.body.len());
    }
}
