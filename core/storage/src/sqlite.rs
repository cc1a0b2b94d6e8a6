//! SQLite-backed local store.
//!
//! Persists cache namespaces, cache entries and the offline queue in a single
//! database file so both survive process restarts.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use lantern_common::{
    CacheNamespace, Error, HeaderMap, HeaderValue, ItemKind, QueueItem, RequestKey, Result, StatusCode,
};
use lantern_common::header::HeaderName;

use crate::cache::{CacheEntry, CacheHandle, CacheStore};
use crate::queue::QueueStore;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS cache_namespaces (
        name TEXT NOT NULL,
        version TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        PRIMARY KEY (name, version)
    );

    CREATE TABLE IF NOT EXISTS cache_entries (
        ns_name TEXT NOT NULL,
        ns_version TEXT NOT NULL,
        method TEXT NOT NULL,
        url TEXT NOT NULL,
        status INTEGER NOT NULL,
        headers TEXT NOT NULL,
        body BLOB NOT NULL,
        stored_at INTEGER NOT NULL,
        PRIMARY KEY (ns_name, ns_version, method, url)
    );

    CREATE TABLE IF NOT EXISTS offline_queue (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        kind TEXT NOT NULL,
        payload TEXT NOT NULL,
        enqueued_at TEXT NOT NULL
    );
"#;

fn storage_err(err: rusqlite::Error) -> Error {
    Error::Storage(err.to_string())
}

/// Headers are stored as a JSON array of `[name, value]` pairs, in order.
/// Values that are not visible ASCII are not persisted.
fn headers_to_json(headers: &HeaderMap) -> Result<String> {
    let pairs: Vec<(&str, &str)> = headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|value| (name.as_str(), value)))
        .collect();
    Ok(serde_json::to_string(&pairs)?)
}

fn headers_from_json(data: &str) -> Result<HeaderMap> {
    let pairs: Vec<(String, String)> = serde_json::from_str(data)?;
    let mut headers = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::Storage(format!("Stored header name {} is invalid: {}", name, e)))?;
        let value = HeaderValue::from_str(&value)
            .map_err(|e| Error::Storage(format!("Stored header value is invalid: {}", e)))?;
        headers.append(name, value);
    }
    Ok(headers)
}

/// SQLite-backed store holding both the cache and the queue.
///
/// Every operation runs on the blocking pool and holds the connection lock
/// only for the duration of its own transaction.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open or create a store at `path`, creating parent directories.
    ///
    /// # Errors
    /// - Directory creation failure
    /// - Database open or schema setup failure
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&path).map_err(storage_err)?;
        let store = Self::from_connection(conn, Some(path.clone()))?;
        info!("Local store opened at {}", path.display());
        Ok(store)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        Self::from_connection(conn, None)
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(storage_err)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Database file, if not in-memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `op` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| Error::Storage("sqlite connection lock poisoned".to_string()))?;
            op(&mut guard)
        })
        .await
        .map_err(|e| Error::Storage(format!("storage task failed: {}", e)))?
    }
}

fn ensure_namespace(conn: &Connection, namespace: &CacheNamespace) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO cache_namespaces (name, version, created_at) VALUES (?1, ?2, ?3)",
        params![namespace.name, namespace.version, Utc::now().timestamp_millis()],
    )
    .map_err(storage_err)?;
    Ok(())
}

fn timestamp_from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}

#[async_trait]
impl CacheStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn open(&self, namespace: &CacheNamespace) -> Result<CacheHandle> {
        let ns = namespace.clone();
        self.with_conn(move |conn| ensure_namespace(conn, &ns)).await?;
        Ok(CacheHandle::new(namespace.clone()))
    }

    async fn find(&self, namespace: &CacheNamespace) -> Result<Option<CacheHandle>> {
        let ns = namespace.clone();
        let exists = self
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT 1 FROM cache_namespaces WHERE name = ?1 AND version = ?2",
                    params![ns.name, ns.version],
                    |_| Ok(()),
                )
                .optional()
                .map(|row| row.is_some())
                .map_err(storage_err)
            })
            .await?;
        Ok(exists.then(|| CacheHandle::new(namespace.clone())))
    }

    async fn get(&self, handle: &CacheHandle, key: &RequestKey) -> Result<Option<CacheEntry>> {
        let ns = handle.namespace().clone();
        let key = key.clone();

        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    r#"
                    SELECT status, headers, body, stored_at FROM cache_entries
                    WHERE ns_name = ?1 AND ns_version = ?2 AND method = ?3 AND url = ?4
                    "#,
                    params![ns.name, ns.version, key.method.as_str(), key.url],
                    |row| {
                        Ok((
                            row.get::<_, u16>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, Vec<u8>>(2)?,
                            row.get::<_, i64>(3)?,
                        ))
                    },
                )
                .optional()
                .map_err(storage_err)?;

            let Some((status, headers, body, stored_at)) = row else {
                return Ok(None);
            };

            let status = StatusCode::from_u16(status)
                .map_err(|e| Error::Storage(format!("Stored status {} is invalid: {}", status, e)))?;

            Ok(Some(CacheEntry {
                key,
                status,
                headers: headers_from_json(&headers)?,
                body: Bytes::from(body),
                stored_at: timestamp_from_millis(stored_at),
            }))
        })
        .await
    }

    async fn put(&self, handle: &CacheHandle, entry: CacheEntry) -> Result<()> {
        let ns = handle.namespace().clone();
        let headers = headers_to_json(&entry.headers)?;

        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(storage_err)?;
            ensure_namespace(&tx, &ns)?;
            tx.execute(
                r#"
                INSERT OR REPLACE INTO cache_entries
                (ns_name, ns_version, method, url, status, headers, body, stored_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    ns.name,
                    ns.version,
                    entry.key.method.as_str(),
                    entry.key.url,
                    entry.status.as_u16(),
                    headers,
                    &entry.body[..],
                    entry.stored_at.timestamp_millis(),
                ],
            )
            .map_err(storage_err)?;
            tx.commit().map_err(storage_err)
        })
        .await
    }

    async fn delete_namespace(&self, namespace: &CacheNamespace) -> Result<bool> {
        let ns = namespace.clone();

        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(storage_err)?;
            let entries = tx
                .execute(
                    "DELETE FROM cache_entries WHERE ns_name = ?1 AND ns_version = ?2",
                    params![ns.name, ns.version],
                )
                .map_err(storage_err)?;
            let removed = tx
                .execute(
                    "DELETE FROM cache_namespaces WHERE name = ?1 AND version = ?2",
                    params![ns.name, ns.version],
                )
                .map_err(storage_err)?;
            tx.commit().map_err(storage_err)?;

            if removed > 0 {
                debug!("Deleted namespace {} ({} entries)", ns, entries);
            }
            Ok(removed > 0)
        })
        .await
    }

    async fn list_namespaces(&self) -> Result<BTreeSet<CacheNamespace>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT name, version FROM cache_namespaces")
                .map_err(storage_err)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(CacheNamespace::new(
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                    ))
                })
                .map_err(storage_err)?;

            let mut namespaces = BTreeSet::new();
            for ns in rows {
                namespaces.insert(ns.map_err(storage_err)?);
            }
            Ok(namespaces)
        })
        .await
    }

    async fn entry_count(&self, handle: &CacheHandle) -> Result<usize> {
        let ns = handle.namespace().clone();
        self.with_conn(move |conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM cache_entries WHERE ns_name = ?1 AND ns_version = ?2",
                    params![ns.name, ns.version],
                    |row| row.get(0),
                )
                .map_err(storage_err)?;
            Ok(count as usize)
        })
        .await
    }
}

#[async_trait]
impl QueueStore for SqliteStore {
    async fn append(&self, kind: ItemKind, payload: serde_json::Value) -> Result<QueueItem> {
        let encoded = serde_json::to_string(&payload)?;
        let enqueued_at = Utc::now();

        let id = self
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO offline_queue (kind, payload, enqueued_at) VALUES (?1, ?2, ?3)",
                    params![kind.as_str(), encoded, enqueued_at.to_rfc3339()],
                )
                .map_err(storage_err)?;
                Ok(conn.last_insert_rowid())
            })
            .await?;

        Ok(QueueItem {
            id: id as u64,
            kind,
            payload,
            enqueued_at,
        })
    }

    async fn list_all(&self) -> Result<Vec<QueueItem>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, kind, payload, enqueued_at FROM offline_queue ORDER BY id")
                .map_err(storage_err)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })
                .map_err(storage_err)?;

            let mut items = Vec::new();
            for row in rows {
                let (id, kind, payload, enqueued_at) = row.map_err(storage_err)?;
                let enqueued_at = DateTime::parse_from_rfc3339(&enqueued_at)
                    .map_err(|e| Error::Serialization(e.to_string()))?
                    .with_timezone(&Utc);
                items.push(QueueItem {
                    id: id as u64,
                    kind: ItemKind::parse(&kind)?,
                    payload: serde_json::from_str(&payload)?,
                    enqueued_at,
                });
            }
            Ok(items)
        })
        .await
    }

    async fn clear(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM offline_queue", [])
                .map_err(storage_err)?;
            Ok(())
        })
        .await
    }

    async fn clear_through(&self, last_id: u64) -> Result<usize> {
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM offline_queue WHERE id <= ?1",
                params![last_id as i64],
            )
            .map_err(storage_err)
        })
        .await
    }

    async fn len(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM offline_queue", [], |row| row.get(0))
                .map_err(storage_err)?;
            Ok(count as usize)
        })
        .await
    }
}
