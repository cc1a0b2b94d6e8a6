//! Remote sync endpoint.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;
use url::Url;

use lantern_common::{Error, QueueItem, Result, StatusCode};

/// One bulk write of queued items.
///
/// Success is any 2xx; anything else must be reported as
/// `Error::SyncRejected`, and transport failures as `Error::Network`.
#[async_trait]
pub trait SyncRemote: Send + Sync {
    async fn push(&self, items: &[QueueItem]) -> Result<()>;
}

/// POSTs the batch as a JSON array.
pub struct HttpSyncRemote {
    http: Client,
    endpoint: Url,
}

impl HttpSyncRemote {
    /// # Errors
    /// - The HTTP client could not be constructed
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl SyncRemote for HttpSyncRemote {
    async fn push(&self, items: &[QueueItem]) -> Result<()> {
        debug!("POST {} items to {}", items.len(), self.endpoint);

        let response = self
            .http
            .post(self.endpoint.clone())
            .json(items)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to reach {}: {}", self.endpoint, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::SyncRejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Scripted remote for tests and demos.
///
/// Answers with a configurable status, optionally after a delay, and keeps
/// every accepted item.
pub struct MemoryRemote {
    status: Mutex<StatusCode>,
    reachable: AtomicBool,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
    accepted: Mutex<Vec<QueueItem>>,
}

impl MemoryRemote {
    /// A reachable remote answering 200.
    pub fn new() -> Self {
        Self {
            status: Mutex::new(StatusCode::OK),
            reachable: AtomicBool::new(true),
            delay: Mutex::new(None),
            calls: AtomicUsize::new(0),
            accepted: Mutex::new(Vec::new()),
        }
    }

    pub fn set_status(&self, status: StatusCode) {
        if let Ok(mut current) = self.status.lock() {
            *current = status;
        }
    }

    /// Fail every push with a transport error while unreachable.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Hold each push for `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        if let Ok(mut current) = self.delay.lock() {
            *current = Some(delay);
        }
    }

    /// Number of bulk calls received, accepted or not.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every item the remote has accepted, in arrival order.
    pub fn accepted(&self) -> Vec<QueueItem> {
        self.accepted
            .lock()
            .map(|items| items.clone())
            .unwrap_or_default()
    }
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SyncRemote for MemoryRemote {
    async fn push(&self, items: &[QueueItem]) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.delay.lock().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if !self.reachable.load(Ordering::SeqCst) {
            return Err(Error::Network("sync endpoint unreachable".to_string()));
        }

        let status = self
            .status
            .lock()
            .map(|status| *status)
            .map_err(|_| Error::Storage("remote status lock poisoned".to_string()))?;
        if !status.is_success() {
            return Err(Error::SyncRejected {
                status: status.as_u16(),
            });
        }

        self.accepted
            .lock()
            .map_err(|_| Error::Storage("remote log lock poisoned".to_string()))?
            .extend_from_slice(items);
        Ok(())
    }
}
