//! In-memory scripted network.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use url::Url;

use lantern_common::{Error, Request, RequestKey, Response, Result, StatusCode};

use crate::fetcher::Fetcher;

/// Scripted network for testing and demos.
///
/// Serves registered responses by URL, answers 404 for anything else, and
/// fails every request with `Error::Network` while switched offline. Every
/// fetch attempt (online or not) is recorded.
pub struct MemoryNetwork {
    routes: RwLock<HashMap<String, Response>>,
    online: AtomicBool,
    log: RwLock<Vec<RequestKey>>,
}

impl MemoryNetwork {
    /// Create an online network with no routes.
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
            online: AtomicBool::new(true),
            log: RwLock::new(Vec::new()),
        }
    }

    /// Serve `response` for `url`.
    pub fn route(&self, url: &Url, response: Response) {
        if let Ok(mut routes) = self.routes.write() {
            routes.insert(RequestKey::get(url).url, response);
        }
    }

    /// Serve a 200 with `content_type` and `body` for `url`.
    pub fn serve(&self, url: &Url, content_type: &str, body: impl Into<Bytes>) {
        self.route(url, Response::with_content_type(StatusCode::OK, content_type, body));
    }

    /// Switch connectivity.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Number of fetch attempts made for `url` (any method).
    pub fn hits(&self, url: &Url) -> usize {
        let target = RequestKey::get(url).url;
        self.log
            .read()
            .map(|log| log.iter().filter(|key| key.url == target).count())
            .unwrap_or(0)
    }

    /// Total number of fetch attempts.
    pub fn total_hits(&self) -> usize {
        self.log.read().map(|log| log.len()).unwrap_or(0)
    }
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for MemoryNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let key = request.key();
        if let Ok(mut log) = self.log.write() {
            log.push(key.clone());
        }

        if !self.online.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("offline: {}", key)));
        }

        let routes = self
            .routes
            .read()
            .map_err(|_| Error::Network("route table lock poisoned".to_string()))?;
        Ok(routes
            .get(&key.url)
            .cloned()
            .unwrap_or_else(Response::not_found))
    }
}
