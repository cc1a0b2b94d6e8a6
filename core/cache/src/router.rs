//! Per-request strategy selection and execution.

use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use lantern_common::{NamespaceRole, Request, RequestKey, Response, Result, StatusCode};
use lantern_net::Fetcher;
use lantern_storage::{CacheEntry, CacheStore};

use crate::config::CacheConfig;
use crate::lifecycle::CacheLifecycle;
use crate::policy::{CachePolicy, Classifier, RequestClass};

const BUILTIN_OFFLINE_PAGE: &str = "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Offline</title></head>\
<body><h1>You are offline</h1><p>This page is not available without a connection.</p></body></html>\n";

const BUILTIN_PLACEHOLDER: &str = "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"200\" height=\"200\" viewBox=\"0 0 200 200\">\
<rect width=\"200\" height=\"200\" fill=\"#e0e0e0\"/></svg>\n";

/// Where a routed response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    OfflinePage,
    PlaceholderImage,
    NotFound,
}

/// Result of routing one request.
#[derive(Debug, Clone)]
pub enum Routed {
    /// The router produced the response.
    Handled {
        response: Response,
        source: ResponseSource,
    },
    /// Not intercepted; the caller sends it to the network unmodified.
    Passthrough,
}

impl Routed {
    fn handled(response: Response, source: ResponseSource) -> Self {
        Routed::Handled { response, source }
    }
}

/// Applies cache-first or network-first per request class.
///
/// Transport failures never escape [`StrategyRouter::route`]; they select a
/// fallback. Cache write failures are logged and the network response is
/// returned regardless.
pub struct StrategyRouter {
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    lifecycle: Arc<CacheLifecycle>,
    classifier: Classifier,
    policy: CachePolicy,
    offline_page: Url,
    placeholder_image: Url,
}

impl StrategyRouter {
    pub fn new(
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetcher>,
        lifecycle: Arc<CacheLifecycle>,
        config: &CacheConfig,
    ) -> Result<Self> {
        Ok(Self {
            store,
            fetcher,
            lifecycle,
            classifier: Classifier::from_config(config)?,
            policy: config.policy.clone(),
            offline_page: config.resolve(&config.offline_page)?,
            placeholder_image: config.resolve(&config.placeholder_image)?,
        })
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Route a request through its strategy.
    pub async fn route(&self, request: &Request) -> Routed {
        let class = self.classifier.classify(request);
        debug!("{} {} classified as {:?}", request.method, request.url, class);

        match class {
            RequestClass::NonRead | RequestClass::CrossOrigin => Routed::Passthrough,
            RequestClass::Navigation => self.network_first(request, NamespaceRole::Pages, true).await,
            RequestClass::SameOrigin => self.network_first(request, NamespaceRole::Pages, false).await,
            RequestClass::Image => self.cache_first(request, NamespaceRole::Images, true).await,
            RequestClass::StaticAsset => self.cache_first(request, NamespaceRole::Static, false).await,
        }
    }

    /// Route a request and send pass-through requests to the network.
    ///
    /// # Errors
    /// - Transport failure on a pass-through request
    pub async fn handle(&self, request: &Request) -> Result<Response> {
        match self.route(request).await {
            Routed::Handled { response, .. } => Ok(response),
            Routed::Passthrough => self.fetcher.fetch(request).await,
        }
    }

    async fn network_first(&self, request: &Request, role: NamespaceRole, navigation: bool) -> Routed {
        let key = request.key();

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.status.is_success() {
                    self.write_through(role, &request.url, key, &response).await;
                }
                return Routed::handled(response, ResponseSource::Network);
            }
            Err(e) => debug!("Network failed for {}: {}", key, e),
        }

        if let Some(entry) = self.lookup(role, &key).await {
            return Routed::handled(entry.to_response(), ResponseSource::Cache);
        }

        if navigation {
            return Routed::handled(self.offline_document().await, ResponseSource::OfflinePage);
        }
        Routed::handled(Response::not_found(), ResponseSource::NotFound)
    }

    async fn cache_first(&self, request: &Request, role: NamespaceRole, image: bool) -> Routed {
        let key = request.key();

        if let Some(entry) = self.lookup(role, &key).await {
            return Routed::handled(entry.to_response(), ResponseSource::Cache);
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.status.is_success() {
                    self.write_through(role, &request.url, key, &response).await;
                }
                Routed::handled(response, ResponseSource::Network)
            }
            Err(e) => {
                debug!("Network failed for {}: {}", key, e);
                if image {
                    Routed::handled(self.placeholder().await, ResponseSource::PlaceholderImage)
                } else {
                    Routed::handled(Response::not_found(), ResponseSource::NotFound)
                }
            }
        }
    }

    /// Read from the current namespace for `role`. Store failures count as a miss.
    ///
    /// Never creates the namespace.
    async fn lookup(&self, role: NamespaceRole, key: &RequestKey) -> Option<CacheEntry> {
        let namespace = self.lifecycle.namespace(role).await;
        let result = match self.store.find(&namespace).await {
            Ok(Some(handle)) => self.store.get(&handle, key).await,
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };
        match result {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Cache read failed for {} in {}: {}", key, namespace, e);
                None
            }
        }
    }

    /// Write a fetched response into the current namespace for `role`.
    ///
    /// The write runs on its own task so it completes even if this request is
    /// dropped mid-flight.
    async fn write_through(&self, role: NamespaceRole, url: &Url, key: RequestKey, response: &Response) {
        if !self.policy.should_cache(url) {
            debug!("Not caching {}", key);
            return;
        }

        let lifecycle = self.lifecycle.clone();
        let entry = CacheEntry::from_response(key, response);
        let write = tokio::spawn(async move { lifecycle.store_current(role, entry).await });

        match write.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Cache write failed for {}: {}", url, e),
            Err(e) => warn!("Cache write task failed for {}: {}", url, e),
        }
    }

    async fn offline_document(&self) -> Response {
        match self.find_anywhere(&self.offline_page).await {
            Some(entry) => entry.to_response(),
            None => builtin(BUILTIN_OFFLINE_PAGE, "text/html; charset=utf-8"),
        }
    }

    async fn placeholder(&self) -> Response {
        match self.find_anywhere(&self.placeholder_image).await {
            Some(entry) => entry.to_response(),
            None => builtin(BUILTIN_PLACEHOLDER, "image/svg+xml"),
        }
    }

    /// Search every current namespace for `url`.
    async fn find_anywhere(&self, url: &Url) -> Option<CacheEntry> {
        let key = RequestKey::get(url);
        for role in NamespaceRole::ALL {
            if let Some(entry) = self.lookup(role, &key).await {
                return Some(entry);
            }
        }
        None
    }
}

fn builtin(body: &'static str, content_type: &str) -> Response {
    Response::with_content_type(StatusCode::OK, content_type, body)
}
