//! Cache engine configuration.

use serde::{Deserialize, Serialize};
use url::Url;

use lantern_common::{Error, Result};

use crate::policy::CachePolicy;

/// Configuration for the router and the lifecycle manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Origin that owns the application (e.g. `http://localhost:8080`).
    pub origin: String,
    /// Critical resources pre-cached on install, relative to `origin`.
    pub manifest: Vec<String>,
    /// Document served to navigations that miss both network and cache.
    pub offline_page: String,
    /// Image served when an image misses both cache and network.
    pub placeholder_image: String,
    /// Path suffixes routed cache-first into the images namespace.
    pub image_suffixes: Vec<String>,
    /// Path suffixes routed cache-first into the static namespace.
    pub static_suffixes: Vec<String>,
    /// Write gate.
    pub policy: CachePolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:8080".to_string(),
            manifest: [
                "/",
                "/index.html",
                "/offline.html",
                "/styles/main.css",
                "/styles/shell.css",
                "/scripts/app.js",
                "/scripts/idb.js",
                "/scripts/sync-manager.js",
                "/images/logo.svg",
                "/images/icon-192x192.png",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            offline_page: "/offline.html".to_string(),
            placeholder_image: "/images/placeholder.svg".to_string(),
            image_suffixes: ["jpg", "jpeg", "png", "gif", "svg", "webp"]
                .into_iter()
                .map(String::from)
                .collect(),
            static_suffixes: ["css", "js"].into_iter().map(String::from).collect(),
            policy: CachePolicy::default(),
        }
    }
}

impl CacheConfig {
    /// Parse the configured origin.
    ///
    /// # Errors
    /// - Origin is not an absolute URL with a host
    pub fn origin_url(&self) -> Result<Url> {
        let url = Url::parse(&self.origin)
            .map_err(|e| Error::Config(format!("Invalid origin {:?}: {}", self.origin, e)))?;
        if url.host_str().is_none() {
            return Err(Error::Config(format!("Origin {:?} has no host", self.origin)));
        }
        Ok(url)
    }

    /// Resolve a path (or absolute URL) against the origin.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        self.origin_url()?
            .join(path)
            .map_err(|e| Error::Config(format!("Invalid resource {:?}: {}", path, e)))
    }

    /// Resolve every manifest entry, preserving order.
    pub fn manifest_urls(&self) -> Result<Vec<Url>> {
        self.manifest.iter().map(|path| self.resolve(path)).collect()
    }
}
