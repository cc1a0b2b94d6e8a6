//! Request classification and the cache write gate.

use serde::{Deserialize, Serialize};
use url::{Origin, Url};

use lantern_common::{Method, Request};

use crate::config::CacheConfig;

/// Decides whether a response may be written to the shared cache.
///
/// Rejection only suppresses the write; the response is still served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CachePolicy {
    /// Query-string fragments that mark a credentialed request.
    pub sensitive_query_markers: Vec<String>,
    /// Path prefixes of per-user resources.
    pub private_path_prefixes: Vec<String>,
    /// Path fragments of private resources, matched anywhere in the path.
    pub private_path_segments: Vec<String>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            sensitive_query_markers: vec!["token=".to_string(), "auth=".to_string()],
            private_path_prefixes: vec!["/api/user/".to_string()],
            private_path_segments: vec!["/private/".to_string()],
        }
    }
}

impl CachePolicy {
    pub fn should_cache(&self, url: &Url) -> bool {
        let query = url.query().unwrap_or("");
        if self
            .sensitive_query_markers
            .iter()
            .any(|marker| query.contains(marker.as_str()))
        {
            return false;
        }

        let path = url.path();
        if self
            .private_path_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
        {
            return false;
        }

        !self
            .private_path_segments
            .iter()
            .any(|segment| path.contains(segment.as_str()))
    }
}

/// Which strategy rule a request falls under.
///
/// Rules are evaluated in declaration order; the first match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Not a safe read; goes straight to the network, never cached.
    NonRead,
    /// Top-level navigation: network-first into pages.
    Navigation,
    /// Image suffix: cache-first into images.
    Image,
    /// Style/script suffix: cache-first into static.
    StaticAsset,
    /// Any other same-origin read: network-first into pages.
    SameOrigin,
    /// Cross-origin and unmatched: left to the platform.
    CrossOrigin,
}

impl RequestClass {
    /// Whether the router produces the response itself.
    pub fn is_intercepted(&self) -> bool {
        !matches!(self, RequestClass::NonRead | RequestClass::CrossOrigin)
    }
}

/// Maps requests to [`RequestClass`].
#[derive(Debug, Clone)]
pub struct Classifier {
    origin: Origin,
    image_suffixes: Vec<String>,
    static_suffixes: Vec<String>,
}

impl Classifier {
    pub fn new(origin: &Url, image_suffixes: &[String], static_suffixes: &[String]) -> Self {
        let normalize = |suffixes: &[String]| -> Vec<String> {
            suffixes
                .iter()
                .map(|s| s.trim_start_matches('.').to_ascii_lowercase())
                .collect()
        };
        Self {
            origin: origin.origin(),
            image_suffixes: normalize(image_suffixes),
            static_suffixes: normalize(static_suffixes),
        }
    }

    pub fn from_config(config: &CacheConfig) -> lantern_common::Result<Self> {
        Ok(Self::new(
            &config.origin_url()?,
            &config.image_suffixes,
            &config.static_suffixes,
        ))
    }

    pub fn classify(&self, request: &Request) -> RequestClass {
        if request.method != Method::GET {
            return RequestClass::NonRead;
        }
        if request.is_navigation() {
            return RequestClass::Navigation;
        }

        let extension = path_extension(&request.url);
        if let Some(ext) = extension.as_deref() {
            if self.image_suffixes.iter().any(|s| s == ext) {
                return RequestClass::Image;
            }
            if self.static_suffixes.iter().any(|s| s == ext) {
                return RequestClass::StaticAsset;
            }
        }

        if request.url.origin() == self.origin {
            RequestClass::SameOrigin
        } else {
            RequestClass::CrossOrigin
        }
    }

    pub fn is_image(&self, url: &Url) -> bool {
        path_extension(url)
            .map(|ext| self.image_suffixes.contains(&ext))
            .unwrap_or(false)
    }
}

/// Lower-cased extension of the last path segment, query ignored.
fn path_extension(url: &Url) -> Option<String> {
    let last = url.path().rsplit('/').next()?;
    let (_, ext) = last.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
