//! Request and response values seen by the interception layer.

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode};
use std::fmt;
use url::Url;

/// Whether a request is a top-level navigation or a sub-resource load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestMode {
    Navigate,
    Subresource,
}

/// An outbound request as seen by the router.
///
/// Only `method`, `url` and `mode` take part in strategy selection; headers
/// and body are carried so pass-through requests reach the network unmodified.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub mode: RequestMode,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl Request {
    /// Build a request with no headers or body.
    pub fn new(method: Method, url: Url, mode: RequestMode) -> Self {
        Self {
            method,
            url,
            mode,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// A sub-resource GET.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url, RequestMode::Subresource)
    }

    /// A top-level navigation GET.
    pub fn navigate(url: Url) -> Self {
        Self::new(Method::GET, url, RequestMode::Navigate)
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// The cache key for this request.
    pub fn key(&self) -> RequestKey {
        RequestKey::new(self.method.clone(), &self.url)
    }
}

/// Identity of a cache entry: method plus absolute URL (fragment stripped).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub method: Method,
    pub url: String,
}

impl RequestKey {
    pub fn new(method: Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method,
            url: url.into(),
        }
    }

    /// Key for a GET of `url`.
    pub fn get(url: &Url) -> Self {
        Self::new(Method::GET, url)
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// A response, either from the network or reconstructed from a cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// A response carrying only a `content-type` header.
    ///
    /// An unparseable content type is dropped rather than rejected.
    pub fn with_content_type(status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(content_type) {
            headers.insert(header::CONTENT_TYPE, value);
        }
        Self::new(status, headers, body)
    }

    /// The generic "not found" response used when every source is exhausted.
    pub fn not_found() -> Self {
        Self::with_content_type(StatusCode::NOT_FOUND, "text/plain", Bytes::from_static(b"Not found"))
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    /// Body as UTF-8 text, lossy.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_strips_fragment() {
        let url = Url::parse("http://localhost/page.html?x=1#section").unwrap();
        let key = RequestKey::get(&url);
        assert_eq!(key.url, "http://localhost/page.html?x=1");
        assert_eq!(key.to_string(), "GET http://localhost/page.html?x=1");
    }

    #[test]
    fn test_key_distinguishes_methods() {
        let url = Url::parse("http://localhost/api/sync").unwrap();
        assert_ne!(RequestKey::get(&url), RequestKey::new(Method::POST, &url));
    }

    #[test]
    fn test_response_helpers() {
        let response = Response::not_found();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert!(!response.status.is_success());
        assert_eq!(response.content_type(), Some("text/plain"));
        assert_eq!(response.text(), "Not found");
    }

    #[test]
    fn test_invalid_content_type_is_dropped() {
        let response = Response::with_content_type(StatusCode::OK, "text/html\n", "x");
        assert!(response.headers.is_empty());
    }
}
