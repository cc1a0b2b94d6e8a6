//! reqwest-backed fetcher.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use lantern_common::{Error, Request, Response, Result};

use crate::fetcher::Fetcher;

/// User agent sent with every request.
const USER_AGENT: &str = "Lantern/0.1";

/// Fetches over HTTP with a per-request timeout.
///
/// Timeouts surface as ordinary `Error::Network` failures, which the router
/// turns into its cache fallback path.
pub struct HttpFetcher {
    http: Client,
}

impl HttpFetcher {
    /// Create a fetcher whose requests time out after `timeout`.
    ///
    /// # Errors
    /// - The HTTP client could not be constructed (TLS backend failure)
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { http })
    }

    /// Wrap an existing client.
    pub fn with_client(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let mut builder = self
            .http
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Network(format!("{} {}: {}", request.method, request.url, e)))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("Failed to read body of {}: {}", request.url, e)))?;

        debug!("{} {} -> {}", request.method, request.url, status);
        Ok(Response::new(status, headers, body))
    }
}
