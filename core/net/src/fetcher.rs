//! Fetcher trait definition.

use async_trait::async_trait;

use lantern_common::{Request, Response, Result};

/// Performs a request against the network.
///
/// A response with any status, including 4xx/5xx, is `Ok`. Only transport
/// failures (unreachable host, connection reset, timeout) are
/// `Err(Error::Network)`.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response>;
}
