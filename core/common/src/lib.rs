//! Common utilities and types shared across Lantern modules.
//!
//! This module provides the error taxonomy and the value types that flow
//! between the cache engine, the offline queue and the sync coordinator.

pub mod error;
pub mod message;
pub mod types;

pub use error::{Error, Result};
pub use message::{Request, RequestKey, RequestMode, Response};
pub use http::{header, HeaderMap, HeaderValue, Method, StatusCode};
pub use types::{CacheNamespace, ItemKind, NamespaceRole, QueueItem, VersionTag};
