//! Lantern resource cache engine.
//!
//! This module provides:
//! - Per-request strategy selection (network-first / cache-first) with
//!   offline fallbacks
//! - The `should_cache` gate that keeps private and credentialed responses
//!   out of the shared cache
//! - Versioned namespace lifecycle: pre-population on install, eviction of
//!   superseded versions on activate
//!
//! # Architecture
//! The router consults the cache store through namespaces chosen by the
//! lifecycle manager's current version tag, and the network through a
//! [`lantern_net::Fetcher`].

pub mod config;
pub mod lifecycle;
pub mod policy;
pub mod router;

pub use config::CacheConfig;
pub use lifecycle::{ActivateReport, CacheLifecycle, InstallReport};
pub use policy::{CachePolicy, Classifier, RequestClass};
pub use router::{ResponseSource, Routed, StrategyRouter};
