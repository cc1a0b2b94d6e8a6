//! Network access for Lantern.
//!
//! The cache engine never talks to the network directly; it goes through the
//! [`Fetcher`] trait so the transport can be swapped (reqwest in production,
//! an in-memory scripted network in tests and demos).

pub mod fetcher;
pub mod http;
pub mod memory;

pub use fetcher::Fetcher;
pub use http::HttpFetcher;
pub use memory::MemoryNetwork;
