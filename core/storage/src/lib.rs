//! Local persistent store for Lantern.
//!
//! Two independent partitions live behind one store process-wide:
//! - the **cache store**: versioned namespaces of request → response entries
//! - the **queue store**: an append-only, ordered log of pending mutations
//!
//! Both are expressed as async traits so the router, the lifecycle manager
//! and the sync coordinator never see which backend is in use.
//!
//! # Consistency
//! Entries under the same key follow last-write-wins. There is no
//! compare-and-swap and no read-modify-write cycle; concurrent writers to the
//! same namespace simply overwrite each other.

pub mod cache;
pub mod memory;
pub mod queue;
pub mod registry;
pub mod sqlite;

pub use cache::{CacheEntry, CacheHandle, CacheStore};
pub use memory::MemoryStore;
pub use queue::QueueStore;
pub use registry::{create_default_registry, LocalStore, StoreFactory, StoreRegistry};
pub use sqlite::SqliteStore;
