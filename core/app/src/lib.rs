//! Lantern Application Layer
//!
//! Wires the cache engine, offline queue and sync coordinator into one owned
//! context, and loads the configuration that drives it.

pub mod config;
pub mod context;

pub use config::{default_data_dir, AppConfig, StoreSettings, SyncSettings, CONFIG_FILENAME};
pub use context::{ContextStatus, OfflineContext};
