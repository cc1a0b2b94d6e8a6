//! Lantern Offline Sync
//!
//! Replays locally queued mutations against the remote endpoint:
//! - Durable offline queue for form submissions and analytics
//! - Single-flight sync coordinator with an acknowledged-prefix clear
//! - Deferred-trigger scheduler driven by connectivity changes
//! - Completion events for connected listeners

pub mod connectivity;
pub mod coordinator;
pub mod events;
pub mod queue;
pub mod remote;
pub mod scheduler;
pub mod state;

// Re-export main types
pub use connectivity::{Connectivity, LinkState};
pub use coordinator::SyncCoordinator;
pub use events::{SyncEvent, SyncEvents};
pub use queue::OfflineQueue;
pub use remote::{HttpSyncRemote, MemoryRemote, SyncRemote};
pub use scheduler::{DeferredScheduler, DeferredSync, SchedulerHandle, SYNC_TAG};
pub use state::{SyncOutcome, SyncPhase, SyncSession, SyncTrigger};
