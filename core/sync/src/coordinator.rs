//! Sync coordinator: replays the offline queue against the remote.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use lantern_common::{Error, Result};

use crate::connectivity::Connectivity;
use crate::events::{SyncEvent, SyncEvents};
use crate::queue::OfflineQueue;
use crate::remote::SyncRemote;
use crate::scheduler::{DeferredSync, SYNC_TAG};
use crate::state::{SyncOutcome, SyncPhase, SyncSession, SyncTrigger};

/// State owned by the single in-flight attempt.
#[derive(Debug, Default)]
struct Flight {
    /// Highest id the remote acknowledged whose clear has not committed.
    pending_ack: Option<u64>,
}

/// Drives `Idle -> Attempting -> {Succeeded, Failed} -> Idle`.
///
/// At most one attempt runs at a time; a trigger arriving during an attempt
/// is coalesced rather than starting a second bulk write.
pub struct SyncCoordinator {
    queue: OfflineQueue,
    remote: Arc<dyn SyncRemote>,
    connectivity: Connectivity,
    events: SyncEvents,
    deferred: Option<Arc<dyn DeferredSync>>,
    flight: Mutex<Flight>,
    phase: RwLock<SyncPhase>,
    last_session: RwLock<Option<SyncSession>>,
}

impl SyncCoordinator {
    pub fn new(
        queue: OfflineQueue,
        remote: Arc<dyn SyncRemote>,
        connectivity: Connectivity,
        events: SyncEvents,
    ) -> Self {
        Self {
            queue,
            remote,
            connectivity,
            events,
            deferred: None,
            flight: Mutex::new(Flight::default()),
            phase: RwLock::new(SyncPhase::Idle),
            last_session: RwLock::new(None),
        }
    }

    /// Prefer registering deferred attempts with `facility`.
    pub fn with_deferred(mut self, facility: Arc<dyn DeferredSync>) -> Self {
        self.deferred = Some(facility);
        self
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    pub fn events(&self) -> &SyncEvents {
        &self.events
    }

    pub async fn phase(&self) -> SyncPhase {
        *self.phase.read().await
    }

    /// The most recent attempt, if any.
    pub async fn last_session(&self) -> Option<SyncSession> {
        self.last_session.read().await.clone()
    }

    /// Request a sync the way producers do after queueing.
    ///
    /// Offline requests are not attempted. Otherwise a deferred attempt is
    /// registered when a facility is available; if registration fails or no
    /// facility exists, the attempt runs now.
    pub async fn request_sync(&self) -> Result<SyncOutcome> {
        if !self.connectivity.is_online() {
            debug!("Sync requested while offline; not attempted");
            return Ok(SyncOutcome::Offline);
        }

        if let Some(facility) = &self.deferred {
            match facility.register(SYNC_TAG).await {
                Ok(()) => return Ok(SyncOutcome::Deferred),
                Err(Error::PlatformUnsupported(_)) => {}
                Err(e) => warn!("Deferred sync registration failed, syncing now: {}", e),
            }
        }

        self.attempt(SyncTrigger::Immediate).await
    }

    /// Run one read/send/clear attempt.
    ///
    /// # Errors
    /// - `Error::Network` / `Error::SyncRejected` when the remote write fails;
    ///   the queue is left untouched
    /// - `Error::SyncUncommitted` when the remote accepted but the queue
    ///   could not be cleared; the clear is retried on the next attempt
    /// - `Error::Storage` when the queue cannot be read
    pub async fn attempt(&self, trigger: SyncTrigger) -> Result<SyncOutcome> {
        if !self.connectivity.is_online() {
            return Ok(SyncOutcome::Offline);
        }

        let mut flight = match self.flight.try_lock() {
            Ok(flight) => flight,
            Err(_) => {
                debug!("Sync already in flight; {} trigger coalesced", trigger);
                return Ok(SyncOutcome::Coalesced);
            }
        };

        let mut session = SyncSession::start(trigger);
        *self.phase.write().await = SyncPhase::Attempting;
        info!("Sync {} started ({})", session.id, trigger);

        let result = self.run(&mut flight).await;

        match &result {
            Ok(outcome) => {
                session.succeed(outcome.synced());
                info!("Sync {} succeeded: {}", session.id, outcome);
            }
            Err(e) => {
                session.fail(e.to_string());
                warn!("Sync {} failed: {}", session.id, e);
            }
        }

        *self.phase.write().await = session.phase;
        *self.last_session.write().await = Some(session);
        *self.phase.write().await = SyncPhase::Idle;

        result
    }

    async fn run(&self, flight: &mut Flight) -> Result<SyncOutcome> {
        let recovered = match flight.pending_ack {
            Some(acknowledged) => {
                let cleared = self
                    .queue
                    .clear_through(acknowledged)
                    .await
                    .map_err(|e| uncommitted(acknowledged, e))?;
                flight.pending_ack = None;
                info!(
                    "Committed {} previously acknowledged items (through id {})",
                    cleared, acknowledged
                );
                if cleared > 0 {
                    self.publish_completed(cleared);
                }
                cleared
            }
            None => 0,
        };

        let items = self.queue.list_all().await?;
        let last_id = match items.iter().map(|item| item.id).max() {
            Some(id) => id,
            None if recovered > 0 => return Ok(SyncOutcome::Synced { count: recovered }),
            None => return Ok(SyncOutcome::Empty),
        };

        self.remote.push(&items).await?;

        if let Err(e) = self.queue.clear_through(last_id).await {
            flight.pending_ack = Some(last_id);
            return Err(uncommitted(last_id, e));
        }

        let count = items.len();
        self.publish_completed(count);

        Ok(SyncOutcome::Synced {
            count: recovered + count,
        })
    }

    fn publish_completed(&self, synced: usize) {
        self.events.publish(SyncEvent::SyncCompleted {
            synced,
            timestamp: Utc::now(),
        });
    }
}

fn uncommitted(last_id: u64, cause: Error) -> Error {
    Error::SyncUncommitted(format!(
        "remote acknowledged items through id {} but the queue was not cleared: {}",
        last_id, cause
    ))
}
