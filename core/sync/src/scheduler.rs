//! Deferred-trigger scheduling.
//!
//! Deferred registrations are held until connectivity is available and then
//! delivered as sync attempts. An offline to online transition is itself a
//! trigger.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::future::Future;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use lantern_common::{Error, Result};

use crate::connectivity::{Connectivity, LinkState};
use crate::state::{SyncOutcome, SyncTrigger};

/// The only deferred tag the scheduler acts on.
pub const SYNC_TAG: &str = "sync-data";

/// A facility that runs a tagged sync later, when conditions allow.
#[async_trait]
pub trait DeferredSync: Send + Sync {
    /// Register a deferred attempt under `tag`.
    ///
    /// # Errors
    /// - `Error::PlatformUnsupported` when no facility is running
    async fn register(&self, tag: &str) -> Result<()>;
}

#[derive(Debug)]
enum SchedulerRequest {
    Register(String),
    Shutdown,
}

/// Registration side of the scheduler. Cheap to share.
#[derive(Debug, Clone)]
pub struct DeferredScheduler {
    request_tx: mpsc::Sender<SchedulerRequest>,
}

impl DeferredScheduler {
    /// Create a scheduler that watches `connectivity`.
    pub fn new(connectivity: &Connectivity) -> (Self, SchedulerHandle) {
        let (request_tx, request_rx) = mpsc::channel(100);

        let scheduler = Self { request_tx };
        let connectivity = connectivity.subscribe();
        let link = *connectivity.borrow();
        let handle = SchedulerHandle {
            request_rx,
            connectivity,
            link,
        };

        (scheduler, handle)
    }

    /// Stop the background task.
    pub async fn shutdown(&self) {
        let _ = self.request_tx.send(SchedulerRequest::Shutdown).await;
    }
}

#[async_trait]
impl DeferredSync for DeferredScheduler {
    async fn register(&self, tag: &str) -> Result<()> {
        self.request_tx
            .send(SchedulerRequest::Register(tag.to_string()))
            .await
            .map_err(|_| Error::PlatformUnsupported("Deferred scheduler not running".to_string()))
    }
}

/// Background side of the scheduler.
pub struct SchedulerHandle {
    request_rx: mpsc::Receiver<SchedulerRequest>,
    connectivity: watch::Receiver<LinkState>,
    /// State as of subscription; transitions after it are seen by `run`.
    link: LinkState,
}

impl SchedulerHandle {
    /// Run the scheduler loop.
    ///
    /// This should be spawned in a tokio task. `sync_fn` is called for every
    /// delivered trigger. Returns on shutdown or when every
    /// [`DeferredScheduler`] has been dropped.
    pub async fn run<F, Fut>(mut self, sync_fn: F)
    where
        F: Fn(SyncTrigger) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<SyncOutcome>> + Send,
    {
        let mut pending: BTreeSet<String> = BTreeSet::new();
        let mut online = self.link.online;
        let mut restores = self.link.restores;
        let mut watching = true;

        info!("Deferred sync scheduler started (online: {})", online);

        loop {
            tokio::select! {
                request = self.request_rx.recv() => {
                    match request {
                        Some(SchedulerRequest::Register(tag)) => {
                            if tag != SYNC_TAG {
                                warn!("Ignoring deferred registration for unknown tag {:?}", tag);
                                continue;
                            }
                            debug!("Deferred sync registered (online: {})", online);
                            pending.insert(tag);
                            if online {
                                Self::deliver(&mut pending, SyncTrigger::Deferred, &sync_fn).await;
                            }
                        }
                        Some(SchedulerRequest::Shutdown) | None => {
                            info!("Deferred sync scheduler shutting down");
                            break;
                        }
                    }
                }

                changed = self.connectivity.changed(), if watching => {
                    if changed.is_err() {
                        debug!("Connectivity monitor dropped; no further transitions");
                        watching = false;
                        continue;
                    }

                    // Compare restore counts, not the online flag, so a flap
                    // between two polls still counts.
                    let now = *self.connectivity.borrow_and_update();
                    let restored = now.restores != restores;
                    online = now.online;
                    restores = now.restores;

                    if restored && online {
                        let trigger = if pending.is_empty() {
                            SyncTrigger::Immediate
                        } else {
                            SyncTrigger::Deferred
                        };
                        info!("Connectivity restored, starting {} sync", trigger);
                        Self::deliver(&mut pending, trigger, &sync_fn).await;
                    }
                }
            }
        }
    }

    /// Run one attempt. Pending registrations survive a failed or skipped
    /// attempt and are retried on the next restore.
    async fn deliver<F, Fut>(pending: &mut BTreeSet<String>, trigger: SyncTrigger, sync_fn: &F)
    where
        F: Fn(SyncTrigger) -> Fut,
        Fut: Future<Output = Result<SyncOutcome>>,
    {
        match sync_fn(trigger).await {
            Ok(SyncOutcome::Offline) => {
                debug!("Sync skipped while offline; keeping registration");
            }
            Ok(outcome) => {
                info!("{} sync finished: {}", trigger, outcome);
                pending.clear();
            }
            Err(e) => {
                warn!("{} sync failed: {}", trigger, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    type Deliveries = mpsc::UnboundedReceiver<SyncTrigger>;

    fn spawn(
        connectivity: &Connectivity,
        fail: Arc<AtomicBool>,
    ) -> (DeferredScheduler, Deliveries, tokio::task::JoinHandle<()>) {
        let (scheduler, handle) = DeferredScheduler::new(connectivity);
        let (tx, rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            handle
                .run(move |trigger| {
                    let tx = tx.clone();
                    let fail = fail.clone();
                    async move {
                        let _ = tx.send(trigger);
                        if fail.load(Ordering::SeqCst) {
                            Err(Error::SyncRejected { status: 500 })
                        } else {
                            Ok(SyncOutcome::Empty)
                        }
                    }
                })
                .await;
        });

        (scheduler, rx, task)
    }

    async fn next(rx: &mut Deliveries) -> Option<SyncTrigger> {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .ok()
            .flatten()
    }

    async fn none_within(rx: &mut Deliveries) -> bool {
        tokio::time::timeout(Duration::from_millis(50), rx.recv())
            .await
            .is_err()
    }

    #[tokio::test]
    async fn test_register_while_online_delivers() {
        let connectivity = Connectivity::new(true);
        let (scheduler, mut rx, task) = spawn(&connectivity, Arc::new(AtomicBool::new(false)));

        scheduler.register(SYNC_TAG).await.unwrap();

        assert_eq!(next(&mut rx).await, Some(SyncTrigger::Deferred));
        scheduler.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_register_while_offline_waits_for_restore() {
        let connectivity = Connectivity::new(false);
        let (scheduler, mut rx, task) = spawn(&connectivity, Arc::new(AtomicBool::new(false)));

        scheduler.register(SYNC_TAG).await.unwrap();
        assert!(none_within(&mut rx).await);

        connectivity.set_online(true);
        assert_eq!(next(&mut rx).await, Some(SyncTrigger::Deferred));
        assert!(none_within(&mut rx).await);

        scheduler.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_restore_without_registration_runs_immediate() {
        let connectivity = Connectivity::new(false);
        let (scheduler, mut rx, task) = spawn(&connectivity, Arc::new(AtomicBool::new(false)));

        connectivity.set_online(true);

        assert_eq!(next(&mut rx).await, Some(SyncTrigger::Immediate));
        scheduler.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_flap_between_polls_still_triggers() {
        let connectivity = Connectivity::new(true);
        let (scheduler, mut rx, task) = spawn(&connectivity, Arc::new(AtomicBool::new(false)));

        connectivity.set_online(false);
        connectivity.set_online(true);

        assert_eq!(next(&mut rx).await, Some(SyncTrigger::Immediate));
        assert!(none_within(&mut rx).await);
        scheduler.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_tag_is_ignored() {
        let connectivity = Connectivity::new(true);
        let (scheduler, mut rx, task) = spawn(&connectivity, Arc::new(AtomicBool::new(false)));

        scheduler.register("push-retry").await.unwrap();

        assert!(none_within(&mut rx).await);
        scheduler.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_delivery_is_retried_as_deferred() {
        let connectivity = Connectivity::new(true);
        let fail = Arc::new(AtomicBool::new(true));
        let (scheduler, mut rx, task) = spawn(&connectivity, fail.clone());

        scheduler.register(SYNC_TAG).await.unwrap();
        assert_eq!(next(&mut rx).await, Some(SyncTrigger::Deferred));

        fail.store(false, Ordering::SeqCst);
        connectivity.set_online(false);
        tokio::time::sleep(Duration::from_millis(20)).await;
        connectivity.set_online(true);

        assert_eq!(next(&mut rx).await, Some(SyncTrigger::Deferred));
        scheduler.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_register_without_running_scheduler_is_unsupported() {
        let connectivity = Connectivity::new(true);
        let (scheduler, handle) = DeferredScheduler::new(&connectivity);
        drop(handle);

        let err = scheduler.register(SYNC_TAG).await.unwrap_err();

        assert!(matches!(err, Error::PlatformUnsupported(_)));
    }
}
