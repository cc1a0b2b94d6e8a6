//! The owned offline context.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use lantern_cache::{ActivateReport, CacheLifecycle, InstallReport, Routed, StrategyRouter};
use lantern_common::{CacheNamespace, ItemKind, QueueItem, Request, Response, Result, VersionTag};
use lantern_net::{Fetcher, HttpFetcher};
use lantern_storage::{create_default_registry, LocalStore};
use lantern_sync::{
    Connectivity, DeferredScheduler, HttpSyncRemote, OfflineQueue, SyncCoordinator, SyncEvent,
    SyncEvents, SyncOutcome, SyncRemote, SyncSession, SyncTrigger,
};

use crate::config::AppConfig;

/// Diagnostics snapshot.
#[derive(Debug, Clone)]
pub struct ContextStatus {
    pub version: VersionTag,
    pub online: bool,
    pub store_backend: String,
    pub queue_len: usize,
    /// Every stored namespace with its entry count.
    pub namespaces: Vec<(CacheNamespace, usize)>,
    pub last_sync: Option<SyncSession>,
}

/// Everything one application instance needs, owned in one place.
///
/// The current version, connectivity and in-flight sync state live here
/// rather than in process globals, so independent contexts can run side by
/// side.
pub struct OfflineContext {
    store: LocalStore,
    fetcher: Arc<dyn Fetcher>,
    lifecycle: Arc<CacheLifecycle>,
    router: StrategyRouter,
    queue: OfflineQueue,
    coordinator: Arc<SyncCoordinator>,
    connectivity: Connectivity,
    scheduler: Option<DeferredScheduler>,
    scheduler_task: Option<JoinHandle<()>>,
}

impl OfflineContext {
    /// Open a context from configuration with the HTTP fetcher and remote.
    ///
    /// Must be called within a tokio runtime when deferred sync is enabled.
    ///
    /// # Errors
    /// - Configuration invalid
    /// - Store backend cannot be opened
    /// - HTTP client cannot be constructed
    pub fn open(config: &AppConfig) -> Result<Self> {
        config.validate()?;

        let store = create_default_registry().resolve(&config.store.backend, config.store_config())?;
        let fetcher = Arc::new(HttpFetcher::new(config.timeout())?);
        let remote = Arc::new(HttpSyncRemote::new(config.sync_endpoint()?, config.timeout())?);

        Self::new(config, store, fetcher, remote)
    }

    /// Assemble a context from explicit collaborators.
    ///
    /// Must be called within a tokio runtime when deferred sync is enabled.
    pub fn new(
        config: &AppConfig,
        store: LocalStore,
        fetcher: Arc<dyn Fetcher>,
        remote: Arc<dyn SyncRemote>,
    ) -> Result<Self> {
        let version = config.version_tag()?;
        let lifecycle = Arc::new(CacheLifecycle::new(
            store.cache.clone(),
            fetcher.clone(),
            &config.cache,
            version,
        )?);
        let router = StrategyRouter::new(
            store.cache.clone(),
            fetcher.clone(),
            lifecycle.clone(),
            &config.cache,
        )?;

        let queue = OfflineQueue::new(store.queue.clone());
        let connectivity = Connectivity::new(true);
        let coordinator = SyncCoordinator::new(
            queue.clone(),
            remote,
            connectivity.clone(),
            SyncEvents::new(),
        );

        let (coordinator, scheduler, scheduler_task) = if config.sync.deferred {
            let (scheduler, handle) = DeferredScheduler::new(&connectivity);
            let coordinator = Arc::new(coordinator.with_deferred(Arc::new(scheduler.clone())));

            let runner = coordinator.clone();
            let task = tokio::spawn(async move {
                handle
                    .run(move |trigger: SyncTrigger| {
                        let coordinator = runner.clone();
                        async move { coordinator.attempt(trigger).await }
                    })
                    .await;
            });
            (coordinator, Some(scheduler), Some(task))
        } else {
            (Arc::new(coordinator), None, None)
        };

        info!(
            "Offline context ready (store: {}, version: {})",
            store.backend(),
            config.version
        );

        Ok(Self {
            store,
            fetcher,
            lifecycle,
            router,
            queue,
            coordinator,
            connectivity,
            scheduler,
            scheduler_task,
        })
    }

    /// Route an inbound request.
    pub async fn route(&self, request: &Request) -> Routed {
        self.router.route(request).await
    }

    /// Route a request, sending pass-through requests to the network.
    pub async fn handle(&self, request: &Request) -> Result<Response> {
        self.router.handle(request).await
    }

    /// Send a request straight to the network, bypassing the router.
    pub async fn fetch_network(&self, request: &Request) -> Result<Response> {
        self.fetcher.fetch(request).await
    }

    /// Pre-populate the current static namespace.
    pub async fn install(&self) -> Result<InstallReport> {
        self.lifecycle.install().await
    }

    /// Evict every non-current namespace.
    pub async fn activate(&self) -> Result<ActivateReport> {
        self.lifecycle.activate().await
    }

    /// Install under `tag`, make it current, then evict older versions.
    pub async fn on_version_change(&self, tag: &str) -> Result<ActivateReport> {
        self.lifecycle.on_version_change(VersionTag::new(tag)?).await
    }

    /// Queue a mutation for later sync. Never waits on connectivity.
    pub async fn enqueue(&self, kind: ItemKind, payload: Value) -> Result<u64> {
        self.queue.enqueue(kind, payload).await
    }

    /// Queue a form submission and ask for a sync.
    ///
    /// A failed sync request does not undo the enqueue; the item stays queued
    /// for the next trigger.
    pub async fn submit_form(&self, payload: Value) -> Result<u64> {
        let id = self.queue.enqueue_form(payload).await?;
        if let Err(e) = self.coordinator.request_sync().await {
            warn!("Sync after form submission failed: {}", e);
        }
        Ok(id)
    }

    pub async fn pending(&self) -> Result<Vec<QueueItem>> {
        self.queue.list_all().await
    }

    /// Run a sync attempt in the foreground now.
    pub async fn drain_queue(&self) -> Result<SyncOutcome> {
        self.coordinator.attempt(SyncTrigger::Immediate).await
    }

    /// Ask for a sync, preferring a deferred attempt.
    pub async fn request_sync(&self) -> Result<SyncOutcome> {
        self.coordinator.request_sync().await
    }

    /// Report connectivity. Coming back online triggers a sync when the
    /// deferred scheduler is running.
    pub fn set_online(&self, online: bool) -> bool {
        self.connectivity.set_online(online)
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Listen for sync completion events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.coordinator.events().subscribe()
    }

    pub async fn version(&self) -> VersionTag {
        self.lifecycle.version().await
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub async fn status(&self) -> Result<ContextStatus> {
        let mut namespaces = Vec::new();
        for namespace in self.store.cache.list_namespaces().await? {
            // Skip namespaces evicted since the listing.
            if let Some(handle) = self.store.cache.find(&namespace).await? {
                let count = self.store.cache.entry_count(&handle).await?;
                namespaces.push((namespace, count));
            }
        }

        Ok(ContextStatus {
            version: self.lifecycle.version().await,
            online: self.connectivity.is_online(),
            store_backend: self.store.backend().to_string(),
            queue_len: self.queue.len().await?,
            namespaces,
            last_sync: self.coordinator.last_session().await,
        })
    }

    /// Stop the deferred scheduler and wait for it to finish.
    pub async fn shutdown(mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.shutdown().await;
        }
        if let Some(task) = self.scheduler_task.take() {
            if let Err(e) = task.await {
                warn!("Scheduler task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for OfflineContext {
    fn drop(&mut self) {
        if let Some(task) = self.scheduler_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lantern_cache::ResponseSource;
    use lantern_common::{Error, StatusCode};
    use lantern_net::MemoryNetwork;
    use lantern_sync::MemoryRemote;
    use serde_json::json;
    use std::time::Duration;
    use url::Url;

    use crate::config::{StoreSettings, CONFIG_FILENAME, DATABASE_FILENAME};
    use tempfile::TempDir;

    struct Fixture {
        ctx: OfflineContext,
        network: Arc<MemoryNetwork>,
        remote: Arc<MemoryRemote>,
        config: AppConfig,
    }

    fn fixture(manifest: &[&str], deferred: bool) -> Fixture {
        let mut config = AppConfig {
            store: StoreSettings {
                backend: "memory".to_string(),
                path: None,
            },
            ..AppConfig::default()
        };
        config.cache.manifest = manifest.iter().map(|s| s.to_string()).collect();
        config.sync.deferred = deferred;

        let network = Arc::new(MemoryNetwork::new());
        for url in config.cache.manifest_urls().unwrap() {
            network.serve(&url, "text/html", format!("content of {}", url.path()));
        }
        let remote = Arc::new(MemoryRemote::new());
        let ctx = OfflineContext::new(&config, LocalStore::memory(), network.clone(), remote.clone())
            .unwrap();

        Fixture {
            ctx,
            network,
            remote,
            config,
        }
    }

    impl Fixture {
        fn url(&self, path: &str) -> Url {
            self.config.cache.resolve(path).unwrap()
        }

        fn go_offline(&self) {
            self.network.set_online(false);
            self.ctx.set_online(false);
        }

        fn go_online(&self) {
            self.network.set_online(true);
            self.ctx.set_online(true);
        }
    }

    async fn next_event(rx: &mut broadcast::Receiver<SyncEvent>) -> Option<SyncEvent> {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .ok()
            .and_then(|r| r.ok())
    }

    #[tokio::test]
    async fn test_install_scenario() {
        let f = fixture(&["/", "/index.html", "/offline.html"], false);

        f.ctx.install().await.unwrap();
        let status = f.ctx.status().await.unwrap();

        assert_eq!(status.namespaces.len(), 1);
        assert_eq!(status.namespaces[0].0.identity(), "static-v1.0.0");
        assert_eq!(status.namespaces[0].1, 3);
    }

    #[tokio::test]
    async fn test_version_change_leaves_no_old_namespaces() {
        let f = fixture(&["/", "/offline.html"], false);
        f.ctx.install().await.unwrap();
        f.ctx.handle(&Request::navigate(f.url("/offline.html"))).await.unwrap();

        f.ctx.on_version_change("v2.0.0").await.unwrap();

        let status = f.ctx.status().await.unwrap();
        assert_eq!(status.version.as_str(), "v2.0.0");
        assert!(status.namespaces.iter().all(|(ns, _)| ns.version == "v2.0.0"));
    }

    #[tokio::test]
    async fn test_upgrade_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join(CONFIG_FILENAME);
        let mut config = AppConfig {
            store: StoreSettings {
                backend: "sqlite".to_string(),
                path: Some(dir.path().join(DATABASE_FILENAME)),
            },
            ..AppConfig::default()
        };
        config.cache.manifest = vec!["/".to_string(), "/offline.html".to_string()];
        config.sync.deferred = false;
        config.save(&config_path).unwrap();

        let network = Arc::new(MemoryNetwork::new());
        for url in config.cache.manifest_urls().unwrap() {
            network.serve(&url, "text/html", "page");
        }
        let open = |config: &AppConfig| {
            let store = create_default_registry()
                .resolve(&config.store.backend, config.store_config())
                .unwrap();
            OfflineContext::new(config, store, network.clone(), Arc::new(MemoryRemote::new()))
                .unwrap()
        };

        let ctx = open(&config);
        ctx.install().await.unwrap();
        ctx.on_version_change("v2").await.unwrap();
        AppConfig::save_version(&config_path, &ctx.version().await).unwrap();
        drop(ctx);

        let reloaded = AppConfig::load(&config_path).unwrap();
        assert_eq!(reloaded.version, "v2");
        let ctx = open(&reloaded);
        let report = ctx.activate().await.unwrap();

        assert!(report.deleted.is_empty());
        let status = ctx.status().await.unwrap();
        assert_eq!(status.version.as_str(), "v2");
        assert!(status
            .namespaces
            .iter()
            .any(|(ns, count)| ns.identity() == "static-v2" && *count == 2));
    }

    #[tokio::test]
    async fn test_offline_navigation_scenario() {
        let f = fixture(&["/", "/index.html", "/offline.html"], false);
        f.ctx.install().await.unwrap();
        f.go_offline();

        let routed = f.ctx.route(&Request::navigate(f.url("/articles/unseen"))).await;

        match routed {
            Routed::Handled { response, source } => {
                assert_eq!(source, ResponseSource::OfflinePage);
                assert_eq!(response.status, StatusCode::OK);
                assert_eq!(response.text(), "content of /offline.html");
            }
            Routed::Passthrough => panic!("navigation must be handled"),
        }
    }

    #[tokio::test]
    async fn test_offline_forms_sync_on_reconnect() {
        let f = fixture(&[], true);
        let mut events = f.ctx.subscribe();
        f.go_offline();
        // Let the scheduler observe the offline state.
        tokio::time::sleep(Duration::from_millis(20)).await;

        for i in 0..3 {
            f.ctx.submit_form(json!({ "message": i })).await.unwrap();
        }
        assert_eq!(f.ctx.pending().await.unwrap().len(), 3);
        assert_eq!(f.remote.call_count(), 0);

        f.go_online();

        let event = next_event(&mut events).await.unwrap();
        assert!(matches!(event, SyncEvent::SyncCompleted { synced: 3, .. }));
        assert!(f.ctx.pending().await.unwrap().is_empty());
        assert_eq!(f.remote.call_count(), 1);
        assert!(next_event(&mut events).await.is_none());
    }

    #[tokio::test]
    async fn test_server_error_then_success() {
        let f = fixture(&[], false);
        for i in 0..3 {
            f.ctx
                .enqueue(ItemKind::Form, json!({ "message": i }))
                .await
                .unwrap();
        }
        f.remote.set_status(StatusCode::SERVICE_UNAVAILABLE);

        let err = f.ctx.drain_queue().await.unwrap_err();

        assert!(matches!(err, Error::SyncRejected { status: 503 }));
        assert_eq!(f.ctx.pending().await.unwrap().len(), 3);

        f.remote.set_status(StatusCode::OK);
        let outcome = f.ctx.drain_queue().await.unwrap();

        assert_eq!(outcome, SyncOutcome::Synced { count: 3 });
        assert!(f.ctx.pending().await.unwrap().is_empty());
        assert_eq!(f.remote.accepted().len(), 3);
    }

    #[tokio::test]
    async fn test_deferred_request_reaches_remote() {
        let f = fixture(&[], true);
        let mut events = f.ctx.subscribe();
        f.ctx
            .enqueue(ItemKind::Analytics, json!({ "action": "click", "data": {} }))
            .await
            .unwrap();

        assert_eq!(f.ctx.request_sync().await.unwrap(), SyncOutcome::Deferred);

        assert!(next_event(&mut events).await.is_some());
        assert!(f.ctx.pending().await.unwrap().is_empty());
        f.ctx.shutdown().await;
    }

    #[tokio::test]
    async fn test_fetch_network_bypasses_cache() {
        let f = fixture(&["/"], false);
        f.ctx.install().await.unwrap();
        let home = f.url("/");

        let response = f.ctx.fetch_network(&Request::get(home.clone())).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(f.network.hits(&home), 2);
    }

    #[tokio::test]
    async fn test_independent_contexts_do_not_share_state() {
        let a = fixture(&[], false);
        let b = fixture(&[], false);

        a.ctx.enqueue(ItemKind::Form, json!({})).await.unwrap();
        a.ctx.set_online(false);

        assert_eq!(b.ctx.pending().await.unwrap().len(), 0);
        assert!(b.ctx.is_online());
    }
}
