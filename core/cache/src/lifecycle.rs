//! Cache namespace lifecycle: versioning, pre-population and eviction.

use futures::future::try_join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use lantern_common::{
    CacheNamespace, Error, NamespaceRole, Request, RequestKey, Response, Result, VersionTag,
};
use lantern_net::Fetcher;
use lantern_storage::{CacheEntry, CacheStore};

use crate::config::CacheConfig;
use crate::policy::CachePolicy;

/// Outcome of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Namespace that received the manifest.
    pub namespace: CacheNamespace,
    /// Entries written.
    pub cached: usize,
    /// Manifest entries rejected by the write gate.
    pub skipped: usize,
}

/// Outcome of an activation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivateReport {
    /// Current namespaces found in storage.
    pub kept: Vec<CacheNamespace>,
    /// Superseded namespaces removed by this pass.
    pub deleted: Vec<CacheNamespace>,
}

/// Owns the active version tag and reconciles stored namespaces against it.
///
/// Exactly one namespace per role is current: `{role}-{version}`. Both
/// triggers are idempotent and safe to re-run.
pub struct CacheLifecycle {
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    manifest: Vec<Url>,
    policy: CachePolicy,
    version: RwLock<VersionTag>,
}

impl CacheLifecycle {
    /// Create a lifecycle manager starting at `version`.
    ///
    /// # Errors
    /// - Origin or a manifest entry does not resolve to a URL
    pub fn new(
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetcher>,
        config: &CacheConfig,
        version: VersionTag,
    ) -> Result<Self> {
        Ok(Self {
            store,
            fetcher,
            manifest: config.manifest_urls()?,
            policy: config.policy.clone(),
            version: RwLock::new(version),
        })
    }

    /// The active version tag.
    pub async fn version(&self) -> VersionTag {
        self.version.read().await.clone()
    }

    /// The current namespace for `role`.
    pub async fn namespace(&self, role: NamespaceRole) -> CacheNamespace {
        CacheNamespace::for_role(role, &*self.version.read().await)
    }

    /// Every current namespace, one per role.
    pub async fn current_namespaces(&self) -> Vec<CacheNamespace> {
        let version = self.version.read().await;
        NamespaceRole::ALL
            .iter()
            .map(|role| CacheNamespace::for_role(*role, &version))
            .collect()
    }

    /// Pre-populate the current static namespace from the manifest.
    ///
    /// Every manifest entry is fetched before anything is written; a single
    /// transport failure or non-success status fails the whole install and
    /// leaves the store untouched. If a write fails partway, a namespace this
    /// install created is removed again.
    pub async fn install(&self) -> Result<InstallReport> {
        let version = self.version().await;
        self.precache(&version).await
    }

    /// Delete every stored namespace that is not current.
    ///
    /// Tolerates namespaces disappearing concurrently. If some deletions
    /// fail, the rest are still attempted and the first error is returned.
    pub async fn activate(&self) -> Result<ActivateReport> {
        let current: BTreeSet<CacheNamespace> =
            self.current_namespaces().await.into_iter().collect();
        let stored = self.store.list_namespaces().await?;

        let mut report = ActivateReport::default();
        let mut first_error = None;

        for namespace in stored {
            if current.contains(&namespace) {
                report.kept.push(namespace);
                continue;
            }

            match self.store.delete_namespace(&namespace).await {
                Ok(true) => {
                    info!("Deleted superseded cache {}", namespace);
                    report.deleted.push(namespace);
                }
                Ok(false) => debug!("Cache {} already gone", namespace),
                Err(e) => {
                    warn!("Failed to delete cache {}: {}", namespace, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Write `entry` into the namespace for `role` under the version current
    /// at write time.
    ///
    /// The version cannot change while the write runs, so a write racing a
    /// version change never lands in a namespace that activation has already
    /// evicted.
    pub async fn store_current(&self, role: NamespaceRole, entry: CacheEntry) -> Result<()> {
        let version = self.version.read().await;
        let namespace = CacheNamespace::for_role(role, &version);
        let handle = self.store.open(&namespace).await?;
        self.store.put(&handle, entry).await
    }

    /// Switch to a new version tag: install under it, make it current, then
    /// evict everything else.
    ///
    /// If install fails the previous tag stays current and nothing is evicted.
    pub async fn on_version_change(&self, tag: VersionTag) -> Result<ActivateReport> {
        let previous = self.version().await;
        info!("Cache version change {} -> {}", previous, tag);

        self.precache(&tag).await?;
        *self.version.write().await = tag;
        self.activate().await
    }

    async fn precache(&self, version: &VersionTag) -> Result<InstallReport> {
        let namespace = CacheNamespace::for_role(NamespaceRole::Static, version);
        info!(
            "Pre-caching {} resources into {}",
            self.manifest.len(),
            namespace
        );

        let fetched = try_join_all(self.manifest.iter().map(|url| self.fetch_required(url))).await?;

        let existed = self.store.find(&namespace).await?.is_some();
        let handle = self.store.open(&namespace).await?;
        let mut report = InstallReport {
            namespace,
            cached: 0,
            skipped: 0,
        };

        for (url, response) in fetched {
            if !self.policy.should_cache(&url) {
                warn!("Manifest entry {} rejected by cache policy", url);
                report.skipped += 1;
                continue;
            }
            let entry = CacheEntry::from_response(RequestKey::get(&url), &response);
            if let Err(e) = self.store.put(&handle, entry).await {
                if !existed {
                    if let Err(cleanup) = self.store.delete_namespace(&report.namespace).await {
                        warn!("Failed to remove partial cache {}: {}", report.namespace, cleanup);
                    }
                }
                return Err(e);
            }
            report.cached += 1;
        }

        info!(
            "Install complete: {} cached, {} skipped in {}",
            report.cached, report.skipped, report.namespace
        );
        Ok(report)
    }

    async fn fetch_required(&self, url: &Url) -> Result<(Url, Response)> {
        let response = self.fetcher.fetch(&Request::get(url.clone())).await?;
        if !response.status.is_success() {
            return Err(Error::UnexpectedStatus {
                url: url.to_string(),
                status: response.status.as_u16(),
            });
        }
        Ok((url.clone(), response))
    }
}
