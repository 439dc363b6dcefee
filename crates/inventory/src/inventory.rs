use crate::announcements::{AnnouncementIndex, AnnouncementIndexBuilder};
use crate::config::{InventoryConfig, Scope};
use crate::fetch::ResourceFetcher;
use crate::join::{InventorySnapshot, JoinEngine, JoinedInventory};
use crate::keys::{ResourceKind, ANNOUNCEMENT_DETAIL_PREFIX, GPU_CLUSTER_DETAIL_PREFIX};
use crate::network::EnvironmentHealth;
use crate::remote::{CliRemote, RemoteSource};
use crate::stats::FetchStatsSnapshot;
use crate::Result;
use fleet_cache::CacheStore;
use serde::Serialize;
use std::sync::Arc;

/// Everything one report run produces.
#[derive(Debug, Clone, Serialize)]
pub struct InventoryReport {
    pub scope: Scope,
    pub inventory: JoinedInventory,
    pub environment: EnvironmentHealth,
    pub stats: FetchStatsSnapshot,
}

/// Wires the cache, the fetchers, the announcement index and the joins for
/// one scope.
pub struct FleetInventory {
    fetcher: ResourceFetcher,
}

impl FleetInventory {
    /// Fails with a configuration error before anything is fetched when the
    /// scope is incomplete.
    pub fn new(config: &InventoryConfig, scope: Scope, remote: Arc<dyn RemoteSource>) -> Result<Self> {
        let cache = CacheStore::new(&config.cache_dir, config.cache_ttl);
        Self::with_cache(config, scope, remote, cache)
    }

    pub fn with_cache(
        config: &InventoryConfig,
        scope: Scope,
        remote: Arc<dyn RemoteSource>,
        cache: CacheStore,
    ) -> Result<Self> {
        scope.validate()?;
        log::debug!(
            "Inventory for {} in {} (cache {}, ttl {}s, concurrency {})",
            scope.compartment_id,
            scope.region,
            cache.dir().display(),
            cache.ttl().as_secs(),
            config.concurrency
        );
        Ok(Self {
            fetcher: ResourceFetcher::new(cache, remote, scope, config),
        })
    }

    /// Inventory backed by the `oci` and `kubectl` binaries from `config`.
    pub fn with_cli(config: &InventoryConfig, scope: Scope) -> Result<Self> {
        let remote = CliRemote::new(
            &config.oci_bin,
            &config.kubectl_bin,
            scope.region.clone(),
            scope.profile.clone(),
        );
        Self::new(config, scope, Arc::new(remote))
    }

    /// Ignore cache freshness for this run.
    pub fn force_refresh(mut self, force: bool) -> Self {
        self.fetcher = self.fetcher.with_force(force);
        self
    }

    pub fn fetcher(&self) -> &ResourceFetcher {
        &self.fetcher
    }

    pub fn cache(&self) -> &CacheStore {
        self.fetcher.cache()
    }

    pub fn scope(&self) -> &Scope {
        self.fetcher.scope()
    }

    pub fn stats(&self) -> FetchStatsSnapshot {
        self.fetcher.stats().snapshot()
    }

    pub async fn announcements(&self) -> AnnouncementIndex {
        AnnouncementIndexBuilder::new(self.fetcher.clone()).run().await
    }

    /// Current value of every collection the joins need. Collections are
    /// fetched concurrently; per-item detail calls share one pool.
    pub async fn snapshot(&self) -> InventorySnapshot {
        let f = &self.fetcher;
        let (
            fabrics,
            gpu_memory_clusters,
            instance_configurations,
            compute_clusters,
            instances,
            nodes,
            capacity_hosts,
            announcements,
        ) = tokio::join!(
            f.fabrics(),
            f.gpu_memory_clusters(),
            f.instance_configurations(),
            f.compute_clusters(),
            f.instances(),
            f.nodes(),
            f.capacity_hosts(),
            self.announcements(),
        );
        InventorySnapshot {
            fabrics,
            gpu_memory_clusters,
            instance_configurations,
            compute_clusters,
            instances,
            nodes,
            capacity_hosts,
            announcements,
        }
    }

    pub async fn environment(&self) -> EnvironmentHealth {
        let f = &self.fetcher;
        let (subnets, nsgs, gateways) =
            tokio::join!(f.subnets(), f.network_security_groups(), f.gateways());
        EnvironmentHealth::summarize(&subnets, &nsgs, &gateways)
    }

    pub async fn join(&self) -> JoinedInventory {
        let snapshot = self.snapshot().await;
        JoinEngine::new(&snapshot).join()
    }

    pub async fn report(&self) -> InventoryReport {
        let (inventory, environment) = tokio::join!(self.join(), self.environment());
        let stats = self.stats();
        log::info!(
            "Inventory: {} rows, {} idle fabrics, {} orphan instances ({} cache hits, {} remote calls, {} failures, {} malformed records)",
            inventory.rows.len(),
            inventory.idle_fabrics.len(),
            inventory.orphan_instances.len(),
            stats.cache_hits,
            stats.remote_calls,
            stats.remote_failures,
            stats.malformed_records
        );
        InventoryReport {
            scope: self.scope().clone(),
            inventory,
            environment,
            stats,
        }
    }

    /// Drops the collections of `kinds` in this scope. GPU memory clusters and
    /// announcements also drop their per-item detail entries.
    pub async fn invalidate_kinds(&self, kinds: &[ResourceKind]) -> Result<usize> {
        let cache = self.cache();
        let mut keys: Vec<String> = kinds.iter().map(|k| self.fetcher.key_for(*k)).collect();
        for kind in kinds {
            let prefix = match kind {
                ResourceKind::GpuMemoryClusters => GPU_CLUSTER_DETAIL_PREFIX,
                ResourceKind::Announcements => ANNOUNCEMENT_DETAIL_PREFIX,
                _ => continue,
            };
            keys.extend(cache.keys_with_prefix(prefix).await?);
        }
        let removed = cache.invalidate(&keys).await?;
        log::info!("Invalidated {removed} cache entries");
        Ok(removed)
    }

    /// Creating, scaling or deleting a cluster changes fabric host counts and
    /// the cluster list.
    pub async fn invalidate_after_cluster_change(&self) -> Result<usize> {
        self.invalidate_kinds(&[ResourceKind::Fabrics, ResourceKind::GpuMemoryClusters])
            .await
    }

    pub async fn clear_cache(&self) -> Result<usize> {
        let removed = self.cache().clear().await?;
        log::info!("Removed {removed} cache entries");
        Ok(removed)
    }
}
