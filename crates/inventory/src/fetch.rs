//! TTL-gated fetchers, one per resource collection.
//!
//! Every collection follows the same path: serve a fresh cache entry when one
//! exists, otherwise call the remote source, normalize the payload into flat
//! records and write the whole collection back. A failed call still writes an
//! empty collection so later reads within the TTL do not retry it.

use crate::config::{InventoryConfig, Scope};
use crate::error::RemoteError;
use crate::keys::{collection_key, gpu_cluster_detail_key, ResourceKind};
use crate::model::{
    AnnouncementSummary, CapacityTopologyHost, ComputeCluster, Fabric, GatewayPresence,
    GpuMemoryCluster, Instance, InstanceConfiguration, NetworkSecurityGroup, Node, Subnet,
};
use crate::normalize::{self, items_of, object_of, str_field};
use crate::pool::FetchPool;
use crate::remote::{RemoteRequest, RemoteSource};
use crate::stats::FetchStats;
use fleet_cache::{CacheStore, Record};
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Remote source wrapped with the per-call timeout and run counters.
#[derive(Clone)]
pub(crate) struct RemoteCaller {
    remote: Arc<dyn RemoteSource>,
    timeout: Duration,
    stats: FetchStats,
}

impl RemoteCaller {
    pub(crate) fn new(remote: Arc<dyn RemoteSource>, timeout: Duration, stats: FetchStats) -> Self {
        Self {
            remote,
            timeout,
            stats,
        }
    }

    pub(crate) fn stats(&self) -> &FetchStats {
        &self.stats
    }

    /// A timed-out call is reported like any other failed call.
    pub(crate) async fn call(&self, request: RemoteRequest) -> Result<Value, RemoteError> {
        self.stats.record_remote_call();
        let result = match tokio::time::timeout(self.timeout, self.remote.call(&request)).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout {
                request: request.to_string(),
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        };
        if let Err(err) = &result {
            self.stats.record_remote_failure();
            log::warn!("{request} failed: {err}");
        }
        result
    }
}

#[derive(Clone)]
pub struct ResourceFetcher {
    cache: CacheStore,
    caller: RemoteCaller,
    pool: FetchPool,
    scope: Scope,
    node_selector: String,
    force: bool,
}

impl ResourceFetcher {
    pub fn new(
        cache: CacheStore,
        remote: Arc<dyn RemoteSource>,
        scope: Scope,
        config: &InventoryConfig,
    ) -> Self {
        Self {
            cache,
            caller: RemoteCaller::new(remote, config.call_timeout, FetchStats::new()),
            pool: FetchPool::new(config.concurrency),
            scope,
            node_selector: config.node_selector.clone(),
            force: false,
        }
    }

    /// Bypass freshness checks; every collection and detail is refetched.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn pool(&self) -> &FetchPool {
        &self.pool
    }

    pub fn stats(&self) -> &FetchStats {
        self.caller.stats()
    }

    pub fn key_for(&self, kind: ResourceKind) -> String {
        collection_key(kind, &self.scope, &self.node_selector)
    }

    fn compartment(&self) -> String {
        self.scope.compartment_id.clone()
    }

    async fn collection<R, F, Fut>(&self, kind: ResourceKind, fetch: F) -> Vec<R>
    where
        R: Record,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<R>, RemoteError>>,
    {
        let key = self.key_for(kind);
        if !self.force && self.cache.is_fresh(&key).await {
            match self.cache.read_records::<R>(&key).await {
                Ok(Some(snapshot)) => {
                    let stats = self.stats();
                    stats.record_cache_hit();
                    stats.record_malformed(snapshot.malformed);
                    log::debug!("Cache hit {key} ({} records)", snapshot.records.len());
                    return snapshot.records;
                }
                Ok(None) => {}
                Err(err) => log::warn!("Cannot read cache entry {key}: {err}"),
            }
        }

        log::debug!("Cache miss {key}");
        let records = match fetch().await {
            Ok(records) => records,
            Err(err) => {
                log::debug!("Caching empty {kind} collection after failure: {err}");
                Vec::new()
            }
        };
        if let Err(err) = self.cache.write_records(&key, &records).await {
            log::warn!("Cannot write cache entry {key}: {err}");
        }
        log::info!("Fetched {} {kind}", records.len());
        records
    }

    async fn listed<R>(
        &self,
        kind: ResourceKind,
        request: RemoteRequest,
        normalize: fn(&Value) -> Option<R>,
    ) -> Vec<R>
    where
        R: Record,
    {
        self.collection(kind, || async move {
            let payload = self.caller.call(request).await?;
            Ok::<Vec<R>, RemoteError>(items_of(&payload).iter().filter_map(normalize).collect())
        })
        .await
    }

    /// Per-item detail object, cached as JSON under its own key. A failed
    /// call leaves no entry behind.
    pub(crate) async fn detail(&self, key: String, request: RemoteRequest) -> Option<Value> {
        if !self.force && self.cache.is_fresh(&key).await {
            match self.cache.read_json::<Value>(&key).await {
                Ok(Some(cached)) => {
                    self.stats().record_cache_hit();
                    return Some(cached);
                }
                Ok(None) => {}
                Err(err) => log::warn!("Cannot read cache entry {key}: {err}"),
            }
        }

        let payload = self.caller.call(request).await.ok()?;
        let detail = object_of(&payload)?.clone();
        if let Err(err) = self.cache.write_json(&key, &detail).await {
            log::warn!("Cannot write cache entry {key}: {err}");
        }
        Some(detail)
    }

    pub async fn fabrics(&self) -> Vec<Fabric> {
        let request = RemoteRequest::ListFabrics {
            compartment_id: self.compartment(),
        };
        self.listed(ResourceKind::Fabrics, request, normalize::fabric)
            .await
    }

    /// Lists clusters, then fetches each cluster's detail through the pool to
    /// learn its size and owning configuration and compute cluster.
    pub async fn gpu_memory_clusters(&self) -> Vec<GpuMemoryCluster> {
        self.collection(ResourceKind::GpuMemoryClusters, || async {
            let payload = self
                .caller
                .call(RemoteRequest::ListGpuMemoryClusters {
                    compartment_id: self.compartment(),
                })
                .await?;
            let mut clusters: Vec<GpuMemoryCluster> = items_of(&payload)
                .iter()
                .filter_map(normalize::gpu_memory_cluster)
                .collect();

            let ids: Vec<String> = clusters.iter().map(|c| c.id.clone()).collect();
            let details = self
                .pool
                .map(ids, |cluster_id| {
                    let this = self.clone();
                    async move {
                        let key = gpu_cluster_detail_key(&cluster_id);
                        this.detail(key, RemoteRequest::GetGpuMemoryCluster { cluster_id })
                            .await
                    }
                })
                .await;
            for (cluster, detail) in clusters.iter_mut().zip(details) {
                if let Some(detail) = detail.flatten() {
                    normalize::merge_gpu_memory_cluster_detail(cluster, &detail);
                }
            }
            Ok::<_, RemoteError>(clusters)
        })
        .await
    }

    pub async fn instance_configurations(&self) -> Vec<InstanceConfiguration> {
        let request = RemoteRequest::ListInstanceConfigurations {
            compartment_id: self.compartment(),
        };
        self.listed(
            ResourceKind::InstanceConfigurations,
            request,
            normalize::instance_configuration,
        )
        .await
    }

    pub async fn compute_clusters(&self) -> Vec<ComputeCluster> {
        let request = RemoteRequest::ListComputeClusters {
            compartment_id: self.compartment(),
        };
        self.listed(
            ResourceKind::ComputeClusters,
            request,
            normalize::compute_cluster,
        )
        .await
    }

    pub async fn instances(&self) -> Vec<Instance> {
        let request = RemoteRequest::ListInstances {
            compartment_id: self.compartment(),
        };
        self.listed(ResourceKind::Instances, request, normalize::instance)
            .await
    }

    pub async fn nodes(&self) -> Vec<Node> {
        let request = RemoteRequest::ListNodes {
            selector: self.node_selector.clone(),
        };
        self.listed(ResourceKind::Nodes, request, normalize::node)
            .await
    }

    /// Hosts of every capacity topology. A topology whose host list cannot be
    /// fetched contributes nothing.
    pub async fn capacity_hosts(&self) -> Vec<CapacityTopologyHost> {
        self.collection(ResourceKind::CapacityHosts, || async {
            let payload = self
                .caller
                .call(RemoteRequest::ListCapacityTopologies {
                    compartment_id: self.compartment(),
                })
                .await?;
            let topology_ids: Vec<String> = items_of(&payload)
                .iter()
                .filter_map(|topology| str_field(topology, "id"))
                .collect();

            let per_topology = self
                .pool
                .map(topology_ids, |topology_id| {
                    let caller = self.caller.clone();
                    async move {
                        let payload = caller
                            .call(RemoteRequest::ListCapacityTopologyHosts {
                                topology_id: topology_id.clone(),
                            })
                            .await
                            .ok()?;
                        let hosts: Vec<CapacityTopologyHost> = items_of(&payload)
                            .iter()
                            .filter_map(|host| normalize::capacity_topology_host(host, &topology_id))
                            .collect();
                        Some(hosts)
                    }
                })
                .await;
            Ok::<_, RemoteError>(per_topology.into_iter().flatten().flatten().flatten().collect())
        })
        .await
    }

    /// Announcements are listed at tenancy level when the tenancy is known.
    pub async fn announcement_summaries(&self) -> Vec<AnnouncementSummary> {
        let compartment_id = self
            .scope
            .tenancy_id
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| self.compartment());
        self.listed(
            ResourceKind::Announcements,
            RemoteRequest::ListAnnouncements { compartment_id },
            normalize::announcement_summary,
        )
        .await
    }

    pub async fn subnets(&self) -> Vec<Subnet> {
        let request = RemoteRequest::ListSubnets {
            compartment_id: self.compartment(),
        };
        self.listed(ResourceKind::Subnets, request, normalize::subnet)
            .await
    }

    /// Security groups with their rule counts; a failed rule listing leaves
    /// the count unknown.
    pub async fn network_security_groups(&self) -> Vec<NetworkSecurityGroup> {
        self.collection(ResourceKind::NetworkSecurityGroups, || async {
            let payload = self
                .caller
                .call(RemoteRequest::ListNetworkSecurityGroups {
                    compartment_id: self.compartment(),
                })
                .await?;
            let mut groups: Vec<NetworkSecurityGroup> = items_of(&payload)
                .iter()
                .filter_map(normalize::network_security_group)
                .collect();

            let ids: Vec<String> = groups.iter().map(|g| g.id.clone()).collect();
            let counts = self
                .pool
                .map(ids, |nsg_id| {
                    let caller = self.caller.clone();
                    async move {
                        let payload = caller
                            .call(RemoteRequest::ListNsgRules { nsg_id })
                            .await
                            .ok()?;
                        u32::try_from(items_of(&payload).len()).ok()
                    }
                })
                .await;
            for (group, count) in groups.iter_mut().zip(counts) {
                group.rule_count = count.flatten();
            }
            Ok::<_, RemoteError>(groups)
        })
        .await
    }

    /// Gateway presence per VCN. Any failed listing fails the collection, since
    /// a missing gateway list would read as "gateway absent".
    pub async fn gateways(&self) -> Vec<GatewayPresence> {
        self.collection(ResourceKind::Gateways, || async {
            let compartment_id = self.compartment();
            let vcns = self
                .caller
                .call(RemoteRequest::ListVcns {
                    compartment_id: compartment_id.clone(),
                })
                .await?;
            let internet = self
                .caller
                .call(RemoteRequest::ListInternetGateways {
                    compartment_id: compartment_id.clone(),
                })
                .await?;
            let nat = self
                .caller
                .call(RemoteRequest::ListNatGateways {
                    compartment_id: compartment_id.clone(),
                })
                .await?;
            let service = self
                .caller
                .call(RemoteRequest::ListServiceGateways { compartment_id })
                .await?;

            let (internet, nat, service) =
                (vcns_with(&internet), vcns_with(&nat), vcns_with(&service));
            Ok::<Vec<GatewayPresence>, RemoteError>(items_of(&vcns)
                .iter()
                .filter_map(|vcn| {
                    let vcn_id = str_field(vcn, "id")?;
                    Some(GatewayPresence {
                        vcn_name: str_field(vcn, "display-name").unwrap_or_default(),
                        internet_gateway: internet.contains(&vcn_id),
                        nat_gateway: nat.contains(&vcn_id),
                        service_gateway: service.contains(&vcn_id),
                        vcn_id,
                    })
                })
                .collect())
        })
        .await
    }
}

fn vcns_with(payload: &Value) -> HashSet<String> {
    items_of(payload)
        .iter()
        .filter_map(|gateway| str_field(gateway, "vcn-id"))
        .collect()
}
