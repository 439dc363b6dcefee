use async_trait::async_trait;
use fleet_cache::{CacheStore, ManualClock, DEFAULT_TTL};
use fleet_inventory::{
    announcement_detail_key, collection_key, AnnouncementIndexBuilder, AnnouncementPhase, Fabric,
    FleetInventory, GpuMemoryCluster, InventoryConfig, RemoteError, RemoteRequest, RemoteSource,
    ResourceFetcher, ResourceKind, Scope, DEFAULT_NODE_SELECTOR, NOT_AVAILABLE,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

const COMPARTMENT: &str = "ocid1.compartment.oc1..fleet";
const REGION: &str = "us-ashburn-1";

enum Reply {
    Json(Value),
    Fail,
}

/// Answers scripted requests; anything unscripted is an empty response.
#[derive(Default)]
struct ScriptedRemote {
    replies: HashMap<RemoteRequest, Reply>,
    calls: Mutex<Vec<RemoteRequest>>,
}

impl ScriptedRemote {
    fn with(mut self, request: RemoteRequest, reply: Reply) -> Self {
        self.replies.insert(request, reply);
        self
    }

    fn calls(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }

    fn calls_named(&self, name: &str) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .filter(|r| r.name() == name)
            .count()
    }
}

#[async_trait]
impl RemoteSource for ScriptedRemote {
    async fn call(&self, request: &RemoteRequest) -> Result<Value, RemoteError> {
        self.calls.lock().expect("calls lock").push(request.clone());
        match self.replies.get(request) {
            None => Ok(Value::Null),
            Some(Reply::Json(payload)) => Ok(payload.clone()),
            Some(Reply::Fail) => Err(RemoteError::Other(format!("{request} unavailable"))),
        }
    }
}

fn scope() -> Scope {
    Scope::new(COMPARTMENT, REGION)
}

fn config(dir: &Path) -> InventoryConfig {
    InventoryConfig {
        cache_dir: dir.to_path_buf(),
        ..InventoryConfig::default()
    }
}

fn compartment() -> String {
    COMPARTMENT.to_string()
}

fn fabric(suffix: &str) -> Fabric {
    Fabric {
        id: format!("ocid1.computegpumemoryfabric.oc1.iad.{suffix}"),
        suffix: suffix.to_string(),
        display_name: format!("fabric-{suffix}"),
        lifecycle_state: "AVAILABLE".to_string(),
        healthy_host_count: Some(18),
        available_host_count: Some(2),
        total_host_count: Some(18),
        current_firmware_bundle_id: None,
        target_firmware_bundle_id: None,
        firmware_update_state: None,
    }
}

fn gpu_instance(id: &str, state: &str, cluster: Option<&str>) -> Value {
    let mut instance = json!({
        "id": id,
        "display-name": format!("gpu-{id}"),
        "lifecycle-state": state,
        "shape": "BM.GPU.GB200.4",
    });
    if let Some(cluster) = cluster {
        instance["freeform-tags"] = json!({ "oci:compute:gpumemorycluster": cluster });
    }
    instance
}

fn k8s_node(name: &str, provider_id: &str, clique: &str) -> Value {
    json!({
        "metadata": {
            "name": name,
            "labels": { "nvidia.com/gpu.clique": clique }
        },
        "spec": { "providerID": provider_id },
        "status": { "conditions": [{ "type": "Ready", "status": "True" }] }
    })
}

fn nodes_request() -> RemoteRequest {
    RemoteRequest::ListNodes {
        selector: DEFAULT_NODE_SELECTOR.to_string(),
    }
}

#[tokio::test]
async fn second_fetch_within_ttl_makes_no_remote_calls() {
    let temp = TempDir::new().expect("tempdir");
    let remote = Arc::new(
        ScriptedRemote::default()
            .with(
                RemoteRequest::ListGpuMemoryClusters {
                    compartment_id: compartment(),
                },
                Reply::Json(json!({ "data": { "items": [
                    { "id": "cl-1", "display-name": "gmc-ab123", "lifecycle-state": "ACTIVE" },
                    { "id": "cl-2", "display-name": "gmc-cd456", "lifecycle-state": "ACTIVE" }
                ] } })),
            )
            .with(
                RemoteRequest::GetGpuMemoryCluster {
                    cluster_id: "cl-1".to_string(),
                },
                Reply::Json(json!({ "data": { "id": "cl-1", "size": 18 } })),
            ),
    );
    let fetcher = ResourceFetcher::new(
        CacheStore::new(temp.path(), DEFAULT_TTL),
        remote.clone(),
        scope(),
        &config(temp.path()),
    );

    let first = fetcher.gpu_memory_clusters().await;
    assert_eq!(remote.calls(), 3, "one list plus one detail per cluster");
    let entry = temp
        .path()
        .join(fetcher.key_for(ResourceKind::GpuMemoryClusters));
    let written = tokio::fs::read(&entry).await.expect("read entry");

    let second = fetcher.gpu_memory_clusters().await;
    assert_eq!(remote.calls(), 3);
    assert_eq!(
        serde_json::to_vec(&first).expect("json"),
        serde_json::to_vec(&second).expect("json")
    );
    assert_eq!(tokio::fs::read(&entry).await.expect("read entry"), written);
    assert_eq!(first[0].size, Some(18));
    assert_eq!(first[1].size, None, "detail miss keeps the list values");
    assert_eq!(fetcher.stats().snapshot().cache_hits, 1);
}

#[tokio::test]
async fn failed_fetch_caches_an_empty_collection() {
    let temp = TempDir::new().expect("tempdir");
    let remote = Arc::new(ScriptedRemote::default().with(
        RemoteRequest::ListInstances {
            compartment_id: compartment(),
        },
        Reply::Fail,
    ));
    let fetcher = ResourceFetcher::new(
        CacheStore::new(temp.path(), DEFAULT_TTL),
        remote.clone(),
        scope(),
        &config(temp.path()),
    );

    assert!(fetcher.instances().await.is_empty());
    assert!(fetcher.instances().await.is_empty());
    assert_eq!(remote.calls(), 1);
    let stats = fetcher.stats().snapshot();
    assert_eq!(stats.remote_failures, 1);
    assert_eq!(stats.cache_hits, 1);
}

#[tokio::test]
async fn expired_entry_is_refetched() {
    let temp = TempDir::new().expect("tempdir");
    let clock = ManualClock::new(SystemTime::now());
    let cache =
        CacheStore::new(temp.path(), Duration::from_secs(60)).with_clock(Arc::new(clock.clone()));
    let remote = Arc::new(ScriptedRemote::default());
    let fetcher = ResourceFetcher::new(cache, remote.clone(), scope(), &config(temp.path()));

    fetcher.fabrics().await;
    fetcher.fabrics().await;
    assert_eq!(remote.calls(), 1);

    clock.advance(Duration::from_secs(120));
    fetcher.fabrics().await;
    assert_eq!(remote.calls(), 2);
}

#[tokio::test]
async fn forced_refresh_ignores_fresh_entries() {
    let temp = TempDir::new().expect("tempdir");
    let remote = Arc::new(ScriptedRemote::default());
    let cache = CacheStore::new(temp.path(), DEFAULT_TTL);
    let fetcher = ResourceFetcher::new(cache, remote.clone(), scope(), &config(temp.path()));

    fetcher.nodes().await;
    fetcher.clone().with_force(true).nodes().await;
    assert_eq!(remote.calls_named("list-nodes"), 2);
}

#[tokio::test]
async fn fabric_leaves_idle_list_only_while_an_active_cluster_uses_it() {
    let temp = TempDir::new().expect("tempdir");
    let cache = CacheStore::new(temp.path(), DEFAULT_TTL);
    let fabrics_key = collection_key(ResourceKind::Fabrics, &scope(), DEFAULT_NODE_SELECTOR);
    let clusters_key =
        collection_key(ResourceKind::GpuMemoryClusters, &scope(), DEFAULT_NODE_SELECTOR);
    cache
        .write_records(&fabrics_key, &[fabric("ab123")])
        .await
        .expect("write fabrics");
    cache
        .write_records(
            &clusters_key,
            &[GpuMemoryCluster {
                id: "cl-1".to_string(),
                display_name: "gmc-ab123".to_string(),
                lifecycle_state: "ACTIVE".to_string(),
                size: Some(2),
                instance_configuration_id: None,
                compute_cluster_id: None,
                fabric_suffix: Some("ab123".to_string()),
            }],
        )
        .await
        .expect("write clusters");

    let remote = Arc::new(ScriptedRemote::default());
    let inventory =
        FleetInventory::with_cache(&config(temp.path()), scope(), remote.clone(), cache.clone())
            .expect("inventory");

    let joined = inventory.join().await;
    assert!(joined.idle_fabrics.is_empty());
    assert_eq!(remote.calls_named("list-fabrics"), 0);
    assert_eq!(remote.calls_named("list-gpu-memory-clusters"), 0);

    cache.invalidate([&clusters_key]).await.expect("invalidate");
    let joined = inventory.join().await;
    let idle: Vec<&str> = joined.idle_fabrics.iter().map(|f| f.suffix.as_str()).collect();
    assert_eq!(idle, vec!["ab123"]);
}

#[tokio::test]
async fn node_with_unknown_cluster_renders_not_available() {
    let temp = TempDir::new().expect("tempdir");
    let remote = Arc::new(
        ScriptedRemote::default()
            .with(
                nodes_request(),
                Reply::Json(json!({ "items": [k8s_node("gpu-node-1", "i-1", "X")] })),
            )
            .with(
                RemoteRequest::ListInstances {
                    compartment_id: compartment(),
                },
                Reply::Json(json!({ "data": [gpu_instance("i-1", "RUNNING", Some("cl-9"))] })),
            ),
    );
    let inventory =
        FleetInventory::new(&config(temp.path()), scope(), remote).expect("inventory");

    let joined = inventory.join().await;
    assert_eq!(joined.rows.len(), 1);
    let row = &joined.rows[0];
    assert_eq!(row.gpu_memory_cluster_id.as_deref(), Some("cl-9"));
    assert_eq!(row.gpu_memory_cluster_state, None);
    let labels = row.labels();
    assert_eq!(labels.gpu_memory_cluster_state, NOT_AVAILABLE);
    assert_eq!(labels.fabric, NOT_AVAILABLE);
    assert_eq!(labels.node_name, "gpu-node-1");
    assert_eq!(labels.clique, "X");
    assert!(joined.orphan_instances.is_empty());
    assert!(joined.orphan_nodes.is_empty());
}

#[tokio::test]
async fn only_running_instances_without_nodes_are_orphans() {
    let temp = TempDir::new().expect("tempdir");
    let remote = Arc::new(
        ScriptedRemote::default()
            .with(
                nodes_request(),
                Reply::Json(json!({ "items": [k8s_node("gpu-node-1", "oci://i-1", "X")] })),
            )
            .with(
                RemoteRequest::ListInstances {
                    compartment_id: compartment(),
                },
                Reply::Json(json!({ "data": [
                    gpu_instance("i-1", "RUNNING", None),
                    gpu_instance("i-2", "RUNNING", None),
                    gpu_instance("i-2", "RUNNING", None),
                    gpu_instance("i-3", "TERMINATED", None)
                ] })),
            ),
    );
    let inventory =
        FleetInventory::new(&config(temp.path()), scope(), remote).expect("inventory");

    let joined = inventory.join().await;
    let orphans: Vec<&str> = joined
        .orphan_instances
        .iter()
        .map(|i| i.id.as_str())
        .collect();
    assert_eq!(orphans, vec!["i-2"]);
}

#[tokio::test]
async fn scaling_cluster_keeps_its_fabric_busy_but_failed_does_not() {
    let temp = TempDir::new().expect("tempdir");
    let remote = Arc::new(
        ScriptedRemote::default()
            .with(
                RemoteRequest::ListFabrics {
                    compartment_id: compartment(),
                },
                Reply::Json(json!({ "data": { "items": [
                    { "id": "ocid1.fabric.oc1..ab123", "lifecycle-state": "AVAILABLE", "available-host-count": 2 },
                    { "id": "ocid1.fabric.oc1..cd456", "lifecycle-state": "AVAILABLE", "available-host-count": "18" }
                ] } })),
            )
            .with(
                RemoteRequest::ListGpuMemoryClusters {
                    compartment_id: compartment(),
                },
                Reply::Json(json!({ "data": { "items": [
                    { "id": "cl-1", "display-name": "train-ab123", "lifecycle-state": "ACTIVE" },
                    { "id": "cl-2", "display-name": "train-cd456", "lifecycle-state": "FAILED" }
                ] } })),
            )
            .with(
                RemoteRequest::GetGpuMemoryCluster {
                    cluster_id: "cl-1".to_string(),
                },
                Reply::Json(json!({ "data": {
                    "id": "cl-1",
                    "lifecycle-state": "SCALING",
                    "size": 4,
                    "instance-configuration-id": "ic-1",
                    "compute-cluster-id": "cc-1"
                } })),
            )
            .with(
                RemoteRequest::GetGpuMemoryCluster {
                    cluster_id: "cl-2".to_string(),
                },
                Reply::Fail,
            ),
    );
    let inventory =
        FleetInventory::new(&config(temp.path()), scope(), remote).expect("inventory");

    let snapshot = inventory.snapshot().await;
    let scaling = &snapshot.gpu_memory_clusters[0];
    assert_eq!(scaling.lifecycle_state, "SCALING");
    assert_eq!(scaling.size, Some(4));
    assert_eq!(scaling.instance_configuration_id.as_deref(), Some("ic-1"));

    let joined = inventory.join().await;
    let idle: Vec<&str> = joined.idle_fabrics.iter().map(|f| f.suffix.as_str()).collect();
    assert_eq!(idle, vec!["cd456"]);
    assert_eq!(joined.idle_fabrics[0].available_host_count, Some(18));
}

#[tokio::test]
async fn instance_and_cluster_announcements_are_merged_on_the_row() {
    let temp = TempDir::new().expect("tempdir");
    let remote = Arc::new(
        ScriptedRemote::default()
            .with(
                nodes_request(),
                Reply::Json(json!({ "items": [k8s_node("gpu-node-1", "i-1", "X")] })),
            )
            .with(
                RemoteRequest::ListInstances {
                    compartment_id: compartment(),
                },
                Reply::Json(json!({ "data": [gpu_instance("i-1", "RUNNING", Some("cl-1"))] })),
            )
            .with(
                RemoteRequest::ListAnnouncements {
                    compartment_id: compartment(),
                },
                Reply::Json(json!({ "data": { "items": [
                    { "id": "ann-1", "lifecycle-state": "ACTIVE" },
                    { "id": "ann-2", "lifecycle-state": "ACTIVE" },
                    { "id": "ann-3", "lifecycle-state": "ACTIVE" }
                ] } })),
            )
            .with(
                RemoteRequest::GetAnnouncement {
                    announcement_id: "ann-1".to_string(),
                },
                Reply::Json(json!({ "data": {
                    "id": "ann-1",
                    "lifecycle-state": "ACTIVE",
                    "reference-ticket-number": "TICKET01-maintenance",
                    "affected-resources": [{ "resource-id": "i-1" }]
                } })),
            )
            .with(
                RemoteRequest::GetAnnouncement {
                    announcement_id: "ann-2".to_string(),
                },
                Reply::Json(json!({ "data": {
                    "id": "ann-2",
                    "lifecycle-state": "ACTIVE",
                    "reference-ticket-number": "TICKET02",
                    "affected-resources": [{ "properties": [
                        { "name": "gpuMemoryCluster", "value": "cl-1" }
                    ] }]
                } })),
            )
            .with(
                RemoteRequest::GetAnnouncement {
                    announcement_id: "ann-3".to_string(),
                },
                Reply::Fail,
            ),
    );
    let inventory =
        FleetInventory::new(&config(temp.path()), scope(), remote.clone()).expect("inventory");

    let first = inventory.report().await;
    assert_eq!(first.inventory.rows[0].announcements, vec!["TICKET01", "TICKET02"]);
    assert_eq!(first.inventory.rows[0].labels().announcements, "TICKET01,TICKET02");

    // ann-3 never got a detail entry, so only it is retried.
    let calls = remote.calls();
    let second = inventory.report().await;
    assert_eq!(remote.calls() - calls, 1);
    assert_eq!(remote.calls_named("get-announcement"), 4);
    assert_eq!(
        serde_json::to_value(&first.inventory).expect("json"),
        serde_json::to_value(&second.inventory).expect("json")
    );
}

#[tokio::test]
async fn announcements_that_left_the_list_or_expired_are_not_indexed() {
    let temp = TempDir::new().expect("tempdir");
    let clock = ManualClock::new(SystemTime::now());
    let cache = CacheStore::new(temp.path(), DEFAULT_TTL).with_clock(Arc::new(clock.clone()));
    let old_key = announcement_detail_key("ann-old");
    let stale_key = announcement_detail_key("ann-stale");
    for (id, ticket) in [("ann-old", "OLDTICKET"), ("ann-stale", "STALE001")] {
        let detail = json!({
            "id": id,
            "lifecycle-state": "ACTIVE",
            "reference-ticket-number": ticket,
            "affected-resources": [{ "resource-id": "i-1" }]
        });
        cache
            .write_json(&announcement_detail_key(id), &detail)
            .await
            .expect("write detail");
    }
    clock.advance(Duration::from_secs(30 * 24 * 3_600));

    let remote = Arc::new(
        ScriptedRemote::default()
            .with(
                nodes_request(),
                Reply::Json(json!({ "items": [k8s_node("gpu-node-1", "i-1", "X")] })),
            )
            .with(
                RemoteRequest::ListInstances {
                    compartment_id: compartment(),
                },
                Reply::Json(json!({ "data": [gpu_instance("i-1", "RUNNING", None)] })),
            )
            .with(
                RemoteRequest::ListAnnouncements {
                    compartment_id: compartment(),
                },
                Reply::Json(json!({ "data": [{ "id": "ann-stale", "lifecycle-state": "ACTIVE" }] })),
            )
            .with(
                RemoteRequest::GetAnnouncement {
                    announcement_id: "ann-stale".to_string(),
                },
                Reply::Fail,
            ),
    );
    let inventory =
        FleetInventory::with_cache(&config(temp.path()), scope(), remote, cache.clone())
            .expect("inventory");

    let joined = inventory.join().await;
    assert_eq!(joined.rows.len(), 1);
    assert!(joined.rows[0].announcements.is_empty());
    assert!(cache.read(&old_key).await.expect("read").is_none());
    assert!(cache.read(&stale_key).await.expect("read").is_some());
}

#[tokio::test]
async fn announcement_builder_steps_through_phases_and_skips_corrupt_details() {
    let temp = TempDir::new().expect("tempdir");
    tokio::fs::write(
        temp.path().join(announcement_detail_key("x")),
        br#"{"id": "x", "lifecycle-st"#,
    )
    .await
    .expect("truncated detail");

    let remote = Arc::new(
        ScriptedRemote::default()
            .with(
                RemoteRequest::ListAnnouncements {
                    compartment_id: compartment(),
                },
                Reply::Json(json!({ "data": [{ "id": "ann-1" }, { "id": "x" }] })),
            )
            .with(
                RemoteRequest::GetAnnouncement {
                    announcement_id: "ann-1".to_string(),
                },
                Reply::Json(json!({ "data": {
                    "id": "ann-1",
                    "lifecycle-state": "ACTIVE",
                    "reference-ticket-number": "TICKET01",
                    "affected-resources": [{ "instance-id": "i-1" }]
                } })),
            ),
    );
    let cache = CacheStore::new(temp.path(), DEFAULT_TTL);
    let fetcher = ResourceFetcher::new(cache, remote, scope(), &config(temp.path()));
    let mut builder = AnnouncementIndexBuilder::new(fetcher.clone());
    assert_eq!(builder.phase(), AnnouncementPhase::NotFetched);

    assert_eq!(builder.fetch_list().await.len(), 2);
    assert_eq!(builder.phase(), AnnouncementPhase::ListFetched);

    assert_eq!(builder.fetch_details().await, 1);
    assert_eq!(builder.phase(), AnnouncementPhase::DetailsFetched);

    let index = builder.build_index().await;
    assert_eq!(builder.phase(), AnnouncementPhase::IndexBuilt);
    assert_eq!(index.tickets_for_resource("i-1"), ["TICKET01"]);
    assert_eq!(fetcher.stats().snapshot().malformed_records, 1);
}

#[tokio::test]
async fn capacity_hosts_survive_one_failed_topology() {
    let temp = TempDir::new().expect("tempdir");
    let remote = Arc::new(
        ScriptedRemote::default()
            .with(
                nodes_request(),
                Reply::Json(json!({ "items": [
                    k8s_node("gpu-node-1", "i-1", "X"),
                    k8s_node("gpu-node-2", "i-2", "X")
                ] })),
            )
            .with(
                RemoteRequest::ListInstances {
                    compartment_id: compartment(),
                },
                Reply::Json(json!({ "data": [
                    gpu_instance("i-1", "RUNNING", None),
                    gpu_instance("i-2", "RUNNING", None)
                ] })),
            )
            .with(
                RemoteRequest::ListCapacityTopologies {
                    compartment_id: compartment(),
                },
                Reply::Json(json!({ "data": { "items": [{ "id": "topo-1" }, { "id": "topo-2" }] } })),
            )
            .with(
                RemoteRequest::ListCapacityTopologyHosts {
                    topology_id: "topo-1".to_string(),
                },
                Reply::Fail,
            )
            .with(
                RemoteRequest::ListCapacityTopologyHosts {
                    topology_id: "topo-2".to_string(),
                },
                Reply::Json(json!({ "data": { "items": [{
                    "instance-id": "i-2",
                    "lifecycle-state": "ACTIVE",
                    "lifecycle-details": "healthy"
                }] } })),
            ),
    );
    let inventory =
        FleetInventory::new(&config(temp.path()), scope(), remote.clone()).expect("inventory");

    let joined = inventory.join().await;
    let host_state = |instance: &str| {
        joined
            .rows
            .iter()
            .find(|r| r.instance_id.as_deref() == Some(instance))
            .map(|r| r.labels().host_state)
    };
    assert_eq!(host_state("i-2").as_deref(), Some("ACTIVE"));
    assert_eq!(host_state("i-1").as_deref(), Some(NOT_AVAILABLE));
    assert_eq!(remote.calls_named("list-capacity-topology-hosts"), 2);
    assert_eq!(inventory.stats().remote_failures, 1);

    let hosts = inventory.fetcher().capacity_hosts().await;
    assert_eq!(hosts.len(), 1);
    assert_eq!(hosts[0].topology_id, "topo-2");
    assert_eq!(remote.calls_named("list-capacity-topology-hosts"), 2);
}

#[tokio::test]
async fn environment_health_reports_gateway_gaps() {
    let temp = TempDir::new().expect("tempdir");
    let remote = Arc::new(
        ScriptedRemote::default()
            .with(
                RemoteRequest::ListVcns {
                    compartment_id: compartment(),
                },
                Reply::Json(json!({ "data": [
                    { "id": "vcn-1", "display-name": "fleet" },
                    { "id": "vcn-2", "display-name": "mgmt" }
                ] })),
            )
            .with(
                RemoteRequest::ListNatGateways {
                    compartment_id: compartment(),
                },
                Reply::Json(json!({ "data": [{ "id": "nat-1", "vcn-id": "vcn-1" }] })),
            )
            .with(
                RemoteRequest::ListServiceGateways {
                    compartment_id: compartment(),
                },
                Reply::Json(json!({ "data": [
                    { "id": "sgw-1", "vcn-id": "vcn-1" },
                    { "id": "sgw-2", "vcn-id": "vcn-2" }
                ] })),
            )
            .with(
                RemoteRequest::ListNetworkSecurityGroups {
                    compartment_id: compartment(),
                },
                Reply::Json(json!({ "data": [
                    { "id": "nsg-1", "display-name": "workers", "lifecycle-state": "AVAILABLE" }
                ] })),
            )
            .with(
                RemoteRequest::ListNsgRules {
                    nsg_id: "nsg-1".to_string(),
                },
                Reply::Json(json!({ "data": [{ "direction": "INGRESS" }, { "direction": "EGRESS" }] })),
            ),
    );
    let inventory =
        FleetInventory::new(&config(temp.path()), scope(), remote).expect("inventory");

    let health = inventory.environment().await;
    assert_eq!(health.vcn_count, 2);
    assert_eq!(health.vcns_without_nat, vec!["mgmt"]);
    assert!(health.vcns_without_service_gateway.is_empty());
    assert_eq!(health.nsg_rule_count, 2);
    assert!(health.unavailable.is_empty());
}

#[tokio::test]
async fn cluster_change_invalidates_fabrics_clusters_and_details() {
    let temp = TempDir::new().expect("tempdir");
    let remote = Arc::new(
        ScriptedRemote::default()
            .with(
                RemoteRequest::ListGpuMemoryClusters {
                    compartment_id: compartment(),
                },
                Reply::Json(json!({ "data": [{ "id": "cl-1", "display-name": "gmc-ab123" }] })),
            )
            .with(
                RemoteRequest::GetGpuMemoryCluster {
                    cluster_id: "cl-1".to_string(),
                },
                Reply::Json(json!({ "data": { "id": "cl-1", "size": 2 } })),
            ),
    );
    let inventory =
        FleetInventory::new(&config(temp.path()), scope(), remote.clone()).expect("inventory");

    inventory.snapshot().await;
    let removed = inventory
        .invalidate_after_cluster_change()
        .await
        .expect("invalidate");
    // fabrics, clusters, and the one cluster detail entry
    assert_eq!(removed, 3);

    let before = remote.calls_named("list-fabrics");
    inventory.snapshot().await;
    assert_eq!(remote.calls_named("list-fabrics"), before + 1);
    assert_eq!(remote.calls_named("list-instances"), 1, "instances stay cached");
}

#[test]
fn incomplete_scope_is_rejected_before_any_call() {
    let temp = TempDir::new().expect("tempdir");
    let remote = Arc::new(ScriptedRemote::default());
    let result = FleetInventory::new(&config(temp.path()), Scope::new("", REGION), remote.clone());
    assert!(result.is_err());
    assert_eq!(remote.calls(), 0);
}
