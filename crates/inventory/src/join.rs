//! Cross-source joins over one snapshot of every cached collection.
//!
//! Join chain:
//!
//! ```text
//! Node.provider_id ── Instance.id ── tag ── GpuMemoryCluster.id ── suffix ── Fabric
//!                                                 ├── InstanceConfiguration.id
//!                                                 └── ComputeCluster.id
//! ```
//!
//! A missing target is `None` in the row; nothing here fails.

use crate::announcements::AnnouncementIndex;
use crate::model::{
    or_na, CapacityTopologyHost, ComputeCluster, Fabric, GpuMemoryCluster, Instance,
    InstanceConfiguration, Node, NOT_AVAILABLE,
};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Most recent cached value of every collection the joins read.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InventorySnapshot {
    pub fabrics: Vec<Fabric>,
    pub gpu_memory_clusters: Vec<GpuMemoryCluster>,
    pub instance_configurations: Vec<InstanceConfiguration>,
    pub compute_clusters: Vec<ComputeCluster>,
    pub instances: Vec<Instance>,
    pub nodes: Vec<Node>,
    pub capacity_hosts: Vec<CapacityTopologyHost>,
    #[serde(skip)]
    pub announcements: AnnouncementIndex,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InventoryRow {
    pub display_name: String,
    pub instance_id: Option<String>,
    pub instance_state: Option<String>,
    pub shape: Option<String>,
    pub node_name: Option<String>,
    pub node_ready: Option<bool>,
    pub clique: Option<String>,
    pub gpu_memory_cluster_id: Option<String>,
    pub gpu_memory_cluster_name: Option<String>,
    pub gpu_memory_cluster_state: Option<String>,
    pub gpu_memory_cluster_size: Option<u32>,
    pub instance_configuration: Option<String>,
    pub compute_cluster: Option<String>,
    pub fabric_id: Option<String>,
    pub fabric_name: Option<String>,
    pub fabric_state: Option<String>,
    pub fabric_available_hosts: Option<u32>,
    pub host_state: Option<String>,
    pub announcements: Vec<String>,
}

/// Display form of a row: every absent value is `"N/A"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowLabels {
    pub display_name: String,
    pub instance_id: String,
    pub instance_state: String,
    pub node_name: String,
    pub ready: String,
    pub clique: String,
    pub gpu_memory_cluster: String,
    pub gpu_memory_cluster_state: String,
    pub gpu_memory_cluster_size: String,
    pub instance_configuration: String,
    pub compute_cluster: String,
    pub fabric: String,
    pub fabric_available_hosts: String,
    pub host_state: String,
    pub announcements: String,
}

fn label(value: &Option<String>) -> String {
    or_na(value.as_deref()).to_string()
}

fn count_label(value: Option<u32>) -> String {
    value.map_or_else(|| NOT_AVAILABLE.to_string(), |v| v.to_string())
}

impl InventoryRow {
    pub fn labels(&self) -> RowLabels {
        RowLabels {
            display_name: or_na(Some(self.display_name.as_str())).to_string(),
            instance_id: label(&self.instance_id),
            instance_state: label(&self.instance_state),
            node_name: label(&self.node_name),
            ready: match self.node_ready {
                Some(true) => "Ready".to_string(),
                Some(false) => "NotReady".to_string(),
                None => NOT_AVAILABLE.to_string(),
            },
            clique: label(&self.clique),
            gpu_memory_cluster: label(
                &self
                    .gpu_memory_cluster_name
                    .clone()
                    .or_else(|| self.gpu_memory_cluster_id.clone()),
            ),
            gpu_memory_cluster_state: label(&self.gpu_memory_cluster_state),
            gpu_memory_cluster_size: count_label(self.gpu_memory_cluster_size),
            instance_configuration: label(&self.instance_configuration),
            compute_cluster: label(&self.compute_cluster),
            fabric: label(&self.fabric_name.clone().or_else(|| self.fabric_id.clone())),
            fabric_available_hosts: count_label(self.fabric_available_hosts),
            host_state: label(&self.host_state),
            announcements: if self.announcements.is_empty() {
                NOT_AVAILABLE.to_string()
            } else {
                self.announcements.join(",")
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CliqueCluster {
    pub gpu_memory_cluster_id: Option<String>,
    pub node_count: usize,
}

/// Nodes sharing one clique label and the GPU memory clusters behind them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CliqueSummary {
    pub clique: String,
    pub node_count: usize,
    pub ready_count: usize,
    /// Every distinct cluster among member nodes, in first-seen order. Nodes
    /// without a known cluster count under `None`.
    pub gpu_memory_clusters: Vec<CliqueCluster>,
    /// Every distinct state of those clusters.
    pub cluster_states: Vec<String>,
    /// True only when the clique maps to exactly one known cluster.
    pub consistent: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JoinedInventory {
    pub rows: Vec<InventoryRow>,
    pub cliques: Vec<CliqueSummary>,
    /// Fabrics no active cluster is placed on.
    pub idle_fabrics: Vec<Fabric>,
    /// Running GPU instances that never joined the orchestrator.
    pub orphan_instances: Vec<Instance>,
    /// Nodes whose provider id matches no cloud instance.
    pub orphan_nodes: Vec<Node>,
}

pub struct JoinEngine<'a> {
    snapshot: &'a InventorySnapshot,
    fabrics_by_suffix: HashMap<&'a str, &'a Fabric>,
    clusters: HashMap<&'a str, &'a GpuMemoryCluster>,
    configurations: HashMap<&'a str, &'a InstanceConfiguration>,
    compute_clusters: HashMap<&'a str, &'a ComputeCluster>,
    instances: HashMap<&'a str, &'a Instance>,
    nodes_by_instance: HashMap<&'a str, &'a Node>,
    hosts: HashMap<&'a str, &'a CapacityTopologyHost>,
}

/// First entry per key wins.
fn index_by<'a, T>(
    items: &'a [T],
    key: impl Fn(&'a T) -> Option<&'a str>,
) -> HashMap<&'a str, &'a T> {
    let mut map = HashMap::with_capacity(items.len());
    for item in items {
        if let Some(k) = key(item).filter(|k| !k.is_empty()) {
            map.entry(k).or_insert(item);
        }
    }
    map
}

impl<'a> JoinEngine<'a> {
    pub fn new(snapshot: &'a InventorySnapshot) -> Self {
        Self {
            snapshot,
            fabrics_by_suffix: index_by(&snapshot.fabrics, |f| Some(f.suffix.as_str())),
            clusters: index_by(&snapshot.gpu_memory_clusters, |c| Some(c.id.as_str())),
            configurations: index_by(&snapshot.instance_configurations, |c| Some(c.id.as_str())),
            compute_clusters: index_by(&snapshot.compute_clusters, |c| Some(c.id.as_str())),
            instances: index_by(&snapshot.instances, |i| Some(i.id.as_str())),
            nodes_by_instance: index_by(&snapshot.nodes, Node::instance_id),
            hosts: index_by(&snapshot.capacity_hosts, |h| Some(h.instance_id.as_str())),
        }
    }

    pub fn cluster(&self, cluster_id: &str) -> Option<&'a GpuMemoryCluster> {
        self.clusters.get(cluster_id).copied()
    }

    /// The fabric whose suffix equals the cluster's, if any.
    pub fn fabric_for(&self, cluster: &GpuMemoryCluster) -> Option<&'a Fabric> {
        let suffix = cluster.fabric_suffix.as_deref()?;
        self.fabrics_by_suffix.get(suffix).copied()
    }

    pub fn node_for(&self, instance_id: &str) -> Option<&'a Node> {
        self.nodes_by_instance.get(instance_id).copied()
    }

    pub fn instance_for(&self, node: &Node) -> Option<&'a Instance> {
        node.instance_id()
            .and_then(|id| self.instances.get(id).copied())
    }

    pub fn join(&self) -> JoinedInventory {
        JoinedInventory {
            rows: self.rows(),
            cliques: self.cliques(),
            idle_fabrics: self.idle_fabrics(),
            orphan_instances: self.orphan_instances(),
            orphan_nodes: self.orphan_nodes(),
        }
    }

    fn row(&self, instance: Option<&Instance>, node: Option<&Node>) -> InventoryRow {
        let cluster_id = instance.and_then(|i| i.gpu_memory_cluster_id.clone());
        let cluster = cluster_id.as_deref().and_then(|id| self.cluster(id));
        let fabric = cluster.and_then(|c| self.fabric_for(c));
        let instance_id = instance.map(|i| i.id.clone());
        let provider_id = instance_id
            .as_deref()
            .or_else(|| node.and_then(Node::instance_id));

        InventoryRow {
            display_name: instance
                .map(|i| i.display_name.clone())
                .filter(|n| !n.is_empty())
                .or_else(|| node.map(|n| n.name.clone()))
                .unwrap_or_default(),
            instance_state: instance.map(|i| i.lifecycle_state.clone()),
            shape: instance.map(|i| i.shape.clone()),
            node_name: node.map(|n| n.name.clone()),
            node_ready: node.and_then(|n| n.ready),
            clique: node.and_then(|n| n.clique.clone()),
            gpu_memory_cluster_name: cluster.map(|c| c.display_name.clone()),
            gpu_memory_cluster_state: cluster.map(|c| c.lifecycle_state.clone()),
            gpu_memory_cluster_size: cluster.and_then(|c| c.size),
            instance_configuration: cluster
                .and_then(|c| c.instance_configuration_id.as_deref())
                .and_then(|id| self.configurations.get(id))
                .map(|c| c.display_name.clone()),
            compute_cluster: cluster
                .and_then(|c| c.compute_cluster_id.as_deref())
                .and_then(|id| self.compute_clusters.get(id))
                .map(|c| c.display_name.clone()),
            fabric_id: fabric.map(|f| f.id.clone()),
            fabric_name: fabric.map(|f| f.display_name.clone()),
            fabric_state: fabric.map(|f| f.lifecycle_state.clone()),
            fabric_available_hosts: fabric.and_then(|f| f.available_host_count),
            host_state: provider_id
                .and_then(|id| self.hosts.get(id))
                .map(|h| h.lifecycle_state.clone()),
            announcements: self
                .snapshot
                .announcements
                .tickets_for(provider_id, cluster_id.as_deref()),
            gpu_memory_cluster_id: cluster_id,
            instance_id,
        }
    }

    /// One row per relevant instance plus one per node without an instance,
    /// sorted by cluster id (rows without one last), then display name.
    pub fn rows(&self) -> Vec<InventoryRow> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut rows = Vec::new();
        for instance in &self.snapshot.instances {
            if !seen.insert(instance.id.as_str()) {
                continue;
            }
            let node = self.node_for(&instance.id);
            let relevant = node.is_some()
                || ((instance.is_gpu_shape() || instance.gpu_memory_cluster_id.is_some())
                    && instance.lifecycle_state != "TERMINATED");
            if relevant {
                rows.push(self.row(Some(instance), node));
            }
        }
        for node in &self.snapshot.nodes {
            if self.instance_for(node).is_none() {
                rows.push(self.row(None, Some(node)));
            }
        }
        rows.sort_by(compare_rows);
        rows
    }

    pub fn cliques(&self) -> Vec<CliqueSummary> {
        let mut members: BTreeMap<&str, Vec<&Node>> = BTreeMap::new();
        for node in &self.snapshot.nodes {
            if let Some(clique) = node.clique.as_deref().filter(|c| !c.is_empty()) {
                members.entry(clique).or_default().push(node);
            }
        }

        members
            .into_iter()
            .map(|(clique, nodes)| {
                let mut clusters: Vec<CliqueCluster> = Vec::new();
                for node in &nodes {
                    let cluster_id = self
                        .instance_for(node)
                        .and_then(|i| i.gpu_memory_cluster_id.clone());
                    match clusters
                        .iter_mut()
                        .find(|c| c.gpu_memory_cluster_id == cluster_id)
                    {
                        Some(entry) => entry.node_count += 1,
                        None => clusters.push(CliqueCluster {
                            gpu_memory_cluster_id: cluster_id,
                            node_count: 1,
                        }),
                    }
                }

                let mut cluster_states: Vec<String> = Vec::new();
                for entry in &clusters {
                    let state = entry
                        .gpu_memory_cluster_id
                        .as_deref()
                        .and_then(|id| self.cluster(id))
                        .map(|c| c.lifecycle_state.clone());
                    if let Some(state) = state {
                        if !cluster_states.contains(&state) {
                            cluster_states.push(state);
                        }
                    }
                }

                let consistent =
                    clusters.len() == 1 && clusters[0].gpu_memory_cluster_id.is_some();
                if !consistent {
                    log::debug!("Clique {clique} spans {} cluster entries", clusters.len());
                }
                CliqueSummary {
                    clique: clique.to_string(),
                    node_count: nodes.len(),
                    ready_count: nodes.iter().filter(|n| n.ready == Some(true)).count(),
                    gpu_memory_clusters: clusters,
                    cluster_states,
                    consistent,
                }
            })
            .collect()
    }

    /// Fabrics without a cluster in ACTIVE, UPDATING or SCALING state.
    pub fn idle_fabrics(&self) -> Vec<Fabric> {
        let busy: HashSet<&str> = self
            .snapshot
            .gpu_memory_clusters
            .iter()
            .filter(|c| c.has_active_workload())
            .filter_map(|c| c.fabric_suffix.as_deref())
            .collect();
        self.snapshot
            .fabrics
            .iter()
            .filter(|f| !busy.contains(f.suffix.as_str()))
            .cloned()
            .collect()
    }

    /// Running GPU-shaped instances with no node, each listed once.
    pub fn orphan_instances(&self) -> Vec<Instance> {
        let mut seen: HashSet<&str> = HashSet::new();
        self.snapshot
            .instances
            .iter()
            .filter(|i| i.is_running() && i.is_gpu_shape())
            .filter(|i| self.node_for(&i.id).is_none())
            .filter(|i| seen.insert(i.id.as_str()))
            .cloned()
            .collect()
    }

    pub fn orphan_nodes(&self) -> Vec<Node> {
        self.snapshot
            .nodes
            .iter()
            .filter(|n| self.instance_for(n).is_none())
            .cloned()
            .collect()
    }
}

fn compare_rows(a: &InventoryRow, b: &InventoryRow) -> Ordering {
    let cluster = match (&a.gpu_memory_cluster_id, &b.gpu_memory_cluster_id) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    cluster
        .then_with(|| a.display_name.cmp(&b.display_name))
        .then_with(|| a.instance_id.cmp(&b.instance_id))
        .then_with(|| a.node_name.cmp(&b.node_name))
}
