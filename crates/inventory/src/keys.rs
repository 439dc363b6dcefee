use crate::config::Scope;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

pub const GPU_CLUSTER_DETAIL_PREFIX: &str = "gpu_cluster_detail_";
pub const ANNOUNCEMENT_DETAIL_PREFIX: &str = "announcement_detail_";

/// Resource collections kept in the cache, one entry per kind and scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Fabrics,
    GpuMemoryClusters,
    InstanceConfigurations,
    ComputeClusters,
    Instances,
    Nodes,
    CapacityHosts,
    Announcements,
    Subnets,
    NetworkSecurityGroups,
    Gateways,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 11] = [
        Self::Fabrics,
        Self::GpuMemoryClusters,
        Self::InstanceConfigurations,
        Self::ComputeClusters,
        Self::Instances,
        Self::Nodes,
        Self::CapacityHosts,
        Self::Announcements,
        Self::Subnets,
        Self::NetworkSecurityGroups,
        Self::Gateways,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fabrics => "fabrics",
            Self::GpuMemoryClusters => "gpu-memory-clusters",
            Self::InstanceConfigurations => "instance-configurations",
            Self::ComputeClusters => "compute-clusters",
            Self::Instances => "instances",
            Self::Nodes => "nodes",
            Self::CapacityHosts => "capacity-hosts",
            Self::Announcements => "announcements",
            Self::Subnets => "subnets",
            Self::NetworkSecurityGroups => "nsgs",
            Self::Gateways => "gateways",
        }
    }

    fn file_stem(self) -> &'static str {
        match self {
            Self::Fabrics => "fabrics",
            Self::GpuMemoryClusters => "gpu_clusters",
            Self::InstanceConfigurations => "instance_configs",
            Self::ComputeClusters => "compute_clusters",
            Self::Instances => "instances",
            Self::Nodes => "nodes",
            Self::CapacityHosts => "capacity_hosts",
            Self::Announcements => "announcements",
            Self::Subnets => "subnets",
            Self::NetworkSecurityGroups => "nsgs",
            Self::Gateways => "gateways",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|k| k.as_str()).collect();
                format!("unknown resource kind {raw:?} (expected one of {})", known.join(", "))
            })
    }
}

/// Collection key: `<kind>_<region>_<digest of compartment>`. Nodes come from
/// the orchestrator's current context, so their key depends on the selector.
pub fn collection_key(kind: ResourceKind, scope: &Scope, node_selector: &str) -> String {
    let tag = match kind {
        ResourceKind::Nodes => short_digest(node_selector),
        _ => format!(
            "{}_{}",
            sanitize(&scope.region),
            short_digest(&scope.compartment_id)
        ),
    };
    format!("{}_{tag}", kind.file_stem())
}

pub fn gpu_cluster_detail_key(cluster_id: &str) -> String {
    format!("{GPU_CLUSTER_DETAIL_PREFIX}{}.json", sanitize(cluster_id))
}

pub fn announcement_detail_key(announcement_id: &str) -> String {
    format!("{ANNOUNCEMENT_DETAIL_PREFIX}{}.json", sanitize(announcement_id))
}

fn short_digest(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    digest[..6].iter().map(|b| format!("{b:02x}")).collect()
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect()
}
