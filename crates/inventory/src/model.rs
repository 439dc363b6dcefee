//! Flat entity records shared by the fetchers, the cache and the joins.
//!
//! Absent values are `None` here; the `"N/A"` sentinel only appears when a
//! row is turned into display labels.

use fleet_cache::Record;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::OnceLock;

pub const NOT_AVAILABLE: &str = "N/A";

/// Cluster states that still occupy fabric capacity.
pub const ACTIVE_CLUSTER_STATES: [&str; 3] = ["ACTIVE", "UPDATING", "SCALING"];

pub const FABRIC_SUFFIX_LEN: usize = 5;

pub const GPU_MEMORY_CLUSTER_TAG: &str = "oci:compute:gpumemorycluster";

pub const CLIQUE_LABEL: &str = "nvidia.com/gpu.clique";
pub const GPU_PRODUCT_LABEL: &str = "nvidia.com/gpu.product";
pub const GPU_MEMORY_LABEL: &str = "nvidia.com/gpu.memory";
pub const GPU_COUNT_LABEL: &str = "nvidia.com/gpu.count";

pub fn or_na(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or(NOT_AVAILABLE)
}

pub fn is_active_cluster_state(state: &str) -> bool {
    ACTIVE_CLUSTER_STATES.contains(&state)
}

/// Join key of a fabric: the last five characters of its id.
pub fn fabric_suffix_of(id: &str) -> Option<String> {
    let chars: Vec<char> = id.chars().collect();
    if chars.len() < FABRIC_SUFFIX_LEN {
        return None;
    }
    Some(chars[chars.len() - FABRIC_SUFFIX_LEN..].iter().collect())
}

/// GPU memory cluster names end in `-<fabric suffix>`.
pub fn fabric_suffix_from_name(name: &str) -> Option<String> {
    static SUFFIX: OnceLock<Regex> = OnceLock::new();
    let re = SUFFIX.get_or_init(|| {
        Regex::new(r"-([a-z0-9]{5})$").unwrap_or_else(|err| unreachable!("suffix regex: {err}"))
    });
    re.captures(name.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fabric {
    pub id: String,
    pub suffix: String,
    pub display_name: String,
    pub lifecycle_state: String,
    pub healthy_host_count: Option<u32>,
    pub available_host_count: Option<u32>,
    pub total_host_count: Option<u32>,
    pub current_firmware_bundle_id: Option<String>,
    pub target_firmware_bundle_id: Option<String>,
    pub firmware_update_state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuMemoryCluster {
    pub id: String,
    pub display_name: String,
    pub lifecycle_state: String,
    /// Node count at fetch time.
    pub size: Option<u32>,
    pub instance_configuration_id: Option<String>,
    pub compute_cluster_id: Option<String>,
    pub fabric_suffix: Option<String>,
}

impl GpuMemoryCluster {
    pub fn has_active_workload(&self) -> bool {
        is_active_cluster_state(&self.lifecycle_state)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceConfiguration {
    pub id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeCluster {
    pub id: String,
    pub display_name: String,
    pub availability_domain: Option<String>,
}

/// Orchestrator-side view of a GPU node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub provider_id: Option<String>,
    pub ready: Option<bool>,
    pub clique: Option<String>,
    pub gpu_product: Option<String>,
    pub gpu_memory: Option<String>,
    pub gpu_count: Option<String>,
}

impl Node {
    /// Instance id behind the provider id, without any `scheme://` prefix.
    pub fn instance_id(&self) -> Option<&str> {
        let raw = self.provider_id.as_deref()?.trim();
        let id = raw.rsplit_once("://").map_or(raw, |(_, rest)| rest);
        (!id.is_empty()).then_some(id)
    }
}

/// Cloud-side compute instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub display_name: String,
    pub lifecycle_state: String,
    pub shape: String,
    pub availability_domain: Option<String>,
    pub fault_domain: Option<String>,
    pub gpu_memory_cluster_id: Option<String>,
    pub time_created: Option<String>,
}

impl Instance {
    pub fn is_running(&self) -> bool {
        self.lifecycle_state == "RUNNING"
    }

    pub fn is_gpu_shape(&self) -> bool {
        self.shape.to_ascii_uppercase().contains("GPU")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityTopologyHost {
    pub instance_id: String,
    pub lifecycle_state: String,
    pub lifecycle_details: Option<String>,
    pub topology_id: String,
}

/// Announcement as returned by the list call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnouncementSummary {
    pub id: String,
    pub reference_ticket: Option<String>,
    pub lifecycle_state: String,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: String,
    pub display_name: String,
    pub cidr_block: Option<String>,
    /// `public` or `private`.
    pub access: Option<String>,
    pub lifecycle_state: String,
    pub vcn_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSecurityGroup {
    pub id: String,
    pub display_name: String,
    pub lifecycle_state: String,
    pub vcn_id: Option<String>,
    pub rule_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayPresence {
    pub vcn_id: String,
    pub vcn_name: String,
    pub internet_gateway: bool,
    pub nat_gateway: bool,
    pub service_gateway: bool,
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn number<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn optional(field: &str) -> Option<String> {
    (!field.is_empty()).then(|| field.to_string())
}

/// Outer `None` means the field is present but unparsable.
fn parse_optional<T: FromStr>(field: &str) -> Option<Option<T>> {
    if field.is_empty() {
        return Some(None);
    }
    field.parse().ok().map(Some)
}

impl Record for Fabric {
    const HEADER: &'static [&'static str] = &[
        "id",
        "suffix",
        "display_name",
        "lifecycle_state",
        "healthy_hosts",
        "available_hosts",
        "total_hosts",
        "current_firmware",
        "target_firmware",
        "firmware_update_state",
    ];

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.suffix.clone(),
            self.display_name.clone(),
            self.lifecycle_state.clone(),
            number(self.healthy_host_count),
            number(self.available_host_count),
            number(self.total_host_count),
            text(&self.current_firmware_bundle_id),
            text(&self.target_firmware_bundle_id),
            text(&self.firmware_update_state),
        ]
    }

    fn from_fields(f: &[String]) -> Option<Self> {
        Some(Self {
            id: optional(&f[0])?,
            suffix: f[1].clone(),
            display_name: f[2].clone(),
            lifecycle_state: f[3].clone(),
            healthy_host_count: parse_optional(&f[4])?,
            available_host_count: parse_optional(&f[5])?,
            total_host_count: parse_optional(&f[6])?,
            current_firmware_bundle_id: optional(&f[7]),
            target_firmware_bundle_id: optional(&f[8]),
            firmware_update_state: optional(&f[9]),
        })
    }
}

impl Record for GpuMemoryCluster {
    const HEADER: &'static [&'static str] = &[
        "id",
        "display_name",
        "lifecycle_state",
        "size",
        "instance_configuration_id",
        "compute_cluster_id",
        "fabric_suffix",
    ];

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.display_name.clone(),
            self.lifecycle_state.clone(),
            number(self.size),
            text(&self.instance_configuration_id),
            text(&self.compute_cluster_id),
            text(&self.fabric_suffix),
        ]
    }

    fn from_fields(f: &[String]) -> Option<Self> {
        Some(Self {
            id: optional(&f[0])?,
            display_name: f[1].clone(),
            lifecycle_state: f[2].clone(),
            size: parse_optional(&f[3])?,
            instance_configuration_id: optional(&f[4]),
            compute_cluster_id: optional(&f[5]),
            fabric_suffix: optional(&f[6]),
        })
    }
}

impl Record for InstanceConfiguration {
    const HEADER: &'static [&'static str] = &["id", "display_name"];

    fn to_fields(&self) -> Vec<String> {
        vec![self.id.clone(), self.display_name.clone()]
    }

    fn from_fields(f: &[String]) -> Option<Self> {
        Some(Self {
            id: optional(&f[0])?,
            display_name: f[1].clone(),
        })
    }
}

impl Record for ComputeCluster {
    const HEADER: &'static [&'static str] = &["id", "display_name", "availability_domain"];

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.display_name.clone(),
            text(&self.availability_domain),
        ]
    }

    fn from_fields(f: &[String]) -> Option<Self> {
        Some(Self {
            id: optional(&f[0])?,
            display_name: f[1].clone(),
            availability_domain: optional(&f[2]),
        })
    }
}

impl Record for Node {
    const HEADER: &'static [&'static str] = &[
        "name",
        "provider_id",
        "ready",
        "clique",
        "gpu_product",
        "gpu_memory",
        "gpu_count",
    ];

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            text(&self.provider_id),
            number(self.ready),
            text(&self.clique),
            text(&self.gpu_product),
            text(&self.gpu_memory),
            text(&self.gpu_count),
        ]
    }

    fn from_fields(f: &[String]) -> Option<Self> {
        Some(Self {
            name: optional(&f[0])?,
            provider_id: optional(&f[1]),
            ready: parse_optional(&f[2])?,
            clique: optional(&f[3]),
            gpu_product: optional(&f[4]),
            gpu_memory: optional(&f[5]),
            gpu_count: optional(&f[6]),
        })
    }
}

impl Record for Instance {
    const HEADER: &'static [&'static str] = &[
        "id",
        "display_name",
        "lifecycle_state",
        "shape",
        "availability_domain",
        "fault_domain",
        "gpu_memory_cluster_id",
        "time_created",
    ];

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.display_name.clone(),
            self.lifecycle_state.clone(),
            self.shape.clone(),
            text(&self.availability_domain),
            text(&self.fault_domain),
            text(&self.gpu_memory_cluster_id),
            text(&self.time_created),
        ]
    }

    fn from_fields(f: &[String]) -> Option<Self> {
        Some(Self {
            id: optional(&f[0])?,
            display_name: f[1].clone(),
            lifecycle_state: f[2].clone(),
            shape: f[3].clone(),
            availability_domain: optional(&f[4]),
            fault_domain: optional(&f[5]),
            gpu_memory_cluster_id: optional(&f[6]),
            time_created: optional(&f[7]),
        })
    }
}

impl Record for CapacityTopologyHost {
    const HEADER: &'static [&'static str] = &[
        "instance_id",
        "lifecycle_state",
        "lifecycle_details",
        "topology_id",
    ];

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.instance_id.clone(),
            self.lifecycle_state.clone(),
            text(&self.lifecycle_details),
            self.topology_id.clone(),
        ]
    }

    fn from_fields(f: &[String]) -> Option<Self> {
        Some(Self {
            instance_id: optional(&f[0])?,
            lifecycle_state: f[1].clone(),
            lifecycle_details: optional(&f[2]),
            topology_id: f[3].clone(),
        })
    }
}

impl Record for AnnouncementSummary {
    const HEADER: &'static [&'static str] =
        &["id", "reference_ticket", "lifecycle_state", "summary"];

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            text(&self.reference_ticket),
            self.lifecycle_state.clone(),
            text(&self.summary),
        ]
    }

    fn from_fields(f: &[String]) -> Option<Self> {
        Some(Self {
            id: optional(&f[0])?,
            reference_ticket: optional(&f[1]),
            lifecycle_state: f[2].clone(),
            summary: optional(&f[3]),
        })
    }
}

impl Record for Subnet {
    const HEADER: &'static [&'static str] = &[
        "id",
        "display_name",
        "cidr_block",
        "access",
        "lifecycle_state",
        "vcn_id",
    ];

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.display_name.clone(),
            text(&self.cidr_block),
            text(&self.access),
            self.lifecycle_state.clone(),
            text(&self.vcn_id),
        ]
    }

    fn from_fields(f: &[String]) -> Option<Self> {
        Some(Self {
            id: optional(&f[0])?,
            display_name: f[1].clone(),
            cidr_block: optional(&f[2]),
            access: optional(&f[3]),
            lifecycle_state: f[4].clone(),
            vcn_id: optional(&f[5]),
        })
    }
}

impl Record for NetworkSecurityGroup {
    const HEADER: &'static [&'static str] = &[
        "id",
        "display_name",
        "lifecycle_state",
        "vcn_id",
        "rule_count",
    ];

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.display_name.clone(),
            self.lifecycle_state.clone(),
            text(&self.vcn_id),
            number(self.rule_count),
        ]
    }

    fn from_fields(f: &[String]) -> Option<Self> {
        Some(Self {
            id: optional(&f[0])?,
            display_name: f[1].clone(),
            lifecycle_state: f[2].clone(),
            vcn_id: optional(&f[3]),
            rule_count: parse_optional(&f[4])?,
        })
    }
}

impl Record for GatewayPresence {
    const HEADER: &'static [&'static str] = &[
        "vcn_id",
        "vcn_name",
        "internet_gateway",
        "nat_gateway",
        "service_gateway",
    ];

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.vcn_id.clone(),
            self.vcn_name.clone(),
            self.internet_gateway.to_string(),
            self.nat_gateway.to_string(),
            self.service_gateway.to_string(),
        ]
    }

    fn from_fields(f: &[String]) -> Option<Self> {
        Some(Self {
            vcn_id: optional(&f[0])?,
            vcn_name: f[1].clone(),
            internet_gateway: f[2].parse().ok()?,
            nat_gateway: f[3].parse().ok()?,
            service_gateway: f[4].parse().ok()?,
        })
    }
}
