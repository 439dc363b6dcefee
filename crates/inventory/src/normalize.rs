//! Best-effort extraction of flat records from remote JSON payloads.
//!
//! Field names are looked up in the CLI's kebab-case form first and in the
//! API's camelCase form second. A record is dropped only when its identity is
//! missing; every other missing field becomes `None`.

use crate::model::{
    fabric_suffix_from_name, fabric_suffix_of, AnnouncementSummary, CapacityTopologyHost,
    ComputeCluster, Fabric, GpuMemoryCluster, Instance, InstanceConfiguration,
    NetworkSecurityGroup, Node, Subnet, CLIQUE_LABEL, GPU_COUNT_LABEL, GPU_MEMORY_CLUSTER_TAG,
    GPU_MEMORY_LABEL, GPU_PRODUCT_LABEL,
};
use serde_json::Value;

/// Items of a list response: `data.items`, `data`, `items`, or a bare array.
pub fn items_of(payload: &Value) -> Vec<Value> {
    let candidates = [
        payload.get("data").and_then(|d| d.get("items")),
        payload.get("data"),
        payload.get("items"),
        Some(payload),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_array().cloned())
        .unwrap_or_default()
}

/// Object of a get response: `data` when it is an object, else the payload.
pub fn object_of(payload: &Value) -> Option<&Value> {
    match payload.get("data") {
        Some(data) if data.is_object() => Some(data),
        _ => payload.is_object().then_some(payload),
    }
}

fn camel_case(kebab: &str) -> String {
    let mut out = String::with_capacity(kebab.len());
    let mut upper = false;
    for ch in kebab.chars() {
        if ch == '-' {
            upper = true;
        } else if upper {
            out.push(ch.to_ascii_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

pub(crate) fn field<'a>(item: &'a Value, name: &str) -> Option<&'a Value> {
    item.get(name).or_else(|| item.get(camel_case(name)))
}

pub(crate) fn str_field(item: &Value, name: &str) -> Option<String> {
    match field(item, name)? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn u32_field(item: &Value, name: &str) -> Option<u32> {
    match field(item, name)? {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn state(item: &Value) -> String {
    str_field(item, "lifecycle-state").unwrap_or_default()
}

pub fn fabric(item: &Value) -> Option<Fabric> {
    let id = str_field(item, "id")?;
    let suffix = fabric_suffix_of(&id)?;
    Some(Fabric {
        suffix,
        display_name: str_field(item, "display-name").unwrap_or_default(),
        lifecycle_state: state(item),
        healthy_host_count: u32_field(item, "healthy-host-count"),
        available_host_count: u32_field(item, "available-host-count"),
        total_host_count: u32_field(item, "total-host-count"),
        current_firmware_bundle_id: str_field(item, "current-firmware-bundle-id"),
        target_firmware_bundle_id: str_field(item, "target-firmware-bundle-id"),
        firmware_update_state: str_field(item, "firmware-update-state"),
        id,
    })
}

/// Cluster as known from the list call; detail fields are merged later.
pub fn gpu_memory_cluster(item: &Value) -> Option<GpuMemoryCluster> {
    let id = str_field(item, "id")?;
    let display_name = str_field(item, "display-name").unwrap_or_default();
    let mut cluster = GpuMemoryCluster {
        fabric_suffix: fabric_suffix_from_name(&display_name),
        id,
        display_name,
        lifecycle_state: state(item),
        size: None,
        instance_configuration_id: None,
        compute_cluster_id: None,
    };
    merge_gpu_memory_cluster_detail(&mut cluster, item);
    Some(cluster)
}

/// Fills fields the list call omits. Values already known are kept when the
/// detail does not carry them.
pub fn merge_gpu_memory_cluster_detail(cluster: &mut GpuMemoryCluster, detail: &Value) {
    if let Some(state) = str_field(detail, "lifecycle-state") {
        cluster.lifecycle_state = state;
    }
    if let Some(size) = u32_field(detail, "size") {
        cluster.size = Some(size);
    }
    if let Some(id) = str_field(detail, "instance-configuration-id") {
        cluster.instance_configuration_id = Some(id);
    }
    if let Some(id) = str_field(detail, "compute-cluster-id") {
        cluster.compute_cluster_id = Some(id);
    }
    if cluster.fabric_suffix.is_none() {
        cluster.fabric_suffix =
            str_field(detail, "gpu-memory-fabric-id").and_then(|id| fabric_suffix_of(&id));
    }
}

pub fn instance_configuration(item: &Value) -> Option<InstanceConfiguration> {
    Some(InstanceConfiguration {
        id: str_field(item, "id")?,
        display_name: str_field(item, "display-name").unwrap_or_default(),
    })
}

pub fn compute_cluster(item: &Value) -> Option<ComputeCluster> {
    Some(ComputeCluster {
        id: str_field(item, "id")?,
        display_name: str_field(item, "display-name").unwrap_or_default(),
        availability_domain: str_field(item, "availability-domain"),
    })
}

pub fn instance(item: &Value) -> Option<Instance> {
    let gpu_memory_cluster_id = field(item, "freeform-tags")
        .and_then(|tags| tags.get(GPU_MEMORY_CLUSTER_TAG))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);
    Some(Instance {
        id: str_field(item, "id")?,
        display_name: str_field(item, "display-name").unwrap_or_default(),
        lifecycle_state: state(item),
        shape: str_field(item, "shape").unwrap_or_default(),
        availability_domain: str_field(item, "availability-domain"),
        fault_domain: str_field(item, "fault-domain"),
        gpu_memory_cluster_id,
        time_created: str_field(item, "time-created"),
    })
}

/// Kubernetes node object (`kubectl get nodes -o json` item).
pub fn node(item: &Value) -> Option<Node> {
    let metadata = item.get("metadata")?;
    let name = str_field(metadata, "name")?;
    let labels = metadata.get("labels");
    let label = |key: &str| {
        labels
            .and_then(|l| l.get(key))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    let ready = item
        .get("status")
        .and_then(|s| s.get("conditions"))
        .and_then(Value::as_array)
        .and_then(|conditions| {
            conditions
                .iter()
                .find(|c| c.get("type").and_then(Value::as_str) == Some("Ready"))
        })
        .and_then(|c| c.get("status").and_then(Value::as_str))
        .map(|status| status == "True");
    let provider_id = item
        .get("spec")
        .and_then(|s| s.get("providerID"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    Some(Node {
        name,
        provider_id,
        ready,
        clique: label(CLIQUE_LABEL),
        gpu_product: label(GPU_PRODUCT_LABEL),
        gpu_memory: label(GPU_MEMORY_LABEL),
        gpu_count: label(GPU_COUNT_LABEL),
    })
}

pub fn capacity_topology_host(item: &Value, topology_id: &str) -> Option<CapacityTopologyHost> {
    Some(CapacityTopologyHost {
        instance_id: str_field(item, "instance-id")?,
        lifecycle_state: state(item),
        lifecycle_details: str_field(item, "lifecycle-details"),
        topology_id: str_field(item, "capacity-topology-id")
            .unwrap_or_else(|| topology_id.to_string()),
    })
}

pub fn announcement_summary(item: &Value) -> Option<AnnouncementSummary> {
    Some(AnnouncementSummary {
        id: str_field(item, "id")?,
        reference_ticket: str_field(item, "reference-ticket-number"),
        lifecycle_state: state(item),
        summary: str_field(item, "summary"),
    })
}

pub fn subnet(item: &Value) -> Option<Subnet> {
    let access = match field(item, "prohibit-public-ip-on-vnic").and_then(Value::as_bool) {
        Some(true) => Some("private".to_string()),
        Some(false) => Some("public".to_string()),
        None => None,
    };
    Some(Subnet {
        id: str_field(item, "id")?,
        display_name: str_field(item, "display-name").unwrap_or_default(),
        cidr_block: str_field(item, "cidr-block").or_else(|| {
            field(item, "ipv4-cidr-blocks")
                .and_then(Value::as_array)
                .and_then(|blocks| blocks.first())
                .and_then(Value::as_str)
                .map(str::to_string)
        }),
        access,
        lifecycle_state: state(item),
        vcn_id: str_field(item, "vcn-id"),
    })
}

pub fn network_security_group(item: &Value) -> Option<NetworkSecurityGroup> {
    Some(NetworkSecurityGroup {
        id: str_field(item, "id")?,
        display_name: str_field(item, "display-name").unwrap_or_default(),
        lifecycle_state: state(item),
        vcn_id: str_field(item, "vcn-id"),
        rule_count: None,
    })
}
