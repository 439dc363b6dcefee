//! Announcement reverse index: ticket prefixes per affected instance and per
//! GPU memory cluster.
//!
//! Built in three passes. The list call names every announcement, a detail
//! call per announcement (through the fetch pool, skipped while its cache
//! entry is fresh) yields the affected resources, and the index is then
//! built from the details of the listed announcements only. Detail entries
//! of announcements that left the list are deleted.

use crate::fetch::ResourceFetcher;
use crate::keys::{announcement_detail_key, ANNOUNCEMENT_DETAIL_PREFIX};
use crate::model::AnnouncementSummary;
use crate::normalize::{field, str_field};
use crate::remote::RemoteRequest;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

pub const TICKET_PREFIX_LEN: usize = 8;

const RESOURCE_PROPERTY_NAMES: [&str; 2] = ["resourceid", "instanceid"];
const GPU_CLUSTER_PROPERTY_NAMES: [&str; 2] = ["gpumemorycluster", "gpumemoryclusterid"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnnouncementIndex {
    by_resource: BTreeMap<String, Vec<String>>,
    by_gpu_cluster: BTreeMap<String, Vec<String>>,
}

impl AnnouncementIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_resource(&mut self, resource_id: &str, ticket: &str) {
        insert_unique(&mut self.by_resource, resource_id, ticket);
    }

    pub fn add_gpu_cluster(&mut self, cluster: &str, ticket: &str) {
        insert_unique(&mut self.by_gpu_cluster, cluster, ticket);
    }

    pub fn tickets_for_resource(&self, resource_id: &str) -> &[String] {
        self.by_resource
            .get(resource_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn tickets_for_gpu_cluster(&self, cluster: &str) -> &[String] {
        self.by_gpu_cluster
            .get(cluster)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Union of the instance's own tickets and its cluster's tickets, in
    /// first-seen order. A cluster may also be named as a plain resource id.
    pub fn tickets_for(&self, instance_id: Option<&str>, cluster_id: Option<&str>) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let instance = instance_id.map(|id| self.tickets_for_resource(id));
        let cluster = cluster_id.map(|id| self.tickets_for_gpu_cluster(id));
        let cluster_as_resource = cluster_id.map(|id| self.tickets_for_resource(id));
        for ticket in [instance, cluster, cluster_as_resource]
            .into_iter()
            .flatten()
            .flatten()
        {
            if !out.contains(ticket) {
                out.push(ticket.clone());
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.by_resource.is_empty() && self.by_gpu_cluster.is_empty()
    }
}

fn insert_unique(map: &mut BTreeMap<String, Vec<String>>, key: &str, ticket: &str) {
    let key = key.trim();
    if key.is_empty() {
        return;
    }
    let tickets = map.entry(key.to_string()).or_default();
    if !tickets.iter().any(|t| t == ticket) {
        tickets.push(ticket.to_string());
    }
}

/// Display ticket: the reference ticket's first eight characters, or the last
/// eight of the announcement id when no ticket is set.
pub fn ticket_of(detail: &Value) -> Option<String> {
    if let Some(reference) = str_field(detail, "reference-ticket-number") {
        return Some(reference.chars().take(TICKET_PREFIX_LEN).collect());
    }
    let id = str_field(detail, "id")?;
    let chars: Vec<char> = id.chars().collect();
    let start = chars.len().saturating_sub(TICKET_PREFIX_LEN);
    Some(chars[start..].iter().collect())
}

fn property_key(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[derive(Debug, Default, PartialEq, Eq)]
struct AffectedIds {
    resources: Vec<String>,
    gpu_clusters: Vec<String>,
}

/// Affected resources carry ids either as direct fields or as a
/// `properties` list of name/value pairs.
fn affected_ids(resource: &Value) -> AffectedIds {
    let mut ids = AffectedIds::default();
    for name in ["resource-id", "instance-id"] {
        ids.resources.extend(str_field(resource, name));
    }
    for name in ["gpu-memory-cluster", "gpu-memory-cluster-id"] {
        ids.gpu_clusters.extend(str_field(resource, name));
    }

    let properties = field(resource, "properties")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for property in properties {
        let (Some(name), Some(value)) = (str_field(property, "name"), str_field(property, "value"))
        else {
            continue;
        };
        let name = property_key(&name);
        if RESOURCE_PROPERTY_NAMES.contains(&name.as_str()) {
            ids.resources.push(value);
        } else if GPU_CLUSTER_PROPERTY_NAMES.contains(&name.as_str()) {
            ids.gpu_clusters.push(value);
        }
    }
    ids
}

/// Adds one announcement detail to the index. Returns `false` when the detail
/// lacks the expected top-level shape.
pub fn index_detail(index: &mut AnnouncementIndex, detail: &Value) -> bool {
    if !detail.is_object() || str_field(detail, "id").is_none() {
        return false;
    }
    let Some(state) = str_field(detail, "lifecycle-state") else {
        return false;
    };
    if state != "ACTIVE" {
        return true;
    }
    let Some(ticket) = ticket_of(detail) else {
        return false;
    };
    let resources = field(detail, "affected-resources")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for resource in resources {
        let ids = affected_ids(resource);
        for id in &ids.resources {
            index.add_resource(id, &ticket);
        }
        for cluster in &ids.gpu_clusters {
            index.add_gpu_cluster(cluster, &ticket);
        }
    }
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnnouncementPhase {
    NotFetched,
    ListFetched,
    DetailsFetched,
    IndexBuilt,
}

pub struct AnnouncementIndexBuilder {
    fetcher: ResourceFetcher,
    phase: AnnouncementPhase,
    summaries: Vec<AnnouncementSummary>,
    details: Vec<(String, Option<Value>)>,
}

impl AnnouncementIndexBuilder {
    pub fn new(fetcher: ResourceFetcher) -> Self {
        Self {
            fetcher,
            phase: AnnouncementPhase::NotFetched,
            summaries: Vec::new(),
            details: Vec::new(),
        }
    }

    pub fn phase(&self) -> AnnouncementPhase {
        self.phase
    }

    pub fn summaries(&self) -> &[AnnouncementSummary] {
        &self.summaries
    }

    pub async fn fetch_list(&mut self) -> &[AnnouncementSummary] {
        self.summaries = self.fetcher.announcement_summaries().await;
        self.details.clear();
        self.phase = AnnouncementPhase::ListFetched;
        &self.summaries
    }

    /// Fetches details for listed announcements without a fresh entry and
    /// drops detail entries of announcements no longer listed. Returns how
    /// many details are now available.
    pub async fn fetch_details(&mut self) -> usize {
        if self.phase == AnnouncementPhase::NotFetched {
            self.fetch_list().await;
        }
        self.prune_unlisted().await;

        let ids: Vec<String> = self.summaries.iter().map(|s| s.id.clone()).collect();
        let fetched = self
            .fetcher
            .pool()
            .map(ids.clone(), |announcement_id| {
                let fetcher = self.fetcher.clone();
                async move {
                    let key = announcement_detail_key(&announcement_id);
                    fetcher
                        .detail(key, RemoteRequest::GetAnnouncement { announcement_id })
                        .await
                }
            })
            .await;
        self.details = ids
            .into_iter()
            .zip(fetched.into_iter().map(Option::flatten))
            .collect();
        self.phase = AnnouncementPhase::DetailsFetched;

        let available = self.details.iter().filter(|(_, d)| d.is_some()).count();
        log::debug!(
            "Announcement details available: {available}/{}",
            self.summaries.len()
        );
        available
    }

    async fn prune_unlisted(&self) {
        let cache = self.fetcher.cache();
        let listed: HashSet<String> = self
            .summaries
            .iter()
            .map(|s| announcement_detail_key(&s.id))
            .collect();
        let stale = match cache.keys_with_prefix(ANNOUNCEMENT_DETAIL_PREFIX).await {
            Ok(keys) => keys.into_iter().filter(|k| !listed.contains(k)),
            Err(err) => {
                log::warn!("Cannot list announcement details: {err}");
                return;
            }
        };
        match cache.invalidate(stale).await {
            Ok(0) => {}
            Ok(removed) => log::debug!("Dropped {removed} unlisted announcement details"),
            Err(err) => log::warn!("Cannot drop unlisted announcement details: {err}"),
        }
    }

    /// Builds the index from the details of listed announcements, in list
    /// order. A listed announcement whose detail call failed is indexed from
    /// its cache entry only while that entry is fresh; entries that are not
    /// valid JSON objects with an id and a state are skipped.
    pub async fn build_index(&mut self) -> AnnouncementIndex {
        if self.phase != AnnouncementPhase::DetailsFetched
            && self.phase != AnnouncementPhase::IndexBuilt
        {
            self.fetch_details().await;
        }

        let mut index = AnnouncementIndex::new();
        let mut malformed = 0usize;
        for (id, detail) in &self.details {
            let key = announcement_detail_key(id);
            let detail = match detail {
                Some(detail) => detail.clone(),
                None => match self.fresh_cached_detail(&key).await {
                    Some(Ok(detail)) => detail,
                    Some(Err(err)) => {
                        log::warn!("Skipping announcement detail {key}: {err}");
                        malformed += 1;
                        continue;
                    }
                    None => continue,
                },
            };
            if !index_detail(&mut index, &detail) {
                log::warn!("Skipping announcement detail {key}: unexpected shape");
                malformed += 1;
            }
        }
        self.fetcher.stats().record_malformed(malformed);
        self.phase = AnnouncementPhase::IndexBuilt;
        index
    }

    /// The cached detail under `key` when the entry is fresh and non-empty.
    async fn fresh_cached_detail(&self, key: &str) -> Option<serde_json::Result<Value>> {
        let cache = self.fetcher.cache();
        if !cache.is_fresh(key).await {
            return None;
        }
        match cache.read(key).await {
            Ok(bytes) => bytes.map(|bytes| serde_json::from_slice(&bytes)),
            Err(err) => {
                log::warn!("Cannot read {key}: {err}");
                None
            }
        }
    }

    pub async fn run(mut self) -> AnnouncementIndex {
        self.fetch_list().await;
        self.fetch_details().await;
        self.build_index().await
    }
}
