//! # Fleet Inventory
//!
//! One auditable view of a GPU fleet assembled from the cloud control plane
//! and the cluster orchestrator.
//!
//! ## Pipeline
//!
//! ```text
//! RemoteSource (oci / kubectl)
//!     │
//!     ├──> ResourceFetcher (TTL-gated, one per collection)
//!     │      └─> CacheStore snapshots
//!     │
//!     ├──> AnnouncementIndexBuilder (list → details → reverse index)
//!     │
//!     └──> JoinEngine
//!            └─> rows, cliques, idle fabrics, orphans
//! ```
//!
//! Only an incomplete [`Scope`] is an error. Failed or timed-out remote calls
//! leave empty collections behind and show up as missing data in the joins.
//!
//! ## Example
//!
//! ```no_run
//! use fleet_inventory::{FleetInventory, InventoryConfig, ScopeOverrides};
//!
//! #[tokio::main]
//! async fn main() -> fleet_inventory::Result<()> {
//!     let scope = ScopeOverrides::default().resolve()?;
//!     let inventory = FleetInventory::with_cli(&InventoryConfig::from_env(), scope)?;
//!     let report = inventory.report().await;
//!
//!     println!("{} rows, {} orphan instances", report.inventory.rows.len(),
//!         report.inventory.orphan_instances.len());
//!     Ok(())
//! }
//! ```

mod announcements;
mod config;
mod error;
mod fetch;
mod inventory;
mod join;
mod keys;
mod model;
mod network;
mod normalize;
mod pool;
mod remote;
mod stats;

pub use announcements::{
    index_detail, ticket_of, AnnouncementIndex, AnnouncementIndexBuilder, AnnouncementPhase,
    TICKET_PREFIX_LEN,
};
pub use config::{
    default_cache_dir, parse_concurrency, parse_oci_config, InventoryConfig, OciProfile, Scope,
    ScopeOverrides, DEFAULT_CACHE_TTL, DEFAULT_CALL_TIMEOUT, DEFAULT_CONCURRENCY,
    DEFAULT_NODE_SELECTOR, DEFAULT_OCI_PROFILE, MAX_CONCURRENCY,
};
pub use error::{InventoryError, RemoteError, Result};
pub use fetch::ResourceFetcher;
pub use inventory::{FleetInventory, InventoryReport};
pub use join::{
    CliqueCluster, CliqueSummary, InventoryRow, InventorySnapshot, JoinEngine, JoinedInventory,
    RowLabels,
};
pub use keys::{
    announcement_detail_key, collection_key, gpu_cluster_detail_key, ResourceKind,
    ANNOUNCEMENT_DETAIL_PREFIX, GPU_CLUSTER_DETAIL_PREFIX,
};
pub use model::{
    fabric_suffix_from_name, fabric_suffix_of, is_active_cluster_state, or_na,
    AnnouncementSummary, CapacityTopologyHost, ComputeCluster, Fabric, GatewayPresence,
    GpuMemoryCluster, Instance, InstanceConfiguration, NetworkSecurityGroup, Node, Subnet,
    ACTIVE_CLUSTER_STATES, NOT_AVAILABLE,
};
pub use network::EnvironmentHealth;
pub use normalize::{items_of, object_of};
pub use pool::{FetchPool, PoolSnapshot};
pub use remote::{CliRemote, Invocation, RemoteRequest, RemoteSource};
pub use stats::{FetchStats, FetchStatsSnapshot};
