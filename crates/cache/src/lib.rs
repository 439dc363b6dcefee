//! # Fleet Cache
//!
//! TTL-gated on-disk snapshots of remote resource collections.
//!
//! ## Layout
//!
//! ```text
//! <cache dir>
//!     │
//!     ├──> fabrics_<scope>          (line records, `#` header)
//!     ├──> gpu_clusters_<scope>     (line records, `#` header)
//!     └──> announcement_detail_<id>.json (raw JSON detail)
//! ```
//!
//! Every write replaces a whole entry through a temp file and a rename, so a
//! concurrent reader sees either the previous snapshot or the new one.
//!
//! ## Example
//!
//! ```no_run
//! use fleet_cache::CacheStore;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> fleet_cache::Result<()> {
//!     let store = CacheStore::new("/tmp/fleet-cache", Duration::from_secs(3600));
//!     store.write("fabrics_demo", b"# id|name\n").await?;
//!     assert!(store.is_fresh("fabrics_demo").await);
//!     Ok(())
//! }
//! ```

mod clock;
mod error;
mod record;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CacheError, Result};
pub use record::{decode_line, encode_line, parse_records, render_records, Record};
pub use store::{CacheStore, Snapshot, DEFAULT_TTL};
