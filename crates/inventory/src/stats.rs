use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Per-run counters, shared by every fetcher and pool worker.
#[derive(Debug, Clone, Default)]
pub struct FetchStats {
    inner: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    cache_hits: AtomicUsize,
    remote_calls: AtomicUsize,
    remote_failures: AtomicUsize,
    malformed_records: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchStatsSnapshot {
    pub cache_hits: usize,
    pub remote_calls: usize,
    pub remote_failures: usize,
    pub malformed_records: usize,
}

impl FetchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cache_hit(&self) {
        self.inner.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_remote_call(&self) {
        self.inner.remote_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_remote_failure(&self) {
        self.inner.remote_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self, count: usize) {
        if count > 0 {
            self.inner
                .malformed_records
                .fetch_add(count, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> FetchStatsSnapshot {
        FetchStatsSnapshot {
            cache_hits: self.inner.cache_hits.load(Ordering::Relaxed),
            remote_calls: self.inner.remote_calls.load(Ordering::Relaxed),
            remote_failures: self.inner.remote_failures.load(Ordering::Relaxed),
            malformed_records: self.inner.malformed_records.load(Ordering::Relaxed),
        }
    }
}
