use crate::config::MAX_CONCURRENCY;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub limit: usize,
    pub in_flight: usize,
    pub peak: usize,
}

/// Fixed-size worker pool for independent remote calls.
#[derive(Debug, Clone)]
pub struct FetchPool {
    limit: usize,
    semaphore: Arc<Semaphore>,
    gauge: Arc<Gauge>,
}

#[derive(Debug, Default)]
struct Gauge {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

struct InFlightGuard {
    gauge: Arc<Gauge>,
}

impl InFlightGuard {
    fn enter(gauge: Arc<Gauge>) -> Self {
        let now = gauge.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        gauge.peak.fetch_max(now, Ordering::SeqCst);
        Self { gauge }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.gauge.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FetchPool {
    pub fn new(limit: usize) -> Self {
        let limit = limit.clamp(1, MAX_CONCURRENCY);
        Self {
            limit,
            semaphore: Arc::new(Semaphore::new(limit)),
            gauge: Arc::new(Gauge::default()),
        }
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            limit: self.limit,
            in_flight: self.gauge.in_flight.load(Ordering::SeqCst),
            peak: self.gauge.peak.load(Ordering::SeqCst),
        }
    }

    /// Runs `job` for every item with at most `limit` in flight. Results keep
    /// input order; a worker that panicked is logged and leaves `None`.
    pub async fn map<I, F, Fut, O>(&self, items: I, job: F) -> Vec<Option<O>>
    where
        I: IntoIterator,
        F: Fn(I::Item) -> Fut,
        Fut: Future<Output = O> + Send + 'static,
        O: Send + 'static,
    {
        let mut set = JoinSet::new();
        for (idx, item) in items.into_iter().enumerate() {
            let work = job(item);
            let semaphore = Arc::clone(&self.semaphore);
            let gauge = Arc::clone(&self.gauge);
            set.spawn(async move {
                // The semaphore is never closed; acquire failures are not expected.
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .unwrap_or_else(|_| unreachable!("fetch pool semaphore closed"));
                let _slot = InFlightGuard::enter(gauge);
                (idx, work.await)
            });
        }

        let mut slots: Vec<Option<O>> = (0..set.len()).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, out)) => slots[idx] = Some(out),
                Err(err) => log::warn!("Fetch worker failed: {err}"),
            }
        }
        slots
    }
}
