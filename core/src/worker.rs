use crate::filters::{AttributionFilter, FilterState};
use crate::model::attribution::AttributionId;
use crate::model::resource::ResourceTree;
use crate::progress::{progress_statistics, ProgressStatistics};
use crate::store::AttributionStore;
use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Frozen input of one recompute. `generation` increases with every
/// submission, store mutation or not.
#[derive(Debug, Clone)]
pub struct ViewSnapshot {
    pub generation: u64,
    pub tree: Arc<ResourceTree>,
    pub store: AttributionStore,
    pub filters: FilterState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewResult {
    pub generation: u64,
    pub store_version: u64,
    pub progress: ProgressStatistics,
    pub filter_counts: BTreeMap<AttributionFilter, usize>,
    pub filtered_manual_ids: Vec<AttributionId>,
    /// Selected filters that matched nothing and were dropped.
    pub deselected: Vec<AttributionFilter>,
}

/// A result computed from a snapshot that has since been superseded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stale {
    pub generation: u64,
    pub latest: u64,
}

/// Derived views of one snapshot. Pure; the worker and the in-line
/// fallback both call this.
pub fn compute_view(snapshot: &ViewSnapshot) -> ViewResult {
    let mut filters = snapshot.filters.clone();
    let entities = snapshot.store.manual().entities();
    let deselected = filters.refresh(snapshot.store.version(), entities);
    ViewResult {
        generation: snapshot.generation,
        store_version: snapshot.store.version(),
        progress: progress_statistics(&snapshot.tree, &snapshot.store),
        filter_counts: filters.counts().clone(),
        filtered_manual_ids: filters.apply(entities),
        deselected,
    }
}

/// Background thread computing [`ViewResult`]s. It only ever reads the
/// snapshots it is sent.
pub struct RecomputeWorker {
    requests: Option<Sender<ViewSnapshot>>,
    results: Receiver<ViewResult>,
    latest: u64,
    handle: Option<JoinHandle<()>>,
}

impl RecomputeWorker {
    pub fn spawn() -> std::io::Result<Self> {
        let (req_tx, req_rx) = mpsc::channel::<ViewSnapshot>();
        let (res_tx, res_rx) = mpsc::channel::<ViewResult>();
        let handle = std::thread::Builder::new()
            .name("attribution-recompute".to_string())
            .spawn(move || run(req_rx, res_tx))?;
        Ok(Self {
            requests: Some(req_tx),
            results: res_rx,
            latest: 0,
            handle: Some(handle),
        })
    }

    pub fn latest_generation(&self) -> u64 {
        self.latest
    }

    /// Returns false when the worker thread is gone.
    pub fn submit(&mut self, snapshot: ViewSnapshot) -> bool {
        self.latest = snapshot.generation;
        match &self.requests {
            Some(tx) => tx.send(snapshot).is_ok(),
            None => false,
        }
    }

    fn check(&self, result: ViewResult) -> Result<ViewResult, Stale> {
        if result.generation == self.latest {
            Ok(result)
        } else {
            tracing::debug!(
                generation = result.generation,
                latest = self.latest,
                "discarding stale view result"
            );
            Err(Stale {
                generation: result.generation,
                latest: self.latest,
            })
        }
    }

    /// Non-blocking: the next finished result, if any.
    pub fn poll(&self) -> Option<Result<ViewResult, Stale>> {
        match self.results.try_recv() {
            Ok(result) => Some(self.check(result)),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn wait(&self, timeout: Duration) -> Option<Result<ViewResult, Stale>> {
        match self.results.recv_timeout(timeout) {
            Ok(result) => Some(self.check(result)),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Blocks until the result of the latest submission arrives, dropping
    /// stale ones on the way.
    pub fn wait_latest(&self, timeout: Duration) -> Option<ViewResult> {
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.checked_duration_since(Instant::now())?;
            match self.wait(left)? {
                Ok(result) => return Some(result),
                Err(_) => continue,
            }
        }
    }
}

impl Drop for RecomputeWorker {
    fn drop(&mut self) {
        self.requests.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("recompute worker panicked");
            }
        }
    }
}

fn run(requests: Receiver<ViewSnapshot>, results: Sender<ViewResult>) {
    while let Ok(mut snapshot) = requests.recv() {
        // Only the newest queued snapshot is worth computing.
        while let Ok(newer) = requests.try_recv() {
            snapshot = newer;
        }
        let started = Instant::now();
        let result = compute_view(&snapshot);
        tracing::debug!(
            generation = result.generation,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "view recomputed"
        );
        if results.send(result).is_err() {
            break;
        }
    }
}

/// Keeps only the latest value and releases it once `delay` has passed
/// without a newer push.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    delay: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn push(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now));
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn ready(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((_, at)) if now.saturating_duration_since(*at) >= self.delay => {
                self.pending.take().map(|(value, _)| value)
            }
            _ => None,
        }
    }

    /// Releases the pending value regardless of the delay.
    pub fn flush(&mut self) -> Option<T> {
        self.pending.take().map(|(value, _)| value)
    }
}
