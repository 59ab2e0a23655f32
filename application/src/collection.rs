//! Concurrent collection state shared between the orchestrator and adapters
//!
//! Three pieces glue asynchronous channel adapters to one cycle:
//!
//! - [`SharedAvailability`]: the availability store behind a single async
//!   mutex; every read and write, whether from a background listener, a
//!   gather call, or the alignment read, goes through it.
//! - [`CollectionTracker`]: a semaphore-backed wait group with one expected
//!   completion per contacted person. The deadline trigger blocks on it
//!   instead of spinning.
//! - [`CycleHandle`]: what an adapter receives. Carries the window's dates,
//!   the store, the tracker, the cancellation token, and the pending-request
//!   store. Cheap to clone into background tasks.

use crate::ports::pending_store::PendingStore;
use freeday_domain::{AvailabilityMap, AvailabilityStore, CycleId, CycleWindow, DateLabel};
use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// The availability store behind one exclusive async lock.
#[derive(Clone, Default)]
pub struct SharedAvailability {
    inner: Arc<Mutex<AvailabilityStore>>,
}

impl SharedAvailability {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a closure against the locked store.
    pub async fn with<R>(&self, f: impl FnOnce(&mut AvailabilityStore) -> R) -> R {
        let mut store = self.inner.lock().await;
        f(&mut store)
    }

    pub async fn clear(&self) {
        self.inner.lock().await.clear();
    }

    pub async fn seed(&self, person: &str, window: &CycleWindow) {
        self.inner.lock().await.seed(person, window);
    }

    /// Seed a person with an all-false map over an explicit label set.
    pub async fn seed_labels(&self, person: &str, labels: impl IntoIterator<Item = DateLabel>) {
        self.inner.lock().await.seed_labels(person, labels);
    }

    /// Extend a person's map to cover the given labels, keeping collected
    /// values intact.
    pub async fn ensure_labels(&self, person: &str, labels: impl IntoIterator<Item = DateLabel>) {
        self.inner.lock().await.ensure_labels(person, labels);
    }

    pub async fn insert(&self, person: &str, map: AvailabilityMap) {
        self.inner.lock().await.insert(person, map);
    }

    pub async fn set(&self, person: &str, label: DateLabel, available: bool) -> bool {
        self.inner.lock().await.set(person, label, available)
    }

    /// Reset every date for a person to unavailable.
    pub async fn reset(&self, person: &str) {
        self.inner.lock().await.reset(person);
    }

    pub async fn remove(&self, person: &str) {
        self.inner.lock().await.remove(person);
    }

    pub async fn get(&self, person: &str) -> Option<AvailabilityMap> {
        self.inner.lock().await.get(person).cloned()
    }
}

/// Per-person completion signal for one cycle's collection phase.
///
/// Created with the set of contacted persons; each person's completion
/// releases one permit, and [`wait_all`](CollectionTracker::wait_all)
/// blocks until every permit is released or the timeout elapses. Completion
/// is idempotent per person, so a listener and the orchestrator may both
/// signal the same person without over-counting.
pub struct CollectionTracker {
    expected: HashSet<String>,
    done: StdMutex<HashSet<String>>,
    permits: Semaphore,
}

impl CollectionTracker {
    pub fn new(expected: impl IntoIterator<Item = String>) -> Self {
        Self {
            expected: expected.into_iter().collect(),
            done: StdMutex::new(HashSet::new()),
            permits: Semaphore::new(0),
        }
    }

    /// Signal that a person's collection is finished. Returns false if the
    /// person was not expected or already completed.
    pub fn complete(&self, person: &str) -> bool {
        if !self.expected.contains(person) {
            return false;
        }
        let mut done = self.done.lock().expect("tracker lock");
        if !done.insert(person.to_string()) {
            return false;
        }
        self.permits.add_permits(1);
        true
    }

    /// Persons that have not completed yet.
    pub fn pending(&self) -> Vec<String> {
        let done = self.done.lock().expect("tracker lock");
        let mut pending: Vec<String> = self
            .expected
            .iter()
            .filter(|p| !done.contains(*p))
            .cloned()
            .collect();
        pending.sort_unstable();
        pending
    }

    /// Block until every expected person has completed, bounded by `timeout`.
    ///
    /// Returns true when everyone completed; false on timeout, in which case
    /// [`pending`](CollectionTracker::pending) names the stragglers.
    pub async fn wait_all(&self, timeout: Duration) -> bool {
        let expected = self.expected.len() as u32;
        if expected == 0 {
            return true;
        }
        match tokio::time::timeout(timeout, self.permits.acquire_many(expected)).await {
            Ok(Ok(permits)) => {
                permits.forget();
                true
            }
            Ok(Err(_)) => {
                // Semaphore closed; nobody closes it, but don't hang if it is
                warn!("collection tracker semaphore closed");
                false
            }
            Err(_) => false,
        }
    }
}

/// Everything an adapter needs to take part in one cycle.
#[derive(Clone)]
pub struct CycleHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    cycle: CycleId,
    title: String,
    labels: Vec<DateLabel>,
    store: SharedAvailability,
    tracker: Arc<CollectionTracker>,
    cancel: CancellationToken,
    pending: Arc<dyn PendingStore>,
}

impl CycleHandle {
    pub fn new(
        cycle: CycleId,
        title: impl Into<String>,
        labels: Vec<DateLabel>,
        store: SharedAvailability,
        tracker: Arc<CollectionTracker>,
        cancel: CancellationToken,
        pending: Arc<dyn PendingStore>,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                cycle,
                title: title.into(),
                labels,
                store,
                tracker,
                cancel,
                pending,
            }),
        }
    }

    pub fn cycle(&self) -> &CycleId {
        &self.inner.cycle
    }

    /// The stable owner name scoping persisted records.
    pub fn owner(&self) -> &str {
        self.inner.cycle.owner()
    }

    /// The group title shown in channel messages.
    pub fn title(&self) -> &str {
        &self.inner.title
    }

    /// The window's dates, chronological. Empty on a cycle resumed after a
    /// restart, where adapters rebuild maps from their persisted records.
    pub fn labels(&self) -> &[DateLabel] {
        &self.inner.labels
    }

    pub fn store(&self) -> &SharedAvailability {
        &self.inner.store
    }

    pub fn pending(&self) -> &Arc<dyn PendingStore> {
        &self.inner.pending
    }

    /// The cooperative stop signal. Background listeners poll this between
    /// blocking external calls and exit promptly once it fires.
    pub fn cancelled(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    /// Signal that a person's collection is finished.
    pub fn complete(&self, person: &str) {
        self.inner.tracker.complete(person);
    }

    pub fn tracker(&self) -> &Arc<CollectionTracker> {
        &self.inner.tracker
    }
}
