//! Run Cycle use case
//!
//! The orchestrator drives one recurring cycle through its states:
//!
//! ```text
//! Idle -> Contacting -> Collecting -> Aligning -> Responding -> Idle
//! ```
//!
//! The *contact* trigger (a timer or an explicit call) opens a cycle and
//! dispatches a request to every person's channel adapter; the *deadline*
//! trigger stops background listeners, finalizes collection, classifies the
//! persons with no usable answer, runs the decaying-quorum alignment, and
//! reports the outcome to everyone. The state machine is the single arbiter
//! keeping two cycles (or a contact and a deadline) from running against
//! the same availability store concurrently.

use crate::collection::{CollectionTracker, CycleHandle, SharedAvailability};
use crate::ports::pending_store::{PendingStore, StoreError};
use crate::registry::AdapterRegistry;
use chrono::{FixedOffset, NaiveDate, Utc};
use freeday_domain::{CycleId, CycleWindow, DomainError, Outcome, Roster, resolve};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Errors that can occur while driving a cycle
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("Trigger rejected: cycle is {actual}, expected {expected}")]
    InvalidState {
        expected: CycleState,
        actual: CycleState,
    },

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Pending-request store error: {0}")]
    Store(#[from] StoreError),
}

/// Where the orchestrator currently is in a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Contacting,
    Collecting,
    Aligning,
    Responding,
}

impl std::fmt::Display for CycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CycleState::Idle => "idle",
            CycleState::Contacting => "contacting",
            CycleState::Collecting => "collecting",
            CycleState::Aligning => "aligning",
            CycleState::Responding => "responding",
        };
        write!(f, "{s}")
    }
}

/// Static settings for one orchestrator instance.
#[derive(Debug, Clone)]
pub struct CycleSettings {
    /// Stable name scoping persisted records across restarts
    pub owner: String,
    /// Group title shown in channel messages
    pub title: String,
    /// Days after the contact day before the asked-about window starts
    pub offset: u32,
    /// Days the window covers
    pub interval: u32,
    /// Bound on the deadline trigger's wait for background collection
    pub collect_timeout: Duration,
    /// Timezone offset used to derive the contact day from the clock
    pub tz: FixedOffset,
}

/// One cycle's live context, held between contact and deadline.
struct ActiveCycle {
    handle: CycleHandle,
}

/// The state machine driving the contact / collect / align / respond cycle.
///
/// Owns the availability store, the adapter registry, and the quorum-search
/// policy. One instance manages one roster and one recurring cycle.
pub struct CycleOrchestrator {
    settings: CycleSettings,
    roster: Roster,
    registry: AdapterRegistry,
    pending: Arc<dyn PendingStore>,
    store: SharedAvailability,
    state: StdMutex<CycleState>,
    seq: AtomicU64,
    current: Mutex<Option<ActiveCycle>>,
}

impl CycleOrchestrator {
    pub fn new(
        settings: CycleSettings,
        roster: Roster,
        registry: AdapterRegistry,
        pending: Arc<dyn PendingStore>,
    ) -> Result<Self, CycleError> {
        if roster.is_empty() {
            return Err(DomainError::EmptyRoster.into());
        }
        if settings.interval == 0 {
            return Err(DomainError::EmptyWindow.into());
        }
        Ok(Self {
            settings,
            roster,
            registry,
            pending,
            store: SharedAvailability::new(),
            state: StdMutex::new(CycleState::Idle),
            seq: AtomicU64::new(0),
            current: Mutex::new(None),
        })
    }

    pub fn state(&self) -> CycleState {
        *self.state.lock().expect("state lock")
    }

    pub fn store(&self) -> &SharedAvailability {
        &self.store
    }

    /// Move `from` -> `to`, or report what state we were actually in.
    fn transition(&self, from: CycleState, to: CycleState) -> Result<(), CycleError> {
        let mut state = self.state.lock().expect("state lock");
        if *state != from {
            return Err(CycleError::InvalidState {
                expected: from,
                actual: *state,
            });
        }
        *state = to;
        Ok(())
    }

    fn set_state(&self, to: CycleState) {
        *self.state.lock().expect("state lock") = to;
    }

    /// Resume an interrupted cycle from durable records.
    ///
    /// Called once at startup, before any trigger fires. If the pending
    /// store still holds records for this owner, a previous process died
    /// between contact and deadline; enter `Collecting` so the next deadline
    /// trigger finalizes that cycle from the records. Returns whether a
    /// cycle was resumed.
    pub async fn recover(&self) -> Result<bool, CycleError> {
        self.transition(CycleState::Idle, CycleState::Contacting)?;

        let leftover = match self.pending.find_all(&self.settings.owner).await {
            Ok(leftover) => leftover,
            Err(e) => {
                self.set_state(CycleState::Idle);
                return Err(e.into());
            }
        };
        if leftover.is_empty() {
            self.set_state(CycleState::Idle);
            return Ok(false);
        }

        info!(
            owner = %self.settings.owner,
            records = leftover.len(),
            "resuming interrupted cycle from durable records"
        );

        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        // No labels and no expected completions: the listeners of the old
        // process are gone, and gather rebuilds maps from the records.
        let handle = CycleHandle::new(
            CycleId::new(self.settings.owner.clone(), seq),
            self.settings.title.clone(),
            Vec::new(),
            self.store.clone(),
            Arc::new(CollectionTracker::new(Vec::new())),
            CancellationToken::new(),
            Arc::clone(&self.pending),
        );
        *self.current.lock().await = Some(ActiveCycle { handle });
        self.set_state(CycleState::Collecting);
        Ok(true)
    }

    /// The contact trigger. Valid only from `Idle`.
    pub async fn on_contact(&self) -> Result<(), CycleError> {
        let today = Utc::now().with_timezone(&self.settings.tz).date_naive();
        self.on_contact_for(today).await
    }

    /// Contact trigger with an explicit contact day (manual runs, tests).
    pub async fn on_contact_for(&self, today: NaiveDate) -> Result<(), CycleError> {
        self.transition(CycleState::Idle, CycleState::Contacting)
            .inspect_err(|e| error!("{e}"))?;

        let window = match CycleWindow::new(today, self.settings.offset, self.settings.interval) {
            Ok(w) => w,
            Err(e) => {
                self.set_state(CycleState::Idle);
                return Err(e.into());
            }
        };
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let cycle = CycleId::new(self.settings.owner.clone(), seq);
        info!(%cycle, window = ?window.labels().first(), "starting contact");

        // A new cycle clobbers anything an abandoned one left behind.
        self.store.clear().await;
        if let Err(e) = self.purge_records().await {
            warn!("could not purge leftover records: {e}");
        }

        let tracker = Arc::new(CollectionTracker::new(
            self.roster.iter().map(|p| p.name.clone()),
        ));
        let handle = CycleHandle::new(
            cycle,
            self.settings.title.clone(),
            window.labels(),
            self.store.clone(),
            Arc::clone(&tracker),
            CancellationToken::new(),
            Arc::clone(&self.pending),
        );

        for person in self.roster.iter() {
            let Some(adapter) = self.registry.get(&person.request_channel) else {
                error!(
                    person = %person.name,
                    channel = %person.request_channel,
                    "request channel is not registered"
                );
                handle.complete(&person.name);
                continue;
            };

            match adapter.request(person, &handle).await {
                Ok(()) => {
                    debug!(person = %person.name, channel = %person.request_channel, "request dispatched");
                }
                Err(e) => {
                    // The person surfaces as unknown at the deadline; their
                    // completion signal is ours to send now.
                    error!(person = %person.name, "request failed: {e}");
                    handle.complete(&person.name);
                }
            }
        }

        *self.current.lock().await = Some(ActiveCycle { handle });
        self.set_state(CycleState::Collecting);
        Ok(())
    }

    /// The deadline trigger. Valid only from `Collecting`.
    ///
    /// Stops background listeners, waits (bounded) for their completion
    /// signals, gathers, aligns with a decaying quorum, and responds to
    /// every person, including the unknowns.
    pub async fn on_deadline(&self) -> Result<Outcome, CycleError> {
        self.transition(CycleState::Collecting, CycleState::Aligning)
            .inspect_err(|e| error!("{e}"))?;

        let Some(active) = self.current.lock().await.take() else {
            // Collecting with no active cycle cannot happen; recover anyway.
            self.set_state(CycleState::Idle);
            return Err(CycleError::InvalidState {
                expected: CycleState::Collecting,
                actual: CycleState::Idle,
            });
        };
        let handle = active.handle;
        info!(cycle = %handle.cycle(), "starting completion");

        // Cooperative stop: listeners observe the token between external
        // calls, flush, and signal completion.
        handle.cancelled().cancel();

        let all_done = handle
            .tracker()
            .wait_all(self.settings.collect_timeout)
            .await;
        let stragglers = if all_done {
            Vec::new()
        } else {
            let stragglers = handle.tracker().pending();
            warn!(
                timeout = ?self.settings.collect_timeout,
                ?stragglers,
                "collection did not finish in time; forcing stragglers to unknown"
            );
            for person in &stragglers {
                handle.store().remove(person).await;
            }
            stragglers
        };

        for person in self.roster.iter() {
            // A straggler's listener may still be running; touching their
            // records now could race with it.
            if stragglers.contains(&person.name) {
                continue;
            }
            let Some(adapter) = self.registry.get(&person.request_channel) else {
                continue;
            };
            match adapter.gather(person, &handle).await {
                Ok(()) => debug!(person = %person.name, "gather finished"),
                Err(e) => {
                    // Whatever partial data made it into the store stays.
                    error!(person = %person.name, "gather failed: {e}");
                }
            }
        }

        let (days, unknowns, quorum) = self
            .store
            .with(|store| {
                let unknowns = store.split_unknowns(&self.roster);
                let total = self.roster.len() - unknowns.len();
                let (days, quorum) = resolve(store, total);
                (days, unknowns, quorum)
            })
            .await;
        info!(
            days = days.len(),
            quorum,
            unknowns = unknowns.len(),
            "alignment finished"
        );

        let outcome = Outcome {
            days,
            unknowns,
            quorum,
            roster_size: self.roster.len(),
        };

        self.set_state(CycleState::Responding);
        for person in self.roster.iter() {
            let Some(adapter) = self.registry.get(&person.response_channel) else {
                error!(
                    person = %person.name,
                    channel = %person.response_channel,
                    "response channel is not registered"
                );
                continue;
            };
            if let Err(e) = adapter.respond(person, &handle, &outcome).await {
                // Terminal only for this person's notification.
                error!(person = %person.name, "response failed: {e}");
            }
        }

        self.set_state(CycleState::Idle);
        info!(cycle = %handle.cycle(), "completion finished");
        Ok(outcome)
    }

    /// Delete any records a previous, abandoned cycle left under our owner.
    async fn purge_records(&self) -> Result<(), StoreError> {
        let leftover = self.pending.find_all(&self.settings.owner).await?;
        if !leftover.is_empty() {
            warn!(records = leftover.len(), "purging stale pending records");
        }
        for record in &leftover {
            self.pending.delete(record).await?;
        }
        Ok(())
    }
}
