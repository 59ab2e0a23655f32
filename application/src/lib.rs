//! Application layer for freeday
//!
//! This crate contains the port definitions, the shared collection state,
//! and the cycle orchestrator use case. It depends only on the domain layer.
//!
//! The flow: a timer (or an explicit call) fires the *contact* trigger; the
//! orchestrator resets state and asks every person's channel adapter to
//! prompt them; adapters may spawn background listeners that stream answers
//! into the shared availability store. A later *deadline* trigger stops the
//! listeners, finalizes collection, aligns everyone's schedules, and sends
//! the result back through each person's response channel.

pub mod collection;
pub mod ports;
pub mod registry;
pub mod use_cases;

// Re-export commonly used types
pub use collection::{CollectionTracker, CycleHandle, SharedAvailability};
pub use ports::{
    channel_adapter::{AdapterError, ChannelAdapter},
    pending_store::{MemoryPendingStore, PendingRequest, PendingStore, StoreError},
};
pub use registry::AdapterRegistry;
pub use use_cases::run_cycle::{CycleError, CycleOrchestrator, CycleSettings, CycleState};
