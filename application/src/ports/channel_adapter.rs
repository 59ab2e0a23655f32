//! Channel adapter port
//!
//! Defines the interface one messaging channel (Discord, Telegram, ...)
//! implements to take part in a cycle. The orchestrator selects an adapter
//! per person through the [`AdapterRegistry`](crate::registry::AdapterRegistry)
//! by channel name; it never knows which wire protocol sits behind the trait.

use crate::collection::CycleHandle;
use crate::ports::pending_store::StoreError;
use async_trait::async_trait;
use freeday_domain::{Outcome, Person};
use thiserror::Error;

/// Errors a channel adapter can surface.
///
/// None of these abort a cycle for other persons: the orchestrator logs the
/// failure and the affected person degrades to "unknown" (request) or keeps
/// whatever partial data was collected (gather).
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("Channel session has not been initialized")]
    NotInitialized,

    #[error("Channel transport unreachable: {0}")]
    ChannelUnavailable(String),

    #[error("Transport request failed: {0}")]
    Transport(String),

    #[error("Person id is not valid for this channel: {0}")]
    InvalidPersonId(String),

    #[error("Pending-request store error: {0}")]
    Store(#[from] StoreError),
}

/// One messaging channel's request / gather / respond capability.
///
/// Implementations (adapters) live in the infrastructure layer.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Prompt a person for their availability over this channel.
    ///
    /// Must seed the person's all-false availability map in the cycle's
    /// store, deliver a prompt enumerating the window's dates, and persist
    /// pending-request records so a restarted process can still finish
    /// [`gather`](ChannelAdapter::gather). May spawn background listeners
    /// that stream answers into the store; listeners must watch the cycle's
    /// cancellation token and exit promptly once it fires, never mid-write.
    ///
    /// Contract: after a successful return, the adapter is responsible for
    /// eventually signalling the person's collection completion on the
    /// cycle's tracker: immediately if it runs no background work, or from
    /// the listener once it observes cancellation. On error the orchestrator
    /// signals completion itself.
    async fn request(&self, person: &Person, cycle: &CycleHandle) -> Result<(), AdapterError>;

    /// Finalize the person's availability from pending-request records.
    ///
    /// Loads the person's records from the persistence gateway (so it works
    /// after a restart that lost all in-memory state), applies them in
    /// batch-sequence order (an "all unavailable" answer in an early batch
    /// short-circuits later ones), and deletes each consumed record.
    ///
    /// Must be idempotent: a second call with no records left changes
    /// nothing.
    async fn gather(&self, person: &Person, cycle: &CycleHandle) -> Result<(), AdapterError>;

    /// Deliver the cycle's outcome to a person. Pure side effect; must not
    /// touch the availability store.
    async fn respond(
        &self,
        person: &Person,
        cycle: &CycleHandle,
        outcome: &Outcome,
    ) -> Result<(), AdapterError>;
}
