//! Typed status events and the event hub
//!
//! The engine reports progress through an outbound channel of typed
//! events. These are notifications only: nothing in the engine waits on a
//! subscriber, and correctness never depends on an event being observed.
//!
//! The hub is a `tokio::sync::broadcast` channel with a bounded capacity.
//! Publishing never blocks; a subscriber that falls behind observes
//! `RecvError::Lagged` and loses the oldest events.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::mutation::MutationKind;
use super::newtypes::{ModelId, ModelTypeName, MutationId};

/// How a merge changed the local store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Created,
    Updated,
    Deleted,
}

/// Status events published by the sync engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SyncEvent {
    /// The outbox transitioned between empty and non-empty
    OutboxStatus { is_empty: bool },

    /// A mutation was accepted into the outbox
    MutationEnqueued {
        mutation_id: MutationId,
        model_type: ModelTypeName,
        model_id: ModelId,
        kind: MutationKind,
    },

    /// A mutation was acknowledged by the remote and removed from the outbox
    MutationProcessed {
        mutation_id: MutationId,
        model_type: ModelTypeName,
        model_id: ModelId,
    },

    /// A mutation failed terminally and requires out-of-band resolution
    MutationFailed {
        mutation_id: MutationId,
        model_type: ModelTypeName,
        model_id: ModelId,
        reason: String,
    },

    /// A remote (model, metadata) pair was applied to the local store
    ModelSynced {
        model_type: ModelTypeName,
        model_id: ModelId,
        change: ChangeType,
    },

    /// Hydration of one model type began
    HydrationStarted {
        model_type: ModelTypeName,
        /// `true` for a full hydration, `false` for incremental
        full: bool,
    },

    /// One hydration page was merged
    HydrationPage {
        model_type: ModelTypeName,
        applied: u64,
        skipped: u64,
        orphans_skipped: u64,
    },

    /// Hydration of one model type finished successfully
    HydrationCompleted {
        model_type: ModelTypeName,
        applied: u64,
    },

    /// Hydration of one model type failed; other types are unaffected
    HydrationFailed {
        model_type: ModelTypeName,
        reason: String,
    },
}

/// Bounded, non-blocking fan-out channel for [`SyncEvent`]s
#[derive(Debug, Clone)]
pub struct EventHub {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventHub {
    /// Creates a hub whose subscribers each buffer up to `capacity` events
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes an event; a send with no subscribers is not an error
    pub fn publish(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribes to events published from this point on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(256)
    }
}
