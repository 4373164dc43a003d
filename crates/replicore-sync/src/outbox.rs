//! Durable mutation outbox
//!
//! The [`MutationOutbox`] is the single entry point for locally-originated
//! writes on their way to the remote store. Enqueued mutations are held in
//! the local store's pending table and replayed strictly oldest-first; a
//! new write against an identity that already has a queued mutation is
//! collapsed with it per [`collapse`](replicore_core::domain::collapse).
//!
//! ## In-flight mutations
//!
//! A mutation that has been handed to the mutation processor but not yet
//! acknowledged is marked in flight. An in-flight mutation no longer
//! participates in collapsing: a write arriving while its predecessor is on
//! the wire becomes a fresh queue entry, since the predecessor's snapshot
//! must not change under the transport. Writes after that collapse into the
//! fresh entry, the newest for the identity, so at most one actionable
//! mutation ever trails an in-flight one.
//!
//! All mutating operations serialize on one async mutex. Collapse reads the
//! queue and then writes it; interleaving two enqueues for the same identity
//! would corrupt the queue invariant (at most one actionable mutation per
//! identity).

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use replicore_core::domain::{
    collapse, Collapse, CollapseConflict, EventHub, ModelId, ModelTypeName, MutationId,
    PendingMutation, SyncEvent,
};
use replicore_core::ports::{IModelStore, StoreError};

/// Errors raised by outbox operations
#[derive(Debug, Error)]
pub enum OutboxError {
    /// The incoming mutation is an illegal successor to a queued one
    #[error(transparent)]
    Collapse(#[from] CollapseConflict),

    /// The referenced mutation is not in the outbox
    #[error("No such mutation in outbox: {0}")]
    NoSuchMutation(MutationId),

    /// The backing store failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Default)]
struct OutboxState {
    /// Ids handed to the processor and awaiting acknowledgement
    in_flight: HashSet<MutationId>,
}

/// Durable FIFO queue of not-yet-acknowledged local writes
pub struct MutationOutbox {
    store: Arc<dyn IModelStore>,
    hub: EventHub,
    state: Mutex<OutboxState>,
    /// Woken whenever a new actionable mutation lands in the queue
    content: Arc<Notify>,
}

impl MutationOutbox {
    /// Creates an outbox over the given store, publishing status events to
    /// the given hub
    pub fn new(store: Arc<dyn IModelStore>, hub: EventHub) -> Self {
        Self {
            store,
            hub,
            state: Mutex::new(OutboxState::default()),
            content: Arc::new(Notify::new()),
        }
    }

    /// A handle the processor can await for "content arrived" wakeups
    #[must_use]
    pub fn content_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.content)
    }

    /// Accepts a local mutation into the queue, collapsing it with any
    /// queued (not in-flight) mutation for the same identity
    ///
    /// # Errors
    ///
    /// Returns [`OutboxError::Collapse`] for illegal successions, e.g. a
    /// second CREATE or any write after a queued DELETE.
    pub async fn enqueue(&self, incoming: PendingMutation) -> Result<(), OutboxError> {
        let state = self.state.lock().await;

        // Collapse targets the newest queued entry for the identity. An
        // in-flight predecessor is immutable and excluded; once one exists,
        // later writes collapse into the appended successor instead.
        let in_flight: Vec<MutationId> = state.in_flight.iter().copied().collect();
        let existing = self
            .store
            .get_pending_for_model(incoming.model_type(), incoming.model_id(), &in_flight)
            .await?;

        let decision = collapse(
            existing.as_ref().map(PendingMutation::kind),
            incoming.kind(),
            incoming.condition().is_some(),
        )?;

        debug!(
            model_type = %incoming.model_type(),
            model_id = %incoming.model_id(),
            kind = %incoming.kind(),
            ?decision,
            "Enqueueing mutation"
        );

        // collapse only returns the non-Append outcomes when an existing
        // mutation was supplied, so the pairing below is total.
        match (decision, existing) {
            (Collapse::Append, _) => {
                self.store.save_pending(&incoming).await?;
                self.publish_enqueued(&incoming);
            }
            (Collapse::MergeIntoExisting { kind }, Some(existing)) => {
                let merged = existing.snapshot().merged_with(incoming.snapshot());
                let rewritten = existing.rewritten(kind, merged, None);
                self.store.save_pending(&rewritten).await?;
                self.publish_enqueued(&rewritten);
            }
            (Collapse::OverwriteExisting { kind }, Some(existing)) => {
                let rewritten = existing.rewritten(
                    kind,
                    incoming.snapshot().clone(),
                    incoming.condition().cloned(),
                );
                self.store.save_pending(&rewritten).await?;
                self.publish_enqueued(&rewritten);
            }
            (Collapse::CancelBoth, Some(existing)) => {
                info!(
                    mutation_id = %existing.id(),
                    model_type = %existing.model_type(),
                    "Deletion cancelled an unacknowledged creation"
                );
                self.store.delete_pending(&existing.id()).await?;
            }
            (_, None) => unreachable!("collapse outcomes other than Append require an existing mutation"),
        }

        drop(state);
        self.publish_status().await?;
        self.content.notify_one();
        Ok(())
    }

    /// Marks a mutation as handed to the transport
    ///
    /// # Errors
    ///
    /// Returns [`OutboxError::NoSuchMutation`] if no queued mutation has
    /// the given id.
    pub async fn mark_in_flight(&self, id: MutationId) -> Result<(), OutboxError> {
        let mut state = self.state.lock().await;
        if self.store.get_pending(&id).await?.is_none() {
            return Err(OutboxError::NoSuchMutation(id));
        }
        state.in_flight.insert(id);
        Ok(())
    }

    /// Removes an acknowledged (or terminally failed) mutation
    ///
    /// # Errors
    ///
    /// Returns [`OutboxError::NoSuchMutation`] if no queued mutation has
    /// the given id.
    pub async fn remove(&self, id: MutationId) -> Result<(), OutboxError> {
        let mut state = self.state.lock().await;
        if !self.store.delete_pending(&id).await? {
            warn!(mutation_id = %id, "Attempted to remove unknown mutation");
            return Err(OutboxError::NoSuchMutation(id));
        }
        state.in_flight.remove(&id);
        drop(state);
        self.publish_status().await?;
        Ok(())
    }

    /// Clears the in-flight mark without removing the mutation; used when
    /// processing is interrupted before an acknowledgement arrives
    pub async fn release(&self, id: MutationId) {
        let mut state = self.state.lock().await;
        state.in_flight.remove(&id);
    }

    /// The oldest queued mutation that is not in flight, if any
    pub async fn peek_next(&self) -> Result<Option<PendingMutation>, OutboxError> {
        let state = self.state.lock().await;
        let skip: Vec<MutationId> = state.in_flight.iter().copied().collect();
        Ok(self.store.next_pending(&skip).await?)
    }

    /// Whether any mutation (in flight or not) is queued for the identity
    ///
    /// The merger consults this before applying remote state: a queued
    /// mutation means local intent has not reached the server yet, and the
    /// local field state must win until it does.
    pub async fn has_pending_mutation(
        &self,
        model_type: &ModelTypeName,
        id: &ModelId,
    ) -> Result<bool, OutboxError> {
        Ok(self
            .store
            .get_pending_for_model(model_type, id, &[])
            .await?
            .is_some())
    }

    /// Number of queued mutations, in flight included
    pub async fn count(&self) -> Result<u64, OutboxError> {
        Ok(self.store.count_pending().await?)
    }

    fn publish_enqueued(&self, mutation: &PendingMutation) {
        self.hub.publish(SyncEvent::MutationEnqueued {
            mutation_id: mutation.id(),
            model_type: mutation.model_type().clone(),
            model_id: mutation.model_id().clone(),
            kind: mutation.kind(),
        });
    }

    async fn publish_status(&self) -> Result<(), OutboxError> {
        let is_empty = self.store.count_pending().await? == 0;
        self.hub.publish(SyncEvent::OutboxStatus { is_empty });
        Ok(())
    }
}
