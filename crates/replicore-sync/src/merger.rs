//! Merger: the single funnel for remote state entering the local store
//!
//! Every remote (model, metadata) pair, whether it arrived on a hydration
//! page, as a mutation acknowledgement, or attached to a conflict, passes
//! through [`Merger::merge`]. The merger enforces two gates before anything
//! touches a row:
//!
//! 1. **Version gate.** An incoming version less than or equal to the
//!    locally known version is discarded before any write, the metadata
//!    row included. The comparison is strictly greater-than: a server echo
//!    of a write the engine already applied carries an equal version and
//!    must not clobber a racing local write.
//! 2. **Outbox precedence.** If any mutation is queued for the identity,
//!    local intent has not reached the server yet. Only the metadata row is
//!    advanced, so the version bookkeeping stays current while the local
//!    field state remains untouched; the next hydration pass re-delivers
//!    the remote state once the queue drains.
//!
//! A write rejected by the store's referential-integrity constraint (a
//! child arriving before its parent, or a parent tombstone arriving while
//! a local child still references it) is a soft failure: the pair is
//! skipped and counted, and a later pass applies it once the constraint
//! clears. Merges serialize on one async write gate, so two merges for the
//! same identity can never interleave their version read and their write.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use replicore_core::domain::{ChangeType, EventHub, ModelWithMetadata, SyncEvent};
use replicore_core::ports::{IModelStore, StoreError};

use crate::outbox::MutationOutbox;
use crate::SyncError;

/// What [`Merger::merge`] did with one remote pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The pair was applied to the local store
    Applied(ChangeType),
    /// A queued mutation protects the identity; only metadata was advanced
    SkippedPendingMutation,
    /// The incoming version did not exceed the local one
    SkippedVersion,
    /// The store's referential-integrity constraint rejected the write
    OrphanSkipped,
}

/// Applies remote state to the local store under the version and outbox gates
pub struct Merger {
    store: Arc<dyn IModelStore>,
    outbox: Arc<MutationOutbox>,
    hub: EventHub,
    /// Serializes the read-gate-write sequence across callers; the mutation
    /// processor and concurrent hydration tasks all merge through one
    /// instance
    write_gate: Mutex<()>,
}

impl Merger {
    pub fn new(store: Arc<dyn IModelStore>, outbox: Arc<MutationOutbox>, hub: EventHub) -> Self {
        Self {
            store,
            outbox,
            hub,
            write_gate: Mutex::new(()),
        }
    }

    /// Merges one remote (model, metadata) pair into the local store
    #[tracing::instrument(skip(self, incoming), fields(key = %incoming.model.key()))]
    pub async fn merge(&self, incoming: &ModelWithMetadata) -> Result<MergeOutcome, SyncError> {
        let model_type = incoming.model.model_type();
        let model_id = incoming.model.id();
        let _gate = self.write_gate.lock().await;

        let current = self.store.get_metadata(model_type, model_id).await?;
        if let Some(current) = &current {
            if current.version_or_default() >= incoming.metadata.version_or_default() {
                debug!(
                    local = current.version_or_default(),
                    incoming = incoming.metadata.version_or_default(),
                    "Incoming version does not exceed local; discarding"
                );
                return Ok(MergeOutcome::SkippedVersion);
            }
        }

        if self
            .outbox
            .has_pending_mutation(model_type, model_id)
            .await?
        {
            debug!("Queued mutation protects identity; advancing metadata only");
            self.store.save_metadata(&incoming.metadata).await?;
            return Ok(MergeOutcome::SkippedPendingMutation);
        }

        let change = if incoming.metadata.deleted {
            match self
                .store
                .delete_model(model_type, model_id, &incoming.metadata)
                .await
            {
                Ok(()) => {}
                Err(StoreError::ForeignKeyViolation(msg)) => {
                    warn!(reason = %msg, "Skipping tombstone still referenced by a local row");
                    return Ok(MergeOutcome::OrphanSkipped);
                }
                Err(e) => return Err(e.into()),
            }
            ChangeType::Deleted
        } else {
            let existed = self.store.get_model(model_type, model_id).await?.is_some();
            match self
                .store
                .save_model(&incoming.model, &incoming.metadata)
                .await
            {
                Ok(()) => {}
                Err(StoreError::ForeignKeyViolation(msg)) => {
                    warn!(reason = %msg, "Skipping record whose parent has not arrived yet");
                    return Ok(MergeOutcome::OrphanSkipped);
                }
                Err(e) => return Err(e.into()),
            }
            if existed {
                ChangeType::Updated
            } else {
                ChangeType::Created
            }
        };

        self.hub.publish(SyncEvent::ModelSynced {
            model_type: model_type.clone(),
            model_id: model_id.clone(),
            change,
        });

        Ok(MergeOutcome::Applied(change))
    }
}
