//! Conflict resolution
//!
//! When the remote rejects a mutation with a version or condition
//! mismatch, it attaches its current state. The [`ConflictResolver`]
//! presents both sides to the application's [`IConflictHandler`] and
//! applies the decision:
//!
//! - **ApplyRemote** drops the queued mutation and merges the server's
//!   state fully, as if it had arrived on a hydration page.
//! - **RetryLocal** advances the local metadata to the server's version and
//!   leaves the queued mutation untouched; the next attempt publishes the
//!   same fields at the now-correct version.
//! - **RetryWith** does the same but first rewrites the queued mutation's
//!   snapshot to the application-merged model, keeping its id and queue
//!   position.

use std::sync::Arc;

use tracing::{debug, info};

use replicore_core::domain::{ModelWithMetadata, PendingMutation};
use replicore_core::ports::{ConflictData, ConflictDecision, IConflictHandler, IModelStore};

use crate::merger::Merger;
use crate::outbox::MutationOutbox;
use crate::SyncError;

/// What the processor should do with the conflicted mutation next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionAction {
    /// The mutation was dropped; move on to the next queue entry
    Dropped,
    /// The mutation (possibly rewritten) should be published again
    Retry,
}

/// Applies the application's conflict decisions to outbox and store
pub struct ConflictResolver {
    handler: Arc<dyn IConflictHandler>,
    store: Arc<dyn IModelStore>,
    outbox: Arc<MutationOutbox>,
    merger: Arc<Merger>,
}

impl ConflictResolver {
    pub fn new(
        handler: Arc<dyn IConflictHandler>,
        store: Arc<dyn IModelStore>,
        outbox: Arc<MutationOutbox>,
        merger: Arc<Merger>,
    ) -> Self {
        Self {
            handler,
            store,
            outbox,
            merger,
        }
    }

    /// Resolves one rejected mutation against the server's attached state
    #[tracing::instrument(skip_all, fields(mutation_id = %pending.id()))]
    pub async fn resolve(
        &self,
        pending: &PendingMutation,
        server: &ModelWithMetadata,
    ) -> Result<ResolutionAction, SyncError> {
        let data = ConflictData {
            local: pending.outbound_model(),
            remote: server.model.clone(),
        };
        let decision = self.handler.on_conflict(data).await;
        debug!(?decision, "Conflict decision received");

        match decision {
            ConflictDecision::ApplyRemote => {
                // Remove first: the merge must not be blocked by the very
                // mutation it is resolving.
                self.outbox.remove(pending.id()).await?;
                self.merger.merge(server).await?;
                info!("Conflict resolved by accepting server state");
                Ok(ResolutionAction::Dropped)
            }
            ConflictDecision::RetryLocal => {
                self.store.save_metadata(&server.metadata).await?;
                Ok(ResolutionAction::Retry)
            }
            ConflictDecision::RetryWith(model) => {
                self.store.save_metadata(&server.metadata).await?;
                let rewritten = pending.rewritten(pending.kind(), model, None);
                self.store.save_pending(&rewritten).await?;
                Ok(ResolutionAction::Retry)
            }
        }
    }
}
