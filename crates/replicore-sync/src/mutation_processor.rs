//! Mutation processor: drains the outbox toward the remote store
//!
//! The processor replays queued mutations strictly oldest-first. One
//! mutation is on the wire at a time; the next is not touched until the
//! current one is acknowledged, resolved, or terminally failed.
//!
//! ## Outcome handling
//!
//! - **Acknowledged**: the server's confirmed state goes through the
//!   merger first, then the mutation leaves the outbox. Merging first
//!   matters: if the process dies between the two steps the mutation is
//!   still queued and replays, whereas the reverse order would lose the
//!   confirmed version with nothing left to retry.
//! - **Conflict**: handed to the [`ConflictResolver`]; a retry decision
//!   republishes within the same attempt budget.
//! - **Service failure**: retried with backoff when its class is in the
//!   configured retryable set, otherwise failed terminally. A terminal
//!   failure removes the mutation and announces it, so one poisoned write
//!   cannot wedge the queue behind it.
//!
//! Cancellation is honored between queue items and during backoff sleeps;
//! an in-flight publication is never abandoned mid-call.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use replicore_core::domain::{
    EventHub, ModelWithMetadata, MutationKind, PendingMutation, SyncEvent,
};
use replicore_core::ports::{ErrorClass, IModelStore, IRemoteSync, RemoteError};

use crate::conflict::{ConflictResolver, ResolutionAction};
use crate::merger::Merger;
use crate::outbox::MutationOutbox;
use crate::retry::RetryPolicy;
use crate::version::VersionRepository;
use crate::SyncError;

/// Outcome of a single publication attempt, before retry policy is applied
enum PublishError {
    Conflict(Box<ModelWithMetadata>),
    Service { class: ErrorClass, message: String },
    Version(crate::version::VersionError),
}

impl From<RemoteError> for PublishError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::Conflict { server, .. } => PublishError::Conflict(server),
            RemoteError::Service { class, message } => PublishError::Service { class, message },
        }
    }
}

/// Publishes queued mutations to the remote store, one at a time
pub struct MutationProcessor {
    store: Arc<dyn IModelStore>,
    remote: Arc<dyn IRemoteSync>,
    outbox: Arc<MutationOutbox>,
    merger: Arc<Merger>,
    resolver: Arc<ConflictResolver>,
    versions: VersionRepository,
    policy: RetryPolicy,
    hub: EventHub,
}

impl MutationProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn IModelStore>,
        remote: Arc<dyn IRemoteSync>,
        outbox: Arc<MutationOutbox>,
        merger: Arc<Merger>,
        resolver: Arc<ConflictResolver>,
        policy: RetryPolicy,
        hub: EventHub,
    ) -> Self {
        let versions = VersionRepository::new(Arc::clone(&store));
        Self {
            store,
            remote,
            outbox,
            merger,
            resolver,
            versions,
            policy,
            hub,
        }
    }

    /// Runs until cancelled: drains the queue, then sleeps until the outbox
    /// signals new content
    pub async fn run(&self, cancel: CancellationToken) {
        let content = self.outbox.content_signal();
        info!("Mutation processor started");

        loop {
            if let Err(e) = self.drain(&cancel).await {
                error!(error = %e, "Outbox drain failed; waiting for next trigger");
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = content.notified() => {}
            }
        }

        info!("Mutation processor stopped");
    }

    /// Processes queued mutations until the queue is empty or cancellation
    /// is requested; the current item is always finished first
    pub async fn drain(&self, cancel: &CancellationToken) -> Result<(), SyncError> {
        while !cancel.is_cancelled() {
            let Some(pending) = self.outbox.peek_next().await? else {
                break;
            };
            self.outbox.mark_in_flight(pending.id()).await?;
            self.process_one(pending, cancel).await?;
        }
        Ok(())
    }

    /// Publishes one mutation through its full retry/conflict lifecycle
    #[tracing::instrument(skip_all, fields(mutation_id = %pending.id(), kind = %pending.kind()))]
    async fn process_one(
        &self,
        mut pending: PendingMutation,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        let id = pending.id();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            match self.publish(&pending).await {
                Ok(ack) => {
                    // Merge before removing: if this fails the mutation is
                    // still queued and replays on the next drain.
                    if let Err(e) = self.merger.merge(&ack).await {
                        self.outbox.release(id).await;
                        return Err(e);
                    }
                    self.outbox.remove(id).await?;
                    debug!(attempt, "Mutation acknowledged");
                    self.publish_processed(&pending);
                    return Ok(());
                }

                Err(PublishError::Conflict(server)) => {
                    info!(attempt, "Remote rejected mutation with a conflict");
                    match self.resolver.resolve(&pending, &server).await? {
                        ResolutionAction::Dropped => {
                            self.publish_processed(&pending);
                            return Ok(());
                        }
                        ResolutionAction::Retry => {
                            if attempt >= self.policy.max_attempts() {
                                return self
                                    .fail_terminally(&pending, "conflict retries exhausted")
                                    .await;
                            }
                            // The resolver may have rewritten the snapshot.
                            if let Some(rewritten) = self.store.get_pending(&id).await? {
                                pending = rewritten;
                            }
                        }
                    }
                }

                Err(PublishError::Service { class, message }) => {
                    let delay = if self.policy.is_retryable(class) {
                        self.policy.next_delay(attempt)
                    } else {
                        None
                    };

                    match delay {
                        Some(delay) => {
                            warn!(
                                ?class,
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                "Publication failed; backing off"
                            );
                            tokio::select! {
                                () = tokio::time::sleep(delay) => {}
                                () = cancel.cancelled() => {
                                    self.outbox.release(id).await;
                                    return Ok(());
                                }
                            }
                        }
                        None => {
                            return self.fail_terminally(&pending, &message).await;
                        }
                    }
                }

                Err(PublishError::Version(e)) => {
                    // No usable version means the publication can never
                    // succeed; retrying would not change the metadata.
                    return self.fail_terminally(&pending, &e.to_string()).await;
                }
            }
        }
    }

    /// One publication attempt against the remote transport
    async fn publish(&self, pending: &PendingMutation) -> Result<ModelWithMetadata, PublishError> {
        match pending.kind() {
            MutationKind::Create => Ok(self.remote.create(&pending.outbound_model()).await?),
            MutationKind::Update => {
                let version = self
                    .versions
                    .find_version(pending.model_type(), pending.model_id())
                    .await
                    .map_err(PublishError::Version)?;
                Ok(self
                    .remote
                    .update(&pending.outbound_model(), version, pending.condition())
                    .await?)
            }
            MutationKind::Delete => {
                let version = self
                    .versions
                    .find_version(pending.model_type(), pending.model_id())
                    .await
                    .map_err(PublishError::Version)?;
                Ok(self
                    .remote
                    .delete(
                        pending.model_type(),
                        pending.model_id(),
                        version,
                        pending.condition(),
                    )
                    .await?)
            }
        }
    }

    async fn fail_terminally(
        &self,
        pending: &PendingMutation,
        reason: &str,
    ) -> Result<(), SyncError> {
        error!(reason, "Mutation failed terminally; removing from outbox");
        self.outbox.remove(pending.id()).await?;
        self.hub.publish(SyncEvent::MutationFailed {
            mutation_id: pending.id(),
            model_type: pending.model_type().clone(),
            model_id: pending.model_id().clone(),
            reason: reason.to_string(),
        });
        Ok(())
    }

    fn publish_processed(&self, pending: &PendingMutation) {
        self.hub.publish(SyncEvent::MutationProcessed {
            mutation_id: pending.id(),
            model_type: pending.model_type().clone(),
            model_id: pending.model_id().clone(),
        });
    }
}
