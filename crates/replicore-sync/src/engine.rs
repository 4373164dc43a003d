//! Sync engine facade
//!
//! The [`SyncEngine`] wires the outbox, merger, processors and event hub
//! together over the injected adapters. It is the only type an embedding
//! application needs:
//!
//! - [`save`](SyncEngine::save) / [`delete`](SyncEngine::delete) apply a
//!   local write immediately and queue its publication
//! - [`start`](SyncEngine::start) launches the background mutation and
//!   hydration loops; [`stop`](SyncEngine::stop) winds them down, always
//!   finishing the item currently on the wire
//! - [`events`](SyncEngine::events) / [`observe`](SyncEngine::observe)
//!   expose engine progress and row-level store changes

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Map;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use replicore_core::config::Config;
use replicore_core::domain::{
    EventHub, ModelId, ModelInstance, ModelTypeName, PendingMutation, SyncEvent, WriteCondition,
};
use replicore_core::ports::{IConflictHandler, IModelStore, IRemoteSync, StoreChange};

use crate::conflict::ConflictResolver;
use crate::merger::Merger;
use crate::mutation_processor::MutationProcessor;
use crate::outbox::MutationOutbox;
use crate::retry::RetryPolicy;
use crate::sync_processor::{HydrationReport, SyncProcessor};
use crate::SyncError;

/// Offline-first sync engine over injected store, transport and policy
pub struct SyncEngine {
    store: Arc<dyn IModelStore>,
    outbox: Arc<MutationOutbox>,
    mutation_processor: Arc<MutationProcessor>,
    sync_processor: Arc<SyncProcessor>,
    hub: EventHub,
    model_types: Vec<ModelTypeName>,
    cancel: CancellationToken,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl SyncEngine {
    /// Builds an engine from its adapters and validated configuration
    ///
    /// `model_types` lists the types the hydration loop will keep in sync;
    /// local writes are accepted for any type.
    pub fn new(
        store: Arc<dyn IModelStore>,
        remote: Arc<dyn IRemoteSync>,
        handler: Arc<dyn IConflictHandler>,
        config: Config,
        model_types: Vec<ModelTypeName>,
    ) -> Result<Self> {
        config.validate().context("Invalid engine configuration")?;

        let hub = EventHub::new(config.events.channel_capacity);
        let outbox = Arc::new(MutationOutbox::new(Arc::clone(&store), hub.clone()));
        let merger = Arc::new(Merger::new(
            Arc::clone(&store),
            Arc::clone(&outbox),
            hub.clone(),
        ));
        let resolver = Arc::new(ConflictResolver::new(
            handler,
            Arc::clone(&store),
            Arc::clone(&outbox),
            Arc::clone(&merger),
        ));
        let mutation_processor = Arc::new(MutationProcessor::new(
            Arc::clone(&store),
            Arc::clone(&remote),
            Arc::clone(&outbox),
            Arc::clone(&merger),
            resolver,
            RetryPolicy::new(config.retry.clone()),
            hub.clone(),
        ));
        let sync_processor = Arc::new(SyncProcessor::new(
            Arc::clone(&store),
            remote,
            merger,
            config.hydration.clone(),
            hub.clone(),
        ));

        Ok(Self {
            store,
            outbox,
            mutation_processor,
            sync_processor,
            hub,
            model_types,
            cancel: CancellationToken::new(),
            tasks: std::sync::Mutex::new(Vec::new()),
        })
    }

    /// Saves a model locally and queues its publication
    ///
    /// A first-time save queues a CREATE; a save over an existing local row
    /// queues an UPDATE whose diff is taken against that row. The condition
    /// only applies to updates; it is ignored on a first-time save, since
    /// there is no server state to evaluate it against.
    pub async fn save(
        &self,
        model: ModelInstance,
        condition: Option<WriteCondition>,
    ) -> Result<(), SyncError> {
        let existing = self.store.get_model(model.model_type(), model.id()).await?;
        self.store.upsert_model(&model).await?;

        let mutation = match existing {
            Some(base) => PendingMutation::update(model, Some(base), condition),
            None => PendingMutation::creation(model),
        };
        self.outbox.enqueue(mutation).await?;
        Ok(())
    }

    /// Deletes a model locally and queues the deletion's publication
    pub async fn delete(
        &self,
        model_type: &ModelTypeName,
        id: &ModelId,
        condition: Option<WriteCondition>,
    ) -> Result<(), SyncError> {
        let snapshot = self
            .store
            .get_model(model_type, id)
            .await?
            .unwrap_or_else(|| ModelInstance::new(model_type.clone(), id.clone(), Map::new()));
        self.store.remove_model(model_type, id).await?;

        self.outbox
            .enqueue(PendingMutation::deletion(snapshot, condition))
            .await?;
        Ok(())
    }

    /// Launches the background mutation and hydration loops
    pub fn start(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        if !tasks.is_empty() {
            return;
        }
        info!(model_types = self.model_types.len(), "Starting sync engine");

        let processor = Arc::clone(&self.mutation_processor);
        let cancel = self.cancel.clone();
        tasks.push(tokio::spawn(async move {
            processor.run(cancel).await;
        }));

        let hydrator = Arc::clone(&self.sync_processor);
        let model_types = self.model_types.clone();
        let cancel = self.cancel.clone();
        tasks.push(tokio::spawn(async move {
            hydrator.run(model_types, cancel).await;
        }));
    }

    /// Stops the background loops, finishing the item currently on the wire
    pub async fn stop(&self) {
        info!("Stopping sync engine");
        self.cancel.cancel();
        let tasks: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            tasks.drain(..).collect()
        };
        for task in tasks {
            let _ = task.await;
        }
    }

    /// Runs one hydration pass immediately, outside the scheduled interval
    pub async fn hydrate_now(&self) -> HydrationReport {
        self.sync_processor
            .hydrate(&self.model_types, &self.cancel)
            .await
    }

    /// Drains the outbox once; returns when it is empty or cancellation hits
    pub async fn drain_outbox(&self) -> Result<(), SyncError> {
        self.mutation_processor.drain(&self.cancel).await
    }

    /// Subscribes to engine status events
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<SyncEvent> {
        self.hub.subscribe()
    }

    /// Subscribes to row-level store change notifications
    #[must_use]
    pub fn observe(&self) -> broadcast::Receiver<StoreChange> {
        self.store.observe()
    }

    /// Number of queued mutations awaiting acknowledgement
    pub async fn pending_mutations(&self) -> Result<u64, SyncError> {
        Ok(self.outbox.count().await?)
    }
}
