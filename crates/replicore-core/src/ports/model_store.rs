//! Local model store port (driven/secondary port)
//!
//! The engine treats on-device storage as an opaque, key-addressable model
//! store. The same store also backs the mutation outbox and the hydration
//! bookmarks, which is what lets the outbox and the merger coordinate
//! "is this identity spoken for" through durable state instead of shared
//! in-memory structures.
//!
//! ## Design Notes
//!
//! - Operations return a typed [`StoreError`] rather than `anyhow`, because
//!   the merger must distinguish a referential-integrity violation (a soft,
//!   retry-on-next-hydration failure) from a real storage fault.
//! - `save_model` and `delete_model` each write the model row and its
//!   metadata row in one transaction; the merger's correctness depends on
//!   that atomicity.
//! - Pending-mutation rows are replayed oldest-first; `next_pending` skips
//!   ids the caller reports as in flight.

use thiserror::Error;
use tokio::sync::broadcast;

use crate::domain::{
    LastSyncMetadata, ModelId, ModelInstance, ModelMetadata, ModelTypeName, MutationId,
    PendingMutation,
};

/// Errors raised by a model store adapter
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    /// Failed to establish or use a storage connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A storage query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Serialization or deserialization of domain types failed
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A write violated a referential-integrity constraint, e.g. a child
    /// model arriving before its parent
    #[error("Referential integrity violation: {0}")]
    ForeignKeyViolation(String),
}

/// A row-level change notification from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub model_type: ModelTypeName,
    pub model_id: ModelId,
    pub kind: StoreChangeKind,
}

/// What happened to the row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChangeKind {
    Saved,
    Deleted,
}

/// Port trait for the local model store
#[async_trait::async_trait]
pub trait IModelStore: Send + Sync {
    // --- Model rows ---

    /// Atomically upserts a model row together with its metadata row
    async fn save_model(
        &self,
        model: &ModelInstance,
        metadata: &ModelMetadata,
    ) -> Result<(), StoreError>;

    /// Upserts a model row without touching metadata (local app writes,
    /// which carry no server-assigned version yet)
    async fn upsert_model(&self, model: &ModelInstance) -> Result<(), StoreError>;

    /// Retrieves a model row by identity
    async fn get_model(
        &self,
        model_type: &ModelTypeName,
        id: &ModelId,
    ) -> Result<Option<ModelInstance>, StoreError>;

    /// Retrieves all model rows of one type
    async fn query_models(
        &self,
        model_type: &ModelTypeName,
    ) -> Result<Vec<ModelInstance>, StoreError>;

    /// Atomically deletes a model row and upserts its deletion-tombstone
    /// metadata row
    async fn delete_model(
        &self,
        model_type: &ModelTypeName,
        id: &ModelId,
        tombstone: &ModelMetadata,
    ) -> Result<(), StoreError>;

    /// Removes a model row without writing metadata (local app deletes)
    async fn remove_model(
        &self,
        model_type: &ModelTypeName,
        id: &ModelId,
    ) -> Result<(), StoreError>;

    // --- Metadata rows ---

    /// Retrieves the metadata row for one identity
    async fn get_metadata(
        &self,
        model_type: &ModelTypeName,
        id: &ModelId,
    ) -> Result<Option<ModelMetadata>, StoreError>;

    /// Upserts a metadata row without touching the model row; used when the
    /// server-confirmed version must advance but local field state is
    /// protected by a queued mutation
    async fn save_metadata(&self, metadata: &ModelMetadata) -> Result<(), StoreError>;

    // --- Hydration bookmarks ---

    /// Retrieves the hydration bookmark for one model type
    async fn get_last_sync(
        &self,
        model_type: &ModelTypeName,
    ) -> Result<Option<LastSyncMetadata>, StoreError>;

    /// Upserts a hydration bookmark
    async fn save_last_sync(&self, bookmark: &LastSyncMetadata) -> Result<(), StoreError>;

    // --- Pending mutations (outbox backing rows) ---

    /// Upserts a pending mutation; an upsert over an existing mutation id
    /// keeps the original queue position
    async fn save_pending(&self, mutation: &PendingMutation) -> Result<(), StoreError>;

    /// Retrieves a pending mutation by id
    async fn get_pending(&self, id: &MutationId) -> Result<Option<PendingMutation>, StoreError>;

    /// Retrieves the newest-queued pending mutation for one identity whose
    /// id is not in `skip` (the caller's in-flight set); collapsing must
    /// target the queue tail, never an immutable in-flight entry
    async fn get_pending_for_model(
        &self,
        model_type: &ModelTypeName,
        id: &ModelId,
        skip: &[MutationId],
    ) -> Result<Option<PendingMutation>, StoreError>;

    /// Retrieves the earliest-queued pending mutation whose id is not in
    /// `skip` (the caller's in-flight set)
    async fn next_pending(
        &self,
        skip: &[MutationId],
    ) -> Result<Option<PendingMutation>, StoreError>;

    /// Deletes a pending mutation; returns whether a row existed
    async fn delete_pending(&self, id: &MutationId) -> Result<bool, StoreError>;

    /// Counts queued pending mutations
    async fn count_pending(&self) -> Result<u64, StoreError>;

    // --- Change notifications ---

    /// Subscribes to row-level change notifications
    fn observe(&self) -> broadcast::Receiver<StoreChange>;
}
