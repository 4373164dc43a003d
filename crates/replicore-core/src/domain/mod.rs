//! Domain entities and business logic
//!
//! This module contains the core domain types for Replicore:
//! - Newtypes for type-safe identifiers
//! - Model instances and their sync metadata
//! - Pending mutations and the pure outbox collapse rules
//! - Typed status events and the event hub
//! - Domain-specific error types

pub mod errors;
pub mod events;
pub mod metadata;
pub mod model;
pub mod mutation;
pub mod newtypes;

// Re-export commonly used types
pub use errors::DomainError;
pub use events::{ChangeType, EventHub, SyncEvent};
pub use metadata::{LastSyncMetadata, ModelMetadata, SyncMode};
pub use model::{ModelInstance, ModelRef, ModelWithMetadata};
pub use mutation::{
    collapse, Collapse, CollapseConflict, MutationKind, PendingMutation, WriteCondition,
};
pub use newtypes::*;
