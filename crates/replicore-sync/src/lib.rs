//! Replicore Sync - Offline-first synchronization engine
//!
//! Provides:
//! - A durable mutation outbox with submission collapse rules
//! - Version-gated, idempotent merging of remote state
//! - Mutation publication with conflict resolution and jittered retry
//! - Concurrent bulk hydration of local state from the remote store
//!
//! ## Modules
//!
//! - [`engine`] - Facade wiring the outbox, processors and event hub together
//! - [`outbox`] - Durable FIFO queue of not-yet-acknowledged local writes
//! - [`merger`] - Single funnel through which remote state enters the store
//! - [`version`] - Lookup of the server-confirmed version for a mutation
//! - [`conflict`] - Applies the application's conflict decisions
//! - [`retry`] - Classified-error retry policy with exponential backoff
//! - [`mutation_processor`] - Drains the outbox toward the remote store
//! - [`sync_processor`] - Paged hydration across model types

pub mod conflict;
pub mod engine;
pub mod merger;
pub mod mutation_processor;
pub mod outbox;
pub mod retry;
pub mod sync_processor;
pub mod version;

use thiserror::Error;

use replicore_core::domain::errors::DomainError;
use replicore_core::ports::StoreError;

pub use engine::SyncEngine;
pub use outbox::{MutationOutbox, OutboxError};
pub use version::VersionError;

/// Errors that can occur during synchronization operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// A storage operation failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// An outbox operation failed
    #[error("Outbox error: {0}")]
    Outbox(#[from] OutboxError),

    /// The server-confirmed version for a mutation could not be determined
    #[error("Version error: {0}")]
    Version(#[from] VersionError),

    /// A domain-level error propagated from replicore-core
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// The remote transport failed in a way the engine cannot recover from
    #[error("Remote error: {0}")]
    Remote(String),
}
