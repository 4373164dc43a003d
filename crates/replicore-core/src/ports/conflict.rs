//! Conflict handler port (driving/primary port)
//!
//! Conflict resolution policy belongs to the embedding application: when
//! the remote rejects a mutation with a version or condition mismatch, the
//! engine presents both sides and awaits a decision. This is the only place
//! end-user policy enters the engine.

use crate::domain::ModelInstance;

/// Both sides of a detected conflict
#[derive(Debug, Clone)]
pub struct ConflictData {
    /// The model as the local mutation would have written it
    pub local: ModelInstance,
    /// The model as the server currently holds it
    pub remote: ModelInstance,
}

/// The application's decision for one conflict
#[derive(Debug, Clone)]
pub enum ConflictDecision {
    /// Retry the local model unconditionally at the server's version
    RetryLocal,
    /// Accept the server's state and discard the local write
    ApplyRemote,
    /// Retry with an application-merged model at the server's version
    RetryWith(ModelInstance),
}

/// Port trait for application-supplied conflict resolution
#[async_trait::async_trait]
pub trait IConflictHandler: Send + Sync {
    /// Decides how to resolve a conflict; must not fail
    async fn on_conflict(&self, data: ConflictData) -> ConflictDecision;
}

/// Default handler: always accept the server's state
#[derive(Debug, Default, Clone, Copy)]
pub struct ApplyRemoteHandler;

#[async_trait::async_trait]
impl IConflictHandler for ApplyRemoteHandler {
    async fn on_conflict(&self, _data: ConflictData) -> ConflictDecision {
        ConflictDecision::ApplyRemote
    }
}
