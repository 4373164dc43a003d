//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the interfaces the sync engine depends on, whose
//! implementations live outside the core:
//!
//! - [`IModelStore`] - durable local model/metadata/outbox storage
//! - [`IRemoteSync`] - the remote authoritative store's transport
//! - [`IConflictHandler`] - application-supplied conflict policy

pub mod conflict;
pub mod model_store;
pub mod remote;

pub use conflict::{ApplyRemoteHandler, ConflictData, ConflictDecision, IConflictHandler};
pub use model_store::{IModelStore, StoreChange, StoreChangeKind, StoreError};
pub use remote::{ErrorClass, IRemoteSync, RemoteError, RemotePage};
