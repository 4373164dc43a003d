//! Remote sync transport port (driven/secondary port)
//!
//! The remote authoritative store is consumed through paged list and
//! per-mutation create/update/delete operations. Responses carry either the
//! server-confirmed (model, metadata) pair, a structured conflict with the
//! server's current state attached, or a classified service failure.
//!
//! Error classification is the transport's job: the retry policy only ever
//! sees an [`ErrorClass`] and compares it against the configured retryable
//! set.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{
    ModelId, ModelInstance, ModelTypeName, ModelWithMetadata, PageToken, WriteCondition,
};

/// Coarse failure classification reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Connection-level failure: refused, reset, timed out, DNS
    Network,
    /// The remote asked us to slow down
    Throttling,
    /// Transient server-side failure (5xx-style)
    ServiceUnavailable,
    /// Authentication or authorization failure
    Unauthorized,
    /// The request itself was malformed or rejected permanently
    BadRequest,
    /// Anything the transport could not classify
    Unknown,
}

/// Errors raised by the remote transport
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The remote rejected a mutation because of a version or condition
    /// mismatch; carries the server's current state for conflict resolution
    #[error("Remote conflict: {message}")]
    Conflict {
        server: Box<ModelWithMetadata>,
        message: String,
    },

    /// A transport or service failure, with its classification
    #[error("Remote {class:?} error: {message}")]
    Service { class: ErrorClass, message: String },
}

impl RemoteError {
    /// The failure classification, if this is a service failure
    #[must_use]
    pub fn class(&self) -> Option<ErrorClass> {
        match self {
            RemoteError::Conflict { .. } => None,
            RemoteError::Service { class, .. } => Some(*class),
        }
    }

    /// Convenience constructor for a classified service failure
    pub fn service(class: ErrorClass, message: impl Into<String>) -> Self {
        RemoteError::Service {
            class,
            message: message.into(),
        }
    }
}

/// One page of a remote list result
#[derive(Debug, Clone)]
pub struct RemotePage {
    pub items: Vec<ModelWithMetadata>,
    /// Token for the next page; `None` when the sequence is exhausted
    pub next_token: Option<PageToken>,
}

/// Port trait for the remote sync transport
#[async_trait::async_trait]
pub trait IRemoteSync: Send + Sync {
    /// Publishes a creation; the server assigns version 1
    async fn create(&self, model: &ModelInstance) -> Result<ModelWithMetadata, RemoteError>;

    /// Publishes an update at the caller's known version, optionally
    /// guarded by a write condition
    async fn update(
        &self,
        model: &ModelInstance,
        version: i64,
        condition: Option<&WriteCondition>,
    ) -> Result<ModelWithMetadata, RemoteError>;

    /// Publishes a deletion at the caller's known version, optionally
    /// guarded by a write condition
    async fn delete(
        &self,
        model_type: &ModelTypeName,
        id: &ModelId,
        version: i64,
        condition: Option<&WriteCondition>,
    ) -> Result<ModelWithMetadata, RemoteError>;

    /// Lists records of one type, optionally restricted to records changed
    /// since the given epoch-millisecond timestamp, resuming from an
    /// optional page token
    async fn list(
        &self,
        model_type: &ModelTypeName,
        since: Option<i64>,
        page_token: Option<&PageToken>,
        limit: u32,
    ) -> Result<RemotePage, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_class_accessor() {
        let err = RemoteError::service(ErrorClass::Throttling, "slow down");
        assert_eq!(err.class(), Some(ErrorClass::Throttling));
    }

    #[test]
    fn test_error_class_config_name() {
        // Config files refer to classes by their snake_case name.
        let parsed: ErrorClass = serde_yaml::from_str("service_unavailable").unwrap();
        assert_eq!(parsed, ErrorClass::ServiceUnavailable);
    }
}
