//! Server-confirmed version lookup
//!
//! UPDATE and DELETE mutations must be published at the version the server
//! last confirmed for the instance; the remote rejects anything else as a
//! conflict. The [`VersionRepository`] reads that version out of the local
//! metadata table and distinguishes "never synced" from "metadata row
//! exists but carries no version", because the two call for different
//! handling upstream.

use std::sync::Arc;

use thiserror::Error;

use replicore_core::domain::{ModelId, ModelTypeName};
use replicore_core::ports::{IModelStore, StoreError};

/// Errors raised by version lookup
#[derive(Debug, Error)]
pub enum VersionError {
    /// No metadata row exists; the instance has never been acknowledged by
    /// the remote
    #[error("No sync metadata for {model_type}|{model_id}")]
    NeverSynced {
        model_type: ModelTypeName,
        model_id: ModelId,
    },

    /// A metadata row exists but carries no version; the record is corrupt
    #[error("Sync metadata for {model_type}|{model_id} has no version")]
    MissingVersion {
        model_type: ModelTypeName,
        model_id: ModelId,
    },

    /// The backing store failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Reads server-confirmed versions out of the local metadata table
pub struct VersionRepository {
    store: Arc<dyn IModelStore>,
}

impl VersionRepository {
    pub fn new(store: Arc<dyn IModelStore>) -> Self {
        Self { store }
    }

    /// The version the remote last confirmed for the instance
    pub async fn find_version(
        &self,
        model_type: &ModelTypeName,
        id: &ModelId,
    ) -> Result<i64, VersionError> {
        let metadata =
            self.store
                .get_metadata(model_type, id)
                .await?
                .ok_or_else(|| VersionError::NeverSynced {
                    model_type: model_type.clone(),
                    model_id: id.clone(),
                })?;

        metadata.version.ok_or_else(|| VersionError::MissingVersion {
            model_type: model_type.clone(),
            model_id: id.clone(),
        })
    }
}
