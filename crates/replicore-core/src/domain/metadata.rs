//! Sync bookkeeping records
//!
//! Two system record kinds live alongside the model rows in the local
//! store:
//!
//! - [`ModelMetadata`]: the authoritative version/deletion state of one
//!   model instance, keyed `"<type>|<id>"`. Versions are compared with
//!   strict greater-than semantics during merge; an equal incoming version
//!   is rejected so a server echo can never clobber a racing local write.
//! - [`LastSyncMetadata`]: the per-model-type hydration bookmark that
//!   decides between full and incremental hydration and lets a partially
//!   completed page sequence resume after restart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{ModelId, ModelTypeName, PageToken, KEY_SEPARATOR};

// ============================================================================
// ModelMetadata
// ============================================================================

/// Authoritative sync state for one model instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_type: ModelTypeName,
    pub model_id: ModelId,
    /// Server-assigned, monotonically increasing version. `None` means the
    /// record was written without a version, which the version repository
    /// treats as corrupt.
    pub version: Option<i64>,
    pub deleted: bool,
    pub last_changed_at: DateTime<Utc>,
}

impl ModelMetadata {
    /// Creates metadata for a live (non-deleted) instance
    pub fn new(model_type: ModelTypeName, model_id: ModelId, version: i64) -> Self {
        Self {
            model_type,
            model_id,
            version: Some(version),
            deleted: false,
            last_changed_at: Utc::now(),
        }
    }

    /// Creates a deletion tombstone at the given version
    pub fn tombstone(model_type: ModelTypeName, model_id: ModelId, version: i64) -> Self {
        Self {
            model_type,
            model_id,
            version: Some(version),
            deleted: true,
            last_changed_at: Utc::now(),
        }
    }

    /// The composite storage key (`"<type>|<id>"`)
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}{}{}", self.model_type, KEY_SEPARATOR, self.model_id)
    }

    /// The version to use in merge comparisons; unset versions sort below
    /// every real version so they never block an incoming merge.
    #[must_use]
    pub fn version_or_default(&self) -> i64 {
        self.version.unwrap_or(-1)
    }
}

// ============================================================================
// LastSyncMetadata
// ============================================================================

/// Per-model-type hydration bookmark
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastSyncMetadata {
    pub model_type: ModelTypeName,
    /// Last successful hydration completion time, epoch milliseconds
    pub last_sync_time: i64,
    /// Continuation token of an interrupted page sequence, if any
    pub page_token: Option<PageToken>,
}

impl LastSyncMetadata {
    /// Creates a bookmark for a completed hydration pass
    pub fn completed(model_type: ModelTypeName, last_sync_time: i64) -> Self {
        Self {
            model_type,
            last_sync_time,
            page_token: None,
        }
    }
}

/// Hydration mode for one model type, derived from its bookmark
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMode {
    /// No usable bookmark: page through the entire remote result set
    Full,
    /// Bookmark within the base-sync window: request records changed since
    /// the contained epoch-millisecond timestamp
    Delta(i64),
}

impl SyncMode {
    /// Decides the hydration mode for a model type
    ///
    /// A bookmark older than `base_sync_interval_ms` is treated as if the
    /// type had never been synced, because the remote's delta window for it
    /// has expired.
    #[must_use]
    pub fn for_bookmark(
        bookmark: Option<&LastSyncMetadata>,
        base_sync_interval_ms: i64,
        now_ms: i64,
    ) -> SyncMode {
        match bookmark {
            Some(meta) if now_ms - meta.last_sync_time <= base_sync_interval_ms => {
                SyncMode::Delta(meta.last_sync_time)
            }
            _ => SyncMode::Full,
        }
    }
}
