//! Pending mutations and the outbox collapse rules
//!
//! A [`PendingMutation`] is one locally-originated write that has not yet
//! been acknowledged by the remote store. When a newer local write targets
//! an identity that already has a queued mutation, the two are collapsed
//! according to [`collapse`], a pure function over the `(existing, incoming)`
//! kind pair. Keeping the decision table pure makes the trickiest part of
//! the outbox unit-testable without any storage behind it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::model::ModelInstance;
use super::newtypes::{ModelId, ModelTypeName, MutationId};

// ============================================================================
// MutationKind
// ============================================================================

/// The kind of write a pending mutation represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

impl MutationKind {
    /// Stable lowercase name, used for storage and log fields
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Create => "create",
            MutationKind::Update => "update",
            MutationKind::Delete => "delete",
        }
    }

    /// Parses the stable lowercase name
    pub fn parse(s: &str) -> Option<MutationKind> {
        match s {
            "create" => Some(MutationKind::Create),
            "update" => Some(MutationKind::Update),
            "delete" => Some(MutationKind::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// WriteCondition
// ============================================================================

/// An "only apply if the server still matches these fields" predicate
///
/// Carried on UPDATE and DELETE mutations. A conditioned UPDATE is never
/// collapsed into an earlier queued UPDATE, because the condition must be
/// evaluated server-side against the state the earlier write produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WriteCondition(Map<String, Value>);

impl WriteCondition {
    /// Wraps a field/expected-value map
    #[must_use]
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// The expected field values
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

// ============================================================================
// PendingMutation
// ============================================================================

/// One not-yet-acknowledged local write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingMutation {
    id: MutationId,
    kind: MutationKind,
    /// Field snapshot: the full model for CREATE/DELETE, a sparse diff for
    /// UPDATE (against `base` when the caller supplied a prior model).
    snapshot: ModelInstance,
    /// Fully-specified model the UPDATE diff was taken against, if known
    base: Option<ModelInstance>,
    condition: Option<WriteCondition>,
    created_at: DateTime<Utc>,
}

impl PendingMutation {
    /// A CREATE mutation carrying the full new model
    pub fn creation(model: ModelInstance) -> Self {
        Self {
            id: MutationId::new(),
            kind: MutationKind::Create,
            snapshot: model,
            base: None,
            condition: None,
            created_at: Utc::now(),
        }
    }

    /// An UPDATE mutation carrying a (possibly sparse) diff
    pub fn update(
        diff: ModelInstance,
        base: Option<ModelInstance>,
        condition: Option<WriteCondition>,
    ) -> Self {
        Self {
            id: MutationId::new(),
            kind: MutationKind::Update,
            snapshot: diff,
            base,
            condition,
            created_at: Utc::now(),
        }
    }

    /// A DELETE mutation carrying the model as last known locally
    pub fn deletion(model: ModelInstance, condition: Option<WriteCondition>) -> Self {
        Self {
            id: MutationId::new(),
            kind: MutationKind::Delete,
            snapshot: model,
            base: None,
            condition,
            created_at: Utc::now(),
        }
    }

    /// Rebuilds a mutation from its stored parts (storage adapter use)
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: MutationId,
        kind: MutationKind,
        snapshot: ModelInstance,
        base: Option<ModelInstance>,
        condition: Option<WriteCondition>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            kind,
            snapshot,
            base,
            condition,
            created_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> MutationId {
        self.id
    }

    #[must_use]
    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    #[must_use]
    pub fn snapshot(&self) -> &ModelInstance {
        &self.snapshot
    }

    #[must_use]
    pub fn base(&self) -> Option<&ModelInstance> {
        self.base.as_ref()
    }

    #[must_use]
    pub fn condition(&self) -> Option<&WriteCondition> {
        self.condition.as_ref()
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The targeted model type
    #[must_use]
    pub fn model_type(&self) -> &ModelTypeName {
        self.snapshot.model_type()
    }

    /// The targeted model id
    #[must_use]
    pub fn model_id(&self) -> &ModelId {
        self.snapshot.id()
    }

    /// The full model to publish to the remote: for a sparse UPDATE this is
    /// the base with the diff layered on top, otherwise the snapshot itself.
    #[must_use]
    pub fn outbound_model(&self) -> ModelInstance {
        match &self.base {
            Some(base) => base.merged_with(&self.snapshot),
            None => self.snapshot.clone(),
        }
    }

    /// Returns a copy with the existing id and queue position but the given
    /// kind and snapshot; used by the outbox when collapsing.
    #[must_use]
    pub fn rewritten(
        &self,
        kind: MutationKind,
        snapshot: ModelInstance,
        condition: Option<WriteCondition>,
    ) -> Self {
        Self {
            id: self.id,
            kind,
            snapshot,
            base: None,
            condition,
            created_at: self.created_at,
        }
    }
}

// ============================================================================
// Collapse rules
// ============================================================================

/// Outcome of collapsing an incoming mutation against an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collapse {
    /// Append the incoming mutation as a new queue tail entry
    Append,
    /// Keep the existing entry's id and queue position; its snapshot becomes
    /// the field-wise union with the incoming snapshot winning, and its kind
    /// becomes the given kind
    MergeIntoExisting { kind: MutationKind },
    /// Keep the existing entry's id and queue position; its kind, snapshot
    /// and condition are replaced wholesale by the incoming mutation's, with
    /// the kind forced to the given value
    OverwriteExisting { kind: MutationKind },
    /// Remove the existing entry and discard the incoming one
    CancelBoth,
}

/// Illegal `(existing, incoming)` sequences; caller-logic errors, never retried
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CollapseConflict {
    #[error("a creation is already pending for this model")]
    ConflictingCreate,

    #[error("this model is already scheduled for deletion")]
    PendingDeletion,

    #[error("cannot enqueue {incoming} after pending {existing}")]
    UnexpectedSequence {
        existing: MutationKind,
        incoming: MutationKind,
    },
}

/// Decides how an incoming mutation combines with an existing queued one
///
/// `existing` is `None` when no actionable mutation is queued for the
/// identity (including when the only queued one is already in flight).
/// `incoming_has_condition` matters only for UPDATE-on-UPDATE: a
/// conditioned update must stay a separate queue entry.
pub fn collapse(
    existing: Option<MutationKind>,
    incoming: MutationKind,
    incoming_has_condition: bool,
) -> Result<Collapse, CollapseConflict> {
    use MutationKind::{Create, Delete, Update};

    let Some(existing) = existing else {
        return Ok(Collapse::Append);
    };

    match (existing, incoming) {
        (Create, Create) => Err(CollapseConflict::ConflictingCreate),
        (Create, Update) => Ok(Collapse::MergeIntoExisting { kind: Create }),
        (Create, Delete) => Ok(Collapse::CancelBoth),

        (Update, Create) => Err(CollapseConflict::UnexpectedSequence { existing, incoming }),
        (Update, Update) if incoming_has_condition => Ok(Collapse::Append),
        (Update, Update) => Ok(Collapse::MergeIntoExisting { kind: Update }),
        (Update, Delete) => Ok(Collapse::OverwriteExisting { kind: Delete }),

        (Delete, Create) | (Delete, Update) => Err(CollapseConflict::PendingDeletion),
        (Delete, Delete) => Ok(Collapse::OverwriteExisting { kind: Delete }),
    }
}
