//! Model instances as synchronized by the engine
//!
//! The engine is schema-agnostic: a model instance is its type name, its
//! primary key, and a JSON field map. This is the shape the local store
//! persists and the remote transport ships over the wire.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::metadata::ModelMetadata;
use super::newtypes::{ModelId, ModelTypeName, KEY_SEPARATOR};

/// A reference to another model instance, by type and primary key
///
/// Used to express a belongs-to association; the local store enforces it
/// with a real foreign key, which is what makes child-before-parent
/// hydration observable as a referential-integrity violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRef {
    pub model_type: ModelTypeName,
    pub id: ModelId,
}

impl ModelRef {
    /// The composite storage key of the referenced row (`"<type>|<id>"`)
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}{}{}", self.model_type, KEY_SEPARATOR, self.id)
    }
}

/// A single instance of a model, with its field values as a JSON map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInstance {
    model_type: ModelTypeName,
    id: ModelId,
    fields: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent: Option<ModelRef>,
}

impl ModelInstance {
    /// Creates a model instance
    pub fn new(model_type: ModelTypeName, id: ModelId, fields: Map<String, Value>) -> Self {
        Self {
            model_type,
            id,
            fields,
            parent: None,
        }
    }

    /// Sets the parent association, consuming and returning self
    #[must_use]
    pub fn with_parent(mut self, parent: ModelRef) -> Self {
        self.parent = Some(parent);
        self
    }

    /// The model type name
    #[must_use]
    pub fn model_type(&self) -> &ModelTypeName {
        &self.model_type
    }

    /// The primary key
    #[must_use]
    pub fn id(&self) -> &ModelId {
        &self.id
    }

    /// The field values
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// The optional parent association
    #[must_use]
    pub fn parent(&self) -> Option<&ModelRef> {
        self.parent.as_ref()
    }

    /// The composite storage key (`"<type>|<id>"`)
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}{}{}", self.model_type, KEY_SEPARATOR, self.id)
    }

    /// Returns a copy of this instance with `other`'s fields layered on top
    ///
    /// Fields present in `other` win; fields only present in `self` are
    /// retained. The parent association of `other` wins when set. This is the
    /// field-wise union used when a sparse UPDATE collapses into an earlier
    /// queued mutation for the same identity.
    #[must_use]
    pub fn merged_with(&self, other: &ModelInstance) -> ModelInstance {
        let mut fields = self.fields.clone();
        for (k, v) in &other.fields {
            fields.insert(k.clone(), v.clone());
        }
        ModelInstance {
            model_type: self.model_type.clone(),
            id: self.id.clone(),
            fields,
            parent: other.parent.clone().or_else(|| self.parent.clone()),
        }
    }
}

/// A model instance paired with its authoritative sync metadata
///
/// This is the unit that flows through the merger, whether it came from a
/// hydration page, a mutation acknowledgement, or a conflict resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelWithMetadata {
    pub model: ModelInstance,
    pub metadata: ModelMetadata,
}
