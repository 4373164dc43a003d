//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for the identifiers that flow through the sync
//! engine. Each newtype validates at construction time, so the rest of the
//! engine never has to re-check identifier shape.
//!
//! [`MutationId`] is the one identifier with ordering semantics: it wraps a
//! time-ordered (version 7) UUID so that lexicographic order of ids matches
//! enqueue order, which is what gives the mutation outbox its FIFO replay
//! guarantee across restarts.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

/// Separator used to build composite metadata keys (`"<type>|<id>"`).
///
/// Model type names must not contain this character.
pub const KEY_SEPARATOR: char = '|';

// ============================================================================
// ModelTypeName
// ============================================================================

/// The name of a model type known to the schema (e.g. `"BlogOwner"`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelTypeName(String);

impl ModelTypeName {
    /// Creates a validated model type name
    ///
    /// # Errors
    /// Fails if the name is empty or contains the metadata key separator.
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        if name.is_empty() || name.contains(KEY_SEPARATOR) {
            return Err(DomainError::InvalidModelType(name));
        }
        Ok(Self(name))
    }

    /// Returns the name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ModelTypeName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ModelTypeName {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// ============================================================================
// ModelId
// ============================================================================

/// The host-assigned primary key of a model instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    /// Creates a validated model id
    ///
    /// # Errors
    /// Fails if the id is empty.
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.is_empty() {
            return Err(DomainError::InvalidModelId(id));
        }
        Ok(Self(id))
    }

    /// Returns the id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ModelId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ModelId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// ============================================================================
// MutationId
// ============================================================================

/// Time-ordered identifier for a pending mutation
///
/// Wraps a UUIDv7 so that ids created later always sort after ids created
/// earlier, both in memory and in their canonical string form. The outbox
/// relies on this (plus the storage row sequence for same-millisecond ties)
/// to replay mutations strictly oldest-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationId(Uuid);

impl MutationId {
    /// Creates a new id stamped with the current time
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a MutationId from an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Gets the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MutationId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for MutationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MutationId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidMutationId(format!("{s}: {e}")))
    }
}

// ============================================================================
// PageToken
// ============================================================================

/// Opaque continuation token returned by the remote list operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageToken(String);

impl PageToken {
    /// Creates a validated page token
    ///
    /// # Errors
    /// Fails if the token is empty.
    pub fn new(token: impl Into<String>) -> Result<Self, DomainError> {
        let token = token.into();
        if token.is_empty() {
            return Err(DomainError::InvalidPageToken(token));
        }
        Ok(Self(token))
    }

    /// Returns the token as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PageToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
