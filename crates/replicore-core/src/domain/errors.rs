//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including validation failures and identifier parsing errors.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid model type name (empty or containing the key separator)
    #[error("Invalid model type name: {0}")]
    InvalidModelType(String),

    /// Invalid model identifier
    #[error("Invalid model id: {0}")]
    InvalidModelId(String),

    /// Invalid mutation identifier format
    #[error("Invalid mutation id: {0}")]
    InvalidMutationId(String),

    /// Invalid page continuation token
    #[error("Invalid page token: {0}")]
    InvalidPageToken(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
