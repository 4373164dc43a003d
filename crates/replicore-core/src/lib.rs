//! Replicore Core - Domain logic and port definitions
//!
//! This crate contains the hexagonal architecture core of the offline-first
//! sync engine:
//! - **Domain entities** - `ModelInstance`, `ModelMetadata`, `PendingMutation`,
//!   `LastSyncMetadata`, and the pure outbox collapse rules
//! - **Port definitions** - Traits for adapters: `IModelStore`, `IRemoteSync`,
//!   `IConflictHandler`
//! - **Event hub** - Bounded broadcast channel of typed status events
//! - **Configuration** - YAML-loadable engine settings
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure business logic with no storage or network
//! dependencies. Ports define trait interfaces that adapter crates implement;
//! the engine crate (`replicore-sync`) orchestrates domain entities through
//! those ports.

pub mod config;
pub mod domain;
pub mod ports;
