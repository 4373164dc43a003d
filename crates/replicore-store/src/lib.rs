//! Replicore Store - Local model persistence
//!
//! SQLite-based storage for:
//! - Model rows and their JSON field maps
//! - Per-instance sync metadata (version, deletion state)
//! - Per-model-type hydration bookmarks
//! - Pending mutations (the durable outbox backing rows)
//!
//! ## Architecture
//!
//! This crate implements the `IModelStore` port from `replicore-core`
//! using SQLite as the storage backend. It is a driven (secondary) adapter
//! in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteModelStore`] - Full `IModelStore` implementation
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use replicore_store::{DatabasePool, SqliteModelStore};
//!
//! # async fn example() -> Result<(), replicore_core::ports::StoreError> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/replicore/models.db")).await?;
//! let store = SqliteModelStore::new(pool.pool().clone());
//! // Use store as IModelStore...
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod repository;

pub use pool::DatabasePool;
pub use repository::SqliteModelStore;
