//! SQLite implementation of IModelStore
//!
//! This module provides the concrete SQLite-based implementation of the
//! model store port defined in replicore-core. It handles all domain type
//! serialization/deserialization and SQL query construction.
//!
//! ## Type Mapping
//!
//! | Domain Type     | SQL Type | Strategy                                  |
//! |-----------------|----------|-------------------------------------------|
//! | ModelTypeName   | TEXT     | String via `.as_str()` / `::new()`        |
//! | ModelId         | TEXT     | String via `.as_str()` / `::new()`        |
//! | MutationId      | TEXT     | UUID string via `.to_string()` / `FromStr`|
//! | field map       | TEXT     | serde_json serialization                  |
//! | WriteCondition  | TEXT     | serde_json serialization                  |
//! | ModelInstance   | TEXT     | serde_json serialization (base snapshots) |
//! | DateTime<Utc>   | TEXT     | ISO 8601 via `to_rfc3339()` / parse       |
//! | version         | INTEGER  | `Option<i64>`                             |
//! | deleted         | INTEGER  | 0/1                                       |
//!
//! ## Transactional Writes
//!
//! `save_model` and `delete_model` write the model row and its metadata row
//! in a single transaction. The merger's version gate reads metadata and
//! then applies the model, so a torn write between the two tables would let
//! a stale page overwrite a newer row.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tokio::sync::broadcast;

use replicore_core::domain::{
    LastSyncMetadata, ModelId, ModelInstance, ModelMetadata, ModelRef, ModelTypeName, MutationId,
    MutationKind, PageToken, PendingMutation, WriteCondition,
};
use replicore_core::ports::{IModelStore, StoreChange, StoreChangeKind, StoreError};

/// SQLite-based implementation of the model store port
///
/// Provides persistent storage for model rows, their sync metadata, the
/// hydration bookmarks and the mutation outbox backing rows. All operations
/// go through a connection pool; row-level changes are fanned out over a
/// broadcast channel so observers never block a writer.
pub struct SqliteModelStore {
    pool: SqlitePool,
    changes: broadcast::Sender<StoreChange>,
}

impl SqliteModelStore {
    /// Creates a new store instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        let (changes, _) = broadcast::channel(256);
        Self { pool, changes }
    }

    fn notify(&self, model_type: &ModelTypeName, id: &ModelId, kind: StoreChangeKind) {
        // No receivers is fine; drop the notification.
        let _ = self.changes.send(StoreChange {
            model_type: model_type.clone(),
            model_id: id.clone(),
            kind,
        });
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

/// Classifies an sqlx error, surfacing foreign-key failures as their own
/// variant so the merger can treat a child-before-parent write as a soft
/// failure rather than a storage fault.
fn map_sqlx_error(e: sqlx::Error) -> StoreError {
    if let Some(db_err) = e.as_database_error() {
        if db_err.message().contains("FOREIGN KEY constraint failed") {
            return StoreError::ForeignKeyViolation(db_err.message().to_string());
        }
    }
    StoreError::QueryFailed(e.to_string())
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            StoreError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

fn parse_model_type(s: &str) -> Result<ModelTypeName, StoreError> {
    ModelTypeName::new(s)
        .map_err(|e| StoreError::SerializationError(format!("Invalid model type '{}': {}", s, e)))
}

fn parse_model_id(s: &str) -> Result<ModelId, StoreError> {
    ModelId::new(s)
        .map_err(|e| StoreError::SerializationError(format!("Invalid model id '{}': {}", s, e)))
}

/// Splits a stored `"<type>|<id>"` row key back into a [`ModelRef`]
fn parse_parent_key(key: &str) -> Result<ModelRef, StoreError> {
    let (type_part, id_part) = key.split_once('|').ok_or_else(|| {
        StoreError::SerializationError(format!("Invalid parent key '{}'", key))
    })?;
    Ok(ModelRef {
        model_type: parse_model_type(type_part)?,
        id: parse_model_id(id_part)?,
    })
}

/// Converts a database row into a ModelInstance
fn row_to_model(row: &SqliteRow) -> Result<ModelInstance, StoreError> {
    let model_type_str: String = row.get("model_type");
    let model_id_str: String = row.get("model_id");
    let fields_str: String = row.get("fields");
    let parent_key: Option<String> = row.get("parent_key");

    let fields = serde_json::from_str(&fields_str)
        .map_err(|e| StoreError::SerializationError(format!("Invalid field JSON: {}", e)))?;

    let mut model =
        ModelInstance::new(parse_model_type(&model_type_str)?, parse_model_id(&model_id_str)?, fields);
    if let Some(key) = parent_key {
        model = model.with_parent(parse_parent_key(&key)?);
    }
    Ok(model)
}

/// Converts a database row into ModelMetadata
fn row_to_metadata(row: &SqliteRow) -> Result<ModelMetadata, StoreError> {
    let model_type_str: String = row.get("model_type");
    let model_id_str: String = row.get("model_id");
    let version: Option<i64> = row.get("version");
    let deleted: i64 = row.get("deleted");
    let last_changed_str: String = row.get("last_changed_at");

    Ok(ModelMetadata {
        model_type: parse_model_type(&model_type_str)?,
        model_id: parse_model_id(&model_id_str)?,
        version,
        deleted: deleted != 0,
        last_changed_at: parse_datetime(&last_changed_str)?,
    })
}

/// Converts a database row into a PendingMutation
fn row_to_pending(row: &SqliteRow) -> Result<PendingMutation, StoreError> {
    let mutation_id_str: String = row.get("mutation_id");
    let kind_str: String = row.get("kind");
    let snapshot_str: String = row.get("snapshot");
    let base_str: Option<String> = row.get("base");
    let predicate_str: Option<String> = row.get("predicate");
    let created_at_str: String = row.get("created_at");

    let id = MutationId::from_str(&mutation_id_str).map_err(|e| {
        StoreError::SerializationError(format!("Invalid mutation id '{}': {}", mutation_id_str, e))
    })?;
    let kind = MutationKind::parse(&kind_str).ok_or_else(|| {
        StoreError::SerializationError(format!("Unknown mutation kind '{}'", kind_str))
    })?;
    let snapshot: ModelInstance = serde_json::from_str(&snapshot_str)
        .map_err(|e| StoreError::SerializationError(format!("Invalid snapshot JSON: {}", e)))?;
    let base: Option<ModelInstance> = base_str
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| StoreError::SerializationError(format!("Invalid base JSON: {}", e)))?;
    let condition: Option<WriteCondition> = predicate_str
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| StoreError::SerializationError(format!("Invalid predicate JSON: {}", e)))?;

    Ok(PendingMutation::from_parts(
        id,
        kind,
        snapshot,
        base,
        condition,
        parse_datetime(&created_at_str)?,
    ))
}

fn fields_to_json(model: &ModelInstance) -> Result<String, StoreError> {
    serde_json::to_string(model.fields())
        .map_err(|e| StoreError::SerializationError(format!("Failed to serialize fields: {}", e)))
}

// ============================================================================
// IModelStore implementation
// ============================================================================

#[async_trait::async_trait]
impl IModelStore for SqliteModelStore {
    async fn save_model(
        &self,
        model: &ModelInstance,
        metadata: &ModelMetadata,
    ) -> Result<(), StoreError> {
        let fields_json = fields_to_json(model)?;
        let parent_key = model.parent().map(ModelRef::key);
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            INSERT INTO models (row_key, model_type, model_id, fields, parent_key, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(row_key) DO UPDATE SET
                fields = excluded.fields,
                parent_key = excluded.parent_key,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(model.key())
        .bind(model.model_type().as_str())
        .bind(model.id().as_str())
        .bind(&fields_json)
        .bind(&parent_key)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            INSERT INTO model_metadata (row_key, model_type, model_id, version, deleted, last_changed_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(row_key) DO UPDATE SET
                version = excluded.version,
                deleted = excluded.deleted,
                last_changed_at = excluded.last_changed_at
            "#,
        )
        .bind(metadata.key())
        .bind(metadata.model_type.as_str())
        .bind(metadata.model_id.as_str())
        .bind(metadata.version)
        .bind(metadata.deleted as i64)
        .bind(metadata.last_changed_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        self.notify(model.model_type(), model.id(), StoreChangeKind::Saved);
        Ok(())
    }

    async fn upsert_model(&self, model: &ModelInstance) -> Result<(), StoreError> {
        let fields_json = fields_to_json(model)?;
        let parent_key = model.parent().map(ModelRef::key);

        sqlx::query(
            r#"
            INSERT INTO models (row_key, model_type, model_id, fields, parent_key, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(row_key) DO UPDATE SET
                fields = excluded.fields,
                parent_key = excluded.parent_key,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(model.key())
        .bind(model.model_type().as_str())
        .bind(model.id().as_str())
        .bind(&fields_json)
        .bind(&parent_key)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        self.notify(model.model_type(), model.id(), StoreChangeKind::Saved);
        Ok(())
    }

    async fn get_model(
        &self,
        model_type: &ModelTypeName,
        id: &ModelId,
    ) -> Result<Option<ModelInstance>, StoreError> {
        let row = sqlx::query("SELECT * FROM models WHERE model_type = ? AND model_id = ?")
            .bind(model_type.as_str())
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.as_ref().map(row_to_model).transpose()
    }

    async fn query_models(
        &self,
        model_type: &ModelTypeName,
    ) -> Result<Vec<ModelInstance>, StoreError> {
        let rows = sqlx::query("SELECT * FROM models WHERE model_type = ? ORDER BY model_id")
            .bind(model_type.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        rows.iter().map(row_to_model).collect()
    }

    async fn delete_model(
        &self,
        model_type: &ModelTypeName,
        id: &ModelId,
        tombstone: &ModelMetadata,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        sqlx::query("DELETE FROM models WHERE model_type = ? AND model_id = ?")
            .bind(model_type.as_str())
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            INSERT INTO model_metadata (row_key, model_type, model_id, version, deleted, last_changed_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(row_key) DO UPDATE SET
                version = excluded.version,
                deleted = excluded.deleted,
                last_changed_at = excluded.last_changed_at
            "#,
        )
        .bind(tombstone.key())
        .bind(tombstone.model_type.as_str())
        .bind(tombstone.model_id.as_str())
        .bind(tombstone.version)
        .bind(tombstone.deleted as i64)
        .bind(tombstone.last_changed_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        self.notify(model_type, id, StoreChangeKind::Deleted);
        Ok(())
    }

    async fn remove_model(
        &self,
        model_type: &ModelTypeName,
        id: &ModelId,
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM models WHERE model_type = ? AND model_id = ?")
            .bind(model_type.as_str())
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        self.notify(model_type, id, StoreChangeKind::Deleted);
        Ok(())
    }

    async fn get_metadata(
        &self,
        model_type: &ModelTypeName,
        id: &ModelId,
    ) -> Result<Option<ModelMetadata>, StoreError> {
        let row = sqlx::query("SELECT * FROM model_metadata WHERE model_type = ? AND model_id = ?")
            .bind(model_type.as_str())
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.as_ref().map(row_to_metadata).transpose()
    }

    async fn save_metadata(&self, metadata: &ModelMetadata) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO model_metadata (row_key, model_type, model_id, version, deleted, last_changed_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(row_key) DO UPDATE SET
                version = excluded.version,
                deleted = excluded.deleted,
                last_changed_at = excluded.last_changed_at
            "#,
        )
        .bind(metadata.key())
        .bind(metadata.model_type.as_str())
        .bind(metadata.model_id.as_str())
        .bind(metadata.version)
        .bind(metadata.deleted as i64)
        .bind(metadata.last_changed_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn get_last_sync(
        &self,
        model_type: &ModelTypeName,
    ) -> Result<Option<LastSyncMetadata>, StoreError> {
        let row = sqlx::query("SELECT * FROM last_sync WHERE model_type = ?")
            .bind(model_type.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let last_sync_time: i64 = row.get("last_sync_time");
        let token_str: Option<String> = row.get("page_token");
        let page_token = token_str
            .map(PageToken::new)
            .transpose()
            .map_err(|e| StoreError::SerializationError(format!("Invalid page token: {}", e)))?;

        Ok(Some(LastSyncMetadata {
            model_type: model_type.clone(),
            last_sync_time,
            page_token,
        }))
    }

    async fn save_last_sync(&self, bookmark: &LastSyncMetadata) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO last_sync (model_type, last_sync_time, page_token)
            VALUES (?, ?, ?)
            ON CONFLICT(model_type) DO UPDATE SET
                last_sync_time = excluded.last_sync_time,
                page_token = excluded.page_token
            "#,
        )
        .bind(bookmark.model_type.as_str())
        .bind(bookmark.last_sync_time)
        .bind(bookmark.page_token.as_ref().map(PageToken::as_str))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn save_pending(&self, mutation: &PendingMutation) -> Result<(), StoreError> {
        let snapshot_json = serde_json::to_string(mutation.snapshot()).map_err(|e| {
            StoreError::SerializationError(format!("Failed to serialize snapshot: {}", e))
        })?;
        let base_json = mutation
            .base()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| {
                StoreError::SerializationError(format!("Failed to serialize base: {}", e))
            })?;
        let predicate_json = mutation
            .condition()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| {
                StoreError::SerializationError(format!("Failed to serialize predicate: {}", e))
            })?;

        // The upsert leaves seq untouched, so a collapsed mutation keeps the
        // queue position of the entry it replaced.
        sqlx::query(
            r#"
            INSERT INTO pending_mutations
                (mutation_id, model_type, model_id, kind, snapshot, base, predicate, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(mutation_id) DO UPDATE SET
                kind = excluded.kind,
                snapshot = excluded.snapshot,
                base = excluded.base,
                predicate = excluded.predicate
            "#,
        )
        .bind(mutation.id().to_string())
        .bind(mutation.model_type().as_str())
        .bind(mutation.model_id().as_str())
        .bind(mutation.kind().as_str())
        .bind(&snapshot_json)
        .bind(&base_json)
        .bind(&predicate_json)
        .bind(mutation.created_at().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn get_pending(&self, id: &MutationId) -> Result<Option<PendingMutation>, StoreError> {
        let row = sqlx::query("SELECT * FROM pending_mutations WHERE mutation_id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.as_ref().map(row_to_pending).transpose()
    }

    async fn get_pending_for_model(
        &self,
        model_type: &ModelTypeName,
        id: &ModelId,
        skip: &[MutationId],
    ) -> Result<Option<PendingMutation>, StoreError> {
        let row = if skip.is_empty() {
            sqlx::query(
                r#"
                SELECT * FROM pending_mutations
                WHERE model_type = ? AND model_id = ?
                ORDER BY seq DESC
                LIMIT 1
                "#,
            )
            .bind(model_type.as_str())
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
        } else {
            let placeholders = vec!["?"; skip.len()].join(", ");
            let sql = format!(
                "SELECT * FROM pending_mutations \
                 WHERE model_type = ? AND model_id = ? AND mutation_id NOT IN ({}) \
                 ORDER BY seq DESC LIMIT 1",
                placeholders
            );
            let mut query = sqlx::query(&sql).bind(model_type.as_str()).bind(id.as_str());
            for mutation_id in skip {
                query = query.bind(mutation_id.to_string());
            }
            query
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?
        };

        row.as_ref().map(row_to_pending).transpose()
    }

    async fn next_pending(
        &self,
        skip: &[MutationId],
    ) -> Result<Option<PendingMutation>, StoreError> {
        let row = if skip.is_empty() {
            sqlx::query("SELECT * FROM pending_mutations ORDER BY seq ASC LIMIT 1")
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?
        } else {
            let placeholders = vec!["?"; skip.len()].join(", ");
            let sql = format!(
                "SELECT * FROM pending_mutations WHERE mutation_id NOT IN ({}) \
                 ORDER BY seq ASC LIMIT 1",
                placeholders
            );
            let mut query = sqlx::query(&sql);
            for id in skip {
                query = query.bind(id.to_string());
            }
            query
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?
        };

        row.as_ref().map(row_to_pending).transpose()
    }

    async fn delete_pending(&self, id: &MutationId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM pending_mutations WHERE mutation_id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_pending(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM pending_mutations")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let n: i64 = row.get("n");
        Ok(n as u64)
    }

    fn observe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}
