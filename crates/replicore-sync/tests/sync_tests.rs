//! Integration tests for the sync engine
//!
//! These tests exercise the outbox, merger, processors and engine facade
//! end-to-end against an in-memory SQLite store and a scripted mock
//! remote transport.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use serde_json::{json, Map};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use replicore_core::config::{Config, HydrationConfig, RetryConfig};
use replicore_core::domain::{
    ChangeType, EventHub, LastSyncMetadata, ModelId, ModelInstance, ModelMetadata, ModelRef,
    ModelTypeName, ModelWithMetadata, MutationId, MutationKind, PageToken, PendingMutation,
    SyncEvent, WriteCondition,
};
use replicore_core::ports::{
    ApplyRemoteHandler, ConflictData, ConflictDecision, ErrorClass, IConflictHandler, IModelStore,
    IRemoteSync, RemoteError, RemotePage, StoreChange, StoreError,
};
use replicore_store::{DatabasePool, SqliteModelStore};
use replicore_sync::conflict::ConflictResolver;
use replicore_sync::engine::SyncEngine;
use replicore_sync::merger::{MergeOutcome, Merger};
use replicore_sync::mutation_processor::MutationProcessor;
use replicore_sync::outbox::{MutationOutbox, OutboxError};
use replicore_sync::retry::RetryPolicy;
use replicore_sync::sync_processor::SyncProcessor;

// ============================================================================
// Scripted mock remote
// ============================================================================

/// One scripted response for a mutation publication
enum Scripted {
    Ok { version: i64 },
    Conflict { server: ModelWithMetadata },
    Fail { class: ErrorClass },
}

/// Record of one mutation call the mock received
#[derive(Debug, Clone)]
struct MutationCall {
    op: &'static str,
    key: String,
    version: Option<i64>,
    fields: Map<String, serde_json::Value>,
}

/// Record of one list call the mock received
#[derive(Debug, Clone)]
struct ListCall {
    model_type: String,
    since: Option<i64>,
    token: Option<String>,
}

#[derive(Default)]
struct MockRemote {
    /// Responses popped front-first by create/update/delete; an empty
    /// script acknowledges at version 1 (create) or version + 1.
    script: Mutex<VecDeque<Scripted>>,
    /// Pages popped front-first by list, keyed by model type name
    pages: Mutex<HashMap<String, VecDeque<RemotePage>>>,
    /// Model types whose list calls fail with a service error
    fail_lists: Mutex<std::collections::HashSet<String>>,
    mutation_calls: Mutex<Vec<MutationCall>>,
    list_calls: Mutex<Vec<ListCall>>,
}

impl MockRemote {
    fn push(&self, scripted: Scripted) {
        self.script.lock().unwrap().push_back(scripted);
    }

    fn push_page(&self, model_type: &str, page: RemotePage) {
        self.pages
            .lock()
            .unwrap()
            .entry(model_type.to_string())
            .or_default()
            .push_back(page);
    }

    fn fail_list(&self, model_type: &str) {
        self.fail_lists
            .lock()
            .unwrap()
            .insert(model_type.to_string());
    }

    fn mutation_calls(&self) -> Vec<MutationCall> {
        self.mutation_calls.lock().unwrap().clone()
    }

    fn list_calls(&self) -> Vec<ListCall> {
        self.list_calls.lock().unwrap().clone()
    }

    fn respond(
        &self,
        model: &ModelInstance,
        default_version: i64,
        deleted: bool,
    ) -> Result<ModelWithMetadata, RemoteError> {
        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            None | Some(Scripted::Ok { .. }) => {
                let version = match scripted {
                    Some(Scripted::Ok { version }) => version,
                    _ => default_version,
                };
                let metadata = if deleted {
                    ModelMetadata::tombstone(
                        model.model_type().clone(),
                        model.id().clone(),
                        version,
                    )
                } else {
                    ModelMetadata::new(model.model_type().clone(), model.id().clone(), version)
                };
                Ok(ModelWithMetadata {
                    model: model.clone(),
                    metadata,
                })
            }
            Some(Scripted::Conflict { server }) => Err(RemoteError::Conflict {
                server: Box::new(server),
                message: "version mismatch".to_string(),
            }),
            Some(Scripted::Fail { class }) => Err(RemoteError::service(class, "scripted failure")),
        }
    }
}

#[async_trait::async_trait]
impl IRemoteSync for MockRemote {
    async fn create(&self, model: &ModelInstance) -> Result<ModelWithMetadata, RemoteError> {
        self.mutation_calls.lock().unwrap().push(MutationCall {
            op: "create",
            key: model.key(),
            version: None,
            fields: model.fields().clone(),
        });
        self.respond(model, 1, false)
    }

    async fn update(
        &self,
        model: &ModelInstance,
        version: i64,
        _condition: Option<&WriteCondition>,
    ) -> Result<ModelWithMetadata, RemoteError> {
        self.mutation_calls.lock().unwrap().push(MutationCall {
            op: "update",
            key: model.key(),
            version: Some(version),
            fields: model.fields().clone(),
        });
        self.respond(model, version + 1, false)
    }

    async fn delete(
        &self,
        model_type: &ModelTypeName,
        id: &ModelId,
        version: i64,
        _condition: Option<&WriteCondition>,
    ) -> Result<ModelWithMetadata, RemoteError> {
        let model = ModelInstance::new(model_type.clone(), id.clone(), Map::new());
        self.mutation_calls.lock().unwrap().push(MutationCall {
            op: "delete",
            key: model.key(),
            version: Some(version),
            fields: Map::new(),
        });
        self.respond(&model, version + 1, true)
    }

    async fn list(
        &self,
        model_type: &ModelTypeName,
        since: Option<i64>,
        page_token: Option<&PageToken>,
        _limit: u32,
    ) -> Result<RemotePage, RemoteError> {
        self.list_calls.lock().unwrap().push(ListCall {
            model_type: model_type.to_string(),
            since,
            token: page_token.map(|t| t.as_str().to_string()),
        });
        if self.fail_lists.lock().unwrap().contains(model_type.as_str()) {
            return Err(RemoteError::service(
                ErrorClass::ServiceUnavailable,
                "scripted list failure",
            ));
        }
        let page = self
            .pages
            .lock()
            .unwrap()
            .get_mut(model_type.as_str())
            .and_then(VecDeque::pop_front);
        Ok(page.unwrap_or(RemotePage {
            items: vec![],
            next_token: None,
        }))
    }
}

/// Handler that always returns one scripted decision
struct ScriptedHandler(ConflictDecision);

#[async_trait::async_trait]
impl IConflictHandler for ScriptedHandler {
    async fn on_conflict(&self, _data: ConflictData) -> ConflictDecision {
        self.0.clone()
    }
}

/// Store wrapper that fails a scripted number of metadata writes
struct FlakyStore {
    inner: Arc<dyn IModelStore>,
    metadata_failures: Mutex<u32>,
}

impl FlakyStore {
    fn new(inner: Arc<dyn IModelStore>) -> Self {
        Self {
            inner,
            metadata_failures: Mutex::new(0),
        }
    }

    fn fail_next_metadata_save(&self) {
        *self.metadata_failures.lock().unwrap() += 1;
    }
}

#[async_trait::async_trait]
impl IModelStore for FlakyStore {
    async fn save_model(
        &self,
        model: &ModelInstance,
        metadata: &ModelMetadata,
    ) -> Result<(), StoreError> {
        self.inner.save_model(model, metadata).await
    }

    async fn upsert_model(&self, model: &ModelInstance) -> Result<(), StoreError> {
        self.inner.upsert_model(model).await
    }

    async fn get_model(
        &self,
        model_type: &ModelTypeName,
        id: &ModelId,
    ) -> Result<Option<ModelInstance>, StoreError> {
        self.inner.get_model(model_type, id).await
    }

    async fn query_models(
        &self,
        model_type: &ModelTypeName,
    ) -> Result<Vec<ModelInstance>, StoreError> {
        self.inner.query_models(model_type).await
    }

    async fn delete_model(
        &self,
        model_type: &ModelTypeName,
        id: &ModelId,
        tombstone: &ModelMetadata,
    ) -> Result<(), StoreError> {
        self.inner.delete_model(model_type, id, tombstone).await
    }

    async fn remove_model(
        &self,
        model_type: &ModelTypeName,
        id: &ModelId,
    ) -> Result<(), StoreError> {
        self.inner.remove_model(model_type, id).await
    }

    async fn get_metadata(
        &self,
        model_type: &ModelTypeName,
        id: &ModelId,
    ) -> Result<Option<ModelMetadata>, StoreError> {
        self.inner.get_metadata(model_type, id).await
    }

    async fn save_metadata(&self, metadata: &ModelMetadata) -> Result<(), StoreError> {
        {
            let mut failures = self.metadata_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(StoreError::QueryFailed(
                    "scripted metadata failure".to_string(),
                ));
            }
        }
        self.inner.save_metadata(metadata).await
    }

    async fn get_last_sync(
        &self,
        model_type: &ModelTypeName,
    ) -> Result<Option<LastSyncMetadata>, StoreError> {
        self.inner.get_last_sync(model_type).await
    }

    async fn save_last_sync(&self, bookmark: &LastSyncMetadata) -> Result<(), StoreError> {
        self.inner.save_last_sync(bookmark).await
    }

    async fn save_pending(&self, mutation: &PendingMutation) -> Result<(), StoreError> {
        self.inner.save_pending(mutation).await
    }

    async fn get_pending(&self, id: &MutationId) -> Result<Option<PendingMutation>, StoreError> {
        self.inner.get_pending(id).await
    }

    async fn get_pending_for_model(
        &self,
        model_type: &ModelTypeName,
        id: &ModelId,
        skip: &[MutationId],
    ) -> Result<Option<PendingMutation>, StoreError> {
        self.inner.get_pending_for_model(model_type, id, skip).await
    }

    async fn next_pending(
        &self,
        skip: &[MutationId],
    ) -> Result<Option<PendingMutation>, StoreError> {
        self.inner.next_pending(skip).await
    }

    async fn delete_pending(&self, id: &MutationId) -> Result<bool, StoreError> {
        self.inner.delete_pending(id).await
    }

    async fn count_pending(&self) -> Result<u64, StoreError> {
        self.inner.count_pending().await
    }

    fn observe(&self) -> broadcast::Receiver<StoreChange> {
        self.inner.observe()
    }
}

// ============================================================================
// Test helpers
// ============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn type_name(s: &str) -> ModelTypeName {
    ModelTypeName::new(s).unwrap()
}

fn model_id(s: &str) -> ModelId {
    ModelId::new(s).unwrap()
}

fn owner(id: &str, name: &str) -> ModelInstance {
    let mut fields = Map::new();
    fields.insert("name".to_string(), json!(name));
    ModelInstance::new(type_name("BlogOwner"), model_id(id), fields)
}

fn with_meta(model: ModelInstance, version: i64) -> ModelWithMetadata {
    let metadata = ModelMetadata::new(model.model_type().clone(), model.id().clone(), version);
    ModelWithMetadata { model, metadata }
}

fn tombstone_of(model: ModelInstance, version: i64) -> ModelWithMetadata {
    let metadata =
        ModelMetadata::tombstone(model.model_type().clone(), model.id().clone(), version);
    ModelWithMetadata { model, metadata }
}

fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        base_delay_ms: 1,
        max_delay_ms: 5,
        jitter_factor: 0.0,
        retryable: vec![
            ErrorClass::Network,
            ErrorClass::Throttling,
            ErrorClass::ServiceUnavailable,
        ],
    }
}

async fn store() -> Arc<SqliteModelStore> {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    Arc::new(SqliteModelStore::new(pool.pool().clone()))
}

struct Harness {
    store: Arc<dyn IModelStore>,
    remote: Arc<MockRemote>,
    outbox: Arc<MutationOutbox>,
    merger: Arc<Merger>,
    processor: MutationProcessor,
    hub: EventHub,
}

async fn harness_with(handler: Arc<dyn IConflictHandler>, retry: RetryConfig) -> Harness {
    let store: Arc<dyn IModelStore> = store().await;
    harness_over(store, handler, retry)
}

fn harness_over(
    store: Arc<dyn IModelStore>,
    handler: Arc<dyn IConflictHandler>,
    retry: RetryConfig,
) -> Harness {
    init_tracing();
    let remote = Arc::new(MockRemote::default());
    let hub = EventHub::new(64);
    let outbox = Arc::new(MutationOutbox::new(Arc::clone(&store), hub.clone()));
    let merger = Arc::new(Merger::new(
        Arc::clone(&store),
        Arc::clone(&outbox),
        hub.clone(),
    ));
    let resolver = Arc::new(ConflictResolver::new(
        handler,
        Arc::clone(&store),
        Arc::clone(&outbox),
        Arc::clone(&merger),
    ));
    let processor = MutationProcessor::new(
        Arc::clone(&store),
        Arc::clone(&remote) as Arc<dyn IRemoteSync>,
        Arc::clone(&outbox),
        Arc::clone(&merger),
        resolver,
        RetryPolicy::new(retry),
        hub.clone(),
    );
    Harness {
        store,
        remote,
        outbox,
        merger,
        processor,
        hub,
    }
}

async fn harness() -> Harness {
    harness_with(Arc::new(ApplyRemoteHandler), fast_retry(3)).await
}

// ============================================================================
// Outbox collapse tests
// ============================================================================

#[tokio::test]
async fn test_update_collapses_into_pending_create() {
    let h = harness().await;
    let mut create_fields = Map::new();
    create_fields.insert("name".to_string(), json!("Tony"));
    create_fields.insert("age".to_string(), json!(41));
    let create = PendingMutation::creation(ModelInstance::new(
        type_name("BlogOwner"),
        model_id("o-1"),
        create_fields,
    ));
    let create_id = create.id();
    h.outbox.enqueue(create).await.unwrap();

    h.outbox
        .enqueue(PendingMutation::update(owner("o-1", "Tony Jr."), None, None))
        .await
        .unwrap();

    assert_eq!(h.outbox.count().await.unwrap(), 1);
    let head = h.outbox.peek_next().await.unwrap().unwrap();
    assert_eq!(head.id(), create_id);
    assert_eq!(head.kind(), MutationKind::Create);
    // Field union with incoming values winning; untouched fields survive.
    assert_eq!(head.snapshot().fields()["name"], json!("Tony Jr."));
    assert_eq!(head.snapshot().fields()["age"], json!(41));
}

#[tokio::test]
async fn test_delete_cancels_pending_create() {
    let h = harness().await;
    h.outbox
        .enqueue(PendingMutation::creation(owner("o-1", "Tony")))
        .await
        .unwrap();
    h.outbox
        .enqueue(PendingMutation::deletion(owner("o-1", "Tony"), None))
        .await
        .unwrap();

    // Never-seen-remotely model: both writes vanish.
    assert_eq!(h.outbox.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_writes_after_pending_delete_are_rejected() {
    let h = harness().await;
    h.outbox
        .enqueue(PendingMutation::deletion(owner("o-1", "Tony"), None))
        .await
        .unwrap();

    let result = h
        .outbox
        .enqueue(PendingMutation::update(owner("o-1", "Tony Jr."), None, None))
        .await;
    assert!(matches!(result, Err(OutboxError::Collapse(_))));
    assert_eq!(h.outbox.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_second_create_is_rejected() {
    let h = harness().await;
    h.outbox
        .enqueue(PendingMutation::creation(owner("o-1", "Tony")))
        .await
        .unwrap();
    let result = h
        .outbox
        .enqueue(PendingMutation::creation(owner("o-1", "Tony Jr.")))
        .await;
    assert!(matches!(result, Err(OutboxError::Collapse(_))));
}

#[tokio::test]
async fn test_delete_overwrites_pending_update_in_place() {
    let h = harness().await;
    let update = PendingMutation::update(owner("o-1", "Tony"), None, None);
    let update_id = update.id();
    h.outbox.enqueue(update).await.unwrap();
    h.outbox
        .enqueue(PendingMutation::deletion(owner("o-1", "Tony"), None))
        .await
        .unwrap();

    assert_eq!(h.outbox.count().await.unwrap(), 1);
    let head = h.outbox.peek_next().await.unwrap().unwrap();
    assert_eq!(head.id(), update_id);
    assert_eq!(head.kind(), MutationKind::Delete);
}

#[tokio::test]
async fn test_conditioned_update_stays_a_separate_entry() {
    let h = harness().await;
    h.outbox
        .enqueue(PendingMutation::update(owner("o-1", "Tony"), None, None))
        .await
        .unwrap();

    let mut cond_fields = Map::new();
    cond_fields.insert("name".to_string(), json!("Tony"));
    let condition = WriteCondition::new(cond_fields);
    h.outbox
        .enqueue(PendingMutation::update(
            owner("o-1", "Tony Jr."),
            None,
            Some(condition),
        ))
        .await
        .unwrap();

    assert_eq!(h.outbox.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_enqueue_against_in_flight_mutation_appends() {
    let h = harness().await;
    let create = PendingMutation::creation(owner("o-1", "Tony"));
    let create_id = create.id();
    h.outbox.enqueue(create).await.unwrap();
    h.outbox.mark_in_flight(create_id).await.unwrap();

    // The in-flight create is immutable; the update becomes a new entry
    // instead of collapsing into it.
    h.outbox
        .enqueue(PendingMutation::update(owner("o-1", "Tony Jr."), None, None))
        .await
        .unwrap();

    assert_eq!(h.outbox.count().await.unwrap(), 2);
    let next = h.outbox.peek_next().await.unwrap().unwrap();
    assert_ne!(next.id(), create_id);
    assert_eq!(next.kind(), MutationKind::Update);
}

#[tokio::test]
async fn test_collapse_targets_newest_entry_behind_in_flight() {
    let h = harness().await;
    let create = PendingMutation::creation(owner("o-1", "Tony"));
    let create_id = create.id();
    h.outbox.enqueue(create).await.unwrap();
    h.outbox.mark_in_flight(create_id).await.unwrap();

    h.outbox
        .enqueue(PendingMutation::update(owner("o-1", "A"), None, None))
        .await
        .unwrap();
    h.outbox
        .enqueue(PendingMutation::update(owner("o-1", "B"), None, None))
        .await
        .unwrap();

    // The second update collapses into the first, not past it; exactly one
    // actionable entry trails the in-flight create.
    assert_eq!(h.outbox.count().await.unwrap(), 2);
    let tail = h.outbox.peek_next().await.unwrap().unwrap();
    assert_ne!(tail.id(), create_id);
    assert_eq!(tail.kind(), MutationKind::Update);
    assert_eq!(tail.snapshot().fields()["name"], json!("B"));
}

#[tokio::test]
async fn test_remove_unknown_mutation_errors() {
    let h = harness().await;
    let phantom = PendingMutation::creation(owner("o-9", "Ghost"));
    let result = h.outbox.remove(phantom.id()).await;
    assert!(matches!(result, Err(OutboxError::NoSuchMutation(_))));
}

#[tokio::test]
async fn test_outbox_publishes_status_events() {
    let h = harness().await;
    let mut events = h.hub.subscribe();

    h.outbox
        .enqueue(PendingMutation::creation(owner("o-1", "Tony")))
        .await
        .unwrap();

    let enqueued = events.recv().await.unwrap();
    assert!(matches!(enqueued, SyncEvent::MutationEnqueued { .. }));
    let status = events.recv().await.unwrap();
    assert_eq!(status, SyncEvent::OutboxStatus { is_empty: false });
}

// ============================================================================
// Merger tests
// ============================================================================

#[tokio::test]
async fn test_merge_applies_new_record() {
    let h = harness().await;
    let outcome = h
        .merger
        .merge(&with_meta(owner("o-1", "Tony"), 1))
        .await
        .unwrap();
    assert_eq!(outcome, MergeOutcome::Applied(ChangeType::Created));

    let model = h
        .store
        .get_model(&type_name("BlogOwner"), &model_id("o-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(model.fields()["name"], json!("Tony"));
}

#[tokio::test]
async fn test_merge_rejects_equal_version() {
    let h = harness().await;
    h.merger
        .merge(&with_meta(owner("o-1", "Tony"), 3))
        .await
        .unwrap();

    // An echo at the same version must not clobber local state.
    let outcome = h
        .merger
        .merge(&with_meta(owner("o-1", "Stale"), 3))
        .await
        .unwrap();
    assert_eq!(outcome, MergeOutcome::SkippedVersion);

    let model = h
        .store
        .get_model(&type_name("BlogOwner"), &model_id("o-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(model.fields()["name"], json!("Tony"));
}

#[tokio::test]
async fn test_merge_newer_version_updates_row() {
    let h = harness().await;
    h.merger
        .merge(&with_meta(owner("o-1", "Tony"), 5))
        .await
        .unwrap();
    let outcome = h
        .merger
        .merge(&with_meta(owner("o-1", "Newer"), 6))
        .await
        .unwrap();
    assert_eq!(outcome, MergeOutcome::Applied(ChangeType::Updated));

    let model = h
        .store
        .get_model(&type_name("BlogOwner"), &model_id("o-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(model.fields()["name"], json!("Newer"));
    let meta = h
        .store
        .get_metadata(&type_name("BlogOwner"), &model_id("o-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(meta.version_or_default(), 6);
}

#[tokio::test]
async fn test_merge_rejects_older_version() {
    let h = harness().await;
    h.merger
        .merge(&with_meta(owner("o-1", "Tony"), 5))
        .await
        .unwrap();
    let outcome = h
        .merger
        .merge(&with_meta(owner("o-1", "Old"), 2))
        .await
        .unwrap();
    assert_eq!(outcome, MergeOutcome::SkippedVersion);
}

#[tokio::test]
async fn test_merge_with_pending_mutation_advances_metadata_only() {
    let h = harness().await;
    h.store.upsert_model(&owner("o-1", "Local")).await.unwrap();
    h.outbox
        .enqueue(PendingMutation::update(owner("o-1", "Local"), None, None))
        .await
        .unwrap();

    let outcome = h
        .merger
        .merge(&with_meta(owner("o-1", "Remote"), 7))
        .await
        .unwrap();
    assert_eq!(outcome, MergeOutcome::SkippedPendingMutation);

    // Local fields survive; the version bookkeeping catches up.
    let model = h
        .store
        .get_model(&type_name("BlogOwner"), &model_id("o-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(model.fields()["name"], json!("Local"));
    let meta = h
        .store
        .get_metadata(&type_name("BlogOwner"), &model_id("o-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(meta.version, Some(7));
}

#[tokio::test]
async fn test_merge_deletion_removes_row() {
    let h = harness().await;
    h.merger
        .merge(&with_meta(owner("o-1", "Tony"), 1))
        .await
        .unwrap();

    let outcome = h
        .merger
        .merge(&tombstone_of(owner("o-1", "Tony"), 2))
        .await
        .unwrap();
    assert_eq!(outcome, MergeOutcome::Applied(ChangeType::Deleted));

    let model = h
        .store
        .get_model(&type_name("BlogOwner"), &model_id("o-1"))
        .await
        .unwrap();
    assert!(model.is_none());
    let meta = h
        .store
        .get_metadata(&type_name("BlogOwner"), &model_id("o-1"))
        .await
        .unwrap()
        .unwrap();
    assert!(meta.deleted);
}

#[tokio::test]
async fn test_merge_orphan_child_is_soft_skip() {
    let h = harness().await;
    let blog = ModelInstance::new(type_name("Blog"), model_id("b-1"), Map::new()).with_parent(
        ModelRef {
            model_type: type_name("BlogOwner"),
            id: model_id("missing"),
        },
    );
    let outcome = h.merger.merge(&with_meta(blog, 1)).await.unwrap();
    assert_eq!(outcome, MergeOutcome::OrphanSkipped);
}

#[tokio::test]
async fn test_merge_is_idempotent() {
    let h = harness().await;
    let pair = with_meta(owner("o-1", "Tony"), 4);
    assert_eq!(
        h.merger.merge(&pair).await.unwrap(),
        MergeOutcome::Applied(ChangeType::Created)
    );
    assert_eq!(
        h.merger.merge(&pair).await.unwrap(),
        MergeOutcome::SkippedVersion
    );
}

#[tokio::test]
async fn test_stale_metadata_not_regressed_while_mutation_pending() {
    let h = harness().await;
    h.store.upsert_model(&owner("o-1", "Local")).await.unwrap();
    h.store
        .save_metadata(&ModelMetadata::new(
            type_name("BlogOwner"),
            model_id("o-1"),
            5,
        ))
        .await
        .unwrap();
    h.outbox
        .enqueue(PendingMutation::update(owner("o-1", "Local"), None, None))
        .await
        .unwrap();

    // A stale page must not touch even the metadata row.
    let outcome = h
        .merger
        .merge(&with_meta(owner("o-1", "Stale"), 3))
        .await
        .unwrap();
    assert_eq!(outcome, MergeOutcome::SkippedVersion);
    let meta = h
        .store
        .get_metadata(&type_name("BlogOwner"), &model_id("o-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(meta.version, Some(5));

    // A genuinely newer page still advances it.
    let outcome = h
        .merger
        .merge(&with_meta(owner("o-1", "Newer"), 8))
        .await
        .unwrap();
    assert_eq!(outcome, MergeOutcome::SkippedPendingMutation);
    let meta = h
        .store
        .get_metadata(&type_name("BlogOwner"), &model_id("o-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(meta.version, Some(8));
}

#[tokio::test]
async fn test_parent_tombstone_with_local_child_is_soft_skip() {
    let h = harness().await;
    h.merger
        .merge(&with_meta(owner("o-1", "Tony"), 1))
        .await
        .unwrap();
    let child = ModelInstance::new(type_name("Blog"), model_id("b-1"), Map::new()).with_parent(
        ModelRef {
            model_type: type_name("BlogOwner"),
            id: model_id("o-1"),
        },
    );
    h.merger.merge(&with_meta(child, 1)).await.unwrap();

    let outcome = h
        .merger
        .merge(&tombstone_of(owner("o-1", "Tony"), 2))
        .await
        .unwrap();
    assert_eq!(outcome, MergeOutcome::OrphanSkipped);

    // The parent row survives until the child goes first.
    assert!(h
        .store
        .get_model(&type_name("BlogOwner"), &model_id("o-1"))
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_concurrent_merges_for_one_identity_never_regress() {
    let h = harness().await;
    let mut tasks = tokio::task::JoinSet::new();
    for version in 1..=16i64 {
        let merger = Arc::clone(&h.merger);
        tasks.spawn(async move {
            merger
                .merge(&with_meta(owner("o-1", &format!("v{}", version)), version))
                .await
                .unwrap();
        });
    }
    while tasks.join_next().await.is_some() {}

    let meta = h
        .store
        .get_metadata(&type_name("BlogOwner"), &model_id("o-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(meta.version, Some(16));
    let model = h
        .store
        .get_model(&type_name("BlogOwner"), &model_id("o-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(model.fields()["name"], json!("v16"));
}

// ============================================================================
// Mutation processor tests
// ============================================================================

#[tokio::test]
async fn test_acknowledged_create_leaves_outbox_and_merges() {
    let h = harness().await;
    let mut events = h.hub.subscribe();
    h.outbox
        .enqueue(PendingMutation::creation(owner("o-1", "Tony")))
        .await
        .unwrap();

    h.processor.drain(&CancellationToken::new()).await.unwrap();

    assert_eq!(h.outbox.count().await.unwrap(), 0);
    let meta = h
        .store
        .get_metadata(&type_name("BlogOwner"), &model_id("o-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(meta.version, Some(1));

    // MutationEnqueued, OutboxStatus, then the acknowledgement events.
    let mut saw_processed = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SyncEvent::MutationProcessed { .. }) {
            saw_processed = true;
        }
    }
    assert!(saw_processed);
}

#[tokio::test]
async fn test_failed_acknowledgement_merge_replays_mutation() {
    let flaky = Arc::new(FlakyStore::new(store().await as Arc<dyn IModelStore>));
    let h = harness_over(
        Arc::clone(&flaky) as Arc<dyn IModelStore>,
        Arc::new(ApplyRemoteHandler),
        fast_retry(3),
    );
    h.outbox
        .enqueue(PendingMutation::creation(owner("o-1", "Tony")))
        .await
        .unwrap();

    // The acknowledgement fails to merge; the mutation must stay queued so
    // the confirmed version is not lost.
    flaky.fail_next_metadata_save();
    let result = h.processor.drain(&CancellationToken::new()).await;
    assert!(result.is_err());
    assert_eq!(h.outbox.count().await.unwrap(), 1);

    h.processor.drain(&CancellationToken::new()).await.unwrap();
    assert_eq!(h.outbox.count().await.unwrap(), 0);
    let meta = h
        .store
        .get_metadata(&type_name("BlogOwner"), &model_id("o-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(meta.version, Some(1));
}

#[tokio::test]
async fn test_update_publishes_at_known_version() {
    let h = harness().await;
    h.merger
        .merge(&with_meta(owner("o-1", "Tony"), 3))
        .await
        .unwrap();
    h.outbox
        .enqueue(PendingMutation::update(owner("o-1", "Tony Jr."), None, None))
        .await
        .unwrap();

    h.processor.drain(&CancellationToken::new()).await.unwrap();

    let calls = h.remote.mutation_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].op, "update");
    assert_eq!(calls[0].version, Some(3));
}

#[tokio::test]
async fn test_update_without_metadata_fails_terminally() {
    let h = harness().await;
    let mut events = h.hub.subscribe();
    h.outbox
        .enqueue(PendingMutation::update(owner("o-1", "Tony"), None, None))
        .await
        .unwrap();

    h.processor.drain(&CancellationToken::new()).await.unwrap();

    assert_eq!(h.outbox.count().await.unwrap(), 0);
    assert_eq!(h.remote.mutation_calls().len(), 0);

    let mut saw_failed = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SyncEvent::MutationFailed { .. }) {
            saw_failed = true;
        }
    }
    assert!(saw_failed);
}

#[tokio::test]
async fn test_retryable_failure_then_success() {
    let h = harness().await;
    h.remote.push(Scripted::Fail {
        class: ErrorClass::Network,
    });
    h.remote.push(Scripted::Ok { version: 1 });
    h.outbox
        .enqueue(PendingMutation::creation(owner("o-1", "Tony")))
        .await
        .unwrap();

    h.processor.drain(&CancellationToken::new()).await.unwrap();

    assert_eq!(h.remote.mutation_calls().len(), 2);
    assert_eq!(h.outbox.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_non_retryable_failure_is_terminal() {
    let h = harness().await;
    h.remote.push(Scripted::Fail {
        class: ErrorClass::BadRequest,
    });
    h.outbox
        .enqueue(PendingMutation::creation(owner("o-1", "Tony")))
        .await
        .unwrap();

    h.processor.drain(&CancellationToken::new()).await.unwrap();

    // No second attempt for a permanent rejection.
    assert_eq!(h.remote.mutation_calls().len(), 1);
    assert_eq!(h.outbox.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_retries_exhaust_at_max_attempts() {
    let h = harness_with(Arc::new(ApplyRemoteHandler), fast_retry(3)).await;
    for _ in 0..3 {
        h.remote.push(Scripted::Fail {
            class: ErrorClass::ServiceUnavailable,
        });
    }
    h.outbox
        .enqueue(PendingMutation::creation(owner("o-1", "Tony")))
        .await
        .unwrap();

    h.processor.drain(&CancellationToken::new()).await.unwrap();

    assert_eq!(h.remote.mutation_calls().len(), 3);
    assert_eq!(h.outbox.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_poisoned_mutation_does_not_wedge_the_queue() {
    let h = harness().await;
    h.remote.push(Scripted::Fail {
        class: ErrorClass::BadRequest,
    });
    h.outbox
        .enqueue(PendingMutation::creation(owner("o-1", "Tony")))
        .await
        .unwrap();
    h.outbox
        .enqueue(PendingMutation::creation(owner("o-2", "Maria")))
        .await
        .unwrap();

    h.processor.drain(&CancellationToken::new()).await.unwrap();

    // The second mutation still went through after the first failed.
    assert_eq!(h.outbox.count().await.unwrap(), 0);
    let meta = h
        .store
        .get_metadata(&type_name("BlogOwner"), &model_id("o-2"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(meta.version, Some(1));
}

#[tokio::test]
async fn test_cancelled_drain_leaves_queue_intact() {
    let h = harness().await;
    h.outbox
        .enqueue(PendingMutation::creation(owner("o-1", "Tony")))
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    h.processor.drain(&cancel).await.unwrap();

    assert_eq!(h.remote.mutation_calls().len(), 0);
    assert_eq!(h.outbox.count().await.unwrap(), 1);
}

// ============================================================================
// Conflict resolution tests
// ============================================================================

#[tokio::test]
async fn test_conflict_apply_remote_accepts_server_state() {
    let h = harness_with(Arc::new(ApplyRemoteHandler), fast_retry(3)).await;
    h.remote.push(Scripted::Conflict {
        server: with_meta(owner("o-1", "Server"), 5),
    });
    h.store.upsert_model(&owner("o-1", "Local")).await.unwrap();
    h.store
        .save_metadata(&ModelMetadata::new(
            type_name("BlogOwner"),
            model_id("o-1"),
            2,
        ))
        .await
        .unwrap();
    h.outbox
        .enqueue(PendingMutation::update(owner("o-1", "Local"), None, None))
        .await
        .unwrap();

    h.processor.drain(&CancellationToken::new()).await.unwrap();

    assert_eq!(h.outbox.count().await.unwrap(), 0);
    let model = h
        .store
        .get_model(&type_name("BlogOwner"), &model_id("o-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(model.fields()["name"], json!("Server"));
    let meta = h
        .store
        .get_metadata(&type_name("BlogOwner"), &model_id("o-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(meta.version, Some(5));
}

#[tokio::test]
async fn test_conflict_retry_local_republishes_at_server_version() {
    let handler = Arc::new(ScriptedHandler(ConflictDecision::RetryLocal));
    let h = harness_with(handler, fast_retry(3)).await;
    h.remote.push(Scripted::Conflict {
        server: with_meta(owner("o-1", "Server"), 5),
    });
    h.remote.push(Scripted::Ok { version: 6 });
    h.store.upsert_model(&owner("o-1", "Local")).await.unwrap();
    h.store
        .save_metadata(&ModelMetadata::new(
            type_name("BlogOwner"),
            model_id("o-1"),
            2,
        ))
        .await
        .unwrap();
    h.outbox
        .enqueue(PendingMutation::update(owner("o-1", "Local"), None, None))
        .await
        .unwrap();

    h.processor.drain(&CancellationToken::new()).await.unwrap();

    let calls = h.remote.mutation_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].version, Some(2));
    // Second attempt at the server's version, same local fields.
    assert_eq!(calls[1].version, Some(5));
    assert_eq!(calls[1].fields["name"], json!("Local"));

    assert_eq!(h.outbox.count().await.unwrap(), 0);
    let meta = h
        .store
        .get_metadata(&type_name("BlogOwner"), &model_id("o-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(meta.version, Some(6));
}

#[tokio::test]
async fn test_conflict_retry_with_publishes_merged_model() {
    let merged = owner("o-1", "Merged");
    let handler = Arc::new(ScriptedHandler(ConflictDecision::RetryWith(merged)));
    let h = harness_with(handler, fast_retry(3)).await;
    h.remote.push(Scripted::Conflict {
        server: with_meta(owner("o-1", "Server"), 5),
    });
    h.remote.push(Scripted::Ok { version: 6 });
    h.store.upsert_model(&owner("o-1", "Local")).await.unwrap();
    h.store
        .save_metadata(&ModelMetadata::new(
            type_name("BlogOwner"),
            model_id("o-1"),
            2,
        ))
        .await
        .unwrap();
    h.outbox
        .enqueue(PendingMutation::update(owner("o-1", "Local"), None, None))
        .await
        .unwrap();

    h.processor.drain(&CancellationToken::new()).await.unwrap();

    let calls = h.remote.mutation_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].fields["name"], json!("Merged"));
    assert_eq!(calls[1].version, Some(5));
    assert_eq!(h.outbox.count().await.unwrap(), 0);
}

// ============================================================================
// Hydration tests
// ============================================================================

fn hydration_config() -> HydrationConfig {
    HydrationConfig {
        page_size: 10,
        max_records: 100,
        concurrency: 2,
        sync_interval_secs: 300,
        base_sync_interval_secs: 86_400,
    }
}

fn sync_processor(h: &Harness, config: HydrationConfig) -> SyncProcessor {
    SyncProcessor::new(
        Arc::clone(&h.store),
        Arc::clone(&h.remote) as Arc<dyn IRemoteSync>,
        Arc::clone(&h.merger),
        config,
        h.hub.clone(),
    )
}

#[tokio::test]
async fn test_full_hydration_pages_until_exhausted() {
    let h = harness().await;
    h.remote.push_page(
        "BlogOwner",
        RemotePage {
            items: vec![with_meta(owner("o-1", "Tony"), 1)],
            next_token: Some(PageToken::new("page-2").unwrap()),
        },
    );
    h.remote.push_page(
        "BlogOwner",
        RemotePage {
            items: vec![with_meta(owner("o-2", "Maria"), 1)],
            next_token: None,
        },
    );

    let processor = sync_processor(&h, hydration_config());
    let report = processor
        .hydrate(&[type_name("BlogOwner")], &CancellationToken::new())
        .await;

    assert!(report.is_fully_successful());
    assert_eq!(report.total_applied(), 2);

    let calls = h.remote.list_calls();
    assert_eq!(calls.len(), 2);
    // No bookmark: full hydration, no since filter.
    assert_eq!(calls[0].since, None);
    assert_eq!(calls[0].token, None);
    assert_eq!(calls[1].token.as_deref(), Some("page-2"));

    // Completed bookmark with no continuation token.
    let bookmark = h
        .store
        .get_last_sync(&type_name("BlogOwner"))
        .await
        .unwrap()
        .unwrap();
    assert!(bookmark.page_token.is_none());
    assert!(bookmark.last_sync_time > 0);
}

#[tokio::test]
async fn test_recent_bookmark_requests_delta() {
    let h = harness().await;
    let now = chrono::Utc::now().timestamp_millis();
    h.store
        .save_last_sync(&LastSyncMetadata::completed(type_name("BlogOwner"), now - 1_000))
        .await
        .unwrap();

    let processor = sync_processor(&h, hydration_config());
    processor
        .hydrate(&[type_name("BlogOwner")], &CancellationToken::new())
        .await;

    let calls = h.remote.list_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].since, Some(now - 1_000));
}

#[tokio::test]
async fn test_expired_bookmark_forces_full_hydration() {
    let h = harness().await;
    let now = chrono::Utc::now().timestamp_millis();
    let mut config = hydration_config();
    config.base_sync_interval_secs = 60;
    // Bookmark well outside the 60-second window.
    h.store
        .save_last_sync(&LastSyncMetadata::completed(
            type_name("BlogOwner"),
            now - 3_600_000,
        ))
        .await
        .unwrap();

    let processor = sync_processor(&h, config);
    processor
        .hydrate(&[type_name("BlogOwner")], &CancellationToken::new())
        .await;

    let calls = h.remote.list_calls();
    assert_eq!(calls[0].since, None);
}

#[tokio::test]
async fn test_hydration_resumes_from_stored_page_token() {
    let h = harness().await;
    let now = chrono::Utc::now().timestamp_millis();
    h.store
        .save_last_sync(&LastSyncMetadata {
            model_type: type_name("BlogOwner"),
            last_sync_time: now - 1_000,
            page_token: Some(PageToken::new("page-3").unwrap()),
        })
        .await
        .unwrap();

    let processor = sync_processor(&h, hydration_config());
    processor
        .hydrate(&[type_name("BlogOwner")], &CancellationToken::new())
        .await;

    let calls = h.remote.list_calls();
    assert_eq!(calls[0].token.as_deref(), Some("page-3"));
}

#[tokio::test]
async fn test_max_records_caps_paging() {
    let h = harness().await;
    let mut config = hydration_config();
    config.max_records = 1;
    h.remote.push_page(
        "BlogOwner",
        RemotePage {
            items: vec![with_meta(owner("o-1", "Tony"), 1)],
            next_token: Some(PageToken::new("page-2").unwrap()),
        },
    );

    let processor = sync_processor(&h, config);
    let report = processor
        .hydrate(&[type_name("BlogOwner")], &CancellationToken::new())
        .await;

    // One page fetched, then the cap stops the sequence.
    assert_eq!(h.remote.list_calls().len(), 1);
    assert!(report.is_fully_successful());
}

#[tokio::test]
async fn test_hydration_counts_orphans_and_applies_rest() {
    let h = harness().await;
    let orphan = ModelInstance::new(type_name("BlogOwner"), model_id("b-1"), Map::new())
        .with_parent(ModelRef {
            model_type: type_name("BlogOwner"),
            id: model_id("missing"),
        });
    h.remote.push_page(
        "BlogOwner",
        RemotePage {
            items: vec![with_meta(owner("o-1", "Tony"), 1), with_meta(orphan, 1)],
            next_token: None,
        },
    );

    let processor = sync_processor(&h, hydration_config());
    let report = processor
        .hydrate(&[type_name("BlogOwner")], &CancellationToken::new())
        .await;

    let entry = &report.types[0];
    assert_eq!(entry.applied, 1);
    assert_eq!(entry.orphans_skipped, 1);
    assert!(entry.completed);
}

#[tokio::test]
async fn test_hydration_runs_types_concurrently_with_isolation() {
    let h = harness().await;
    // Only Blog has data; BlogOwner returns the empty default. Both types
    // must complete regardless of each other.
    h.remote.push_page(
        "Blog",
        RemotePage {
            items: vec![with_meta(
                ModelInstance::new(type_name("Blog"), model_id("b-1"), Map::new()),
                1,
            )],
            next_token: None,
        },
    );

    let processor = sync_processor(&h, hydration_config());
    let report = processor
        .hydrate(
            &[type_name("BlogOwner"), type_name("Blog")],
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(report.types.len(), 2);
    assert!(report.is_fully_successful());
    assert_eq!(report.total_applied(), 1);
}

#[tokio::test]
async fn test_hydration_failure_in_one_type_spares_the_rest() {
    let h = harness().await;
    h.remote.fail_list("Broken");
    h.remote.push_page(
        "BlogOwner",
        RemotePage {
            items: vec![with_meta(owner("o-1", "Tony"), 1)],
            next_token: None,
        },
    );

    let processor = sync_processor(&h, hydration_config());
    let report = processor
        .hydrate(
            &[type_name("Broken"), type_name("BlogOwner")],
            &CancellationToken::new(),
        )
        .await;

    assert!(!report.is_fully_successful());
    assert_eq!(report.total_applied(), 1);

    let broken = report
        .types
        .iter()
        .find(|t| t.model_type.as_str() == "Broken")
        .unwrap();
    assert!(!broken.completed);
    assert!(broken.error.is_some());
    // The failing type's bookmark must not advance.
    assert!(h
        .store
        .get_last_sync(&type_name("Broken"))
        .await
        .unwrap()
        .is_none());

    let healthy = report
        .types
        .iter()
        .find(|t| t.model_type.as_str() == "BlogOwner")
        .unwrap();
    assert!(healthy.completed);
    assert!(h
        .store
        .get_model(&type_name("BlogOwner"), &model_id("o-1"))
        .await
        .unwrap()
        .is_some());
    let bookmark = h
        .store
        .get_last_sync(&type_name("BlogOwner"))
        .await
        .unwrap()
        .unwrap();
    assert!(bookmark.last_sync_time > 0);
    assert!(bookmark.page_token.is_none());
}

#[tokio::test]
async fn test_hydration_stops_at_shutdown() {
    let h = harness().await;
    h.remote.push_page(
        "BlogOwner",
        RemotePage {
            items: vec![with_meta(owner("o-1", "Tony"), 1)],
            next_token: None,
        },
    );

    let cancel = CancellationToken::new();
    cancel.cancel();
    let processor = sync_processor(&h, hydration_config());
    let report = processor.hydrate(&[type_name("BlogOwner")], &cancel).await;

    // Shutdown lands before the first page request.
    assert!(h.remote.list_calls().is_empty());
    assert_eq!(report.types.len(), 1);
    assert!(!report.types[0].completed);
    assert_eq!(report.types[0].applied, 0);
}

// ============================================================================
// Engine facade tests
// ============================================================================

async fn engine() -> (SyncEngine, Arc<MockRemote>) {
    init_tracing();
    let store: Arc<dyn IModelStore> = store().await;
    let remote = Arc::new(MockRemote::default());
    let engine = SyncEngine::new(
        store,
        Arc::clone(&remote) as Arc<dyn IRemoteSync>,
        Arc::new(ApplyRemoteHandler),
        Config::default(),
        vec![type_name("BlogOwner")],
    )
    .unwrap();
    (engine, remote)
}

#[tokio::test]
async fn test_save_new_model_queues_create() {
    let (engine, remote) = engine().await;
    engine.save(owner("o-1", "Tony"), None).await.unwrap();

    assert_eq!(engine.pending_mutations().await.unwrap(), 1);
    engine.drain_outbox().await.unwrap();

    let calls = remote.mutation_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].op, "create");
    assert_eq!(engine.pending_mutations().await.unwrap(), 0);
}

#[tokio::test]
async fn test_save_existing_model_queues_update() {
    let (engine, remote) = engine().await;
    engine.save(owner("o-1", "Tony"), None).await.unwrap();
    engine.drain_outbox().await.unwrap();

    engine.save(owner("o-1", "Tony Jr."), None).await.unwrap();
    engine.drain_outbox().await.unwrap();

    let calls = remote.mutation_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].op, "update");
    // The create's acknowledgement set version 1.
    assert_eq!(calls[1].version, Some(1));
}

#[tokio::test]
async fn test_delete_queues_deletion_and_removes_locally() {
    let (engine, remote) = engine().await;
    engine.save(owner("o-1", "Tony"), None).await.unwrap();
    engine.drain_outbox().await.unwrap();

    engine
        .delete(&type_name("BlogOwner"), &model_id("o-1"), None)
        .await
        .unwrap();
    engine.drain_outbox().await.unwrap();

    let calls = remote.mutation_calls();
    assert_eq!(calls[1].op, "delete");
    assert_eq!(calls[1].version, Some(1));
    assert_eq!(engine.pending_mutations().await.unwrap(), 0);
}

#[tokio::test]
async fn test_save_then_delete_before_sync_cancels_out() {
    let (engine, remote) = engine().await;
    engine.save(owner("o-1", "Tony"), None).await.unwrap();
    engine
        .delete(&type_name("BlogOwner"), &model_id("o-1"), None)
        .await
        .unwrap();

    assert_eq!(engine.pending_mutations().await.unwrap(), 0);
    engine.drain_outbox().await.unwrap();
    assert_eq!(remote.mutation_calls().len(), 0);
}

#[tokio::test]
async fn test_engine_start_and_stop() {
    let (engine, _remote) = engine().await;
    engine.start();
    engine.save(owner("o-1", "Tony"), None).await.unwrap();
    engine.stop().await;
}

#[tokio::test]
async fn test_engine_events_surface_local_writes() {
    let (engine, _remote) = engine().await;
    let mut events = engine.events();
    engine.save(owner("o-1", "Tony"), None).await.unwrap();

    let event = events.recv().await.unwrap();
    assert!(matches!(
        event,
        SyncEvent::MutationEnqueued {
            kind: MutationKind::Create,
            ..
        }
    ));
}

#[tokio::test]
async fn test_engine_hydrate_now_reports() {
    let (engine, remote) = engine().await;
    remote.push_page(
        "BlogOwner",
        RemotePage {
            items: vec![with_meta(owner("o-1", "Tony"), 1)],
            next_token: None,
        },
    );

    let report = engine.hydrate_now().await;
    assert!(report.is_fully_successful());
    assert_eq!(report.total_applied(), 1);

    let mut observed = engine.observe();
    engine.save(owner("o-2", "Maria"), None).await.unwrap();
    let change = observed.recv().await.unwrap();
    assert_eq!(change.model_id, model_id("o-2"));
}
