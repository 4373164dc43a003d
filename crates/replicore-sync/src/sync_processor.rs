//! Sync processor: paged hydration of local state from the remote store
//!
//! Hydration walks every registered model type, pages its records out of
//! the remote store and funnels each (model, metadata) pair through the
//! [`Merger`]. Types are processed concurrently up to a configured limit;
//! a failure in one type never aborts the others.
//!
//! ## Bookmarks and resumption
//!
//! Each type keeps a [`LastSyncMetadata`] bookmark. A missing or expired
//! bookmark (older than the base-sync window) forces a full hydration;
//! otherwise only records changed since the bookmark are requested. After
//! every merged page the bookmark is rewritten with the next page token,
//! so an interrupted pass resumes mid-sequence instead of starting over.
//! Only when the final page lands does the bookmark advance to the pass's
//! start time with its token cleared.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use replicore_core::config::HydrationConfig;
use replicore_core::domain::{
    EventHub, LastSyncMetadata, ModelTypeName, PageToken, SyncEvent, SyncMode,
};
use replicore_core::ports::{IModelStore, IRemoteSync};

use crate::merger::{MergeOutcome, Merger};

/// Per-model-type result of one hydration pass
#[derive(Debug, Clone)]
pub struct TypeReport {
    pub model_type: ModelTypeName,
    pub applied: u64,
    pub skipped: u64,
    pub orphans_skipped: u64,
    /// `false` when the pass was interrupted or failed before the last page
    pub completed: bool,
    pub error: Option<String>,
}

/// Result of one hydration pass across all model types
#[derive(Debug, Clone, Default)]
pub struct HydrationReport {
    pub types: Vec<TypeReport>,
}

impl HydrationReport {
    /// Whether every model type completed without error
    #[must_use]
    pub fn is_fully_successful(&self) -> bool {
        self.types.iter().all(|t| t.completed && t.error.is_none())
    }

    /// Total records applied across all types
    #[must_use]
    pub fn total_applied(&self) -> u64 {
        self.types.iter().map(|t| t.applied).sum()
    }
}

/// Hydrates local state from the remote store, bounded-concurrently
pub struct SyncProcessor {
    store: Arc<dyn IModelStore>,
    remote: Arc<dyn IRemoteSync>,
    merger: Arc<Merger>,
    config: HydrationConfig,
    hub: EventHub,
}

impl SyncProcessor {
    pub fn new(
        store: Arc<dyn IModelStore>,
        remote: Arc<dyn IRemoteSync>,
        merger: Arc<Merger>,
        config: HydrationConfig,
        hub: EventHub,
    ) -> Self {
        Self {
            store,
            remote,
            merger,
            config,
            hub,
        }
    }

    /// Runs until cancelled, hydrating on the configured interval
    pub async fn run(&self, model_types: Vec<ModelTypeName>, cancel: CancellationToken) {
        let interval = std::time::Duration::from_secs(self.config.sync_interval_secs);
        info!(interval_secs = self.config.sync_interval_secs, "Sync processor started");

        loop {
            let report = self.hydrate(&model_types, &cancel).await;
            if !report.is_fully_successful() {
                warn!(
                    applied = report.total_applied(),
                    "Hydration pass finished with failures"
                );
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }
        }

        info!("Sync processor stopped");
    }

    /// One hydration pass over the given model types
    ///
    /// Types run concurrently, capped by `hydration.concurrency`. Failures
    /// are isolated per type and reported, never propagated across types.
    pub async fn hydrate(
        &self,
        model_types: &[ModelTypeName],
        cancel: &CancellationToken,
    ) -> HydrationReport {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut tasks = JoinSet::new();

        for model_type in model_types {
            let model_type = model_type.clone();
            let semaphore = Arc::clone(&semaphore);
            let store = Arc::clone(&self.store);
            let remote = Arc::clone(&self.remote);
            let merger = Arc::clone(&self.merger);
            let config = self.config.clone();
            let hub = self.hub.clone();
            let cancel = cancel.clone();

            tasks.spawn(async move {
                // The semaphore closes only on drop; acquisition cannot fail
                // while the pass is running.
                let _permit = semaphore.acquire_owned().await;
                hydrate_type(model_type, store, remote, merger, config, hub, cancel).await
            });
        }

        let mut report = HydrationReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(type_report) => report.types.push(type_report),
                Err(e) => error!(error = %e, "Hydration task panicked"),
            }
        }
        report
    }
}

/// Hydrates one model type, page by page
#[tracing::instrument(skip_all, fields(model_type = %model_type))]
async fn hydrate_type(
    model_type: ModelTypeName,
    store: Arc<dyn IModelStore>,
    remote: Arc<dyn IRemoteSync>,
    merger: Arc<Merger>,
    config: HydrationConfig,
    hub: EventHub,
    cancel: CancellationToken,
) -> TypeReport {
    let mut report = TypeReport {
        model_type: model_type.clone(),
        applied: 0,
        skipped: 0,
        orphans_skipped: 0,
        completed: false,
        error: None,
    };

    let bookmark = match store.get_last_sync(&model_type).await {
        Ok(b) => b,
        Err(e) => {
            report.error = Some(e.to_string());
            publish_failure(&hub, &model_type, &e.to_string());
            return report;
        }
    };

    let start_ms = Utc::now().timestamp_millis();
    let base_window_ms = config.base_sync_interval_secs as i64 * 1_000;
    let mode = SyncMode::for_bookmark(bookmark.as_ref(), base_window_ms, start_ms);
    let since = match mode {
        SyncMode::Full => None,
        SyncMode::Delta(t) => Some(t),
    };
    let prior_time = bookmark.as_ref().map_or(0, |b| b.last_sync_time);
    let mut token: Option<PageToken> = bookmark.and_then(|b| b.page_token);
    let mut fetched: u64 = 0;

    hub.publish(SyncEvent::HydrationStarted {
        model_type: model_type.clone(),
        full: since.is_none(),
    });

    loop {
        if cancel.is_cancelled() {
            // The bookmark written after the last page already carries the
            // continuation token; the next pass resumes there.
            info!("Hydration interrupted by shutdown");
            return report;
        }

        let page = match remote
            .list(&model_type, since, token.as_ref(), config.page_size)
            .await
        {
            Ok(page) => page,
            Err(e) => {
                report.error = Some(e.to_string());
                publish_failure(&hub, &model_type, &e.to_string());
                return report;
            }
        };

        let mut page_applied = 0u64;
        let mut page_skipped = 0u64;
        let mut page_orphans = 0u64;

        fetched += page.items.len() as u64;
        for item in &page.items {
            match merger.merge(item).await {
                Ok(MergeOutcome::Applied(_)) => page_applied += 1,
                Ok(MergeOutcome::SkippedPendingMutation | MergeOutcome::SkippedVersion) => {
                    page_skipped += 1;
                }
                Ok(MergeOutcome::OrphanSkipped) => page_orphans += 1,
                Err(e) => {
                    report.error = Some(e.to_string());
                    publish_failure(&hub, &model_type, &e.to_string());
                    return report;
                }
            }
        }

        report.applied += page_applied;
        report.skipped += page_skipped;
        report.orphans_skipped += page_orphans;

        hub.publish(SyncEvent::HydrationPage {
            model_type: model_type.clone(),
            applied: page_applied,
            skipped: page_skipped,
            orphans_skipped: page_orphans,
        });

        token = page.next_token;
        let bookmark = match &token {
            Some(next) if fetched < config.max_records => LastSyncMetadata {
                model_type: model_type.clone(),
                last_sync_time: prior_time,
                page_token: Some(next.clone()),
            },
            _ => LastSyncMetadata::completed(model_type.clone(), start_ms),
        };
        let finished = bookmark.page_token.is_none();

        if let Err(e) = store.save_last_sync(&bookmark).await {
            report.error = Some(e.to_string());
            publish_failure(&hub, &model_type, &e.to_string());
            return report;
        }

        if finished {
            report.completed = true;
            info!(
                applied = report.applied,
                skipped = report.skipped,
                orphans_skipped = report.orphans_skipped,
                "Hydration completed"
            );
            hub.publish(SyncEvent::HydrationCompleted {
                model_type,
                applied: report.applied,
            });
            return report;
        }
    }
}

fn publish_failure(hub: &EventHub, model_type: &ModelTypeName, reason: &str) {
    error!(reason, "Hydration failed");
    hub.publish(SyncEvent::HydrationFailed {
        model_type: model_type.clone(),
        reason: reason.to_string(),
    });
}
