//! Pending-queue sync engine
//!
//! One drain walks a snapshot of the queue in enqueue order, one item at a
//! time. Each item is prepared, sent to the analyzer and, on success, committed
//! in a single store update that rewrites its placeholder and removes it from
//! the queue. Failed items are left where they are for the next drain, so an
//! interrupted drain never loses an item.
//!
//! Drains are serialized: a second `sync_all` waits for the first and then
//! drains whatever is still queued.

use crate::client::{AnalysisService, AnalyzeError, AnalyzeRequest};
use crate::image_prep::ImagePreparer;
use crate::store::LocalStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};
use tripai_common::config::IdentityConfig;
use tripai_common::events::{EventBus, SyncEvent};
use tripai_common::PendingItem;

/// Default per-item bound for queued analyses
pub const DEFAULT_ITEM_TIMEOUT: Duration = Duration::from_secs(120);

const EVENT_CAPACITY: usize = 256;

/// Why a single item was left in the queue
#[derive(Debug, Error)]
pub enum ItemFailure {
    #[error("Unreadable image: {0}")]
    UnreadableImage(String),

    #[error(transparent)]
    Remote(#[from] AnalyzeError),

    #[error("Store error: {0}")]
    Store(String),
}

/// Outcome of one drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub success_count: usize,
    pub fail_count: usize,
}

impl SyncSummary {
    pub fn total(&self) -> usize {
        self.success_count + self.fail_count
    }

    /// Text shown to the user after a drain
    pub fn message(&self) -> String {
        if self.fail_count == 0 {
            format!("{} photo(s) analyzed successfully!", self.success_count)
        } else {
            format!(
                "{} analyzed, {} failed - will retry later",
                self.success_count, self.fail_count
            )
        }
    }
}

struct SyncedItem {
    server_id: i64,
    name: String,
    reconciled: bool,
}

pub struct SyncEngine {
    store: LocalStore,
    analyzer: Arc<dyn AnalysisService>,
    images: Arc<dyn ImagePreparer>,
    identity: IdentityConfig,
    item_timeout: Duration,
    event_bus: EventBus,
    drain_lock: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        store: LocalStore,
        analyzer: Arc<dyn AnalysisService>,
        images: Arc<dyn ImagePreparer>,
    ) -> Self {
        Self {
            store,
            analyzer,
            images,
            identity: IdentityConfig::default(),
            item_timeout: DEFAULT_ITEM_TIMEOUT,
            event_bus: EventBus::new(EVENT_CAPACITY),
            drain_lock: Mutex::new(()),
        }
    }

    /// Identity fields sent with every request (each only when set)
    pub fn with_identity(mut self, identity: IdentityConfig) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_item_timeout(mut self, timeout: Duration) -> Self {
        self.item_timeout = timeout;
        self
    }

    /// Publish progress on an existing bus instead of a private one
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = event_bus;
        self
    }

    /// Progress events for every future drain
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_bus.subscribe()
    }

    /// Drain the queue once
    ///
    /// Never fails: per-item errors are logged and counted.
    pub async fn sync_all(&self) -> SyncSummary {
        self.sync_all_with_progress(|_, _| {}).await
    }

    /// Drain the queue, calling `on_progress(current, total)` before each item
    pub async fn sync_all_with_progress<F>(&self, mut on_progress: F) -> SyncSummary
    where
        F: FnMut(usize, usize) + Send,
    {
        let _drain = self.drain_lock.lock().await;

        let snapshot = self.store.pending().await;
        let total = snapshot.len();
        let mut summary = SyncSummary::default();

        self.event_bus.emit_lossy(SyncEvent::DrainStarted {
            total,
            timestamp: chrono::Utc::now(),
        });

        if total > 0 {
            info!(total, "Draining pending analyses");
        }

        for (index, item) in snapshot.iter().enumerate() {
            let current = index + 1;
            on_progress(current, total);
            self.event_bus.emit_lossy(SyncEvent::ItemStarted {
                current,
                total,
                pending_id: item.id,
            });

            match self.sync_item(item).await {
                Ok(synced) => {
                    summary.success_count += 1;
                    debug!(pending_id = %item.id, server_id = synced.server_id, "Synced pending item");
                    self.event_bus.emit_lossy(SyncEvent::ItemSynced {
                        pending_id: item.id,
                        server_id: synced.server_id,
                        name: synced.name,
                    });
                }
                Err(failure) => {
                    summary.fail_count += 1;
                    warn!(pending_id = %item.id, error = %failure, "Pending item failed, will retry");
                    self.event_bus.emit_lossy(SyncEvent::ItemFailed {
                        pending_id: item.id,
                        reason: failure.to_string(),
                    });
                }
            }
        }

        if total > 0 {
            info!(
                success = summary.success_count,
                failed = summary.fail_count,
                "Drain complete"
            );
        }

        self.event_bus.emit_lossy(SyncEvent::DrainCompleted {
            success_count: summary.success_count,
            fail_count: summary.fail_count,
            timestamp: chrono::Utc::now(),
        });

        summary
    }

    async fn sync_item(&self, item: &PendingItem) -> Result<SyncedItem, ItemFailure> {
        let (image, prepared_ref) = match self.images.prepare(&item.photo_ref).await {
            Some(prepared) => (prepared.bytes, Some(prepared.prepared_ref)),
            None => match self.images.read_raw(&item.photo_ref).await {
                Some(raw) => (raw, None),
                None => return Err(ItemFailure::UnreadableImage(item.photo_ref.clone())),
            },
        };

        let outcome = self.analyze_and_commit(item, image, prepared_ref.clone()).await;

        // The prepared copy survives only as a reconciled record's photo
        if let Some(prepared_ref) = &prepared_ref {
            if !matches!(outcome, Ok(SyncedItem { reconciled: true, .. })) {
                self.images.discard(prepared_ref).await;
            }
        }

        outcome
    }

    async fn analyze_and_commit(
        &self,
        item: &PendingItem,
        image: Vec<u8>,
        prepared_ref: Option<String>,
    ) -> Result<SyncedItem, ItemFailure> {
        let request = AnalyzeRequest {
            image,
            user_id: self.identity.user_id,
            device_id: self.identity.device_id.clone(),
            language: self.identity.language.clone(),
            latitude: item.latitude,
            longitude: item.longitude,
        };

        let response = tokio::time::timeout(self.item_timeout, self.analyzer.analyze(request))
            .await
            .map_err(|_| AnalyzeError::Timeout)??;

        let server_id = response.id;
        let name = response.details.name.clone();

        let pending_id = item.id;
        let language = self.identity.language.clone();
        let reconciled = self
            .store
            .update(move |c| {
                c.pending.retain(|p| p.id != pending_id);
                match c
                    .landmarks
                    .iter_mut()
                    .find(|r| r.is_pending() && r.pending_id == Some(pending_id))
                {
                    Some(record) => {
                        record.reconcile(response.id, response.details, prepared_ref, language);
                        true
                    }
                    None => false,
                }
            })
            .await
            .map_err(|e| ItemFailure::Store(e.to_string()))?;

        if !reconciled {
            warn!(pending_id = %item.id, "Placeholder missing at reconcile, result dropped");
        }

        Ok(SyncedItem {
            server_id,
            name,
            reconciled,
        })
    }
}
