//! Pending-analysis queue
//!
//! Photos whose capture-time analysis could not reach the server. Each queued
//! item gets a placeholder journal record in the same atomic write, so the
//! user sees it immediately.

use crate::store::LocalStore;
use chrono::{DateTime, Utc};
use tracing::info;
use tripai_common::{LandmarkRecord, PendingItem, Result};

#[derive(Clone)]
pub struct PendingQueue {
    store: LocalStore,
}

impl PendingQueue {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// Append one item and its placeholder record
    ///
    /// `photo_ref` is not validated; an unreadable photo fails at drain time
    /// and stays queued.
    pub async fn enqueue(
        &self,
        photo_ref: &str,
        latitude: Option<f64>,
        longitude: Option<f64>,
        created_at: DateTime<Utc>,
    ) -> Result<PendingItem> {
        let item = PendingItem::new(photo_ref, latitude, longitude, created_at);
        let placeholder = LandmarkRecord::placeholder(&item);

        let queued = item.clone();
        let total = self
            .store
            .update(move |c| {
                c.pending.push(queued);
                c.landmarks.push(placeholder);
                c.pending.len()
            })
            .await?;

        info!(pending_id = %item.id, pending = total, "Added to pending queue");
        Ok(item)
    }

    /// Queued items in enqueue order
    pub async fn items(&self) -> Vec<PendingItem> {
        self.store.pending().await
    }

    pub async fn count(&self) -> usize {
        self.store.pending().await.len()
    }

    pub async fn has_pending(&self) -> bool {
        self.count().await > 0
    }
}
