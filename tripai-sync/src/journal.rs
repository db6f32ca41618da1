//! Landmark journal operations
//!
//! User-driven edits (rating, save, delete) and capture-time results. The sync
//! engine owns analysis fields; this module only touches `rating` and
//! `is_saved` on existing records.

use crate::client::AnalysisResponse;
use crate::store::LocalStore;
use chrono::{DateTime, Utc};
use std::fmt;
use tracing::{debug, info};
use tripai_common::{Error, LandmarkRecord, Result};

/// Highest star rating
pub const MAX_RATING: u8 = 5;

/// How the UI refers to a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKey {
    /// Matches only ids assigned by the server (> 0)
    ServerId(i64),
    /// Matches only non-empty references
    PhotoRef(String),
}

impl RecordKey {
    /// Numeric input is a server id, anything else a photo reference
    pub fn parse(input: &str) -> Self {
        match input.parse::<i64>() {
            Ok(id) => RecordKey::ServerId(id),
            Err(_) => RecordKey::PhotoRef(input.to_string()),
        }
    }

    pub fn matches(&self, record: &LandmarkRecord) -> bool {
        match self {
            RecordKey::ServerId(id) => *id > 0 && record.server_id == *id,
            RecordKey::PhotoRef(photo_ref) => {
                !photo_ref.is_empty() && record.photo_ref == *photo_ref
            }
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::ServerId(id) => write!(f, "server id {}", id),
            RecordKey::PhotoRef(photo_ref) => write!(f, "photo {}", photo_ref),
        }
    }
}

#[derive(Clone)]
pub struct LandmarkJournal {
    store: LocalStore,
}

impl LandmarkJournal {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    pub async fn all(&self) -> Vec<LandmarkRecord> {
        self.store.landmarks().await
    }

    /// Records the user kept, in stored order
    pub async fn saved(&self) -> Vec<LandmarkRecord> {
        self.store
            .landmarks()
            .await
            .into_iter()
            .filter(|r| r.is_saved)
            .collect()
    }

    /// Placeholders still waiting for analysis
    pub async fn pending(&self) -> Vec<LandmarkRecord> {
        self.store
            .landmarks()
            .await
            .into_iter()
            .filter(|r| r.is_pending())
            .collect()
    }

    /// Append the result of an immediate analysis (not yet saved)
    pub async fn record_analyzed(
        &self,
        photo_ref: &str,
        response: AnalysisResponse,
        latitude: Option<f64>,
        longitude: Option<f64>,
        language: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Result<LandmarkRecord> {
        let mut record = LandmarkRecord::analyzed(
            photo_ref,
            response.id,
            response.details,
            latitude,
            longitude,
            created_at,
        );
        record.language = language;

        let stored = record.clone();
        let total = self
            .store
            .update(move |c| {
                c.landmarks.push(stored);
                c.landmarks.len()
            })
            .await?;

        info!(server_id = record.server_id, name = %record.details.name, total, "Stored analyzed landmark");
        Ok(record)
    }

    /// Set the star rating (0 clears it) on the first matching record
    pub async fn set_rating(&self, key: &RecordKey, rating: u8) -> Result<bool> {
        if rating > MAX_RATING {
            return Err(Error::InvalidInput(format!(
                "rating must be 0-{}, got {}",
                MAX_RATING, rating
            )));
        }

        let found = self
            .update_first(key, move |record| record.rating = rating)
            .await?;
        debug!(%key, rating, found, "Rating updated");
        Ok(found)
    }

    /// Keep the first matching record in the journal
    pub async fn mark_saved(&self, key: &RecordKey) -> Result<bool> {
        let found = self
            .update_first(key, |record| record.is_saved = true)
            .await?;
        debug!(%key, found, "Marked saved");
        Ok(found)
    }

    /// Remove every matching record
    ///
    /// Removing a placeholder also drops its queued item, so no queued photo is
    /// left without a journal entry. Returns the number of records removed.
    pub async fn delete(&self, key: &RecordKey) -> Result<usize> {
        let key_owned = key.clone();
        let removed = self
            .store
            .update(move |c| {
                let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut c.landmarks)
                    .into_iter()
                    .partition(|r| key_owned.matches(r));
                c.landmarks = kept;

                let orphaned: Vec<_> = removed.iter().filter_map(|r| r.pending_id).collect();
                c.pending.retain(|item| !orphaned.contains(&item.id));

                removed.len()
            })
            .await?;

        info!(%key, removed, "Deleted journal records");
        Ok(removed)
    }

    async fn update_first<F>(&self, key: &RecordKey, mutate: F) -> Result<bool>
    where
        F: FnOnce(&mut LandmarkRecord) + Send,
    {
        let key = key.clone();
        self.store
            .update(move |c| match c.landmarks.iter_mut().find(|r| key.matches(r)) {
                Some(record) => {
                    mutate(record);
                    true
                }
                None => false,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::PendingQueue;
    use tripai_common::LandmarkDetails;

    fn response(id: i64, name: &str) -> AnalysisResponse {
        AnalysisResponse {
            id,
            details: LandmarkDetails {
                name: name.to_string(),
                ..LandmarkDetails::default()
            },
        }
    }

    async fn journal_with(names: &[(i64, &str, &str)]) -> LandmarkJournal {
        let journal = LandmarkJournal::new(LocalStore::in_memory());
        for (id, name, photo) in names {
            journal
                .record_analyzed(photo, response(*id, name), None, None, None, Utc::now())
                .await
                .unwrap();
        }
        journal
    }

    #[test]
    fn test_record_key_parse() {
        assert_eq!(RecordKey::parse("42"), RecordKey::ServerId(42));
        assert_eq!(
            RecordKey::parse("content://media/1"),
            RecordKey::PhotoRef("content://media/1".to_string())
        );
    }

    #[tokio::test]
    async fn test_new_entry_is_not_saved() {
        let journal = journal_with(&[(42, "Eiffel Tower", "p/1.jpg")]).await;
        assert_eq!(journal.all().await.len(), 1);
        assert!(journal.saved().await.is_empty());
    }

    #[tokio::test]
    async fn test_mark_saved_by_server_id() {
        let journal = journal_with(&[(42, "Eiffel Tower", "p/1.jpg")]).await;
        assert!(journal.mark_saved(&RecordKey::ServerId(42)).await.unwrap());

        let saved = journal.saved().await;
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].details.name, "Eiffel Tower");
    }

    #[tokio::test]
    async fn test_guest_entry_matches_by_photo_ref() {
        let journal = journal_with(&[(-1, "Statue of Liberty", "p/guest.jpg")]).await;
        let key = RecordKey::PhotoRef("p/guest.jpg".to_string());

        // Unassigned server ids never match
        assert!(!journal.mark_saved(&RecordKey::ServerId(-1)).await.unwrap());

        assert!(journal.mark_saved(&key).await.unwrap());
        assert!(journal.set_rating(&key, 3).await.unwrap());

        let saved = journal.saved().await;
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].rating, 3);
    }

    #[tokio::test]
    async fn test_rating_and_save_persist_together() {
        let journal = journal_with(&[(7, "Big Ben", "p/ben.jpg")]).await;
        let key = RecordKey::ServerId(7);
        journal.set_rating(&key, 5).await.unwrap();
        journal.mark_saved(&key).await.unwrap();

        let saved = journal.saved().await;
        assert_eq!(saved[0].rating, 5);
        assert!(saved[0].is_saved);
    }

    #[tokio::test]
    async fn test_rating_can_be_cleared() {
        let journal = journal_with(&[(7, "Big Ben", "p/ben.jpg")]).await;
        let key = RecordKey::ServerId(7);
        journal.set_rating(&key, 4).await.unwrap();
        journal.set_rating(&key, 0).await.unwrap();
        assert_eq!(journal.all().await[0].rating, 0);
    }

    #[tokio::test]
    async fn test_rating_out_of_range_rejected() {
        let journal = journal_with(&[(7, "Big Ben", "p/ben.jpg")]).await;
        let result = journal.set_rating(&RecordKey::ServerId(7), 6).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(journal.all().await[0].rating, 0);
    }

    #[tokio::test]
    async fn test_only_saved_entries_listed() {
        let journal = journal_with(&[
            (1, "Eiffel Tower", "p/1.jpg"),
            (2, "Big Ben", "p/2.jpg"),
            (3, "Colosseum", "p/3.jpg"),
        ])
        .await;
        journal.mark_saved(&RecordKey::ServerId(1)).await.unwrap();
        journal.mark_saved(&RecordKey::ServerId(2)).await.unwrap();

        let names: Vec<_> = journal
            .saved()
            .await
            .into_iter()
            .map(|r| r.details.name)
            .collect();
        assert_eq!(names, vec!["Eiffel Tower", "Big Ben"]);
    }

    #[tokio::test]
    async fn test_delete_placeholder_drops_queued_item() {
        let store = LocalStore::in_memory();
        let queue = PendingQueue::new(store.clone());
        let journal = LandmarkJournal::new(store);

        queue.enqueue("p/a.jpg", None, None, Utc::now()).await.unwrap();
        queue.enqueue("p/b.jpg", None, None, Utc::now()).await.unwrap();

        let removed = journal
            .delete(&RecordKey::PhotoRef("p/a.jpg".to_string()))
            .await
            .unwrap();

        assert_eq!(removed, 1);
        let items = queue.items().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].photo_ref, "p/b.jpg");
        assert_eq!(journal.pending().await.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_unknown_key_removes_nothing() {
        let journal = journal_with(&[(1, "Eiffel Tower", "p/1.jpg")]).await;
        let removed = journal.delete(&RecordKey::ServerId(99)).await.unwrap();
        assert_eq!(removed, 0);
        assert_eq!(journal.all().await.len(), 1);
    }
}
