//! On-device persisted store
//!
//! Both collections (`pending_analyses`, `landmarks`) live as JSON array blobs in
//! a [`KeyValueStore`]. [`LocalStore`] is the only way to mutate them: every
//! read-modify-write cycle is one [`KeyValueStore::update_all`], which reads and
//! rewrites both blobs under the backend's exclusive write lock. Capture-time
//! enqueues, drain reconciliation and journal edits never interleave, even when
//! they come from different processes sharing one database file.
//!
//! Plain reads fail open: a missing, corrupt or unreadable blob is an empty
//! collection. Inside an update only corrupt data is treated as empty; a failed
//! read aborts the update so nothing is written back.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryKvStore;
pub use sqlite::SqliteKvStore;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;
use tripai_common::{Error, LandmarkRecord, PendingItem, Result};

/// Key of the pending-analysis queue blob
pub const PENDING_KEY: &str = "pending_analyses";

/// Key of the landmark journal blob
pub const LANDMARKS_KEY: &str = "landmarks";

/// Rewrite step of [`KeyValueStore::update_all`]: current blobs in, one new value per key out
pub type BlobUpdate<'a> =
    Box<dyn FnOnce(Vec<Option<String>>) -> Result<Vec<String>> + Send + 'a>;

/// String blob per named key
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Read `keys` and replace them with what `f` returns, as one exclusive write
    ///
    /// Nothing is written when a read or `f` fails.
    async fn update_all(&self, keys: &[&str], f: BlobUpdate<'_>) -> Result<()>;
}

/// Both collections as read at the start of an update
#[derive(Debug, Clone, Default)]
pub struct Collections {
    pub pending: Vec<PendingItem>,
    pub landmarks: Vec<LandmarkRecord>,
}

/// Serialized access to the two persisted collections
#[derive(Clone)]
pub struct LocalStore {
    kv: Arc<dyn KeyValueStore>,
    write_lock: Arc<Mutex<()>>,
}

impl LocalStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Store backed by process memory only
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKvStore::new()))
    }

    /// Current queue, in enqueue order
    pub async fn pending(&self) -> Vec<PendingItem> {
        self.read_collection(PENDING_KEY).await
    }

    /// Current journal, in insertion order
    pub async fn landmarks(&self) -> Vec<LandmarkRecord> {
        self.read_collection(LANDMARKS_KEY).await
    }

    /// Run one atomic read-modify-write over both collections
    ///
    /// Nothing is persisted if reading or writing fails; the error is returned.
    pub async fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Collections) -> T + Send,
        T: Send,
    {
        let _guard = self.write_lock.lock().await;

        let mut result = None;
        let slot = &mut result;
        self.kv
            .update_all(
                &[PENDING_KEY, LANDMARKS_KEY],
                Box::new(move |blobs: Vec<Option<String>>| {
                    let mut blobs = blobs.into_iter();
                    let mut collections = Collections {
                        pending: decode_collection(PENDING_KEY, blobs.next().flatten()),
                        landmarks: decode_collection(LANDMARKS_KEY, blobs.next().flatten()),
                    };

                    *slot = Some(f(&mut collections));

                    Ok(vec![
                        serde_json::to_string(&collections.pending)?,
                        serde_json::to_string(&collections.landmarks)?,
                    ])
                }),
            )
            .await?;

        result.ok_or_else(|| Error::Internal("Store update did not run".to_string()))
    }

    async fn read_collection<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        match self.kv.get(key).await {
            Ok(blob) => decode_collection(key, blob),
            Err(e) => {
                warn!(key, error = %e, "Stored collection unreadable, treating as empty");
                Vec::new()
            }
        }
    }
}

/// Corrupt blobs read as empty
fn decode_collection<T: DeserializeOwned>(key: &str, blob: Option<String>) -> Vec<T> {
    let Some(blob) = blob else {
        return Vec::new();
    };
    match serde_json::from_str::<Vec<T>>(&blob) {
        Ok(items) => items,
        Err(e) => {
            warn!(key, error = %e, "Stored collection is corrupt, treating as empty");
            Vec::new()
        }
    }
}

/// Write one raw blob, bypassing the collection codec
#[cfg(test)]
pub(crate) async fn seed(kv: &dyn KeyValueStore, key: &str, value: &str) {
    let value = value.to_string();
    kv.update_all(&[key], Box::new(move |_| Ok(vec![value])))
        .await
        .unwrap();
}
