//! In-process key-value store

use super::{BlobUpdate, KeyValueStore};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tripai_common::Result;

/// HashMap-backed store; contents vanish with the process
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn update_all(&self, keys: &[&str], f: BlobUpdate<'_>) -> Result<()> {
        let mut map = self.entries.write().await;
        let current = keys.iter().map(|key| map.get(*key).cloned()).collect();
        let values = f(current)?;
        for (key, value) in keys.iter().zip(values) {
            map.insert((*key).to_string(), value);
        }
        Ok(())
    }
}
