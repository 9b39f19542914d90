use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::storage::{now_millis, ObjectMeta, Storage};

pub struct InMemoryStorage {
    data: Arc<RwLock<HashMap<String, (Bytes, ObjectMeta)>>>,
    /// Keys starting with any of these prefixes are rejected on `put`
    failing_prefixes: Arc<RwLock<Vec<String>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            failing_prefixes: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Make every subsequent `put` under `prefix` fail with `WriteFailed`.
    pub async fn fail_writes_under(&self, prefix: impl Into<String>) {
        self.failing_prefixes.write().await.push(prefix.into());
    }

    /// Number of stored objects
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }

    /// All stored keys, sorted
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.data.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn put(&self, key: &str, data: Bytes) -> Result<ObjectMeta, StorageError> {
        if self.failing_prefixes.read().await.iter().any(|p| key.starts_with(p.as_str())) {
            return Err(StorageError::WriteFailed(format!("rejected: {}", key)));
        }
        let meta = ObjectMeta {
            key: key.to_string(),
            size: data.len() as u64,
            last_modified: now_millis(),
        };
        let mut store = self.data.write().await;
        store.insert(key.to_string(), (data, meta.clone()));
        Ok(meta)
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        let store = self.data.read().await;
        store.get(key).map(|(data, _)| data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let store = self.data.read().await;
        Ok(store.contains_key(key))
    }
}
