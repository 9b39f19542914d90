use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageError;

/// Object metadata
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    /// Milliseconds since the Unix epoch
    pub last_modified: u64,
}

/// Storage abstraction for addressable objects (local filesystem, in-memory, etc.)
///
/// `put` replaces any existing object at `key` in full.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Create or overwrite an object
    async fn put(&self, key: &str, data: Bytes) -> Result<ObjectMeta, StorageError>;

    /// Get an object
    async fn get(&self, key: &str) -> Result<Bytes, StorageError>;

    /// Check if object exists
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;
}

pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_meta_creation() {
        let meta = ObjectMeta {
            key: "a.com/x/1570788418".to_string(),
            size: 1024,
            last_modified: 1570788418000,
        };

        assert_eq!(meta.key, "a.com/x/1570788418");
        assert_eq!(meta.size, 1024);
    }
}
