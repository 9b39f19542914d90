//! Local filesystem storage
//!
//! Objects are plain files addressed by a `/`-separated key relative to a
//! root directory. Intermediate directories are never created: a key whose
//! parent does not exist fails with `StorageError::WriteFailed`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tracing::trace;

use crate::error::StorageError;
use crate::storage::{now_millis, ObjectMeta, Storage};

/// Permission bits for newly created objects (owner rw, group/other r)
pub const FILE_MODE: u32 = 0o644;

pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key onto a path under the root.
    ///
    /// Empty segments are dropped, so a leading `/` stays inside the root.
    /// `..` segments are rejected.
    pub fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let mut path = self.root.clone();
        let mut segments = 0usize;
        for segment in key.split('/').filter(|s| !s.is_empty()) {
            if segment == ".." {
                return Err(StorageError::WriteFailed(format!(
                    "key escapes storage root: {}",
                    key
                )));
            }
            path.push(segment);
            segments += 1;
        }
        if segments == 0 {
            return Err(StorageError::WriteFailed(format!("empty key: {:?}", key)));
        }
        Ok(path)
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn put(&self, key: &str, data: Bytes) -> Result<ObjectMeta, StorageError> {
        let path = self.resolve(key)?;
        let write_failed =
            |e: std::io::Error| StorageError::WriteFailed(format!("{}: {}", path.display(), e));

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(FILE_MODE);

        // Handle is dropped (and the descriptor closed) on every exit path.
        let mut file = options.open(&path).await.map_err(write_failed)?;
        file.write_all(&data).await.map_err(write_failed)?;
        file.flush().await.map_err(write_failed)?;

        trace!(path = %path.display(), bytes = data.len(), "Object written");

        Ok(ObjectMeta {
            key: key.to_string(),
            size: data.len() as u64,
            last_modified: now_millis(),
        })
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound(key.to_string())),
            Err(e) => Err(StorageError::ReadFailed(format!("{}: {}", path.display(), e))),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.resolve(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }
}
