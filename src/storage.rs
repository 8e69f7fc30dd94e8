//! Storage collaborator boundary
//!
//! The pipeline only ever touches uploaded bytes and rendered artifacts through
//! this trait; the production implementation (object store, bucket, CDN) lives
//! with the caller. [`MemoryStorage`] is the in-process implementation used by
//! tests and examples.

use crate::error::StorageError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Byte-level storage contract required of the caller.
#[async_trait]
pub trait AudioStorage: Send + Sync {
    /// Fetch the bytes stored under `key`.
    async fn download(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Store `bytes` under `key`, replacing any existing value.
    async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError>;

    /// Whether `key` currently exists.
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;
}

/// In-memory storage backend.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a key with bytes, bypassing the async trait. Test convenience.
    pub async fn insert(&self, key: &str, bytes: Vec<u8>) {
        self.objects.write().await.insert(key.to_string(), bytes);
    }
}

#[async_trait]
impl AudioStorage for MemoryStorage {
    async fn download(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::KeyNotFound(key.to_string()))
    }

    async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        self.objects.write().await.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.objects.read().await.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip() {
        let storage = MemoryStorage::new();
        storage.upload("a/b.bin", vec![1, 2, 3]).await.unwrap();

        assert!(storage.exists("a/b.bin").await.unwrap());
        assert_eq!(storage.download("a/b.bin").await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_missing_key() {
        let storage = MemoryStorage::new();
        assert!(!storage.exists("nope").await.unwrap());
        assert!(matches!(
            storage.download("nope").await,
            Err(StorageError::KeyNotFound(_))
        ));
    }
}
