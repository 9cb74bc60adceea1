//! Key-value store for the last payload of every topic
//!
//! Entries are flat: one key maps to the raw bytes last seen, overwritten
//! unconditionally. The filesystem store keeps one file per key below its
//! root directory.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;

pub use crate::shelly::cache_key;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid store key {0:?}")]
    InvalidKey(String),

    #[error("store I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Persistence for cached payloads and bridge state
#[async_trait]
pub trait Store: Send + Sync {
    /// Value for `key`, or `None` if nothing was stored
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;
}

/// Store keeping one file per key in a directory
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Open the store, creating the directory if needed
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|source| StoreError::Io {
                path: root.clone(),
                source,
            })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key != "."
            && key != ".."
            && !key.contains(['/', '\\', '\0']);
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl Store for FsStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        tokio::fs::write(&path, value)
            .await
            .map_err(|source| StoreError::Io { path, source })
    }
}

/// In-memory store, used when nothing should survive a restart
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_fs_store_roundtrip_and_overwrite() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::open(dir.path().join("db")).await.unwrap();

        let key = cache_key("shellies/shellyflood-ABC/info");
        assert_eq!(store.get(&key).await.unwrap(), None);

        store.set(&key, br#"{"flood":false}"#).await.unwrap();
        store.set(&key, br#"{"flood":true}"#).await.unwrap();
        assert_eq!(
            store.get(&key).await.unwrap().as_deref(),
            Some(&br#"{"flood":true}"#[..])
        );
        assert!(dir.path().join("db").join(&key).exists());
    }

    #[tokio::test]
    async fn test_fs_store_rejects_path_keys() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::open(dir.path()).await.unwrap();

        for key in ["", "..", "a/b", "a\\b"] {
            assert!(matches!(
                store.set(key, b"x").await,
                Err(StoreError::InvalidKey(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_fs_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = FsStore::open(dir.path()).await.unwrap();
            store.set("device-id", b"AA:BB").await.unwrap();
        }
        let store = FsStore::open(dir.path()).await.unwrap();
        assert_eq!(
            store.get("device-id").await.unwrap(),
            Some(b"AA:BB".to_vec())
        );
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::new();
        assert!(store.is_empty().await);
        store.set("k", b"v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.len().await, 1);
    }
}
