//! Key-value persistence for opaque serialized blobs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;

use crate::error::{GuardianError, Result};

/// Named blob storage. Callers own the blob format.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Load the blob stored under `key`, if any.
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replace the blob stored under `key`.
    async fn save(&self, key: &str, blob: &[u8]) -> Result<()>;
}

/// In-process store for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.read().await.get(key).cloned())
    }

    async fn save(&self, key: &str, blob: &[u8]) -> Result<()> {
        self.blobs.write().await.insert(key.to_string(), blob.to_vec());
        Ok(())
    }
}

/// One `<key>.json` file per key under a data directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(GuardianError::StorageWrite {
                key: key.to_string(),
                reason: "keys may only contain [A-Za-z0-9_-]".to_string(),
            });
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(GuardianError::StorageRead {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn save(&self, key: &str, blob: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir).await?;

        // Write-then-rename so readers never see a partial blob
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, blob)
            .await
            .map_err(|e| GuardianError::StorageWrite {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| GuardianError::StorageWrite {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }
}
