use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{Change, SessionStore};
use crate::errors::ClientError;

/// JSON-file store. The whole map is rewritten on every change through a
/// temporary file and a rename, so readers see either the old or the new map.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Opens the store at `path`, loading existing entries. A missing file is an empty store.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref().to_path_buf();

        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(raw) if raw.trim().is_empty() => HashMap::new(),
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                ClientError::Storage(format!("{} is not a session file: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(ClientError::Storage(format!(
                    "failed to read {}: {e}",
                    path.display()
                )))
            }
        };

        info!("Session store opened at {} ({} keys)", path.display(), entries.len());

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &HashMap<String, String>) -> Result<(), ClientError> {
        let json = serde_json::to_vec_pretty(entries)
            .map_err(|e| ClientError::Storage(format!("failed to encode session: {e}")))?;

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| ClientError::Storage(format!("failed to write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            ClientError::Storage(format!("failed to replace {}: {e}", self.path.display()))
        })?;

        debug!("Session store persisted ({} keys)", entries.len());
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ClientError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), ClientError> {
        self.batch(&[Change::Set(key, value)]).await
    }

    async fn remove(&self, key: &str) -> Result<(), ClientError> {
        self.batch(&[Change::Remove(key)]).await
    }

    async fn batch(&self, changes: &[Change<'_>]) -> Result<(), ClientError> {
        let mut entries = self.entries.lock().await;
        let mut next = entries.clone();
        for change in changes {
            match *change {
                Change::Set(key, value) => {
                    next.insert(key.to_string(), value.to_string());
                }
                Change::Remove(key) => {
                    next.remove(key);
                }
            }
        }
        if next == *entries {
            return Ok(());
        }

        // Only swap the in-memory map once the file write succeeded.
        self.persist(&next).await?;
        *entries = next;
        Ok(())
    }
}
