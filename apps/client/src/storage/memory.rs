use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Change, SessionStore};
use crate::errors::ClientError;

/// In-process store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, ClientError> {
        self.entries
            .lock()
            .map_err(|_| ClientError::Storage("memory store lock poisoned".to_string()))
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ClientError> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), ClientError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), ClientError> {
        self.lock()?.remove(key);
        Ok(())
    }

    async fn batch(&self, changes: &[Change<'_>]) -> Result<(), ClientError> {
        let mut entries = self.lock()?;
        for change in changes {
            match *change {
                Change::Set(key, value) => {
                    entries.insert(key.to_string(), value.to_string());
                }
                Change::Remove(key) => {
                    entries.remove(key);
                }
            }
        }
        Ok(())
    }
}
