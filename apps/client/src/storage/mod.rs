//! Key/value persistence for session state.
//!
//! The session manager never touches a concrete store; it is handed an
//! `Arc<dyn SessionStore>`. `MemoryStore` backs tests and throwaway sessions,
//! `FileStore` keeps a session across process restarts.

use async_trait::async_trait;

use crate::errors::ClientError;

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Storage keys owned by the session manager.
pub mod keys {
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    /// Flat token written by older builds. Read as a fallback, always cleared.
    pub const LEGACY_TOKEN: &str = "authToken";
    pub const USER_PROFILE: &str = "userData";
    pub const AUTH_METHOD: &str = "lastAuthMethod";

    /// Everything a session clear must remove.
    pub const SESSION_KEYS: [&str; 5] = [
        ACCESS_TOKEN,
        REFRESH_TOKEN,
        LEGACY_TOKEN,
        USER_PROFILE,
        AUTH_METHOD,
    ];
}

/// One mutation inside a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change<'a> {
    Set(&'a str, &'a str),
    Remove(&'a str),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, ClientError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), ClientError>;

    async fn remove(&self, key: &str) -> Result<(), ClientError>;

    /// Applies all changes as one unit. Implementations must make the whole
    /// batch visible at once; the default is only suitable for stores with no
    /// concurrent readers.
    async fn batch(&self, changes: &[Change<'_>]) -> Result<(), ClientError> {
        for change in changes {
            match *change {
                Change::Set(key, value) => self.set(key, value).await?,
                Change::Remove(key) => self.remove(key).await?,
            }
        }
        Ok(())
    }

    async fn remove_all(&self, keys: &[&str]) -> Result<(), ClientError> {
        let changes: Vec<Change<'_>> = keys.iter().map(|k| Change::Remove(*k)).collect();
        self.batch(&changes).await
    }
}
