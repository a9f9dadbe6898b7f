//! Token store
//!
//! Holds the current access token, its expiry, and the last-activity marker,
//! and mirrors them into a durable [`TokenStorage`] slot so a restarted client
//! can pick the session back up. When the slot is unavailable every write
//! degrades to memory-only for this process; the store itself never fails.

use crate::clock::Clock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, warn};

/// Persisted token record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored token is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Durable key-value slot for one token record
///
/// Calls are synchronous and made while the session machine holds its state
/// lock, so every write lands in the order the machine made it. Keep them to
/// small local writes; a slot backed by the network belongs behind a cache.
pub trait TokenStorage: Send + Sync {
    fn load(&self) -> Result<Option<StoredToken>, StorageError>;
    fn save(&self, token: &StoredToken) -> Result<(), StorageError>;
    fn remove(&self) -> Result<(), StorageError>;
}

/// JSON file slot; writes go through a temp file and a rename
///
/// Each write is one JSON document of a few hundred bytes on local disk,
/// done inline on the calling thread.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStorage for FileStorage {
    fn load(&self) -> Result<Option<StoredToken>, StorageError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, token: &StoredToken) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(token)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn remove(&self) -> Result<(), StorageError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local slot, useful for tests and ephemeral clients
#[derive(Debug, Default)]
pub struct MemoryStorage {
    slot: Mutex<Option<StoredToken>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStorage for MemoryStorage {
    fn load(&self) -> Result<Option<StoredToken>, StorageError> {
        Ok(self.slot.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save(&self, token: &StoredToken) -> Result<(), StorageError> {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(token.clone());
        Ok(())
    }

    fn remove(&self) -> Result<(), StorageError> {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

/// Current token plus its durable mirror
pub struct TokenStore {
    storage: Arc<dyn TokenStorage>,
    clock: Arc<dyn Clock>,
    current: Mutex<Option<StoredToken>>,
}

impl TokenStore {
    /// Create a store, hydrating from the durable slot if it holds a record
    pub fn new(storage: Arc<dyn TokenStorage>, clock: Arc<dyn Clock>) -> Self {
        let initial = match storage.load() {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Token storage unreadable, starting with an empty session");
                None
            }
        };

        Self {
            storage,
            clock,
            current: Mutex::new(initial),
        }
    }

    /// Access token, if one is held and has not expired
    pub fn get(&self) -> Option<String> {
        let now = self.clock.now();
        self.lock()
            .as_ref()
            .filter(|t| t.expires_at > now)
            .map(|t| t.access_token.clone())
    }

    /// Full record regardless of expiry
    pub fn snapshot(&self) -> Option<StoredToken> {
        self.lock().clone()
    }

    /// Replace the access token and its expiry
    ///
    /// The refresh token and the activity marker of the current record carry
    /// over; a fresh record starts its activity marker at now.
    pub fn set(&self, token: impl Into<String>, expires_at: DateTime<Utc>) {
        let now = self.clock.now();
        let mut current = self.lock();
        let (refresh_token, last_activity) = match current.as_ref() {
            Some(existing) => (existing.refresh_token.clone(), existing.last_activity),
            None => (None, Some(now)),
        };
        let record = StoredToken {
            access_token: token.into(),
            refresh_token,
            expires_at,
            last_activity,
        };
        self.persist(&record);
        *current = Some(record);
    }

    /// Attach a refresh token to the current record; no-op when signed out
    pub fn set_refresh_token(&self, refresh_token: Option<String>) {
        let mut current = self.lock();
        if let Some(record) = current.as_mut() {
            record.refresh_token = refresh_token;
            let record = record.clone();
            self.persist(&record);
        }
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.lock().as_ref().and_then(|t| t.refresh_token.clone())
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.lock().as_ref().map(|t| t.expires_at)
    }

    /// Drop the token and the activity marker, in memory and durably
    pub fn clear(&self) {
        let mut current = self.lock();
        *current = None;
        if let Err(e) = self.storage.remove() {
            warn!(error = %e, "Failed to remove persisted token");
        }
    }

    /// Record now as the last user activity; no-op while signed out
    pub fn touch_activity(&self) {
        let now = self.clock.now();
        let mut current = self.lock();
        if let Some(record) = current.as_mut() {
            record.last_activity = Some(now);
            let record = record.clone();
            self.persist(&record);
        }
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.lock().as_ref().and_then(|t| t.last_activity)
    }

    fn persist(&self, record: &StoredToken) {
        match self.storage.save(record) {
            Ok(()) => debug!("Persisted token record"),
            Err(e) => warn!(error = %e, "Token storage unavailable, keeping token in memory only"),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<StoredToken>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("has_token", &self.lock().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    struct BrokenStorage;

    impl TokenStorage for BrokenStorage {
        fn load(&self) -> Result<Option<StoredToken>, StorageError> {
            Err(StorageError::Unavailable("quota exceeded".to_string()))
        }
        fn save(&self, _token: &StoredToken) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("quota exceeded".to_string()))
        }
        fn remove(&self) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("quota exceeded".to_string()))
        }
    }

    fn store_with(storage: Arc<dyn TokenStorage>) -> (TokenStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (TokenStore::new(storage, clock.clone()), clock)
    }

    #[test]
    fn test_set_get_clear() {
        let (store, clock) = store_with(Arc::new(MemoryStorage::new()));
        assert_eq!(store.get(), None);

        store.set("tok", clock.now() + chrono::Duration::minutes(10));
        assert_eq!(store.get().as_deref(), Some("tok"));
        assert!(store.last_activity().is_some());

        store.clear();
        assert_eq!(store.get(), None);
        assert_eq!(store.last_activity(), None);
    }

    #[test]
    fn test_get_hides_expired_token() {
        let (store, clock) = store_with(Arc::new(MemoryStorage::new()));
        store.set("tok", clock.now() + chrono::Duration::seconds(30));
        clock.advance(Duration::from_secs(30));
        assert_eq!(store.get(), None);
        assert!(store.snapshot().is_some());
    }

    #[test]
    fn test_set_keeps_refresh_token_and_activity() {
        let (store, clock) = store_with(Arc::new(MemoryStorage::new()));
        store.set("tok-1", clock.now() + chrono::Duration::minutes(10));
        store.set_refresh_token(Some("refresh".to_string()));
        let first_activity = store.last_activity();

        clock.advance(Duration::from_secs(60));
        store.set("tok-2", clock.now() + chrono::Duration::minutes(10));

        assert_eq!(store.refresh_token().as_deref(), Some("refresh"));
        assert_eq!(store.last_activity(), first_activity);
    }

    #[test]
    fn test_touch_activity_while_signed_out_is_noop() {
        let (store, _clock) = store_with(Arc::new(MemoryStorage::new()));
        store.touch_activity();
        assert_eq!(store.last_activity(), None);
    }

    #[test]
    fn test_unavailable_storage_keeps_memory_state() {
        let (store, clock) = store_with(Arc::new(BrokenStorage));
        store.set("tok", clock.now() + chrono::Duration::minutes(10));
        store.touch_activity();
        assert_eq!(store.get().as_deref(), Some("tok"));

        store.clear();
        assert_eq!(store.get(), None);
    }

    #[test]
    fn test_file_storage_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");
        let clock = Arc::new(ManualClock::default());
        let expires = clock.now() + chrono::Duration::minutes(10);

        {
            let store = TokenStore::new(Arc::new(FileStorage::new(&path)), clock.clone());
            store.set("persisted", expires);
            store.set_refresh_token(Some("r1".to_string()));
        }

        let reloaded = TokenStore::new(Arc::new(FileStorage::new(&path)), clock.clone());
        assert_eq!(reloaded.get().as_deref(), Some("persisted"));
        assert_eq!(reloaded.refresh_token().as_deref(), Some("r1"));

        reloaded.clear();
        assert!(!path.exists());
    }

    #[test]
    fn test_file_storage_writes_in_call_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let storage = FileStorage::new(&path);
        let clock = Arc::new(ManualClock::default());
        let store = TokenStore::new(Arc::new(storage.clone()), clock.clone());

        store.set("tok-1", clock.now() + chrono::Duration::minutes(10));
        clock.advance(Duration::from_secs(90));
        store.touch_activity();
        store.set("tok-2", clock.now() + chrono::Duration::minutes(10));

        // Every call is on disk before it returns
        let on_disk = storage.load().unwrap().unwrap();
        assert_eq!(on_disk.access_token, "tok-2");
        assert_eq!(on_disk.last_activity, Some(clock.now()));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, b"{not json").unwrap();

        let store = TokenStore::new(
            Arc::new(FileStorage::new(&path)),
            Arc::new(ManualClock::default()),
        );
        assert!(store.snapshot().is_none());
    }
}
