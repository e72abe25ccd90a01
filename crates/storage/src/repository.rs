use async_trait::async_trait;
use quiz_core::model::{ModuleId, SessionKey, SessionRecord};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Source of raw question bank content, one document per module.
#[async_trait]
pub trait BankSource: Send + Sync {
    /// Load the raw bank document for a module.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the module does not exist, or other
    /// storage errors if it cannot be read or parsed.
    async fn load(&self, module: &ModuleId) -> Result<Value, StorageError>;
}

/// Keyed store for per-session records.
///
/// Callers must serialize access per key; the store only guarantees that each
/// individual call is atomic.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch the record for a session key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend fails or the record cannot be decoded.
    async fn get(&self, key: SessionKey) -> Result<Option<SessionRecord>, StorageError>;

    /// Insert or replace the record for a session key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn put(&self, key: SessionKey, record: &SessionRecord) -> Result<(), StorageError>;

    /// Remove the record for a session key. Missing keys are not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend fails.
    async fn delete(&self, key: SessionKey) -> Result<(), StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

/// Bank source backed by documents held in memory.
#[derive(Clone, Default)]
pub struct InMemoryBankSource {
    banks: Arc<Mutex<HashMap<ModuleId, Value>>>,
}

impl InMemoryBankSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a module's raw document.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn insert(&self, module: ModuleId, raw: Value) -> Result<(), StorageError> {
        let mut guard = self
            .banks
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(module, raw);
        Ok(())
    }
}

#[async_trait]
impl BankSource for InMemoryBankSource {
    async fn load(&self, module: &ModuleId) -> Result<Value, StorageError> {
        let guard = self
            .banks
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.get(module).cloned().ok_or(StorageError::NotFound)
    }
}

/// Session store kept in process memory; records vanish with the process.
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    records: Arc<Mutex<HashMap<SessionKey, SessionRecord>>>,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, key: SessionKey) -> Result<Option<SessionRecord>, StorageError> {
        let guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&key).cloned())
    }

    async fn put(&self, key: SessionKey, record: &SessionRecord) -> Result<(), StorageError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(key, record.clone());
        Ok(())
    }

    async fn delete(&self, key: SessionKey) -> Result<(), StorageError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(&key);
        Ok(())
    }
}

/// Aggregates bank and session backends behind trait objects for easy swapping.
#[derive(Clone)]
pub struct Storage {
    pub banks: Arc<dyn BankSource>,
    pub sessions: Arc<dyn SessionStore>,
}

impl Storage {
    #[must_use]
    pub fn new(banks: Arc<dyn BankSource>, sessions: Arc<dyn SessionStore>) -> Self {
        Self { banks, sessions }
    }

    /// In-memory sessions over the given bank source.
    #[must_use]
    pub fn in_memory(banks: Arc<dyn BankSource>) -> Self {
        let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        Self { banks, sessions }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::{DrawMemory, QuestionId};
    use serde_json::json;

    fn module(id: &str) -> ModuleId {
        ModuleId::new(id).unwrap()
    }

    #[tokio::test]
    async fn bank_source_returns_inserted_document() {
        let banks = InMemoryBankSource::new();
        banks
            .insert(module("Module_1"), json!({"questions": []}))
            .unwrap();

        let raw = banks.load(&module("Module_1")).await.unwrap();
        assert_eq!(raw, json!({"questions": []}));
    }

    #[tokio::test]
    async fn bank_source_missing_module_is_not_found() {
        let banks = InMemoryBankSource::new();
        let err = banks.load(&module("ghost")).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[tokio::test]
    async fn session_store_put_get_delete() {
        let store = InMemorySessionStore::new();
        let key = SessionKey::generate();
        assert!(store.get(key).await.unwrap().is_none());

        let record = SessionRecord {
            run: None,
            recent_draws: vec![DrawMemory {
                module_id: module("m"),
                count: 1,
                ids: [QuestionId::new("q0")].into_iter().collect(),
            }],
        };
        store.put(key, &record).await.unwrap();
        assert_eq!(store.get(key).await.unwrap(), Some(record));

        store.delete(key).await.unwrap();
        assert!(store.get(key).await.unwrap().is_none());
        // deleting twice is fine
        store.delete(key).await.unwrap();
    }

    #[tokio::test]
    async fn sessions_are_isolated_by_key() {
        let store = InMemorySessionStore::new();
        let a = SessionKey::generate();
        let b = SessionKey::generate();
        store.put(a, &SessionRecord::default()).await.unwrap();
        assert!(store.get(b).await.unwrap().is_none());
    }
}
