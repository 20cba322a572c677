//! Artifact Store
//!
//! External-collaborator key-value abstraction: whole-value get/set/remove
//! and prefix listing, no partial updates, no transactions. Callers
//! read-modify-write full records and accept last-writer-wins semantics.
//! Every operation may fail with a storage error; read failures should be
//! tolerated where feasible, explicit saves must surface failures.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::types::Result;

/// Shared store handle for async contexts
pub type SharedStore = Arc<dyn ArtifactStore>;

/// Whole-value key-value store
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// In-memory store used as the default wiring and in tests
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedStore {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
