//! In-memory entry store
//!
//! Backed by a `BTreeMap` so iteration follows key order, like the SQLite
//! store. Used by tests and by the CLI's `--memory` mode.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{EntryStore, StoreError, StoreResult, TrackedEntry};

/// In-memory implementation of [`EntryStore`]
#[derive(Debug, Default)]
pub struct MemoryEntryStore {
    entries: RwLock<BTreeMap<String, TrackedEntry>>,
}

impl MemoryEntryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with entries
    pub fn with_entries(entries: impl IntoIterator<Item = TrackedEntry>) -> Self {
        let map = entries
            .into_iter()
            .map(|e| (e.resource_id.clone(), e))
            .collect();
        Self {
            entries: RwLock::new(map),
        }
    }
}

#[async_trait]
impl EntryStore for MemoryEntryStore {
    async fn open(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn get(&self, resource_id: &str) -> StoreResult<TrackedEntry> {
        self.entries
            .read()
            .await
            .get(resource_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(resource_id.to_string()))
    }

    async fn insert(&self, entry: &TrackedEntry) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&entry.resource_id) {
            return Err(StoreError::Duplicate(entry.resource_id.clone()));
        }
        entries.insert(entry.resource_id.clone(), entry.clone());
        Ok(())
    }

    async fn put(&self, entry: &TrackedEntry) -> StoreResult<()> {
        self.entries
            .write()
            .await
            .insert(entry.resource_id.clone(), entry.clone());
        Ok(())
    }

    async fn touch(&self, resource_id: &str, last_update: i64) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(resource_id)
            .ok_or_else(|| StoreError::NotFound(resource_id.to_string()))?;
        entry.last_update = last_update;
        Ok(())
    }

    async fn delete(&self, resource_id: &str) -> StoreResult<TrackedEntry> {
        self.entries
            .write()
            .await
            .remove(resource_id)
            .ok_or_else(|| StoreError::NotFound(resource_id.to_string()))
    }

    async fn iterate_all(&self) -> StoreResult<Vec<TrackedEntry>> {
        Ok(self.entries.read().await.values().cloned().collect())
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(self.entries.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_duplicate() {
        let store = MemoryEntryStore::new();
        store.insert(&TrackedEntry::new("r1", "s1", 0)).await.unwrap();

        let err = store.insert(&TrackedEntry::new("r1", "s1", 0)).await;
        assert_eq!(err, Err(StoreError::Duplicate("r1".to_string())));
    }

    #[tokio::test]
    async fn test_with_entries_ordered() {
        let store = MemoryEntryStore::with_entries(vec![
            TrackedEntry::new("z", "z", 0),
            TrackedEntry::new("m", "m", 0),
        ]);

        let all = store.iterate_all().await.unwrap();
        assert_eq!(all[0].resource_id, "m");
        assert_eq!(all[1].resource_id, "z");
    }

    #[tokio::test]
    async fn test_touch_updates_timestamp_only() {
        let store = MemoryEntryStore::with_entries(vec![TrackedEntry::new("r1", "s1", 5)]);
        store.touch("r1", 42).await.unwrap();

        assert_eq!(store.get("r1").await.unwrap(), TrackedEntry::new("r1", "s1", 42));
    }

    #[tokio::test]
    async fn test_touch_after_delete_does_not_recreate() {
        let store = MemoryEntryStore::with_entries(vec![TrackedEntry::new("r1", "s1", 5)]);
        store.delete("r1").await.unwrap();

        let err = store.touch("r1", 42).await;
        assert_eq!(err, Err(StoreError::NotFound("r1".to_string())));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_returns_record() {
        let store = MemoryEntryStore::with_entries(vec![TrackedEntry::new("r1", "s1", 5)]);
        let removed = store.delete("r1").await.unwrap();
        assert_eq!(removed.last_update, 5);
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
