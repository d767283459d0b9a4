//! Raw key/value storage beneath the result cache

use crate::error::{DriftError, DriftResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// String-keyed store of JSON records
///
/// Implementations must make a single `put` or `delete` atomic: a reader sees
/// the old record, the new record, or nothing.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a record, `None` when absent
    async fn get(&self, key: &str) -> DriftResult<Option<Value>>;

    /// Write or replace a record
    async fn put(&self, key: &str, value: Value) -> DriftResult<()>;

    /// Remove a record; removing an absent key succeeds
    async fn delete(&self, key: &str) -> DriftResult<()>;

    /// All records, ordered by key
    async fn entries(&self) -> DriftResult<Vec<(String, Value)>>;

    /// Remove every record, returning how many were removed
    async fn clear(&self) -> DriftResult<usize>;
}

/// In-process store, lost when the process exits
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> DriftResult<std::sync::MutexGuard<'_, BTreeMap<String, Value>>> {
        self.records
            .lock()
            .map_err(|_| DriftError::cache("memory store poisoned"))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> DriftResult<Option<Value>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Value) -> DriftResult<()> {
        self.lock()?.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> DriftResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    async fn entries(&self) -> DriftResult<Vec<(String, Value)>> {
        Ok(self
            .lock()?
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn clear(&self) -> DriftResult<usize> {
        let mut records = self.lock()?;
        let removed = records.len();
        records.clear();
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_store_crud() {
        let store = MemoryStore::new();
        assert!(store.get("k").await.unwrap().is_none());

        store.put("k", json!({"v": 1})).await.unwrap();
        store.put("k", json!({"v": 2})).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!({"v": 2})));
        assert_eq!(store.len(), 1);

        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn entries_are_sorted_and_clear_counts() {
        let store = MemoryStore::new();
        store.put("b", json!(2)).await.unwrap();
        store.put("a", json!(1)).await.unwrap();

        let keys: Vec<String> = store.entries().await.unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(store.clear().await.unwrap(), 2);
        assert!(store.is_empty());
    }
}
