//! Result cache for drift checks and remote workspace snapshots
//!
//! Two key spaces share one store:
//!
//! | Key type | Canonical form | Value |
//! |----------|----------------|-------|
//! | `DriftCheckResultKey` | `<dir>:<workspace>` | drift verdict |
//! | `RemoteWorkspacesKey` | `<dir>` | remote workspace list |
//!
//! The cache never decides freshness. Callers compare `checked_at` against
//! their validity window and delete stale entries before recomputing.

pub mod file;
pub mod store;

pub use file::FileStore;
pub use store::{KeyValueStore, MemoryStore};

use crate::error::{DriftError, DriftResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Key type tag for drift check results
pub const DRIFT_CHECK_KEY_TYPE: &str = "DriftCheckResultKey";

/// Key type tag for remote workspace snapshots
pub const REMOTE_WORKSPACES_KEY_TYPE: &str = "RemoteWorkspacesKey";

/// Identity of one drift check
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DriftCheckKey {
    /// The directory checked
    pub dir: String,
    /// The workspace checked
    pub workspace: String,
}

impl DriftCheckKey {
    pub fn new(dir: impl Into<String>, workspace: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            workspace: workspace.into(),
        }
    }
}

impl fmt::Display for DriftCheckKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.dir, self.workspace)
    }
}

/// Outcome of one drift check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftCheckValue {
    /// Set when the check itself failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the plan reported changes
    pub drift: bool,
    /// When the check ran
    pub checked_at: DateTime<Utc>,
}

impl DriftCheckValue {
    pub fn new(drift: bool, checked_at: DateTime<Utc>) -> Self {
        Self {
            error: None,
            drift,
            checked_at,
        }
    }
}

/// Identity of one remote workspace snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteWorkspacesKey {
    /// Directory checked
    pub dir: String,
}

impl RemoteWorkspacesKey {
    pub fn new(dir: impl Into<String>) -> Self {
        Self { dir: dir.into() }
    }
}

impl fmt::Display for RemoteWorkspacesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dir)
    }
}

/// Remote workspaces seen for a directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteWorkspacesValue {
    /// Set when listing failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Workspaces present in the remote backend
    pub workspaces: Vec<String>,
    /// When the listing ran
    pub checked_at: DateTime<Utc>,
}

impl RemoteWorkspacesValue {
    pub fn new(workspaces: Vec<String>, checked_at: DateTime<Utc>) -> Self {
        Self {
            error: None,
            workspaces,
            checked_at,
        }
    }
}

/// Storage for check results, shared by every worker of a run
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// Get a drift result, `None` when absent
    async fn get_drift_check_result(
        &self,
        key: &DriftCheckKey,
    ) -> DriftResult<Option<DriftCheckValue>>;

    /// Delete a drift result; deleting an absent key succeeds
    async fn delete_drift_check_result(&self, key: &DriftCheckKey) -> DriftResult<()>;

    /// Store a drift result
    async fn store_drift_check_result(
        &self,
        key: &DriftCheckKey,
        value: &DriftCheckValue,
    ) -> DriftResult<()>;

    /// Get a remote workspace snapshot, `None` when absent
    async fn get_remote_workspaces(
        &self,
        key: &RemoteWorkspacesKey,
    ) -> DriftResult<Option<RemoteWorkspacesValue>>;

    /// Store a remote workspace snapshot
    async fn store_remote_workspaces(
        &self,
        key: &RemoteWorkspacesKey,
        value: &RemoteWorkspacesValue,
    ) -> DriftResult<()>;

    /// Delete a remote workspace snapshot; deleting an absent key succeeds
    async fn delete_remote_workspaces(&self, key: &RemoteWorkspacesKey) -> DriftResult<()>;
}

/// Cache that remembers nothing, so every run is cold
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

#[async_trait]
impl ResultCache for NoopCache {
    async fn get_drift_check_result(
        &self,
        _key: &DriftCheckKey,
    ) -> DriftResult<Option<DriftCheckValue>> {
        Ok(None)
    }

    async fn delete_drift_check_result(&self, _key: &DriftCheckKey) -> DriftResult<()> {
        Ok(())
    }

    async fn store_drift_check_result(
        &self,
        _key: &DriftCheckKey,
        _value: &DriftCheckValue,
    ) -> DriftResult<()> {
        Ok(())
    }

    async fn get_remote_workspaces(
        &self,
        _key: &RemoteWorkspacesKey,
    ) -> DriftResult<Option<RemoteWorkspacesValue>> {
        Ok(None)
    }

    async fn store_remote_workspaces(
        &self,
        _key: &RemoteWorkspacesKey,
        _value: &RemoteWorkspacesValue,
    ) -> DriftResult<()> {
        Ok(())
    }

    async fn delete_remote_workspaces(&self, _key: &RemoteWorkspacesKey) -> DriftResult<()> {
        Ok(())
    }
}

/// Build the store key for an entity: `<key type>:<canonical form>`
pub fn namespaced_key(key_type: &str, key: &impl fmt::Display) -> String {
    format!("{}:{}", key_type, key)
}

/// Record persisted for each entry: the key fields next to the value
#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord<K, V> {
    key: K,
    value: V,
}

/// Result cache backed by any key/value store
pub struct KeyedCache<S> {
    store: S,
}

impl<S: KeyValueStore> KeyedCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Access the underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Probe the store with a read so a broken backend fails at startup
    pub async fn verify(&self) -> DriftResult<()> {
        self.get::<RemoteWorkspacesKey, RemoteWorkspacesValue>(
            REMOTE_WORKSPACES_KEY_TYPE,
            &RemoteWorkspacesKey::new("test"),
        )
        .await
        .map(|_| ())
        .map_err(|e| DriftError::cache(format!("failed to verify cache: {}", e)))
    }

    async fn get<K, V>(&self, key_type: &str, key: &K) -> DriftResult<Option<V>>
    where
        K: fmt::Display + DeserializeOwned,
        V: DeserializeOwned,
    {
        let name = namespaced_key(key_type, key);
        let Some(raw) = self.store.get(&name).await? else {
            return Ok(None);
        };
        let record: StoredRecord<K, V> = serde_json::from_value(raw)
            .map_err(|e| DriftError::cache(format!("failed to decode {}: {}", name, e)))?;
        Ok(Some(record.value))
    }

    async fn put<K, V>(&self, key_type: &str, key: &K, value: &V) -> DriftResult<()>
    where
        K: fmt::Display + Serialize,
        V: Serialize,
    {
        let name = namespaced_key(key_type, key);
        let raw = serde_json::to_value(StoredRecord { key, value })
            .map_err(|e| DriftError::cache(format!("failed to encode {}: {}", name, e)))?;
        self.store.put(&name, raw).await
    }

    async fn delete<K: fmt::Display>(&self, key_type: &str, key: &K) -> DriftResult<()> {
        self.store.delete(&namespaced_key(key_type, key)).await
    }
}

#[async_trait]
impl<S: KeyValueStore> ResultCache for KeyedCache<S> {
    async fn get_drift_check_result(
        &self,
        key: &DriftCheckKey,
    ) -> DriftResult<Option<DriftCheckValue>> {
        self.get(DRIFT_CHECK_KEY_TYPE, key).await
    }

    async fn delete_drift_check_result(&self, key: &DriftCheckKey) -> DriftResult<()> {
        self.delete(DRIFT_CHECK_KEY_TYPE, key).await
    }

    async fn store_drift_check_result(
        &self,
        key: &DriftCheckKey,
        value: &DriftCheckValue,
    ) -> DriftResult<()> {
        self.put(DRIFT_CHECK_KEY_TYPE, key, value).await
    }

    async fn get_remote_workspaces(
        &self,
        key: &RemoteWorkspacesKey,
    ) -> DriftResult<Option<RemoteWorkspacesValue>> {
        self.get(REMOTE_WORKSPACES_KEY_TYPE, key).await
    }

    async fn store_remote_workspaces(
        &self,
        key: &RemoteWorkspacesKey,
        value: &RemoteWorkspacesValue,
    ) -> DriftResult<()> {
        self.put(REMOTE_WORKSPACES_KEY_TYPE, key, value).await
    }

    async fn delete_remote_workspaces(&self, key: &RemoteWorkspacesKey) -> DriftResult<()> {
        self.delete(REMOTE_WORKSPACES_KEY_TYPE, key).await
    }
}
