//! File-backed store: one JSON document per key inside a table directory
//!
//! File names are the SHA256 of the namespaced key, so directory names with
//! slashes or colons never leak into paths. Writes go to a temp file that is
//! renamed over the target, which keeps every single-key update atomic.

use crate::cache::store::KeyValueStore;
use crate::error::{DriftError, DriftResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// On-disk envelope, keeps the readable key next to the record
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    key: String,
    record: Value,
}

/// Durable store rooted at `<cache dir>/<table>`
#[derive(Debug, Clone)]
pub struct FileStore {
    table_dir: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) the named table under `cache_dir`
    pub async fn open(cache_dir: &Path, table: &str) -> DriftResult<Self> {
        if table.is_empty() || table.contains(['/', '\\']) || table == "." || table == ".." {
            return Err(DriftError::cache(format!("invalid cache table name {:?}", table)));
        }

        let table_dir = cache_dir.join(table);
        fs::create_dir_all(&table_dir).await.map_err(|e| {
            DriftError::io(format!("creating cache table {}", table_dir.display()), e)
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            std::fs::set_permissions(&table_dir, perms)
                .map_err(|e| DriftError::io("setting cache table permissions", e))?;
        }

        debug!("Opened cache table {}", table_dir.display());
        Ok(Self { table_dir })
    }

    /// Directory holding the table's records
    pub fn path(&self) -> &Path {
        &self.table_dir
    }

    fn record_path(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        self.table_dir
            .join(format!("{}.json", hex::encode(hasher.finalize())))
    }

    async fn read_envelope(path: &Path) -> DriftResult<Option<Envelope>> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(DriftError::cache(format!(
                    "reading {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        let envelope = serde_json::from_str(&content)
            .map_err(|e| DriftError::cache(format!("decoding {}: {}", path.display(), e)))?;
        Ok(Some(envelope))
    }

    async fn record_files(&self) -> DriftResult<Vec<PathBuf>> {
        let mut entries = fs::read_dir(&self.table_dir)
            .await
            .map_err(|e| DriftError::cache(format!("reading cache table: {}", e)))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DriftError::cache(format!("reading cache entry: {}", e)))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        Ok(files)
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> DriftResult<Option<Value>> {
        let path = self.record_path(key);
        match Self::read_envelope(&path).await? {
            Some(envelope) if envelope.key == key => Ok(Some(envelope.record)),
            Some(envelope) => Err(DriftError::cache(format!(
                "record {} holds key {:?}, expected {:?}",
                path.display(),
                envelope.key,
                key
            ))),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: Value) -> DriftResult<()> {
        let path = self.record_path(key);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(&Envelope {
            key: key.to_string(),
            record: value,
        })?;

        fs::write(&tmp, content)
            .await
            .map_err(|e| DriftError::cache(format!("writing {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| DriftError::cache(format!("replacing {}: {}", path.display(), e)))?;

        debug!("Stored cache record {}", key);
        Ok(())
    }

    async fn delete(&self, key: &str) -> DriftResult<()> {
        let path = self.record_path(key);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted cache record {}", key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DriftError::cache(format!(
                "removing {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn entries(&self) -> DriftResult<Vec<(String, Value)>> {
        let mut entries = Vec::new();
        for path in self.record_files().await? {
            // A record deleted between listing and reading is simply skipped
            if let Some(envelope) = Self::read_envelope(&path).await? {
                entries.push((envelope.key, envelope.record));
            }
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    async fn clear(&self) -> DriftResult<usize> {
        let mut removed = 0;
        for path in self.record_files().await? {
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(DriftError::cache(format!(
                        "removing {}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }
        Ok(removed)
    }
}
