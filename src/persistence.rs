use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use serde_json::Value;

use crate::domain::{LedgerError, SnapshotStore};

/// Keeps snapshots in process memory only. The default backend for tests and
/// for callers that treat the ledger as a per-session cache.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Value>>, LedgerError> {
        self.entries
            .lock()
            .map_err(|_| LedgerError::Storage("snapshot store mutex poisoned".to_string()))
    }
}

impl SnapshotStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, LedgerError> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), LedgerError> {
        self.lock()?.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), LedgerError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Persists each snapshot as one JSON file under a root directory.
///
/// Writes go to a temp file first and are renamed into place, so a crash
/// mid-write never leaves a half-written snapshot for the next load to trip
/// over.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{name}.json"))
    }
}

impl SnapshotStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, LedgerError> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(LedgerError::Storage(format!(
                    "read {} failed: {e}",
                    path.display()
                )));
            }
        };
        let value = serde_json::from_slice(&bytes).map_err(|e| {
            LedgerError::Storage(format!("snapshot {} is not valid json: {e}", path.display()))
        })?;
        Ok(Some(value))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), LedgerError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| LedgerError::Storage(format!("create snapshot dir failed: {e}")))?;

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(&value)
            .map_err(|e| LedgerError::Storage(format!("encode snapshot failed: {e}")))?;

        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| LedgerError::Storage(format!("write {} failed: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| LedgerError::Storage(format!("rename {} failed: {e}", path.display())))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), LedgerError> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LedgerError::Storage(format!(
                "remove {} failed: {e}",
                path.display()
            ))),
        }
    }
}
