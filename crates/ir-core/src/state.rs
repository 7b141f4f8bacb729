//! Persisted connector state.
//!
//! The only thing worth keeping between runs is the cursor of the last page
//! whose records were handed to the sink.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use ir_connectors::Cursor;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

/// State written after every committed page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorState {
    pub last_cursor: Cursor,
}

impl ConnectorState {
    pub fn new(last_cursor: Cursor) -> Self {
        Self { last_cursor }
    }
}

/// Storage for [`ConnectorState`].
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Returns the stored state, or `None` on a first run.
    async fn load(&self) -> SyncResult<Option<ConnectorState>>;

    /// Replaces the stored state.
    async fn save(&self, state: &ConnectorState) -> SyncResult<()>;
}

/// State kept as a small JSON document on disk.
///
/// Saves go through a sibling temp file and a rename, so a crash mid-write
/// leaves the previous state intact.
#[derive(Debug, Clone)]
pub struct JsonFileStateStore {
    path: PathBuf,
}

impl JsonFileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl StateStore for JsonFileStateStore {
    async fn load(&self) -> SyncResult<Option<ConnectorState>> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let state = serde_json::from_slice(&contents).map_err(|e| {
            SyncError::State(format!(
                "Failed to parse state file {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(Some(state))
    }

    async fn save(&self, state: &ConnectorState) -> SyncResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = serde_json::to_vec_pretty(state)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, contents).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        debug!(path = %self.path.display(), cursor = %state.last_cursor, "State saved");
        Ok(())
    }
}

/// In-memory state, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: RwLock<Option<ConnectorState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: ConnectorState) -> Self {
        Self {
            state: RwLock::new(Some(state)),
        }
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> SyncResult<Option<ConnectorState>> {
        Ok(self.state.read().await.clone())
    }

    async fn save(&self, state: &ConnectorState) -> SyncResult<()> {
        *self.state.write().await = Some(state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_store_first_run() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStateStore::new(dir.path().join("state.json"));
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStateStore::new(dir.path().join("nested").join("state.json"));

        let state = ConnectorState::new(Cursor::new("MjAyNC0wNS0wMVQxMTowMDowMFo="));
        store.save(&state).await.unwrap();

        assert_eq!(store.load().await.unwrap(), Some(state));
        assert!(!store.temp_path().exists());

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["last_cursor"], "MjAyNC0wNS0wMVQxMTowMDowMFo=");
    }

    #[tokio::test]
    async fn test_file_store_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "not json").unwrap();

        let err = JsonFileStateStore::new(path).load().await.unwrap_err();
        assert!(matches!(err, SyncError::State(_)));
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStateStore::new();
        assert_eq!(store.load().await.unwrap(), None);

        let state = ConnectorState::new(Cursor::new("c1"));
        store.save(&state).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(state));
    }
}
