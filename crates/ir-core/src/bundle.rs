//! STIX bundle construction and delivery.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use chrono::Utc;
use ir_connectors::Record;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// A STIX 2.1 bundle.
///
/// Objects keep the order and the duplicates of the closed record set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StixBundle {
    #[serde(rename = "type")]
    pub bundle_type: String,
    pub id: String,
    pub objects: Vec<Record>,
}

impl StixBundle {
    pub fn new(objects: Vec<Record>) -> Self {
        Self {
            bundle_type: "bundle".to_string(),
            id: format!("bundle--{}", Uuid::new_v4()),
            objects,
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Destination of closed record sets.
#[async_trait]
pub trait BundleSink: Send + Sync {
    /// Delivers `bundle`. With `update` set, the receiver upserts objects it
    /// already knows instead of skipping them.
    async fn send(&self, bundle: &StixBundle, update: bool) -> SyncResult<()>;
}

/// Writes every bundle as a JSON file in a directory.
///
/// Files are named `<utc timestamp>_<bundle id>.json` so a directory listing
/// sorts in delivery order.
#[derive(Debug, Clone)]
pub struct DirectoryBundleSink {
    dir: PathBuf,
}

#[derive(Serialize)]
struct BundleEnvelope<'a> {
    update: bool,
    #[serde(flatten)]
    bundle: &'a StixBundle,
}

impl DirectoryBundleSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl BundleSink for DirectoryBundleSink {
    async fn send(&self, bundle: &StixBundle, update: bool) -> SyncResult<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            SyncError::Sink(format!(
                "Cannot create output directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let file_name = format!(
            "{}_{}.json",
            Utc::now().format("%Y%m%dT%H%M%S%.6fZ"),
            bundle.id
        );
        let path = self.dir.join(file_name);
        let contents = serde_json::to_vec(&BundleEnvelope { update, bundle })?;

        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| SyncError::Sink(format!("Cannot write {}: {}", path.display(), e)))?;

        info!(
            bundle_id = %bundle.id,
            objects = bundle.len(),
            path = %path.display(),
            "Bundle written"
        );
        Ok(())
    }
}

/// Keeps bundles in memory, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryBundleSink {
    sent: RwLock<Vec<(StixBundle, bool)>>,
    fail_with: Option<String>,
}

impl MemoryBundleSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that rejects every bundle with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            sent: RwLock::new(Vec::new()),
            fail_with: Some(message.into()),
        }
    }

    pub async fn bundles(&self) -> Vec<StixBundle> {
        self.sent.read().await.iter().map(|(b, _)| b.clone()).collect()
    }

    pub async fn update_flags(&self) -> Vec<bool> {
        self.sent.read().await.iter().map(|(_, u)| *u).collect()
    }
}

#[async_trait]
impl BundleSink for MemoryBundleSink {
    async fn send(&self, bundle: &StixBundle, update: bool) -> SyncResult<()> {
        if let Some(message) = &self.fail_with {
            return Err(SyncError::Sink(message.clone()));
        }
        self.sent.write().await.push((bundle.clone(), update));
        Ok(())
    }
}
