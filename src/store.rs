//! Storage collaborators: failures in, ranked clusters out.
//!
//! Two adapters ship by default: an in-memory store for tests and embedded
//! use, and a JSON-file store persisting the `test_failures` and
//! `flaky_clusters` documents with ISO-8601 timestamps.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::assemble::FailureCluster;
use crate::error::{DetectError, Result};
use crate::failure::TestFailure;

pub const FAILURES_COLLECTION: &str = "test_failures";
pub const CLUSTERS_COLLECTION: &str = "flaky_clusters";

/// Storage collaborator contract. Implementations own their thread-safety;
/// the pipeline consumes results read-only.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Failures whose timestamp falls within the past `days` from now.
    async fn fetch_failures(&self, days: u32) -> Result<Vec<TestFailure>>;

    /// Persist the full ranked output, replacing any previous pass.
    async fn save_clusters(&self, clusters: &[FailureCluster]) -> Result<()>;

    /// Persisted clusters for reporting flows.
    async fn fetch_clusters(&self, limit: Option<usize>) -> Result<Vec<FailureCluster>>;
}

fn within_window(failure: &TestFailure, days: u32) -> bool {
    failure.timestamp >= Utc::now() - Duration::days(i64::from(days))
}

/// In-memory store backed by `tokio::sync::RwLock`.
#[derive(Default)]
pub struct MemoryStore {
    failures: RwLock<Vec<TestFailure>>,
    clusters: RwLock<Vec<FailureCluster>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add failures to the store.
    pub async fn seed_failures(&self, failures: Vec<TestFailure>) {
        self.failures.write().await.extend(failures);
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn fetch_failures(&self, days: u32) -> Result<Vec<TestFailure>> {
        Ok(self
            .failures
            .read()
            .await
            .iter()
            .filter(|f| within_window(f, days))
            .cloned()
            .collect())
    }

    async fn save_clusters(&self, clusters: &[FailureCluster]) -> Result<()> {
        *self.clusters.write().await = clusters.to_vec();
        Ok(())
    }

    async fn fetch_clusters(&self, limit: Option<usize>) -> Result<Vec<FailureCluster>> {
        let clusters = self.clusters.read().await;
        let take = limit.unwrap_or(clusters.len());
        Ok(clusters.iter().take(take).cloned().collect())
    }
}

/// File-backed store: one JSON document per collection under a data
/// directory. Missing documents read as empty collections.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn failures_path(&self) -> PathBuf {
        self.dir.join(format!("{FAILURES_COLLECTION}.json"))
    }

    fn clusters_path(&self) -> PathBuf {
        self.dir.join(format!("{CLUSTERS_COLLECTION}.json"))
    }

    async fn read_document<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                DetectError::Storage(format!("cannot parse {}: {e}", path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(DetectError::Storage(format!(
                "cannot read {}: {e}",
                path.display()
            ))),
        }
    }

    async fn write_document<T: Serialize>(&self, path: &Path, items: &[T]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            DetectError::Storage(format!("cannot create {}: {e}", self.dir.display()))
        })?;
        let raw = serde_json::to_string_pretty(items)
            .map_err(|e| DetectError::Storage(format!("cannot serialize: {e}")))?;
        tokio::fs::write(path, raw).await.map_err(|e| {
            DetectError::Storage(format!("cannot write {}: {e}", path.display()))
        })
    }

    /// Replace the persisted failure set. Used by report ingestion tooling;
    /// the detection pipeline itself only reads failures.
    pub async fn save_failures(&self, failures: &[TestFailure]) -> Result<()> {
        self.write_document(&self.failures_path(), failures).await
    }
}

#[async_trait]
impl DataStore for JsonFileStore {
    async fn fetch_failures(&self, days: u32) -> Result<Vec<TestFailure>> {
        let all: Vec<TestFailure> = Self::read_document(&self.failures_path()).await?;
        let kept: Vec<TestFailure> =
            all.into_iter().filter(|f| within_window(f, days)).collect();
        debug!(count = kept.len(), days, "fetched failures from file store");
        Ok(kept)
    }

    async fn save_clusters(&self, clusters: &[FailureCluster]) -> Result<()> {
        self.write_document(&self.clusters_path(), clusters).await
    }

    async fn fetch_clusters(&self, limit: Option<usize>) -> Result<Vec<FailureCluster>> {
        let all: Vec<FailureCluster> = Self::read_document(&self.clusters_path()).await?;
        let take = limit.unwrap_or(all.len());
        Ok(all.into_iter().take(take).collect())
    }
}

/// Storage adapter selection, as a tagged configuration value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    #[default]
    File,
}

impl FromStr for StoreKind {
    type Err = DetectError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreKind::Memory),
            "file" => Ok(StoreKind::File),
            other => Err(DetectError::Config(format!(
                "store must be one of: memory, file (got \"{other}\")"
            ))),
        }
    }
}

/// Build a store from its tagged configuration.
pub fn build_store(kind: StoreKind, data_dir: &Path) -> Arc<dyn DataStore> {
    match kind {
        StoreKind::Memory => Arc::new(MemoryStore::new()),
        StoreKind::File => Arc::new(JsonFileStore::new(data_dir)),
    }
}
