//! Pipeline orchestration: one feed-forward detection pass from stored
//! failures to ranked, persisted clusters.
//!
//! Any stage failure terminates the pass with a typed error; no partial
//! output is emitted. The cancellation token is honored before every
//! suspension point.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::assemble::{self, FailureCluster};
use crate::cancel::CancellationToken;
use crate::config::DetectorConfig;
use crate::dbscan;
use crate::embedding::{EmbeddingOrchestrator, EmbeddingProvider};
use crate::error::Result;
use crate::extractor;
use crate::failure::{self, TestFailure};
use crate::store::DataStore;

pub struct FlakeDetector {
    config: DetectorConfig,
    store: Arc<dyn DataStore>,
    provider: Arc<dyn EmbeddingProvider>,
}

impl std::fmt::Debug for FlakeDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlakeDetector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FlakeDetector {
    /// Configuration is validated here; an invalid value is fatal.
    pub fn new(
        config: DetectorConfig,
        store: Arc<dyn DataStore>,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            provider,
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Run one detection pass: fetch, validate, enrich, embed, cluster,
    /// assemble, rank, persist. Returns the ranked clusters.
    pub async fn detect(&self, cancel: &CancellationToken) -> Result<Vec<FailureCluster>> {
        cancel.check()?;
        let failures = self
            .store
            .fetch_failures(self.config.time_window_days)
            .await?;
        info!(
            count = failures.len(),
            days = self.config.time_window_days,
            "fetched failures"
        );

        let base_key = assemble::pass_base_key(Utc::now());
        let clusters = self.cluster_failures(failures, &base_key, cancel).await?;

        cancel.check()?;
        self.store.save_clusters(&clusters).await?;
        info!(clusters = clusters.len(), "detection pass complete");
        Ok(clusters)
    }

    /// The storage-free middle of the pass, reusable against an explicit
    /// failure set and id base key.
    pub async fn cluster_failures(
        &self,
        failures: Vec<TestFailure>,
        base_key: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<FailureCluster>> {
        failure::validate_failures(&failures)?;
        if failures.is_empty() {
            return Ok(Vec::new());
        }

        let enriched = extractor::enrich_all(&failures);
        cancel.check()?;

        let orchestrator = EmbeddingOrchestrator::new(self.provider.clone(), &self.config);
        let embedded = orchestrator.embed_failures(enriched, cancel).await?;

        let vectors: Vec<Vec<f32>> = embedded.iter().map(|e| e.embedding.clone()).collect();
        let index_sets = dbscan::cluster(
            &vectors,
            self.config.epsilon,
            self.config.min_points,
            self.config.distance,
        );
        info!(
            groups = index_sets.len(),
            noise = embedded.len() - index_sets.iter().map(Vec::len).sum::<usize>(),
            "density clustering done"
        );

        let members: Vec<TestFailure> = embedded.into_iter().map(|e| e.failure).collect();
        let assembled = assemble::assemble_clusters(
            &members,
            &index_sets,
            base_key,
            self.config.min_cluster_size,
        );
        Ok(assemble::rank_clusters(assembled, self.config.max_clusters))
    }

    /// Reporting flow: persisted clusters, most recent pass.
    pub async fn report(&self, limit: Option<usize>) -> Result<Vec<FailureCluster>> {
        self.store.fetch_clusters(limit).await
    }
}
