//! Embedding orchestration: batches contexts to a provider, paces requests,
//! and validates the returned vectors before clustering sees them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::cancel::CancellationToken;
use crate::config::DetectorConfig;
use crate::context;
use crate::error::{DetectError, Result};
use crate::failure::{EmbeddedFailure, TestFailure};

/// Failure inside a provider. The orchestrator attaches the batch index
/// when it surfaces this as a pass-fatal `DetectError::Provider`.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ProviderFault(pub String);

/// External embedding service: an ordered sequence of texts in, an
/// equally-long sequence of equal-length finite vectors out. A provider
/// may retry internally; the orchestrator never does.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn generate_embeddings(
        &self,
        texts: &[String],
    ) -> std::result::Result<Vec<Vec<f32>>, ProviderFault>;
}

/// Drives a provider through the batching and pacing contract.
pub struct EmbeddingOrchestrator {
    provider: Arc<dyn EmbeddingProvider>,
    max_batch_size: usize,
    batch_delay: Duration,
    request_timeout: Duration,
}

impl EmbeddingOrchestrator {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &DetectorConfig) -> Self {
        Self {
            provider,
            max_batch_size: config.max_batch_size.max(1),
            batch_delay: Duration::from_millis(config.batch_delay_ms),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }

    /// Embed every failure's context. Batches are sequential to bound the
    /// request rate; the final batch incurs no trailing delay. A provider
    /// error aborts the pass with the batch index; partial results are
    /// discarded.
    pub async fn embed_failures(
        &self,
        failures: Vec<TestFailure>,
        cancel: &CancellationToken,
    ) -> Result<Vec<EmbeddedFailure>> {
        if failures.is_empty() {
            return Ok(Vec::new());
        }
        let contexts = context::build_contexts(&failures);
        let batches = contexts.len().div_ceil(self.max_batch_size);
        debug!(inputs = contexts.len(), batches, "embedding contexts");

        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(contexts.len());
        for (batch, chunk) in contexts.chunks(self.max_batch_size).enumerate() {
            cancel.check()?;
            let request = self.provider.generate_embeddings(chunk);
            let result = tokio::time::timeout(self.request_timeout, request)
                .await
                .map_err(|_| DetectError::Provider {
                    batch,
                    message: format!(
                        "request exceeded deadline of {}ms",
                        self.request_timeout.as_millis()
                    ),
                })?
                .map_err(|fault| DetectError::Provider {
                    batch,
                    message: fault.to_string(),
                })?;
            if result.len() != chunk.len() {
                return Err(DetectError::Validation(format!(
                    "provider returned {} vectors for {} inputs in batch {batch}",
                    result.len(),
                    chunk.len()
                )));
            }
            vectors.extend(result);
            debug!(batch, size = chunk.len(), "batch embedded");
            if batch + 1 < batches {
                tokio::time::sleep(self.batch_delay).await;
            }
        }

        validate_embeddings(&vectors)?;
        Ok(failures
            .into_iter()
            .zip(vectors)
            .map(|(failure, embedding)| EmbeddedFailure { failure, embedding })
            .collect())
    }
}

/// Post-condition check: vectors non-empty, one shared dimensionality,
/// every component finite. Violation fails the pass.
pub fn validate_embeddings(vectors: &[Vec<f32>]) -> Result<()> {
    let Some(first) = vectors.first() else {
        return Ok(());
    };
    let dim = first.len();
    if dim == 0 {
        return Err(DetectError::Validation(
            "embedding 0 is empty".to_string(),
        ));
    }
    for (index, vector) in vectors.iter().enumerate() {
        if vector.len() != dim {
            return Err(DetectError::Validation(format!(
                "embedding {index} has dimension {} but expected {dim}",
                vector.len()
            )));
        }
        if let Some(component) = vector.iter().find(|v| !v.is_finite()) {
            return Err(DetectError::Validation(format!(
                "embedding {index} contains a non-finite component ({component})"
            )));
        }
    }
    Ok(())
}
