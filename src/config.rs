use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DetectError, Result};

/// Distance function used by the density clustering stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    Euclidean,
}

impl FromStr for DistanceMetric {
    type Err = DetectError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "euclidean" => Ok(DistanceMetric::Euclidean),
            other => Err(DetectError::Config(format!(
                "distance must be one of: cosine, euclidean (got \"{other}\")"
            ))),
        }
    }
}

/// Tuning knobs for one detection pass. Validated at detector construction;
/// an invalid value is fatal for the pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectorConfig {
    /// DBSCAN neighborhood radius.
    pub epsilon: f64,
    /// Minimum neighborhood size (inclusive of the point itself) for a core point.
    pub min_points: usize,
    /// Clusters smaller than this are discarded during assembly.
    pub min_cluster_size: usize,
    /// Keep only the N largest clusters; unset returns all.
    pub max_clusters: Option<usize>,
    pub distance: DistanceMetric,
    /// Fetch failures observed within the past N days.
    pub time_window_days: u32,
    /// Embedding requests are issued in chunks of at most this many contexts.
    pub max_batch_size: usize,
    /// Pause between successive embedding batches, in milliseconds.
    pub batch_delay_ms: u64,
    /// Deadline for a single embedding request, in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.15,
            min_points: 2,
            min_cluster_size: 2,
            max_clusters: Some(5),
            distance: DistanceMetric::Cosine,
            time_window_days: 7,
            max_batch_size: 5,
            batch_delay_ms: 100,
            request_timeout_ms: 30_000,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.epsilon.is_finite() || self.epsilon <= 0.0 {
            return Err(DetectError::Config(
                "epsilon must be greater than 0".to_string(),
            ));
        }
        if self.min_points < 1 {
            return Err(DetectError::Config(
                "minPoints must be at least 1".to_string(),
            ));
        }
        if self.min_cluster_size < 1 {
            return Err(DetectError::Config(
                "minClusterSize must be at least 1".to_string(),
            ));
        }
        if let Some(max) = self.max_clusters {
            if max < 1 {
                return Err(DetectError::Config(
                    "maxClusters must be at least 1 when set".to_string(),
                ));
            }
        }
        if self.time_window_days < 1 {
            return Err(DetectError::Config(
                "timeWindow.days must be a positive integer".to_string(),
            ));
        }
        if self.max_batch_size < 1 {
            return Err(DetectError::Config(
                "maxBatchSize must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Partial configuration as persisted in a `.flakescope.json` file.
/// File fields fill config defaults; CLI flags override both.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileConfig {
    pub epsilon: Option<f64>,
    pub min_points: Option<usize>,
    pub min_cluster_size: Option<usize>,
    pub max_clusters: Option<usize>,
    pub distance: Option<DistanceMetric>,
    pub time_window_days: Option<u32>,
    pub max_batch_size: Option<usize>,
    pub batch_delay_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
}

impl FileConfig {
    /// Overlay the file's fields onto `config`.
    pub fn apply(&self, config: &mut DetectorConfig) {
        if let Some(v) = self.epsilon {
            config.epsilon = v;
        }
        if let Some(v) = self.min_points {
            config.min_points = v;
        }
        if let Some(v) = self.min_cluster_size {
            config.min_cluster_size = v;
        }
        if let Some(v) = self.max_clusters {
            config.max_clusters = Some(v);
        }
        if let Some(v) = self.distance {
            config.distance = v;
        }
        if let Some(v) = self.time_window_days {
            config.time_window_days = v;
        }
        if let Some(v) = self.max_batch_size {
            config.max_batch_size = v;
        }
        if let Some(v) = self.batch_delay_ms {
            config.batch_delay_ms = v;
        }
        if let Some(v) = self.request_timeout_ms {
            config.request_timeout_ms = v;
        }
    }
}

/// Load a config file if it exists. A missing file is not an error; a
/// present-but-unreadable file is.
pub fn load_config_file(path: &Path) -> Result<Option<FileConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| DetectError::Config(format!("cannot read {}: {e}", path.display())))?;
    let parsed: FileConfig = serde_json::from_str(&raw)
        .map_err(|e| DetectError::Config(format!("cannot parse {}: {e}", path.display())))?;
    Ok(Some(parsed))
}
