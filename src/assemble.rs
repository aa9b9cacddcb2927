//! Cluster assembly: turns DBSCAN index sets into `FailureCluster` records
//! with common patterns, temporal statistics, summaries, and deterministic
//! date-keyed ids, then ranks and caps the output.

use std::hash::Hash;

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::failure::TestFailure;

/// Error messages carried in cluster metadata are capped at this many
/// code points.
pub const ERROR_MESSAGE_PREVIEW_CHARS: usize = 200;

const SNIPPET_SUMMARY_CHARS: usize = 100;

/// Values appearing in at least half the members (rounded up), per field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommonPatterns {
    pub file_paths: Vec<String>,
    pub line_numbers: Vec<u32>,
    pub code_snippets: Vec<String>,
    pub locators: Vec<String>,
    pub matchers: Vec<String>,
    pub timeouts: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMetadata {
    pub failure_count: usize,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Mean of consecutive gaps in milliseconds; absent for singletons.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub average_time_between_failures: Option<f64>,
    #[serde(default)]
    pub failure_ids: Vec<String>,
    /// Non-empty run ids of members; duplicates preserved for auditing.
    #[serde(default)]
    pub run_ids: Vec<String>,
    #[serde(default)]
    pub failure_timestamps: Vec<DateTime<Utc>>,
    /// Member error messages, each capped at 200 code points.
    #[serde(default)]
    pub error_messages: Vec<String>,
}

/// A group of related failures plus descriptive metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureCluster {
    /// Deterministic `YYYY-MM-DD-N` key: pass date plus output position.
    pub id: String,
    pub failures: Vec<TestFailure>,
    #[serde(default)]
    pub common_patterns: CommonPatterns,
    pub metadata: ClusterMetadata,
    #[serde(default)]
    pub failure_pattern: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub assertion_pattern: Option<String>,
}

/// Tally values in member order and keep those with count >= threshold,
/// ordered by first appearance. Deterministic for a fixed member order.
fn frequent_values<T>(values: impl Iterator<Item = T>, threshold: usize) -> Vec<T>
where
    T: Clone + Eq + Hash,
{
    let mut counts: AHashMap<T, usize> = AHashMap::new();
    let mut order: Vec<T> = Vec::new();
    for value in values {
        let count = counts.entry(value.clone()).or_insert(0);
        if *count == 0 {
            order.push(value);
        }
        *count += 1;
    }
    order
        .into_iter()
        .filter(|v| counts.get(v).copied().unwrap_or(0) >= threshold)
        .collect()
}

fn common_patterns(members: &[TestFailure]) -> CommonPatterns {
    let threshold = members.len().div_ceil(2);
    CommonPatterns {
        file_paths: frequent_values(
            members.iter().map(|f| f.test_file_path.clone()),
            threshold,
        ),
        line_numbers: frequent_values(
            members.iter().filter_map(|f| f.meta().line_number),
            threshold,
        ),
        code_snippets: frequent_values(
            members.iter().filter_map(|f| f.meta().error_snippet),
            threshold,
        ),
        locators: frequent_values(members.iter().filter_map(|f| f.meta().locator), threshold),
        matchers: frequent_values(members.iter().filter_map(|f| f.meta().matcher), threshold),
        timeouts: frequent_values(members.iter().filter_map(|f| f.meta().timeout), threshold),
    }
}

fn failure_pattern(patterns: &CommonPatterns) -> String {
    if let (Some(path), Some(line)) = (patterns.file_paths.first(), patterns.line_numbers.first())
    {
        return format!("Common failure at {path}:{line}");
    }
    if let Some(snippet) = patterns.code_snippets.first() {
        let prefix: String = snippet.chars().take(SNIPPET_SUMMARY_CHARS).collect();
        let ellipsis = if snippet.chars().count() > SNIPPET_SUMMARY_CHARS {
            "..."
        } else {
            ""
        };
        return format!("Common code pattern: {prefix}{ellipsis}");
    }
    "Similar test failures".to_string()
}

fn assertion_pattern(patterns: &CommonPatterns) -> Option<String> {
    match (patterns.locators.first(), patterns.matchers.first()) {
        (Some(locator), Some(matcher)) => {
            let mut out = format!("{matcher} on {locator}");
            if let Some(timeout) = patterns.timeouts.first() {
                out.push_str(&format!(" ({timeout}ms timeout)"));
            }
            Some(out)
        }
        (Some(locator), None) => Some(format!("Common locator: {locator}")),
        (None, Some(matcher)) => Some(format!("Common matcher: {matcher}")),
        (None, None) => None,
    }
}

fn build_cluster(members: Vec<TestFailure>, id: String) -> FailureCluster {
    let patterns = common_patterns(&members);
    let timestamps: Vec<DateTime<Utc>> = members.iter().map(|f| f.timestamp).collect();
    let average = if members.len() >= 2 {
        let total_ms: i64 = timestamps
            .iter()
            .tuple_windows()
            .map(|(a, b)| (*b - *a).num_milliseconds())
            .sum();
        Some(total_ms as f64 / (members.len() - 1) as f64)
    } else {
        None
    };

    let metadata = ClusterMetadata {
        failure_count: members.len(),
        // members are timestamp-sorted, so min/max are the ends
        first_seen: timestamps[0],
        last_seen: timestamps[timestamps.len() - 1],
        average_time_between_failures: average,
        failure_ids: members.iter().map(|f| f.id.clone()).collect(),
        run_ids: members
            .iter()
            .filter_map(|f| f.meta().run_id)
            .filter(|id| !id.is_empty())
            .collect(),
        failure_timestamps: timestamps,
        error_messages: members
            .iter()
            .map(|f| {
                f.error_message
                    .chars()
                    .take(ERROR_MESSAGE_PREVIEW_CHARS)
                    .collect()
            })
            .collect(),
    };

    FailureCluster {
        id,
        failure_pattern: failure_pattern(&patterns),
        assertion_pattern: assertion_pattern(&patterns),
        common_patterns: patterns,
        metadata,
        failures: members,
    }
}

/// Current calendar date in ISO form, the id prefix shared by every
/// cluster of the pass.
pub fn pass_base_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

/// Assemble clusters from DBSCAN index sets. Clusters below
/// `min_cluster_size` are discarded; survivors get ids
/// `{base_key}-{position}` in output order.
pub fn assemble_clusters(
    failures: &[TestFailure],
    index_sets: &[Vec<usize>],
    base_key: &str,
    min_cluster_size: usize,
) -> Vec<FailureCluster> {
    index_sets
        .iter()
        .filter(|set| set.len() >= min_cluster_size)
        .enumerate()
        .map(|(position, set)| {
            let mut members: Vec<TestFailure> =
                set.iter().map(|&i| failures[i].clone()).collect();
            // ascending by timestamp, stable tiebreak on id
            members.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
            build_cluster(members, format!("{base_key}-{position}"))
        })
        .collect()
}

/// Rank by member count descending (ties by id ascending) and keep the
/// first `max_clusters`; unset means return all.
pub fn rank_clusters(
    mut clusters: Vec<FailureCluster>,
    max_clusters: Option<usize>,
) -> Vec<FailureCluster> {
    clusters.sort_by(|a, b| {
        b.metadata
            .failure_count
            .cmp(&a.metadata.failure_count)
            .then_with(|| a.id.cmp(&b.id))
    });
    if let Some(max) = max_clusters {
        clusters.truncate(max);
    }
    clusters
}
