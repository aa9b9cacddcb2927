use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DetectError, Result};

/// Derived and caller-annotated fields of a failure. Every field is
/// independently optional; extraction never overwrites a present value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FailureMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite_name: Option<String>,
    /// Selector of the UI element the failing assertion targeted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    /// Assertion predicate name, e.g. `toBeVisible`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matcher: Option<String>,
    /// How long the runner waited, in milliseconds, before declaring failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Test runtime in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_value: Option<String>,
    /// CI run identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// URL of the CI report the failure came from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_link: Option<String>,
}

impl FailureMetadata {
    pub fn is_empty(&self) -> bool {
        *self == FailureMetadata::default()
    }
}

/// One observed failure of one test at one time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestFailure {
    /// Caller-supplied identifier, unique within a detection pass.
    pub id: String,
    pub test_title: String,
    pub test_file_path: String,
    pub error_message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_stack: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub metadata: Option<FailureMetadata>,
}

impl TestFailure {
    /// Metadata view, defaulting to the empty bag when absent.
    pub fn meta(&self) -> FailureMetadata {
        self.metadata.clone().unwrap_or_default()
    }
}

/// A failure paired with its embedding vector.
#[derive(Debug, Clone)]
pub struct EmbeddedFailure {
    pub failure: TestFailure,
    pub embedding: Vec<f32>,
}

/// Input validation: either every record is accepted or the pass fails
/// naming the first offending record and field. Non-mutating.
pub fn validate_failures(failures: &[TestFailure]) -> Result<()> {
    for (index, failure) in failures.iter().enumerate() {
        let who = if failure.id.is_empty() {
            format!("record at index {index}")
        } else {
            format!("record \"{}\"", failure.id)
        };
        if failure.id.is_empty() {
            return Err(DetectError::Validation(format!("{who}: id must not be empty")));
        }
        if failure.test_title.is_empty() {
            return Err(DetectError::Validation(format!(
                "{who}: testTitle must not be empty"
            )));
        }
        if failure.test_file_path.is_empty() {
            return Err(DetectError::Validation(format!(
                "{who}: testFilePath must not be empty"
            )));
        }
        if failure.error_message.is_empty() {
            return Err(DetectError::Validation(format!(
                "{who}: errorMessage must not be empty"
            )));
        }
    }
    Ok(())
}
