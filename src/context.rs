//! Renders an enriched failure into the multi-line text blob used as
//! embedding input. Field order and punctuation are a wire contract:
//! changing them shifts every embedding.

use crate::failure::TestFailure;

/// Build the embedding context for one failure. `Test`, `File`, and `Error`
/// are always present; the remaining lines appear only when the underlying
/// field is set.
pub fn build_context(failure: &TestFailure) -> String {
    let meta = failure.meta();
    let mut lines: Vec<String> = Vec::with_capacity(12);

    lines.push(format!("Test: {}", failure.test_title));
    lines.push(format!("File: {}", failure.test_file_path));
    if let Some(project) = &meta.project_name {
        lines.push(format!("Project: {project}"));
    }
    if let Some(suite) = &meta.suite_name {
        lines.push(format!("Suite: {suite}"));
    }
    if let Some(line) = meta.line_number {
        lines.push(format!("Line: {line}"));
    }
    if let Some(locator) = &meta.locator {
        lines.push(format!("Locator: {locator}"));
    }
    if let Some(matcher) = &meta.matcher {
        lines.push(format!("Matcher: {matcher}"));
    }
    if let Some(actual) = &meta.actual_value {
        lines.push(format!("Actual: \"{actual}\""));
    }
    if let Some(expected) = &meta.expected_value {
        lines.push(format!("Expected: \"{expected}\""));
    }
    if let Some(timeout) = meta.timeout {
        lines.push(format!("Timeout: {timeout}ms"));
    }
    if let Some(snippet) = &meta.error_snippet {
        lines.push(format!("Code: {snippet}"));
    }
    lines.push(format!("Error: {}", failure.error_message));

    lines.join("\n")
}

/// Contexts for a batch, in input order.
pub fn build_contexts(failures: &[TestFailure]) -> Vec<String> {
    failures.iter().map(build_context).collect()
}
