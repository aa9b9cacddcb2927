//! Per-record enrichment: derives `FailureMetadata` fields from error text,
//! stack traces, and structured runner payloads.
//!
//! Extraction is a fixed, ordered list of rules. Each rule fills only fields
//! that are still empty, so caller-supplied metadata always wins and the
//! structured payload (rule 1) beats the regex heuristics that follow it.

use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use serde_json::Value;

use crate::failure::{FailureMetadata, TestFailure};

static RE_STACK_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"at\s+.*:(\d+):\d+").unwrap());

static RE_LOCATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?:getBy\w+|queryBy\w+|findBy\w+|selector|locator|xpath|css)\s*\(\s*(?:"([^"]+)"|'([^']+)')"#,
    )
    .unwrap()
});

static RE_MATCHER: Lazy<Regex> = Lazy::new(|| Regex::new(r"expect.*?\.(to\w+)").unwrap());

static RE_TIMEOUT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)timeout\s+(?:of\s+)?(\d+)\s*(ms|s)?\b").unwrap());

static RE_ACTUAL_QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)(?:received|actual|got):\s*"([^"]*)""#).unwrap());

static RE_EXPECTED_QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)(?:expected|should):\s*"([^"]*)""#).unwrap());

static RE_ACTUAL_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Actual:\s*([^\n]+)").unwrap());

static RE_EXPECTED_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Expected:\s*([^\n]+)").unwrap());

static RE_BACKTICK: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").unwrap());

static RE_RUN_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"/runs/(\d+)").unwrap());

// Snippet-driven assertion heuristics (best effort; rule 1 wins when both apply).
static RE_SNIPPET_LOCATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"expect\(\s*([A-Za-z_$][\w$.]*)\s*\)").unwrap());

static RE_SNIPPET_MATCHER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.([A-Za-z_]\w*)\s*\(").unwrap());

static RE_SNIPPET_EXPECTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\.[A-Za-z_]\w*\(\s*"([^"]*)""#).unwrap());

static RE_SNIPPET_TIMEOUT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"timeout:\s*(\d+)").unwrap());

/// Structured error payload some runners emit instead of plain text.
#[derive(Debug, Default)]
struct StructuredError {
    message: Option<String>,
    actual: Option<String>,
    expected: Option<String>,
    locator: Option<String>,
    matcher: Option<String>,
    timeout: Option<u64>,
    line: Option<u32>,
    snippets: Vec<String>,
}

fn value_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Rule 1 input: parse `errorMessage` as a structured object when it is one.
fn parse_structured(error_message: &str) -> Option<StructuredError> {
    let trimmed = error_message.trim_start();
    if !trimmed.starts_with('{') {
        return None;
    }
    let map = match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => map,
        _ => return None,
    };
    let mut out = StructuredError {
        message: map.get("message").and_then(value_to_string),
        actual: map.get("actual").and_then(value_to_string),
        expected: map.get("expected").and_then(value_to_string),
        locator: map.get("locator").and_then(value_to_string),
        matcher: map.get("matcher").and_then(value_to_string),
        timeout: map.get("timeout").and_then(Value::as_u64),
        ..StructuredError::default()
    };
    if let Some(Value::Object(location)) = map.get("location") {
        out.line = location.get("line").and_then(Value::as_u64).map(|n| n as u32);
    }
    match map.get("snippet") {
        Some(Value::String(s)) => out.snippets.push(s.clone()),
        Some(Value::Array(items)) => {
            for item in items {
                if let Value::String(s) = item {
                    out.snippets.push(s.clone());
                }
            }
        }
        _ => {}
    }
    Some(out)
}

/// Rule 1: copy structured payload fields into the gaps.
fn apply_structured(structured: &StructuredError, meta: &mut FailureMetadata) {
    if meta.actual_value.is_none() {
        meta.actual_value = structured.actual.clone();
    }
    if meta.expected_value.is_none() {
        meta.expected_value = structured.expected.clone();
    }
    if meta.locator.is_none() {
        meta.locator = structured.locator.clone();
    }
    if meta.matcher.is_none() {
        meta.matcher = structured.matcher.clone();
    }
    if meta.timeout.is_none() {
        meta.timeout = structured.timeout;
    }
    if meta.line_number.is_none() {
        meta.line_number = structured.line;
    }
    if meta.error_snippet.is_none() && !structured.snippets.is_empty() {
        meta.error_snippet = Some(structured.snippets.join("\n"));
    }
}

/// Rule 2: best-effort assertion parsing from code snippets.
fn apply_snippet_assertions(snippets: &[String], meta: &mut FailureMetadata) {
    for snippet in snippets {
        if meta.locator.is_none() {
            if let Some(cap) = RE_SNIPPET_LOCATOR.captures(snippet) {
                meta.locator = Some(cap[1].to_string());
            }
        }
        if meta.matcher.is_none() {
            if let Some(cap) = RE_SNIPPET_MATCHER.captures(snippet) {
                meta.matcher = Some(cap[1].to_string());
            }
        }
        if meta.expected_value.is_none() {
            if let Some(cap) = RE_SNIPPET_EXPECTED.captures(snippet) {
                meta.expected_value = Some(cap[1].to_string());
            }
        }
        if meta.timeout.is_none() {
            if let Some(cap) = RE_SNIPPET_TIMEOUT.captures(snippet) {
                meta.timeout = cap[1].parse().ok();
            }
        }
    }
}

/// Rule 3: first `at file:line:col` frame of the stack.
fn apply_stack_line(stack: &str, meta: &mut FailureMetadata) {
    if meta.line_number.is_some() {
        return;
    }
    if let Some(cap) = RE_STACK_LINE.captures(stack) {
        meta.line_number = cap[1].parse().ok();
    }
}

/// Rule 4: quoted selector following a locator-builder call.
fn apply_locator(message: &str, meta: &mut FailureMetadata) {
    if meta.locator.is_some() {
        return;
    }
    if let Some(cap) = RE_LOCATOR.captures(message) {
        let inner = cap.get(1).or_else(|| cap.get(2));
        meta.locator = inner.map(|m| m.as_str().to_string());
    }
}

/// Rule 5: `expect(..).toSomething` predicate name.
fn apply_matcher(message: &str, meta: &mut FailureMetadata) {
    if meta.matcher.is_some() {
        return;
    }
    if let Some(cap) = RE_MATCHER.captures(message) {
        meta.matcher = Some(cap[1].to_string());
    }
}

/// Rule 6: "timeout of 5000ms" / "timeout 30s"; seconds scale to ms.
fn apply_timeout(message: &str, meta: &mut FailureMetadata) {
    if meta.timeout.is_some() {
        return;
    }
    if let Some(cap) = RE_TIMEOUT.captures(message) {
        let number: Option<u64> = cap[1].parse().ok();
        let unit_is_secs = cap
            .get(2)
            .map(|m| m.as_str().eq_ignore_ascii_case("s"))
            .unwrap_or(false);
        meta.timeout = number.map(|n| if unit_is_secs { n * 1000 } else { n });
    }
}

/// Rule 7: assertion operands, quoted form first, line-oriented fallback.
fn apply_operands(message: &str, meta: &mut FailureMetadata) {
    if meta.actual_value.is_none() {
        if let Some(cap) = RE_ACTUAL_QUOTED.captures(message) {
            meta.actual_value = Some(cap[1].to_string());
        } else if let Some(cap) = RE_ACTUAL_LINE.captures(message) {
            meta.actual_value = Some(cap[1].trim().to_string());
        }
    }
    if meta.expected_value.is_none() {
        if let Some(cap) = RE_EXPECTED_QUOTED.captures(message) {
            meta.expected_value = Some(cap[1].to_string());
        } else if let Some(cap) = RE_EXPECTED_LINE.captures(message) {
            meta.expected_value = Some(cap[1].trim().to_string());
        }
    }
}

/// Rule 8: backtick-enclosed span as a code snippet of last resort.
fn apply_backtick_snippet(message: &str, meta: &mut FailureMetadata) {
    if meta.error_snippet.is_some() {
        return;
    }
    if let Some(cap) = RE_BACKTICK.captures(message) {
        let inner = cap[1].trim();
        if !inner.is_empty() {
            meta.error_snippet = Some(inner.to_string());
        }
    }
}

/// Rule 9: CI run id from the report link.
fn apply_run_id(meta: &mut FailureMetadata) {
    if meta.run_id.is_some() {
        return;
    }
    if let Some(link) = meta.report_link.as_deref() {
        if let Some(cap) = RE_RUN_ID.captures(link) {
            meta.run_id = Some(cap[1].to_string());
        }
    }
}

/// Derive metadata for one failure. Returns a new record; the input is
/// untouched and fields already present in its metadata are preserved.
pub fn enrich(failure: &TestFailure) -> TestFailure {
    let mut meta = failure.meta();

    let structured = parse_structured(&failure.error_message);
    if let Some(s) = &structured {
        apply_structured(s, &mut meta);
    }
    // The structured message, when present, is the text the regex rules see.
    let message: &str = structured
        .as_ref()
        .and_then(|s| s.message.as_deref())
        .unwrap_or(&failure.error_message);

    let snippets: Vec<String> = match &structured {
        Some(s) if !s.snippets.is_empty() => s.snippets.clone(),
        _ => meta
            .error_snippet
            .as_deref()
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default(),
    };
    apply_snippet_assertions(&snippets, &mut meta);

    if let Some(stack) = failure.error_stack.as_deref() {
        apply_stack_line(stack, &mut meta);
    }
    apply_locator(message, &mut meta);
    apply_matcher(message, &mut meta);
    apply_timeout(message, &mut meta);
    apply_operands(message, &mut meta);
    apply_backtick_snippet(message, &mut meta);
    apply_run_id(&mut meta);

    let mut enriched = failure.clone();
    enriched.metadata = if meta.is_empty() { None } else { Some(meta) };
    enriched
}

/// Enrich a batch in parallel, preserving input order.
pub fn enrich_all(failures: &[TestFailure]) -> Vec<TestFailure> {
    failures.par_iter().map(enrich).collect()
}
