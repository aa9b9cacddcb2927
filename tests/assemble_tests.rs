use chrono::{DateTime, Duration, TimeZone, Utc};
use flakescope::assemble;
use flakescope::failure::{FailureMetadata, TestFailure};

fn ts(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
}

fn failure(id: &str, hour: u32) -> TestFailure {
    TestFailure {
        id: id.to_string(),
        test_title: "Login button should be visible".to_string(),
        test_file_path: "tests/auth/login.spec.ts".to_string(),
        error_message: "Error: expect(locator).toBeVisible() failed".to_string(),
        error_stack: None,
        timestamp: ts(hour),
        metadata: None,
    }
}

fn with_meta(mut f: TestFailure, meta: FailureMetadata) -> TestFailure {
    f.metadata = Some(meta);
    f
}

#[test]
fn common_patterns_require_at_least_half_the_members() {
    let failures: Vec<TestFailure> = (0..5)
        .map(|i| {
            let locator = if i < 3 { "button.login" } else { "input.password" };
            with_meta(
                failure(&format!("f-{i}"), i),
                FailureMetadata {
                    locator: Some(locator.to_string()),
                    ..FailureMetadata::default()
                },
            )
        })
        .collect();
    let clusters =
        assemble::assemble_clusters(&failures, &[vec![0, 1, 2, 3, 4]], "2024-05-01", 1);
    // threshold for 5 members is 3: only the majority locator survives
    assert_eq!(clusters[0].common_patterns.locators, vec!["button.login"]);
}

#[test]
fn exactly_half_meets_the_threshold_for_even_sizes() {
    let failures: Vec<TestFailure> = (0..4)
        .map(|i| {
            let meta = if i < 2 {
                FailureMetadata {
                    matcher: Some("toBeVisible".to_string()),
                    ..FailureMetadata::default()
                }
            } else {
                FailureMetadata::default()
            };
            with_meta(failure(&format!("f-{i}"), i), meta)
        })
        .collect();
    let clusters = assemble::assemble_clusters(&failures, &[vec![0, 1, 2, 3]], "2024-05-01", 1);
    assert_eq!(clusters[0].common_patterns.matchers, vec!["toBeVisible"]);
}

#[test]
fn temporal_stats_cover_the_member_span() {
    let failures = vec![failure("b", 12), failure("a", 10), failure("c", 14)];
    let clusters = assemble::assemble_clusters(&failures, &[vec![0, 1, 2]], "2024-05-01", 1);
    let meta = &clusters[0].metadata;
    assert_eq!(meta.failure_count, 3);
    assert_eq!(meta.first_seen, ts(10));
    assert_eq!(meta.last_seen, ts(12) + Duration::hours(2));
    // two consecutive two-hour gaps
    assert_eq!(meta.average_time_between_failures, Some(7_200_000.0));
    assert_eq!(meta.failure_ids, vec!["a", "b", "c"]);
}

#[test]
fn singleton_clusters_have_no_average_gap() {
    let failures = vec![failure("a", 10)];
    let clusters = assemble::assemble_clusters(&failures, &[vec![0]], "2024-05-01", 1);
    assert_eq!(clusters[0].metadata.average_time_between_failures, None);
}

#[test]
fn failure_pattern_prefers_file_and_line() {
    let failures: Vec<TestFailure> = (0..2)
        .map(|i| {
            with_meta(
                failure(&format!("f-{i}"), i),
                FailureMetadata {
                    line_number: Some(42),
                    ..FailureMetadata::default()
                },
            )
        })
        .collect();
    let clusters = assemble::assemble_clusters(&failures, &[vec![0, 1]], "2024-05-01", 1);
    assert_eq!(
        clusters[0].failure_pattern,
        "Common failure at tests/auth/login.spec.ts:42"
    );
}

#[test]
fn failure_pattern_falls_back_to_snippet_with_truncation() {
    let snippet = "x".repeat(150);
    let failures: Vec<TestFailure> = (0..2)
        .map(|i| {
            with_meta(
                failure(&format!("f-{i}"), i),
                FailureMetadata {
                    error_snippet: Some(snippet.clone()),
                    ..FailureMetadata::default()
                },
            )
        })
        .collect();
    let clusters = assemble::assemble_clusters(&failures, &[vec![0, 1]], "2024-05-01", 1);
    assert_eq!(
        clusters[0].failure_pattern,
        format!("Common code pattern: {}...", "x".repeat(100))
    );
}

#[test]
fn failure_pattern_default_when_nothing_is_common() {
    // distinct file paths and no other metadata
    let mut a = failure("a", 10);
    a.test_file_path = "tests/a.spec.ts".to_string();
    let mut b = failure("b", 11);
    b.test_file_path = "tests/b.spec.ts".to_string();
    let clusters = assemble::assemble_clusters(&[a, b], &[vec![0, 1]], "2024-05-01", 1);
    assert_eq!(clusters[0].failure_pattern, "Similar test failures");
}

#[test]
fn assertion_pattern_variants() {
    let both: Vec<TestFailure> = (0..2)
        .map(|i| {
            with_meta(
                failure(&format!("f-{i}"), i),
                FailureMetadata {
                    locator: Some("button.login".to_string()),
                    matcher: Some("toBeVisible".to_string()),
                    timeout: Some(5000),
                    ..FailureMetadata::default()
                },
            )
        })
        .collect();
    let clusters = assemble::assemble_clusters(&both, &[vec![0, 1]], "2024-05-01", 1);
    assert_eq!(
        clusters[0].assertion_pattern.as_deref(),
        Some("toBeVisible on button.login (5000ms timeout)")
    );

    let locator_only: Vec<TestFailure> = (0..2)
        .map(|i| {
            with_meta(
                failure(&format!("f-{i}"), i),
                FailureMetadata {
                    locator: Some("button.login".to_string()),
                    ..FailureMetadata::default()
                },
            )
        })
        .collect();
    let clusters = assemble::assemble_clusters(&locator_only, &[vec![0, 1]], "2024-05-01", 1);
    assert_eq!(
        clusters[0].assertion_pattern.as_deref(),
        Some("Common locator: button.login")
    );

    let matcher_only: Vec<TestFailure> = (0..2)
        .map(|i| {
            with_meta(
                failure(&format!("f-{i}"), i),
                FailureMetadata {
                    matcher: Some("toHaveText".to_string()),
                    ..FailureMetadata::default()
                },
            )
        })
        .collect();
    let clusters = assemble::assemble_clusters(&matcher_only, &[vec![0, 1]], "2024-05-01", 1);
    assert_eq!(
        clusters[0].assertion_pattern.as_deref(),
        Some("Common matcher: toHaveText")
    );

    let neither = vec![failure("a", 10), failure("b", 11)];
    let clusters = assemble::assemble_clusters(&neither, &[vec![0, 1]], "2024-05-01", 1);
    assert_eq!(clusters[0].assertion_pattern, None);
}

#[test]
fn error_messages_are_capped_at_two_hundred_code_points() {
    let failures: Vec<TestFailure> = (0..2)
        .map(|i| {
            let mut f = failure(&format!("f-{i}"), i);
            f.error_message = "e".repeat(1000);
            f
        })
        .collect();
    let clusters = assemble::assemble_clusters(&failures, &[vec![0, 1]], "2024-05-01", 1);
    for message in &clusters[0].metadata.error_messages {
        assert_eq!(message.chars().count(), 200);
    }
}

#[test]
fn run_ids_preserve_multiplicity() {
    let failures: Vec<TestFailure> = (0..3)
        .map(|i| {
            with_meta(
                failure(&format!("f-{i}"), i),
                FailureMetadata {
                    run_id: Some(if i < 2 { "123" } else { "124" }.to_string()),
                    ..FailureMetadata::default()
                },
            )
        })
        .collect();
    let clusters = assemble::assemble_clusters(&failures, &[vec![0, 1, 2]], "2024-05-01", 1);
    assert_eq!(clusters[0].metadata.run_ids, vec!["123", "123", "124"]);
}

#[test]
fn small_clusters_are_discarded_and_ids_follow_output_order() {
    let failures: Vec<TestFailure> = (0..6).map(|i| failure(&format!("f-{i}"), i)).collect();
    let sets = vec![vec![0, 1, 2], vec![3], vec![4, 5]];
    let clusters = assemble::assemble_clusters(&failures, &sets, "2024-05-01", 2);
    assert_eq!(clusters.len(), 2);
    assert_eq!(clusters[0].id, "2024-05-01-0");
    assert_eq!(clusters[0].metadata.failure_count, 3);
    assert_eq!(clusters[1].id, "2024-05-01-1");
    assert_eq!(clusters[1].metadata.failure_count, 2);
}

#[test]
fn ranking_sorts_by_size_then_id_and_caps() {
    let failures: Vec<TestFailure> = (0..7).map(|i| failure(&format!("f-{i}"), i)).collect();
    let sets = vec![vec![0, 1], vec![2, 3, 4], vec![5, 6]];
    let assembled = assemble::assemble_clusters(&failures, &sets, "2024-05-01", 2);
    let ranked = assemble::rank_clusters(assembled, Some(2));
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].id, "2024-05-01-1"); // size 3 first
    assert_eq!(ranked[1].id, "2024-05-01-0"); // size-2 tie broken by id
}

#[test]
fn unset_cap_returns_everything() {
    let failures: Vec<TestFailure> = (0..4).map(|i| failure(&format!("f-{i}"), i)).collect();
    let sets = vec![vec![0, 1], vec![2, 3]];
    let assembled = assemble::assemble_clusters(&failures, &sets, "2024-05-01", 1);
    let ranked = assemble::rank_clusters(assembled, None);
    assert_eq!(ranked.len(), 2);
}

#[test]
fn pass_base_key_is_the_iso_date() {
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 23, 59, 59).unwrap();
    assert_eq!(assemble::pass_base_key(now), "2024-05-01");
}
