// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Integration tests for wvtest
//!
//! These tests feed complete protocol logs through classification,
//! aggregation and wrapping the way `wvtool format` does.

use similar_asserts::assert_eq;
use wvtest::junit::JunitRecorder;
use wvtest::{
    Aggregator, ClassifiedEvent, Emitted, FailureReason, Outcome, RunSummary, Termination,
    Verbosity, Verdict, classify, unwrap_chunks, wrap_line,
};

const SAMPLE_LOG: &str = r#"make[1]: Entering directory '/src/tests'
Testing "string helpers" in tests/strings.c:
! tests/strings.c:12 strlen("abc") == 3 ok
! tests/strings.c:13 strcmp("a", "b") < 0 ok
Testing "allocator" in tests/alloc.c:
allocating 1024 blocks
! tests/alloc.c:40 pool != NULL ok
! tests/alloc.c:41 used == 1024 FAILED
! tests/alloc.c:42 free_all() == 0 ok
"#;

fn run_log(log: &str, verbosity: Verbosity) -> (wvtest::RunResult, Vec<Emitted>) {
    let mut aggregator = Aggregator::with_verbosity("sample", verbosity);
    let mut emitted = Vec::new();
    for line in log.lines() {
        emitted.extend(aggregator.consume(classify(line)));
    }
    let (result, rest) = aggregator.finish(Termination::Unobserved);
    emitted.extend(rest);
    (result, emitted)
}

// ============================================================================
// Aggregation of complete logs
// ============================================================================

#[test]
fn test_sample_log_counts() {
    let (result, _) = run_log(SAMPLE_LOG, Verbosity::Full);
    assert_eq!(result.counters.checked(), 5);
    assert_eq!(result.counters.failed(), 1);
    assert_eq!(result.summary_line(), "Total: 5 tests, 1 failed");
    assert_eq!(result.verdict(), Verdict::Fail(vec![FailureReason::FailedChecks(1)]));

    let names: Vec<&str> = result.sections.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Preamble of sample", "string helpers", "allocator"]);
    assert_eq!(result.sections_failed(), 1);
}

#[test]
fn test_sample_log_summary_mode() {
    let (_, emitted) = run_log(SAMPLE_LOG, Verbosity::Summary);
    let text: Vec<String> = emitted.iter().map(ToString::to_string).collect();
    assert_eq!(
        text,
        vec![
            "! wvtool  Preamble of sample ok",
            "! tests/strings.c  string helpers ok",
            "! tests/alloc.c  allocator FAILED",
        ]
    );
}

#[test]
fn test_scenario_one_pass_one_fail() {
    let (result, _) = run_log("! step one ok\n! step two FAILED\n", Verbosity::Full);
    assert_eq!(result.summary_line(), "Total: 2 tests, 1 failed");
    assert_eq!(result.verdict().exit_code(), 1);
}

#[test]
fn test_scenario_empty_stream_fails() {
    let (result, emitted) = run_log("", Verbosity::Full);
    assert!(emitted.is_empty());
    assert_eq!(result.summary_line(), "Total: 0 tests, 0 failed");
    assert_eq!(result.verdict(), Verdict::Fail(vec![FailureReason::ZeroChecks]));
    assert_eq!(result.verdict().exit_code(), 1);
}

#[test]
fn test_two_streams_summed() {
    let (a, _) = run_log("! a1 ok\n! a2 ok\n! a3 ok\n", Verbosity::Full);
    let (b, _) = run_log("! b1 ok\n! b2 ok\n", Verbosity::Full);
    let summary = RunSummary::new(vec![a, b]);
    assert_eq!(summary.summary_line(), "Total: 5 tests, 0 failed");
    assert_eq!(summary.exit_code(), 0);
}

#[test]
fn test_reformatting_is_idempotent() {
    let (_, first) = run_log(SAMPLE_LOG, Verbosity::Full);
    let first_text: String = first.iter().map(|e| format!("{e}\n")).collect();
    let (_, second) = run_log(&first_text, Verbosity::Full);
    assert_eq!(first, second);
}

#[test]
fn test_failures_mode_only_collapses_passing_sections() {
    use similar::{ChangeTag, TextDiff};

    let render = |verbosity| {
        let (_, emitted) = run_log(SAMPLE_LOG, verbosity);
        emitted.iter().map(|e| format!("{e}\n")).collect::<String>()
    };
    let full = render(Verbosity::Full);
    let failures = render(Verbosity::Failures);

    let diff = TextDiff::from_lines(&full, &failures);
    let changed = |tag| {
        diff.iter_all_changes()
            .filter(|c| c.tag() == tag)
            .map(|c| c.value().trim_end().to_string())
            .collect::<Vec<_>>()
    };
    assert_eq!(
        changed(ChangeTag::Insert),
        vec![
            "! wvtool  Preamble of sample ok".to_string(),
            "! tests/strings.c  string helpers ok".to_string(),
        ]
    );
    // Preamble banner, its output, and the passing section with its checks
    assert_eq!(changed(ChangeTag::Delete).len(), 5);
    assert!(failures.contains("! tests/alloc.c:41 used == 1024 FAILED"));
}

#[test]
fn test_padded_log_lines_parse_back() {
    let padded = format!("! {:.<60} ok", "tests/x.c:1 thing ");
    match classify(&padded) {
        ClassifiedEvent::Result {
            description,
            outcome,
            ..
        } => {
            assert_eq!(description, "tests/x.c:1 thing");
            assert_eq!(outcome, Outcome::Pass);
        }
        other => panic!("expected Result, got {other:?}"),
    }
}

// ============================================================================
// Wrapping
// ============================================================================

#[test]
fn test_wrap_every_result_line_of_a_tagged_log() {
    for line in SAMPLE_LOG.lines() {
        let tagged = format!("(31337) {line}{}", " padding".repeat(12));
        for width in [20, 40, 80] {
            let chunks = wrap_line(&tagged, width);
            assert!(chunks.iter().all(|c| c.chars().count() <= width));
            assert!(chunks[1..].iter().all(|c| c.starts_with("(31337) ")));
            assert_eq!(unwrap_chunks(&chunks), tagged);
        }
    }
}

// ============================================================================
// JUnit export
// ============================================================================

#[test]
fn test_junit_report_from_sample_log() {
    let mut recorder = JunitRecorder::new("", "sample");
    for line in SAMPLE_LOG.lines() {
        recorder.observe(line, &classify(line));
    }
    let report = recorder.finish();
    assert_eq!(report.suites.len(), 3);
    assert_eq!(report.suites[2].name, "tests/alloc_c.allocator");
    assert_eq!(report.suites[2].failures(), 1);

    let xml = report.to_xml().expect("xml");
    assert_eq!(xml.matches("<testsuite ").count(), 3);
    assert_eq!(xml.matches("<testcase ").count(), 5);
    assert_eq!(xml.matches("<failure ").count(), 1);
}
