// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::{FixtureWorkspace, settings};
use fixture_data::login_suite;
use pretty_assertions::assert_eq;
use testfleet_metadata::RunStatus;
use testfleet_runner::{
    config::IncludeExclude,
    report::{JUNIT_REPORT_FILE_NAME, VIEWER_REDIRECT_FILE_NAME},
    test_filter::{APPLIED_FILTER_FILE_NAME, FILTER_CONFIG_FILE_NAME},
    verdict::{FailedVerdict, Suppression},
};

#[test]
fn plan_selects_login_suite() {
    let workspace = FixtureWorkspace::new();
    let suite = workspace.plan(&settings()).unwrap();

    assert_eq!(suite.tests_to_run.len(), login_suite::selected_count());
    assert_eq!(suite.tests_to_run.len(), 13);
    let mut skipped: Vec<_> = suite
        .skipped_tests
        .iter()
        .map(|(test, _)| test.signature().to_string())
        .collect();
    skipped.sort();
    assert_eq!(
        skipped,
        vec![
            "com.example.feed.FeedTest.biometric (api24)",
            "com.example.feed.FeedTest.legacy (api24)",
            "com.example.feed.FeedTest.legacy (api29)",
        ]
    );

    assert!(workspace.output_dir().join(FILTER_CONFIG_FILE_NAME).exists());
    assert!(workspace.output_dir().join(APPLIED_FILTER_FILE_NAME).exists());
    assert!(
        workspace.stored_results(&workspace.coordinates()).is_empty(),
        "planning doesn't touch the report store"
    );
}

#[test]
fn run_with_rerun_on_target_branch() {
    let workspace = FixtureWorkspace::new();
    let mut settings = settings();
    settings.rerun_on_target_branch = true;
    settings.suppress_flaky = true;
    settings.report.viewer_url = Some("https://rv.example.com".to_owned());

    let outcome = workspace.execute(&settings).unwrap();

    assert_eq!(outcome.selected, 13);
    assert_eq!(outcome.skipped, 3);
    let verdict = outcome.result.verdict();
    assert!(!verdict.is_success());
    assert_eq!(verdict.message(), "2 tests failed, 2 tests lost");

    match outcome.result.failed() {
        FailedVerdict::Failed {
            failed,
            suppression:
                Suppression::PreExisting {
                    suppressed,
                    not_suppressed,
                },
        } => {
            assert_eq!(failed.len(), 4);
            assert!(
                suppressed.iter().all(|c| {
                    c.result.signature.name.as_str() == "com.example.feed.FeedTest.scroll"
                }),
                "failures on the target branch are suppressed"
            );
            assert!(
                not_suppressed.iter().all(|c| {
                    c.result.signature.name.as_str() == "com.example.login.LoginTest.wrongPassword"
                }),
                "new failures are not suppressed"
            );
        }
        other => panic!("expected pre-existing suppression, found {other:?}"),
    }

    let mut lost: Vec<_> = outcome
        .result
        .not_reported()
        .lost_tests()
        .iter()
        .map(|test| test.signature().to_string())
        .collect();
    lost.sort();
    assert_eq!(
        lost,
        vec![
            "com.example.feed.FeedTest.refresh (api24)",
            "com.example.feed.FeedTest.refresh (api29)",
        ]
    );

    assert_eq!(outcome.flaky_info.tests.len(), 2);
    assert!(
        outcome
            .flaky_info
            .tests
            .iter()
            .all(|t| t.signature.name.as_str() == "com.example.login.LoginTest.rememberMe")
    );

    let stored = workspace.stored_results(&workspace.coordinates());
    let lost_rows = stored
        .iter()
        .filter(|result| result.status == RunStatus::Lost)
        .count();
    assert_eq!(lost_rows, 2, "lost tests are written to the main report");
    let skipped_rows = stored
        .iter()
        .filter(|result| result.status == RunStatus::Skipped)
        .count();
    assert_eq!(skipped_rows, 3, "skipped tests are written to the main report");

    let target = workspace.stored_results(&workspace.coordinates().target_branch());
    assert!(
        target.iter().any(|result| {
            result.signature.name.as_str() == "com.example.feed.FeedTest.scroll"
                && result.status == RunStatus::Failed
        }),
        "target branch results are stored in their own report"
    );

    assert_eq!(
        outcome.viewer_url.as_deref(),
        Some("https://rv.example.com/report/app/run-1?onlyFailures=true")
    );
    assert_eq!(
        outcome.junit_path,
        workspace.output_dir().join(JUNIT_REPORT_FILE_NAME)
    );
    let junit = std::fs::read_to_string(&outcome.junit_path).unwrap();
    assert!(junit.contains("wrongPassword"), "{junit}");
    assert!(
        workspace
            .output_dir()
            .join(VIEWER_REDIRECT_FILE_NAME)
            .exists()
    );
}

#[test]
fn suppressed_failures_pass_without_lost_tests() {
    let workspace = FixtureWorkspace::new();
    let mut settings = settings();
    settings.suppress_failure = true;
    settings.filter.prefixes =
        IncludeExclude::new([], ["com.example.feed.FeedTest.refresh".to_owned()]);

    let outcome = workspace.execute(&settings).unwrap();

    assert_eq!(outcome.selected, 11);
    let verdict = outcome.result.verdict();
    assert!(verdict.is_success(), "{verdict}");
    assert_eq!(verdict.message(), "no new failures (4 failures suppressed)");
    assert!(outcome.viewer_url.is_none());

    let stored = workspace.stored_results(&workspace.coordinates());
    assert_eq!(
        stored
            .iter()
            .filter(|result| result.status == RunStatus::Failed)
            .count(),
        4,
        "suppression doesn't change reported data"
    );
    assert!(
        workspace
            .stored_results(&workspace.coordinates().target_branch())
            .is_empty(),
        "no rerun without rerun-on-target-branch"
    );
}
