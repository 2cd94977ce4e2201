// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::{FixtureWorkspace, settings};
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use testfleet_metadata::{ReportId, RunStatus};
use testfleet_runner::{
    config::{IncludeExclude, ReportFilterSpec},
    report::LocalReportStore,
};

fn names(suite: &testfleet_runner::suite::TestSuite) -> BTreeSet<String> {
    suite
        .tests_to_run
        .iter()
        .map(|test| test.test.name.to_string())
        .collect()
}

#[test]
fn retry_skips_tests_that_already_passed() {
    let workspace = FixtureWorkspace::new();
    workspace.execute(&settings()).unwrap();

    let mut settings = settings();
    settings.filter.previous_statuses = IncludeExclude::new([], [RunStatus::Success]);
    let suite = workspace.plan(&settings).unwrap();

    assert_eq!(suite.tests_to_run.len(), 6);
    assert_eq!(
        names(&suite),
        [
            "com.example.feed.FeedTest.refresh",
            "com.example.feed.FeedTest.scroll",
            "com.example.login.LoginTest.wrongPassword",
        ]
        .into_iter()
        .map(str::to_owned)
        .collect::<BTreeSet<_>>()
    );
}

#[test]
fn report_filter_selects_failures_of_another_run() {
    let workspace = FixtureWorkspace::new();
    workspace.execute(&settings()).unwrap();

    let mut settings = settings();
    settings.filter.report = Some(ReportFilterSpec {
        id: LocalReportStore::report_id(&workspace.coordinates()),
        statuses: IncludeExclude::new([RunStatus::Failed], []),
    });
    let suite = workspace.plan(&settings).unwrap();

    assert_eq!(
        names(&suite),
        [
            "com.example.feed.FeedTest.scroll",
            "com.example.login.LoginTest.wrongPassword",
        ]
        .into_iter()
        .map(str::to_owned)
        .collect::<BTreeSet<_>>()
    );
}

#[test]
fn unknown_report_fails_planning() {
    let workspace = FixtureWorkspace::new();
    let mut settings = settings();
    settings.filter.report = Some(ReportFilterSpec {
        id: ReportId::new("not a report id"),
        statuses: IncludeExclude::new([RunStatus::Failed], []),
    });

    workspace
        .plan(&settings)
        .expect_err("an unreadable report can't be used to filter");
}
