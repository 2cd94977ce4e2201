// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Information about the "login-suite" fixture: a small instrumentation suite run on two
//! emulators.

use crate::models::{FixtureStatus, TestFixture};
use chrono::{DateTime, FixedOffset};
use testfleet_metadata::{DeviceConfiguration, DeviceName, RunResult, TestStaticData};

pub const IGNORE_ANNOTATION: &str = "org.junit.Ignore";

pub static EXPECTED_TESTS: &[TestFixture] = &[
    TestFixture::new("com.example.login.LoginTest.signIn", FixtureStatus::Pass),
    TestFixture::new("com.example.login.LoginTest.signOut", FixtureStatus::Pass),
    TestFixture::new("com.example.login.LoginTest.wrongPassword", FixtureStatus::Fail),
    TestFixture::new(
        "com.example.login.LoginTest.rememberMe",
        FixtureStatus::Flaky { pass_attempt: 2 },
    ),
    TestFixture::new("com.example.feed.FeedTest.scroll", FixtureStatus::PreExistingFail),
    TestFixture::new("com.example.feed.FeedTest.refresh", FixtureStatus::Lost),
    TestFixture::new("com.example.feed.FeedTest.biometric", FixtureStatus::Pass).with_min_sdk(28),
    TestFixture::new("com.example.feed.FeedTest.legacy", FixtureStatus::Ignored)
        .with_annotations(&[IGNORE_ANNOTATION]),
];

pub fn devices() -> Vec<DeviceConfiguration> {
    vec![
        DeviceConfiguration {
            device: DeviceName::new("api24"),
            api: 24,
        },
        DeviceConfiguration {
            device: DeviceName::new("api29"),
            api: 29,
        },
    ]
}

pub fn timestamp() -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339("2024-03-01T12:00:00+00:00").expect("valid timestamp")
}

pub fn static_data() -> Vec<TestStaticData> {
    EXPECTED_TESTS.iter().map(|test| test.static_data()).collect()
}

/// Results recorded for the change under test, one per test that reports on each device.
pub fn run_results() -> Vec<RunResult> {
    results_with(TestFixture::run_result)
}

/// Results recorded when the suite is rerun on the target branch.
pub fn rerun_results() -> Vec<RunResult> {
    results_with(TestFixture::rerun_result)
}

fn results_with(
    f: impl Fn(&TestFixture, &DeviceConfiguration, DateTime<FixedOffset>) -> Option<RunResult>,
) -> Vec<RunResult> {
    let devices = devices();
    EXPECTED_TESTS
        .iter()
        .flat_map(|test| {
            devices
                .iter()
                .filter(|target| test.runs_on(target))
                .filter_map(|target| f(test, target, timestamp()))
                .collect::<Vec<_>>()
        })
        .collect()
}

/// The number of test instances the initial filter selects.
pub fn selected_count() -> usize {
    let devices = devices();
    EXPECTED_TESTS
        .iter()
        .map(|test| devices.iter().filter(|target| test.runs_on(target)).count())
        .sum()
}
