// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{errors::WriteReportError, helpers::latest_by_signature, verdict::TestRunResult};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use quick_junit::{NonSuccessKind, Report, TestCase, TestCaseStatus, TestSuite};
use std::{collections::BTreeSet, fs::File};
use testfleet_metadata::{ReportCoordinates, RunResult, RunStatus, TestSignature};
use tracing::debug;

/// The name of the JUnit file written to the output directory.
pub const JUNIT_REPORT_FILE_NAME: &str = "junit-report.xml";

const ANY_DEVICE_SUITE: &str = "any-device";

/// Writes the results of a run as JUnit XML, with one test suite per device.
#[derive(Clone, Debug)]
pub struct JUnitReportWriter {
    output_dir: Utf8PathBuf,
}

impl JUnitReportWriter {
    /// Creates a writer that writes into `output_dir`.
    pub fn new(output_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Returns the path of the JUnit file.
    pub fn path(&self) -> Utf8PathBuf {
        self.output_dir.join(JUNIT_REPORT_FILE_NAME)
    }

    /// Writes the JUnit file and returns its path.
    pub fn write(
        &self,
        coordinates: &ReportCoordinates,
        result: &TestRunResult,
        viewer_url: Option<&str>,
    ) -> Result<Utf8PathBuf, WriteReportError> {
        let report = build_report(coordinates, result, viewer_url);
        let path = self.path();
        write_junit(&self.output_dir, &path, &report)?;
        debug!("wrote JUnit report to {path}");
        Ok(path)
    }
}

fn write_junit(dir: &Utf8Path, path: &Utf8Path, report: &Report) -> Result<(), WriteReportError> {
    std::fs::create_dir_all(dir).map_err(|err| WriteReportError::Fs {
        file: dir.to_owned(),
        err,
    })?;
    let f = File::create(path).map_err(|err| WriteReportError::Fs {
        file: path.to_owned(),
        err,
    })?;
    report.serialize(f).map_err(|err| WriteReportError::Junit {
        file: path.to_owned(),
        err,
    })
}

pub(crate) fn build_report(
    coordinates: &ReportCoordinates,
    result: &TestRunResult,
    viewer_url: Option<&str>,
) -> Report {
    let mut suites: IndexMap<String, TestSuite> = IndexMap::new();
    let lost_tests: BTreeSet<TestSignature> = result
        .not_reported()
        .lost_tests()
        .iter()
        .map(|lost| lost.signature())
        .collect();

    // Rows from earlier attempts of a test that is lost now are replaced by one lost case.
    for reported in latest_by_signature(result.reported_tests()) {
        if lost_tests.contains(&reported.signature) {
            continue;
        }
        let suite = suite_for(&mut suites, &reported.signature, viewer_url);
        suite.add_test_case(reported_test_case(&reported));
    }

    for lost in result.not_reported().lost_tests() {
        let signature = lost.signature();
        let mut status = TestCaseStatus::non_success(NonSuccessKind::Error);
        status
            .set_type("lost")
            .set_message("no result was reported for this test");
        let mut testcase = TestCase::new(signature.name.method_name(), status);
        testcase.set_classname(signature.name.class_name());
        suite_for(&mut suites, &signature, viewer_url).add_test_case(testcase);
    }

    let mut report = Report::new(format!("{}/{}", coordinates.component, coordinates.run_id));
    report.add_test_suites(suites.into_values());
    report
}

fn suite_for<'a>(
    suites: &'a mut IndexMap<String, TestSuite>,
    signature: &TestSignature,
    viewer_url: Option<&str>,
) -> &'a mut TestSuite {
    let key = signature
        .device_name
        .as_ref()
        .map_or(ANY_DEVICE_SUITE, |device| device.as_str());
    suites.entry(key.to_owned()).or_insert_with(|| {
        let mut suite = TestSuite::new(key);
        if let Some(url) = viewer_url {
            suite.add_property(("report-url", url));
        }
        suite
    })
}

fn reported_test_case(result: &RunResult) -> TestCase {
    let mut status = match result.status {
        RunStatus::Success => TestCaseStatus::success(),
        RunStatus::Failed => {
            let mut status = TestCaseStatus::non_success(NonSuccessKind::Failure);
            status.set_type("test failure");
            status
        }
        RunStatus::Lost => {
            let mut status = TestCaseStatus::non_success(NonSuccessKind::Error);
            status.set_type("lost");
            status
        }
        RunStatus::Skipped | RunStatus::Ignored => TestCaseStatus::skipped(),
    };
    if let Some(message) = &result.message {
        status.set_message(message.as_str());
    }

    let mut testcase = TestCase::new(result.signature.name.method_name(), status);
    testcase
        .set_classname(result.signature.name.class_name())
        .set_timestamp(result.timestamp);
    if let Some(duration) = result.duration {
        testcase.set_time(duration);
    }
    if result.attempts > 1 {
        testcase.set_system_out(format!("finished after {} attempts", result.attempts));
    }
    testcase
}
