// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::ReportStoreError;
use std::collections::HashSet;
use testfleet_metadata::{RunResult, RunStatus, TestWithTarget};

/// Why tests are missing from a report.
#[derive(Clone, Debug)]
pub enum MissingCause {
    /// The report was read but the tests have no result in it.
    NotReported,

    /// The report could not be read, so every test is considered missing.
    QueryFailed(ReportStoreError),
}

/// Whether every dispatched test has a result in the report.
#[derive(Clone, Debug)]
pub enum MissingVerdict {
    /// Every test reported.
    NoMissing,

    /// Some tests are missing.
    HasMissing {
        /// The tests without a result.
        lost_tests: Vec<TestWithTarget>,

        /// Why they're missing.
        cause: MissingCause,
    },
}

impl MissingVerdict {
    /// Returns the lost tests, or an empty slice.
    pub fn lost_tests(&self) -> &[TestWithTarget] {
        match self {
            Self::NoMissing => &[],
            Self::HasMissing { lost_tests, .. } => lost_tests,
        }
    }
}

/// Computes which dispatched tests never reported a result.
#[derive(Copy, Clone, Debug, Default)]
pub struct LostTestDeterminer;

impl LostTestDeterminer {
    /// Compares the tests that were dispatched with the results read from the report.
    ///
    /// A test is reported if the report has a result with its signature, other than one marking
    /// it lost. If the report couldn't be read, every test is lost.
    pub fn determine(
        &self,
        run_result: &Result<Vec<RunResult>, ReportStoreError>,
        all_tests: &[TestWithTarget],
    ) -> MissingVerdict {
        let (lost_tests, cause) = match run_result {
            Ok(results) => {
                let reported: HashSet<_> = results
                    .iter()
                    .filter(|result| result.status != RunStatus::Lost)
                    .map(|result| &result.signature)
                    .collect();
                let lost_tests: Vec<_> = all_tests
                    .iter()
                    .filter(|test| !reported.contains(&test.signature()))
                    .cloned()
                    .collect();
                (lost_tests, MissingCause::NotReported)
            }
            Err(error) => (all_tests.to_vec(), MissingCause::QueryFailed(error.clone())),
        };

        if lost_tests.is_empty() {
            MissingVerdict::NoMissing
        } else {
            MissingVerdict::HasMissing { lost_tests, cause }
        }
    }
}
