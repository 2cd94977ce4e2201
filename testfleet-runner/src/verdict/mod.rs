// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deciding whether a test run passes.
//!
//! A [`TestRunResult`] is assembled once at the end of a run from a [`FailedVerdict`] and a
//! [`MissingVerdict`], and the final [`Verdict`] is computed from them at construction.

mod failed;
mod lost;

pub use failed::*;
pub use lost::*;

use crate::{errors::ReportStoreError, helpers::plural};
use std::fmt;
use testfleet_metadata::RunResult;

/// The final outcome of a test run.
#[derive(Clone, Debug)]
pub enum Verdict {
    /// The run passed.
    Success {
        /// A human readable summary.
        message: String,
    },

    /// The run failed.
    Failed {
        /// A human readable summary.
        message: String,

        /// The report store error that prevented the run from being checked, if any.
        cause: Option<ReportStoreError>,
    },
}

impl Verdict {
    /// Returns true if this is a success.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Returns the summary message.
    pub fn message(&self) -> &str {
        match self {
            Self::Success { message } | Self::Failed { message, .. } => message,
        }
    }

    /// Returns the report store error that caused a failure, if any.
    pub fn cause(&self) -> Option<&ReportStoreError> {
        match self {
            Self::Success { .. } => None,
            Self::Failed { cause, .. } => cause.as_ref(),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { message } => write!(f, "success: {message}"),
            Self::Failed { message, .. } => write!(f, "failed: {message}"),
        }
    }
}

/// Everything known about a finished test run.
#[derive(Clone, Debug)]
pub struct TestRunResult {
    reported_tests: Vec<RunResult>,
    failed: FailedVerdict,
    not_reported: MissingVerdict,
    verdict: Verdict,
}

impl TestRunResult {
    /// Assembles the result of a run and computes its verdict.
    ///
    /// The run fails if failures break the build or if any test is missing.
    pub fn new(
        reported_tests: Vec<RunResult>,
        failed: FailedVerdict,
        not_reported: MissingVerdict,
    ) -> Self {
        let verdict = compute_verdict(&failed, &not_reported);
        Self {
            reported_tests,
            failed,
            not_reported,
            verdict,
        }
    }

    /// Returns the results read from the report.
    pub fn reported_tests(&self) -> &[RunResult] {
        &self.reported_tests
    }

    /// Returns the failed test verdict.
    pub fn failed(&self) -> &FailedVerdict {
        &self.failed
    }

    /// Returns the missing test verdict.
    pub fn not_reported(&self) -> &MissingVerdict {
        &self.not_reported
    }

    /// Returns the final verdict.
    pub fn verdict(&self) -> &Verdict {
        &self.verdict
    }
}

fn compute_verdict(failed: &FailedVerdict, not_reported: &MissingVerdict) -> Verdict {
    let mut problems = Vec::new();
    let mut cause = None;

    match failed {
        FailedVerdict::DetermineError(error) => {
            problems.push("can't determine failed tests".to_owned());
            cause = Some(error.clone());
        }
        failed if failed.breaks_build() => {
            let count = failed.unsuppressed_count();
            problems.push(format!("{count} {} failed", plural::tests_str(count)));
        }
        _ => {}
    }

    if let MissingVerdict::HasMissing { lost_tests, cause: missing_cause } = not_reported {
        let count = lost_tests.len();
        problems.push(format!("{count} {} lost", plural::tests_str(count)));
        if let (None, MissingCause::QueryFailed(error)) = (&cause, missing_cause) {
            cause = Some(error.clone());
        }
    }

    if !problems.is_empty() {
        return Verdict::Failed {
            message: problems.join(", "),
            cause,
        };
    }

    let message = match failed {
        FailedVerdict::Failed { failed, .. } => {
            let count = failed.len();
            format!(
                "no new failures ({count} {} suppressed)",
                plural::failures_str(count)
            )
        }
        FailedVerdict::NoFailed | FailedVerdict::DetermineError(_) => {
            "all tests passed".to_owned()
        }
    };
    Verdict::Success { message }
}
