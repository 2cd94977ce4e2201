// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::ReportStoreError;
use testfleet_metadata::{RunResult, RunStatus};

/// A result from the main run, joined with the status of the same test on the target branch.
#[derive(Clone, Debug, PartialEq)]
pub struct ComparedResult {
    /// The result from the main run.
    pub result: RunResult,

    /// The status of the same signature on the target branch, if it was rerun there.
    pub on_target: Option<RunStatus>,
}

impl ComparedResult {
    /// Creates a result that wasn't rerun on the target branch.
    pub fn without_target(result: RunResult) -> Self {
        Self {
            result,
            on_target: None,
        }
    }

    /// Returns true if the test also failed on the target branch.
    pub fn is_pre_existing_failure(&self) -> bool {
        self.on_target == Some(RunStatus::Failed)
    }
}

/// Which failures were muted by configuration.
///
/// Suppression only affects whether the build fails. Reported data is unchanged.
#[derive(Clone, Debug, PartialEq)]
pub enum Suppression {
    /// No failures are suppressed.
    NotSuppressed,

    /// Every failure is suppressed.
    All,

    /// Failures that also fail on the target branch are suppressed.
    PreExisting {
        /// Failures that also fail on the target branch.
        suppressed: Vec<ComparedResult>,

        /// Failures introduced by this change.
        not_suppressed: Vec<ComparedResult>,
    },
}

/// Whether the run has failed tests.
#[derive(Clone, Debug)]
pub enum FailedVerdict {
    /// No test failed.
    NoFailed,

    /// Some tests failed.
    Failed {
        /// Every failed test.
        failed: Vec<ComparedResult>,

        /// Which failures are muted.
        suppression: Suppression,
    },

    /// Results could not be obtained, so failures could not be determined.
    DetermineError(ReportStoreError),
}

impl FailedVerdict {
    /// Returns true if this verdict fails the build.
    pub fn breaks_build(&self) -> bool {
        match self {
            Self::NoFailed => false,
            Self::Failed { suppression, .. } => match suppression {
                Suppression::NotSuppressed => true,
                Suppression::All => false,
                Suppression::PreExisting { not_suppressed, .. } => !not_suppressed.is_empty(),
            },
            Self::DetermineError(_) => true,
        }
    }

    /// Returns the failed tests, or an empty slice.
    pub fn failed(&self) -> &[ComparedResult] {
        match self {
            Self::Failed { failed, .. } => failed,
            Self::NoFailed | Self::DetermineError(_) => &[],
        }
    }

    /// Returns the number of failures that fail the build.
    pub fn unsuppressed_count(&self) -> usize {
        match self {
            Self::Failed { failed, suppression } => match suppression {
                Suppression::NotSuppressed => failed.len(),
                Suppression::All => 0,
                Suppression::PreExisting { not_suppressed, .. } => not_suppressed.len(),
            },
            Self::NoFailed | Self::DetermineError(_) => 0,
        }
    }
}

/// Determines whether a run has failed tests, honoring suppression flags.
#[derive(Copy, Clone, Debug, Default)]
pub struct FailedTestDeterminer {
    suppress_failure: bool,
    suppress_flaky: bool,
}

impl FailedTestDeterminer {
    /// Creates a new determiner.
    ///
    /// `suppress_failure` mutes every failure. `suppress_flaky` mutes failures whose rerun on the
    /// target branch also failed.
    pub fn new(suppress_failure: bool, suppress_flaky: bool) -> Self {
        Self {
            suppress_failure,
            suppress_flaky,
        }
    }

    /// Computes the verdict from results after target branch reruns.
    pub fn determine(
        &self,
        results_after_reruns: &Result<Vec<ComparedResult>, ReportStoreError>,
    ) -> FailedVerdict {
        let results = match results_after_reruns {
            Ok(results) => results,
            Err(error) => return FailedVerdict::DetermineError(error.clone()),
        };

        let failed: Vec<_> = results
            .iter()
            .filter(|compared| compared.result.status == RunStatus::Failed)
            .cloned()
            .collect();
        if failed.is_empty() {
            return FailedVerdict::NoFailed;
        }

        let suppression = if self.suppress_failure {
            Suppression::All
        } else if self.suppress_flaky {
            let (suppressed, not_suppressed) = failed
                .iter()
                .cloned()
                .partition(|compared| compared.is_pre_existing_failure());
            Suppression::PreExisting {
                suppressed,
                not_suppressed,
            }
        } else {
            Suppression::NotSuppressed
        };

        FailedVerdict::Failed {
            failed,
            suppression,
        }
    }
}
