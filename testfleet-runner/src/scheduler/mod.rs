// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduling a test run.
//!
//! A scheduler loads the test suite, applies the initial filter, dispatches the remaining tests
//! to a [`TestExecutor`](crate::executor::TestExecutor), collects results and optionally reruns
//! the suite on the target branch. Both strategies, [`InstrumentationTestsScheduler`] and
//! [`PerformanceTestsScheduler`], move through the same linear sequence of
//! [`SchedulerState`]s.

mod instrumentation;
mod performance;
mod runner;

pub use instrumentation::*;
pub use performance::*;
pub use runner::*;

use crate::{
    config::RunSettings,
    errors::{ReportStoreError, SchedulerError},
    executor::{ExecutionRequest, RunType, TestArtifacts, TestExecutor},
    report::{CreateParams, Report, ReportStore},
    suite::{TestSuite, TestSuiteLoader},
    test_filter::FilterFactory,
    verdict::ComparedResult,
};
use camino::{Utf8Path, Utf8PathBuf};
use debug_ignore::DebugIgnore;
use serde::Serialize;
use std::{fmt, future::Future, time::Duration};
use testfleet_metadata::{ReportCoordinates, RunResult, TestSignature, TestWithTarget};
use tracing::{debug, info, warn};

/// A stage of a scheduler run. Runs only move forward.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum SchedulerState {
    /// Nothing has happened yet.
    Idle,

    /// The test suite was loaded.
    SuiteLoaded,

    /// The initial filter was applied.
    Filtered,

    /// Tests were handed to the executor and it finished.
    Dispatched,

    /// Results were read back from the report.
    ResultsCollected,

    /// The suite was rerun on the target branch.
    ReranOnTarget,

    /// The scheduler result is ready.
    Finalized,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::SuiteLoaded => "suite-loaded",
            Self::Filtered => "filtered",
            Self::Dispatched => "dispatched",
            Self::ResultsCollected => "results-collected",
            Self::ReranOnTarget => "reran-on-target",
            Self::Finalized => "finalized",
        };
        f.write_str(s)
    }
}

/// Tracks the state of a scheduler run.
#[derive(Debug)]
pub(crate) struct SchedulerProgress {
    state: SchedulerState,
}

impl SchedulerProgress {
    pub(crate) fn new() -> Self {
        Self {
            state: SchedulerState::Idle,
        }
    }

    pub(crate) fn state(&self) -> SchedulerState {
        self.state
    }

    /// Moves to `to`, which must come after the current state. States may be skipped.
    pub(crate) fn advance(&mut self, to: SchedulerState) -> Result<(), SchedulerError> {
        if to <= self.state {
            return Err(SchedulerError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        debug!("scheduler: {} -> {to}", self.state);
        self.state = to;
        Ok(())
    }
}

/// Whether the APKs built from the target branch commit can be used for reruns.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BuildOnTargetCommitResult {
    /// Both APKs exist.
    Ok(TestArtifacts),

    /// At least one APK is missing or empty.
    ApksUnavailable,
}

impl BuildOnTargetCommitResult {
    /// Checks that both APKs exist and aren't empty.
    pub fn from_paths(main_apk: &Utf8Path, test_apk: &Utf8Path) -> Self {
        let usable = |path: &Utf8Path| {
            path.metadata()
                .is_ok_and(|metadata| metadata.is_file() && metadata.len() > 0)
        };
        if usable(main_apk) && usable(test_apk) {
            Self::Ok(TestArtifacts {
                main_apk: main_apk.to_owned(),
                test_apk: test_apk.to_owned(),
            })
        } else {
            Self::ApksUnavailable
        }
    }

    /// Returns the artifacts, if available.
    pub fn artifacts(&self) -> Option<&TestArtifacts> {
        match self {
            Self::Ok(artifacts) => Some(artifacts),
            Self::ApksUnavailable => None,
        }
    }
}

/// A test that passed only after executor retries.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FlakyTest {
    /// The test.
    pub signature: TestSignature,

    /// The number of attempts, including the successful one.
    pub attempts: u32,

    /// The time spent on failed attempts, estimated from the average attempt duration.
    #[serde(with = "humantime_serde")]
    pub wasted_time: Option<Duration>,
}

/// Tests that passed only after executor retries.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FlakyInfo {
    /// The flaky tests, in the order their results arrived.
    pub tests: Vec<FlakyTest>,
}

impl FlakyInfo {
    /// Collects flaky tests from terminal results.
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a RunResult>) -> Self {
        let tests = results
            .into_iter()
            .filter(|result| result.is_retried_success())
            .map(|result| FlakyTest {
                signature: result.signature.clone(),
                attempts: result.attempts,
                wasted_time: result
                    .duration
                    .map(|duration| duration / result.attempts * (result.attempts - 1)),
            })
            .collect();
        Self { tests }
    }

    /// Returns the total estimated time spent on failed attempts.
    pub fn total_wasted_time(&self) -> Duration {
        self.tests.iter().filter_map(|test| test.wasted_time).sum()
    }
}

/// The result of scheduling a run.
#[derive(Clone, Debug)]
pub struct SchedulerResult {
    /// The filtered suite.
    pub initial_test_suite: TestSuite,

    /// The results read from the main report after dispatch.
    pub initial_tests_result: Result<Vec<RunResult>, ReportStoreError>,

    /// The latest result per test, joined with target branch reruns when they happened.
    pub test_results_after_branch_reruns: Result<Vec<ComparedResult>, ReportStoreError>,

    /// Tests that passed after retries.
    pub flaky_info: FlakyInfo,

    /// Metric comparisons, for performance runs.
    pub performance: Option<PerformanceSummary>,
}

/// Inputs of a scheduler run besides its collaborators.
#[derive(Clone, Debug)]
pub struct SchedulerInputs {
    /// The test suite manifest.
    pub suite: Utf8PathBuf,

    /// The APKs built from the change under test.
    pub artifacts: TestArtifacts,

    /// The APKs built from the target branch.
    pub target: BuildOnTargetCommitResult,

    /// Metadata for reports the scheduler creates.
    pub create_params: CreateParams,
}

/// The collaborators and settings a scheduler works with.
#[derive(Debug)]
pub struct SchedulerContext<'a, S, L, E> {
    store: DebugIgnore<&'a S>,
    loader: DebugIgnore<&'a L>,
    executor: DebugIgnore<&'a E>,
    settings: &'a RunSettings,
    coordinates: ReportCoordinates,
    inputs: SchedulerInputs,
}

impl<'a, S, L, E> SchedulerContext<'a, S, L, E>
where
    S: ReportStore,
    L: TestSuiteLoader,
    E: TestExecutor,
{
    /// Creates a new context. Results are written to the report at `coordinates`.
    pub fn new(
        store: &'a S,
        loader: &'a L,
        executor: &'a E,
        settings: &'a RunSettings,
        coordinates: ReportCoordinates,
        inputs: SchedulerInputs,
    ) -> Self {
        Self {
            store: DebugIgnore(store),
            loader: DebugIgnore(loader),
            executor: DebugIgnore(executor),
            settings,
            coordinates,
            inputs,
        }
    }

    /// Returns the run settings.
    pub fn settings(&self) -> &'a RunSettings {
        self.settings
    }

    /// Returns the handle of the main report.
    pub fn main_report(&self) -> Report<'a, S> {
        Report::new(*self.store, self.coordinates.clone(), &self.settings.report)
    }

    /// Returns the handle of the report for target branch reruns of this build.
    pub fn target_report(&self) -> Report<'a, S> {
        Report::new(
            *self.store,
            self.coordinates.target_branch(),
            &self.settings.report,
        )
    }

    /// Returns the coordinates of the main report.
    pub fn coordinates(&self) -> &ReportCoordinates {
        &self.coordinates
    }

    pub(crate) fn store(&self) -> &'a S {
        *self.store
    }

    pub(crate) fn inputs(&self) -> &SchedulerInputs {
        &self.inputs
    }

    /// Loads the suite, builds the initial filter and applies it. Skipped tests are reported if
    /// configured.
    pub(crate) async fn load_and_filter(
        &self,
        progress: &mut SchedulerProgress,
        report: &Report<'a, S>,
    ) -> Result<TestSuite, SchedulerError> {
        let tests = self.loader.load(&self.inputs.suite).await?;
        progress.advance(SchedulerState::SuiteLoaded)?;

        let filter =
            FilterFactory::new(&self.settings.filter, self.coordinates.clone(), *self.store)
                .create_initial_filter()
                .await?;
        let suite = TestSuite::new(&tests, &self.settings.targets, filter);
        if self.settings.report_skipped_tests {
            report.send_skipped_tests(&suite.skipped_tests).await;
        }
        progress.advance(SchedulerState::Filtered)?;
        Ok(suite)
    }

    /// Runs `tests` and records their results into `report`.
    pub(crate) async fn dispatch(
        &self,
        run_type: RunType,
        tests: &[TestWithTarget],
        artifacts: &TestArtifacts,
        report: &Report<'a, S>,
    ) -> Result<CollectedResults, SchedulerError> {
        let request = ExecutionRequest {
            run_type,
            tests: tests.to_vec(),
            artifacts: artifacts.clone(),
            targets: self.settings.targets.clone(),
            params: self.settings.execution.clone(),
        };
        info!("dispatching {} tests ({run_type})", request.tests.len());
        let collected = TestsRunner::new(*self.executor, report).run(request).await?;
        Ok(collected)
    }

    /// Returns the target branch artifacts if reruns are enabled and possible.
    pub(crate) fn rerun_artifacts(&self) -> Option<&TestArtifacts> {
        if !self.settings.rerun_on_target_branch {
            return None;
        }
        let artifacts = self.inputs.target.artifacts();
        if artifacts.is_none() {
            warn!("rerun on target branch requested, but target branch APKs are unavailable");
        }
        artifacts
    }
}

/// A strategy for scheduling a run.
pub trait TestsScheduler {
    /// Runs the schedule to completion.
    fn schedule(&self) -> impl Future<Output = Result<SchedulerResult, SchedulerError>>;
}
