// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The end-to-end flow of an instrumentation test run.
//!
//! [`InstrumentationTestsAction`] creates the main report, runs a scheduler, determines lost and
//! failed tests, writes JUnit and filter diagnostics to the output directory, finishes the report
//! and sends notifications. The returned [`ActionOutcome`] carries the final
//! [`TestRunResult`].

use crate::{
    config::RunSettings,
    errors::{ActionError, DisplayErrorChain, SchedulerError},
    executor::{TestArtifacts, TestExecutor},
    notify::Notifier,
    report::{CreateParams, JUnitReportWriter, Report, ReportStore, ReportViewer},
    scheduler::{
        BuildOnTargetCommitResult, FlakyInfo, InstrumentationTestsScheduler,
        PerformanceSummary, PerformanceTestsScheduler, SchedulerContext, SchedulerInputs,
        SchedulerResult, TestsScheduler,
    },
    suite::{TestSuite, TestSuiteLoader},
    test_filter::{FilterFactory, FilterInfoWriter},
    verdict::{
        FailedTestDeterminer, FailedVerdict, LostTestDeterminer, MissingVerdict, TestRunResult,
    },
};
use camino::Utf8PathBuf;
use debug_ignore::DebugIgnore;
use testfleet_metadata::ReportCoordinates;
use tracing::{error, info, warn};

/// Where a run reads its inputs from and writes its outputs to.
#[derive(Clone, Debug)]
pub struct ActionInputs {
    /// The report to record results into.
    pub coordinates: ReportCoordinates,

    /// The test suite manifest.
    pub suite: Utf8PathBuf,

    /// The APKs built from the change under test.
    pub artifacts: TestArtifacts,

    /// The APKs built from the target branch. They're checked before use.
    pub target_artifacts: TestArtifacts,

    /// Metadata for the reports the run creates.
    pub create_params: CreateParams,

    /// The directory for JUnit output, filter diagnostics and the viewer link.
    pub output_dir: Utf8PathBuf,
}

/// What a finished run produced.
#[derive(Clone, Debug)]
pub struct ActionOutcome {
    /// The reported results and the verdict.
    pub result: TestRunResult,

    /// The number of tests selected to run.
    pub selected: usize,

    /// The number of tests the filter skipped.
    pub skipped: usize,

    /// Tests that passed after retries.
    pub flaky_info: FlakyInfo,

    /// Metric comparisons, for performance runs.
    pub performance: Option<PerformanceSummary>,

    /// The JUnit file.
    pub junit_path: Utf8PathBuf,

    /// The report viewer URL, if a viewer is configured.
    pub viewer_url: Option<String>,
}

/// Runs instrumentation tests from start to finish.
#[derive(Debug)]
pub struct InstrumentationTestsAction<'a, S, L, E, N> {
    store: DebugIgnore<&'a S>,
    loader: DebugIgnore<&'a L>,
    executor: DebugIgnore<&'a E>,
    notifier: DebugIgnore<&'a N>,
    settings: &'a RunSettings,
    inputs: ActionInputs,
}

impl<'a, S, L, E, N> InstrumentationTestsAction<'a, S, L, E, N>
where
    S: ReportStore,
    L: TestSuiteLoader,
    E: TestExecutor,
    N: Notifier,
{
    /// Creates a new action.
    pub fn new(
        store: &'a S,
        loader: &'a L,
        executor: &'a E,
        notifier: &'a N,
        settings: &'a RunSettings,
        inputs: ActionInputs,
    ) -> Self {
        Self {
            store: DebugIgnore(store),
            loader: DebugIgnore(loader),
            executor: DebugIgnore(executor),
            notifier: DebugIgnore(notifier),
            settings,
            inputs,
        }
    }

    /// Runs the action on a new tokio runtime.
    pub fn execute(&self) -> Result<ActionOutcome, ActionError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("testfleet-worker")
            .build()
            .map_err(ActionError::TokioRuntimeCreate)?;
        runtime.block_on(self.run())
    }

    /// Loads the suite and applies the initial filter without dispatching anything.
    ///
    /// Filter diagnostics are written to the output directory.
    pub fn plan(&self) -> Result<TestSuite, ActionError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ActionError::TokioRuntimeCreate)?;
        runtime.block_on(self.plan_async())
    }

    pub(crate) async fn plan_async(&self) -> Result<TestSuite, ActionError> {
        let info_writer = FilterInfoWriter::new(&self.inputs.output_dir);
        info_writer.write_filter_config(&self.settings.filter)?;

        let tests = self
            .loader
            .load(&self.inputs.suite)
            .await
            .map_err(SchedulerError::from)?;
        let filter = FilterFactory::new(
            &self.settings.filter,
            self.inputs.coordinates.clone(),
            *self.store,
        )
        .create_initial_filter()
        .await
        .map_err(SchedulerError::from)?;
        let suite = TestSuite::new(&tests, &self.settings.targets, filter);

        write_filter_info(&info_writer, &suite)?;
        Ok(suite)
    }

    /// Runs the action on the current runtime.
    pub async fn run(&self) -> Result<ActionOutcome, ActionError> {
        let settings = self.settings;
        let coordinates = &self.inputs.coordinates;
        let output_dir = &self.inputs.output_dir;
        info!(
            "running configuration `{}` into {coordinates}",
            settings.configuration
        );

        let main_report = Report::new(*self.store, coordinates.clone(), &settings.report);
        main_report.try_create(&self.inputs.create_params).await;

        let info_writer = FilterInfoWriter::new(output_dir);
        info_writer.write_filter_config(&settings.filter)?;

        let target = BuildOnTargetCommitResult::from_paths(
            &self.inputs.target_artifacts.main_apk,
            &self.inputs.target_artifacts.test_apk,
        );
        let context = SchedulerContext::new(
            *self.store,
            *self.loader,
            *self.executor,
            settings,
            coordinates.clone(),
            SchedulerInputs {
                suite: self.inputs.suite.clone(),
                artifacts: self.inputs.artifacts.clone(),
                target,
                create_params: self.inputs.create_params.clone(),
            },
        );
        let scheduled = match &settings.performance {
            Some(performance) => {
                PerformanceTestsScheduler::new(context, performance)
                    .schedule()
                    .await?
            }
            None => InstrumentationTestsScheduler::new(context).schedule().await?,
        };
        let SchedulerResult {
            initial_test_suite,
            initial_tests_result,
            test_results_after_branch_reruns,
            flaky_info,
            performance,
        } = scheduled;

        write_filter_info(&info_writer, &initial_test_suite)?;

        let not_reported =
            LostTestDeterminer.determine(&initial_tests_result, &initial_test_suite.tests_to_run);
        let failed = FailedTestDeterminer::new(settings.suppress_failure, settings.suppress_flaky)
            .determine(&test_results_after_branch_reruns);
        let reported = initial_tests_result.unwrap_or_default();
        let result = TestRunResult::new(reported, failed, not_reported);

        if let MissingVerdict::HasMissing { lost_tests, .. } = result.not_reported() {
            main_report.send_lost_tests(lost_tests).await;
        }

        let viewer = settings.report.viewer_url.as_deref().map(ReportViewer::new);
        let only_failures = !matches!(result.failed(), FailedVerdict::NoFailed);
        let viewer_url = viewer
            .as_ref()
            .map(|viewer| viewer.report_url(coordinates, only_failures));
        let junit_path =
            JUnitReportWriter::new(output_dir).write(coordinates, &result, viewer_url.as_deref())?;
        if let (Some(viewer), Some(url)) = (&viewer, &viewer_url) {
            let path = viewer.write_redirect(output_dir, url)?;
            info!("report viewer link written to {path}");
        }

        main_report
            .finish(settings.is_full_test_suite, viewer_url.as_deref())
            .await;

        if settings.report_flaky_tests
            && let Err(error) = self
                .notifier
                .report_flaky_summary(&flaky_info, coordinates)
                .await
        {
            warn!("{}", DisplayErrorChain::new(&error));
        }
        if settings.send_statistics {
            self.send_statistics(&main_report).await;
        }

        info!("{}", result.verdict());
        Ok(ActionOutcome {
            result,
            selected: initial_test_suite.tests_to_run.len(),
            skipped: initial_test_suite.skipped_tests.len(),
            flaky_info,
            performance,
            junit_path,
            viewer_url,
        })
    }

    async fn send_statistics(&self, report: &Report<'a, S>) {
        let Some(id) = report.try_get_id().await else {
            warn!("not sending statistics: report id is unknown");
            return;
        };
        let suite = match report.get_cross_device_test_data().await {
            Ok(suite) => suite,
            Err(err) => {
                error!("not sending statistics: {err}");
                return;
            }
        };
        if let Err(error) = self.notifier.send_statistics(&id, &suite).await {
            warn!("{}", DisplayErrorChain::new(&error));
        }
    }
}

fn write_filter_info(writer: &FilterInfoWriter, suite: &TestSuite) -> Result<(), ActionError> {
    writer.write_applied_filter(&suite.applied_filter)?;
    writer.write_filter_excludes(&suite.skipped_tests)?;
    Ok(())
}
