// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    FlakyInfo, SchedulerContext, SchedulerProgress, SchedulerResult, SchedulerState,
    TestsScheduler,
};
use crate::{
    errors::{ReportStoreError, SchedulerError},
    executor::{RunType, TestArtifacts, TestExecutor},
    helpers::latest_by_signature,
    report::{FinishOutcome, ReportStore},
    suite::TestSuiteLoader,
    verdict::ComparedResult,
};
use std::collections::HashMap;
use testfleet_metadata::{RunResult, RunStatus, TestSignature, TestWithTarget};
use tracing::{debug, error, info};

/// Schedules functional instrumentation tests, with optional reruns on the target branch.
#[derive(Debug)]
pub struct InstrumentationTestsScheduler<'a, S, L, E> {
    context: SchedulerContext<'a, S, L, E>,
}

impl<'a, S, L, E> InstrumentationTestsScheduler<'a, S, L, E>
where
    S: ReportStore,
    L: TestSuiteLoader,
    E: TestExecutor,
{
    /// Creates a new scheduler.
    pub fn new(context: SchedulerContext<'a, S, L, E>) -> Self {
        Self { context }
    }

    /// Runs the filtered suite again on the target branch and returns the latest status of each
    /// test there.
    ///
    /// A failure to read the rerun report is logged and treated as no rerun data.
    async fn rerun_on_target(
        &self,
        tests: &[TestWithTarget],
        artifacts: &TestArtifacts,
    ) -> Result<HashMap<TestSignature, RunStatus>, SchedulerError> {
        let context = &self.context;
        let target_report = context.target_report();
        target_report
            .try_create(&context.inputs().create_params)
            .await;

        context
            .dispatch(RunType::Rerun, tests, artifacts, &target_report)
            .await?;

        let statuses = match target_report.get_tests().await {
            Ok(results) => latest_by_signature(&results)
                .into_iter()
                .map(|result| (result.signature, result.status))
                .collect(),
            Err(err) => {
                error!("can't read target branch results, continuing without them: {err}");
                HashMap::new()
            }
        };

        if let FinishOutcome::Failed(err) = target_report.finish(false, None).await {
            debug!("target branch report left open: {err}");
        }
        Ok(statuses)
    }
}

impl<S, L, E> TestsScheduler for InstrumentationTestsScheduler<'_, S, L, E>
where
    S: ReportStore,
    L: TestSuiteLoader,
    E: TestExecutor,
{
    async fn schedule(&self) -> Result<SchedulerResult, SchedulerError> {
        let context = &self.context;
        let mut progress = SchedulerProgress::new();
        let main_report = context.main_report();

        let suite = context.load_and_filter(&mut progress, &main_report).await?;

        let collected = context
            .dispatch(
                RunType::Run,
                &suite.tests_to_run,
                &context.inputs().artifacts,
                &main_report,
            )
            .await?;
        progress.advance(SchedulerState::Dispatched)?;

        let initial_tests_result = main_report.get_tests().await;
        if let Err(err) = &initial_tests_result {
            error!("can't read results of {}: {err}", main_report.coordinates());
        }
        progress.advance(SchedulerState::ResultsCollected)?;

        let target_statuses = match context.rerun_artifacts() {
            Some(artifacts) => {
                info!("rerunning {} tests on the target branch", suite.tests_to_run.len());
                let statuses = self.rerun_on_target(&suite.tests_to_run, artifacts).await?;
                progress.advance(SchedulerState::ReranOnTarget)?;
                Some(statuses)
            }
            None => None,
        };

        let test_results_after_branch_reruns =
            join_target_statuses(&initial_tests_result, target_statuses.as_ref());
        let flaky_info = FlakyInfo::from_results(collected.results.values());

        progress.advance(SchedulerState::Finalized)?;
        debug!("scheduler finished in state {}", progress.state());
        Ok(SchedulerResult {
            initial_test_suite: suite,
            initial_tests_result,
            test_results_after_branch_reruns,
            flaky_info,
            performance: None,
        })
    }
}

/// Joins the latest result of each test with its status on the target branch.
pub(crate) fn join_target_statuses(
    initial: &Result<Vec<RunResult>, ReportStoreError>,
    target_statuses: Option<&HashMap<TestSignature, RunStatus>>,
) -> Result<Vec<ComparedResult>, ReportStoreError> {
    let results = initial.as_ref().map_err(Clone::clone)?;
    Ok(latest_by_signature(results)
        .into_iter()
        .map(|result| {
            let on_target =
                target_statuses.and_then(|statuses| statuses.get(&result.signature).copied());
            ComparedResult { result, on_target }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::RunSettings,
        errors::{LoadError, ReportOperation},
        report::CreateParams,
        scheduler::{BuildOnTargetCommitResult, SchedulerInputs},
        test_helpers::{FakeExecutor, FakeReportStore, coordinates, device_config, result},
    };
    use camino::{Utf8Path, Utf8PathBuf};
    use pretty_assertions::assert_eq;
    use testfleet_metadata::{ReportCoordinates, TestStaticData};

    struct StaticLoader(Vec<TestStaticData>);

    impl TestSuiteLoader for StaticLoader {
        async fn load(
            &self,
            _artifact: &Utf8Path,
        ) -> Result<Vec<TestStaticData>, LoadError> {
            Ok(self.0.clone())
        }
    }

    fn loader() -> StaticLoader {
        let mut new_api = TestStaticData::new("a.B.newApi");
        new_api.min_sdk = Some(26);
        StaticLoader(vec![
            TestStaticData::new("a.B.pass"),
            TestStaticData::new("a.B.fail"),
            TestStaticData::new("a.B.lost"),
            new_api,
        ])
    }

    fn settings(rerun: bool) -> RunSettings {
        RunSettings {
            targets: vec![device_config("api22", 22)],
            rerun_on_target_branch: rerun,
            ..Default::default()
        }
    }

    fn inputs(target: BuildOnTargetCommitResult) -> SchedulerInputs {
        SchedulerInputs {
            suite: Utf8PathBuf::from("suite.json"),
            artifacts: TestArtifacts {
                main_apk: "app.apk".into(),
                test_apk: "app-test.apk".into(),
            },
            target,
            create_params: CreateParams::default(),
        }
    }

    fn target_artifacts() -> BuildOnTargetCommitResult {
        BuildOnTargetCommitResult::Ok(TestArtifacts {
            main_apk: "target.apk".into(),
            test_apk: "target-test.apk".into(),
        })
    }

    fn executor() -> FakeExecutor {
        FakeExecutor::new()
            .with_results(
                RunType::Run,
                vec![
                    result("a.B.pass", "api22", RunStatus::Success),
                    result("a.B.fail", "api22", RunStatus::Failed),
                ],
            )
            .with_results(
                RunType::Rerun,
                vec![
                    result("a.B.pass", "api22", RunStatus::Success),
                    result("a.B.fail", "api22", RunStatus::Failed),
                ],
            )
    }

    #[tokio::test]
    async fn schedules_filtered_suite() {
        let store = FakeReportStore::new();
        let loader = loader();
        let executor = executor();
        let settings = settings(false);
        let context = SchedulerContext::new(
            &store,
            &loader,
            &executor,
            &settings,
            coordinates(),
            inputs(target_artifacts()),
        );

        let result = InstrumentationTestsScheduler::new(context)
            .schedule()
            .await
            .unwrap();

        assert_eq!(result.initial_test_suite.tests_to_run.len(), 3);
        assert_eq!(result.initial_test_suite.skipped_tests.len(), 1);

        let requests = executor.requests();
        assert_eq!(requests.len(), 1, "no rerun");
        assert_eq!(requests[0].tests.len(), 3);

        // One skipped result, then two completed tests.
        let reported = result.initial_tests_result.as_ref().unwrap();
        assert_eq!(reported.len(), 3);
        assert_eq!(
            reported
                .iter()
                .filter(|result| result.status == RunStatus::Skipped)
                .count(),
            1
        );

        let compared = result.test_results_after_branch_reruns.unwrap();
        assert!(compared.iter().all(|compared| compared.on_target.is_none()));
        assert!(result.performance.is_none());
    }

    #[tokio::test]
    async fn skipped_tests_not_reported_when_disabled() {
        let store = FakeReportStore::new();
        let loader = loader();
        let executor = executor();
        let settings = RunSettings {
            report_skipped_tests: false,
            ..settings(false)
        };
        let context = SchedulerContext::new(
            &store,
            &loader,
            &executor,
            &settings,
            coordinates(),
            inputs(target_artifacts()),
        );
        let result = InstrumentationTestsScheduler::new(context)
            .schedule()
            .await
            .unwrap();
        assert_eq!(result.initial_tests_result.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn reruns_on_target_branch() {
        let store = FakeReportStore::new();
        let loader = loader();
        let executor = executor();
        let settings = settings(true);
        let context = SchedulerContext::new(
            &store,
            &loader,
            &executor,
            &settings,
            coordinates(),
            inputs(target_artifacts()),
        );

        let result = InstrumentationTestsScheduler::new(context)
            .schedule()
            .await
            .unwrap();

        let requests = executor.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].run_type, RunType::Rerun);
        assert_eq!(requests[1].artifacts.main_apk, "target.apk");

        let target = ReportCoordinates::new("app", "run-1-rerun", "build-1");
        assert_eq!(store.results(&target).len(), 2, "reruns go to the target report");
        assert!(store.is_finished(&target));

        let compared = result.test_results_after_branch_reruns.unwrap();
        let fail = compared
            .iter()
            .find(|compared| compared.result.signature.name.as_str() == "a.B.fail")
            .unwrap();
        assert_eq!(fail.on_target, Some(RunStatus::Failed));
        assert!(fail.is_pre_existing_failure());
    }

    #[tokio::test]
    async fn no_rerun_without_target_apks() {
        let store = FakeReportStore::new();
        let loader = loader();
        let executor = executor();
        let settings = settings(true);
        let context = SchedulerContext::new(
            &store,
            &loader,
            &executor,
            &settings,
            coordinates(),
            inputs(BuildOnTargetCommitResult::ApksUnavailable),
        );
        InstrumentationTestsScheduler::new(context)
            .schedule()
            .await
            .unwrap();
        assert_eq!(executor.requests().len(), 1);
    }

    #[tokio::test]
    async fn report_read_failure_is_carried() {
        let store = FakeReportStore::new();
        let loader = loader();
        let executor = executor();
        let settings = settings(false);
        store.fail(ReportOperation::GetTests);
        let context = SchedulerContext::new(
            &store,
            &loader,
            &executor,
            &settings,
            coordinates(),
            inputs(target_artifacts()),
        );
        let result = InstrumentationTestsScheduler::new(context)
            .schedule()
            .await
            .unwrap();
        assert!(result.initial_tests_result.is_err());
        assert!(result.test_results_after_branch_reruns.is_err());
    }

    #[tokio::test]
    async fn dispatch_failure_aborts() {
        let store = FakeReportStore::new();
        let loader = loader();
        let executor = executor().failing(RunType::Run);
        let settings = settings(false);
        let context = SchedulerContext::new(
            &store,
            &loader,
            &executor,
            &settings,
            coordinates(),
            inputs(target_artifacts()),
        );
        let error = InstrumentationTestsScheduler::new(context)
            .schedule()
            .await
            .expect_err("dispatch failed");
        assert!(matches!(error, SchedulerError::Dispatch(_)));
    }
}
