// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    FlakyInfo, SchedulerContext, SchedulerProgress, SchedulerResult, SchedulerState,
    TestsScheduler, join_target_statuses,
};
use crate::{
    config::{PerformanceConfig, TargetBranchResultSource},
    errors::{ReportStoreError, SchedulerError},
    executor::{RunType, TestExecutor},
    helpers::latest_by_signature,
    report::{ReadReport, ReportStore},
    suite::TestSuiteLoader,
};
use serde::Serialize;
use std::collections::BTreeMap;
use testfleet_metadata::{RunResult, TestName, TestWithTarget};
use tracing::{error, info, warn};

/// The mean of one metric of one test, compared between the change and the target branch.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct MetricComparison {
    /// The test.
    pub test: TestName,

    /// The metric name.
    pub metric: String,

    /// The mean over all devices for the change under test.
    pub current: f64,

    /// The mean over all devices on the target branch.
    pub baseline: f64,

    /// `(current - baseline) / baseline`.
    pub relative_change: f64,

    /// Whether the change exceeds the configured threshold in either direction.
    pub significant: bool,
}

/// Metric comparisons of a performance run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PerformanceSummary {
    /// Whether target branch metrics were available.
    pub baseline_available: bool,

    /// Comparisons for metrics present on both sides, sorted by test and metric.
    pub comparisons: Vec<MetricComparison>,
}

impl PerformanceSummary {
    /// Compares `current` with `baseline`. Metrics missing on either side are skipped, as are
    /// metrics with a zero baseline.
    pub fn compare(current: &[RunResult], baseline: &[RunResult], significant_change: f64) -> Self {
        let current = mean_metrics(current);
        let baseline = mean_metrics(baseline);

        let comparisons = current
            .into_iter()
            .filter_map(|((test, metric), current)| {
                let baseline = *baseline.get(&(test.clone(), metric.clone()))?;
                if baseline == 0.0 {
                    return None;
                }
                let relative_change = (current - baseline) / baseline;
                Some(MetricComparison {
                    test,
                    metric,
                    current,
                    baseline,
                    relative_change,
                    significant: relative_change.abs() > significant_change,
                })
            })
            .collect();

        Self {
            baseline_available: true,
            comparisons,
        }
    }

    /// Returns the comparisons whose change is significant.
    pub fn significant_changes(&self) -> impl Iterator<Item = &MetricComparison> {
        self.comparisons.iter().filter(|comparison| comparison.significant)
    }
}

/// Averages each metric of each test over every device, using the latest result per device.
fn mean_metrics(results: &[RunResult]) -> BTreeMap<(TestName, String), f64> {
    let mut sums: BTreeMap<(TestName, String), (f64, usize)> = BTreeMap::new();
    for result in latest_by_signature(results) {
        for (metric, value) in &result.metrics {
            let entry = sums
                .entry((result.signature.name.clone(), metric.clone()))
                .or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(key, (sum, count))| (key, sum / count as f64))
        .collect()
}

/// Schedules performance tests and compares their metrics with the target branch.
#[derive(Debug)]
pub struct PerformanceTestsScheduler<'a, S, L, E> {
    context: SchedulerContext<'a, S, L, E>,
    config: &'a PerformanceConfig,
}

impl<'a, S, L, E> PerformanceTestsScheduler<'a, S, L, E>
where
    S: ReportStore,
    L: TestSuiteLoader,
    E: TestExecutor,
{
    /// Creates a new scheduler.
    pub fn new(context: SchedulerContext<'a, S, L, E>, config: &'a PerformanceConfig) -> Self {
        Self { context, config }
    }

    /// Obtains target branch results, by dispatching or by reading another build's report.
    ///
    /// Returns `Ok(None)` if no baseline could be obtained. Dispatch errors are fatal.
    async fn baseline(
        &self,
        progress: &mut SchedulerProgress,
        tests: &[TestWithTarget],
    ) -> Result<Option<Vec<RunResult>>, SchedulerError> {
        let context = &self.context;
        let read: Result<Vec<RunResult>, ReportStoreError> =
            match &self.config.target_branch_result_source {
                TargetBranchResultSource::RunInProcess => {
                    let Some(artifacts) = context.inputs().target.artifacts() else {
                        warn!("target branch APKs are unavailable, skipping metric comparison");
                        return Ok(None);
                    };
                    let target_report = context.target_report();
                    target_report
                        .try_create(&context.inputs().create_params)
                        .await;
                    context
                        .dispatch(RunType::Rerun, tests, artifacts, &target_report)
                        .await?;
                    progress.advance(SchedulerState::ReranOnTarget)?;
                    let results = target_report.get_tests().await;
                    target_report.finish(false, None).await;
                    results
                }
                TargetBranchResultSource::FetchFromOtherBuild { target_build_id } => {
                    let coordinates = context.coordinates().target_branch_in_build(target_build_id);
                    info!("reading target branch metrics from {coordinates}");
                    ReadReport::by_coordinates(context.store(), coordinates)
                        .get_tests()
                        .await
                }
            };

        match read {
            Ok(results) if results.is_empty() => {
                warn!("target branch report has no results, skipping metric comparison");
                Ok(None)
            }
            Ok(results) => Ok(Some(results)),
            Err(err) => {
                error!("can't read target branch results, skipping metric comparison: {err}");
                Ok(None)
            }
        }
    }
}

impl<S, L, E> TestsScheduler for PerformanceTestsScheduler<'_, S, L, E>
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
        progress.advance(SchedulerState::ResultsCollected)?;

        let baseline = self.baseline(&mut progress, &suite.tests_to_run).await?;
        let summary = match (&initial_tests_result, baseline) {
            (Ok(current), Some(baseline)) => {
                PerformanceSummary::compare(current, &baseline, self.config.significant_change)
            }
            (Err(err), _) => {
                error!("can't read results of {}: {err}", main_report.coordinates());
                PerformanceSummary::default()
            }
            (Ok(_), None) => PerformanceSummary::default(),
        };
        for change in summary.significant_changes() {
            warn!(
                "significant change in {} of {}: {:.3} -> {:.3} ({:+.1}%)",
                change.metric,
                change.test,
                change.baseline,
                change.current,
                change.relative_change * 100.0
            );
        }
        info!(
            "compared {} metrics, {} changed significantly",
            summary.comparisons.len(),
            summary.significant_changes().count()
        );

        let test_results_after_branch_reruns = join_target_statuses(&initial_tests_result, None);
        let flaky_info = FlakyInfo::from_results(collected.results.values());
        progress.advance(SchedulerState::Finalized)?;
        Ok(SchedulerResult {
            initial_test_suite: suite,
            initial_tests_result,
            test_results_after_branch_reruns,
            flaky_info,
            performance: Some(summary),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::RunSettings,
        errors::LoadError,
        executor::TestArtifacts,
        report::CreateParams,
        scheduler::{BuildOnTargetCommitResult, SchedulerInputs},
        test_helpers::{FakeExecutor, FakeReportStore, coordinates, device_config, result},
    };
    use camino::Utf8Path;
    use testfleet_metadata::{ReportCoordinates, RunStatus, TestStaticData};

    fn with_metric(name: &str, device: &str, metric: &str, value: f64) -> RunResult {
        let mut result = result(name, device, RunStatus::Success);
        result.metrics.insert(metric.to_owned(), value);
        result
    }

    #[test]
    fn compares_means_across_devices() {
        let current = vec![
            with_metric("a.B.startup", "api22", "ms", 120.0),
            with_metric("a.B.startup", "api29", "ms", 100.0),
            with_metric("a.B.scroll", "api29", "fps", 58.0),
            with_metric("a.B.only-current", "api29", "ms", 1.0),
        ];
        let baseline = vec![
            with_metric("a.B.startup", "api22", "ms", 100.0),
            with_metric("a.B.startup", "api29", "ms", 100.0),
            with_metric("a.B.scroll", "api29", "fps", 60.0),
        ];

        let summary = PerformanceSummary::compare(&current, &baseline, 0.05);
        assert!(summary.baseline_available);
        assert_eq!(summary.comparisons.len(), 2);

        let startup = summary
            .comparisons
            .iter()
            .find(|comparison| comparison.test.as_str() == "a.B.startup")
            .unwrap();
        assert_eq!(startup.current, 110.0);
        assert_eq!(startup.baseline, 100.0);
        assert!((startup.relative_change - 0.1).abs() < 1e-9);
        assert!(startup.significant);

        let significant: Vec<_> = summary
            .significant_changes()
            .map(|comparison| comparison.test.as_str())
            .collect();
        assert_eq!(significant, ["a.B.startup"], "fps dropped by 3.3%");
    }

    struct StaticLoader;

    impl TestSuiteLoader for StaticLoader {
        async fn load(&self, _artifact: &Utf8Path) -> Result<Vec<TestStaticData>, LoadError> {
            Ok(vec![TestStaticData::new("a.B.startup")])
        }
    }

    fn inputs() -> SchedulerInputs {
        SchedulerInputs {
            suite: "suite.json".into(),
            artifacts: TestArtifacts {
                main_apk: "app.apk".into(),
                test_apk: "app-test.apk".into(),
            },
            target: BuildOnTargetCommitResult::Ok(TestArtifacts {
                main_apk: "target.apk".into(),
                test_apk: "target-test.apk".into(),
            }),
            create_params: CreateParams::default(),
        }
    }

    #[tokio::test]
    async fn run_in_process_baseline() {
        let store = FakeReportStore::new();
        let executor = FakeExecutor::new()
            .with_results(RunType::Run, vec![with_metric("a.B.startup", "api29", "ms", 150.0)])
            .with_results(RunType::Rerun, vec![with_metric("a.B.startup", "api29", "ms", 100.0)]);
        let settings = RunSettings {
            targets: vec![device_config("api29", 29)],
            ..Default::default()
        };
        let config = PerformanceConfig {
            target_branch_result_source: TargetBranchResultSource::RunInProcess,
            significant_change: 0.1,
        };
        let context = SchedulerContext::new(
            &store,
            &StaticLoader,
            &executor,
            &settings,
            coordinates(),
            inputs(),
        );

        let result = PerformanceTestsScheduler::new(context, &config)
            .schedule()
            .await
            .unwrap();

        assert_eq!(executor.requests().len(), 2);
        let summary = result.performance.unwrap();
        assert_eq!(summary.comparisons.len(), 1);
        assert!(summary.comparisons[0].significant);
    }

    #[tokio::test]
    async fn fetch_baseline_from_other_build() {
        let store = FakeReportStore::new();
        store.insert_results(
            &ReportCoordinates::new("app", "run-1-rerun", "build-0"),
            vec![with_metric("a.B.startup", "api29", "ms", 100.0)],
        );
        let executor = FakeExecutor::new()
            .with_results(RunType::Run, vec![with_metric("a.B.startup", "api29", "ms", 101.0)]);
        let settings = RunSettings {
            targets: vec![device_config("api29", 29)],
            ..Default::default()
        };
        let config = PerformanceConfig {
            target_branch_result_source: TargetBranchResultSource::FetchFromOtherBuild {
                target_build_id: "build-0".to_owned(),
            },
            significant_change: 0.1,
        };
        let context = SchedulerContext::new(
            &store,
            &StaticLoader,
            &executor,
            &settings,
            coordinates(),
            inputs(),
        );

        let result = PerformanceTestsScheduler::new(context, &config)
            .schedule()
            .await
            .unwrap();

        assert_eq!(executor.requests().len(), 1, "no dispatch for the baseline");
        let summary = result.performance.unwrap();
        assert_eq!(summary.comparisons.len(), 1);
        assert!(!summary.comparisons[0].significant);
    }

    #[tokio::test]
    async fn missing_baseline() {
        let store = FakeReportStore::new();
        let executor = FakeExecutor::new()
            .with_results(RunType::Run, vec![with_metric("a.B.startup", "api29", "ms", 101.0)]);
        let settings = RunSettings {
            targets: vec![device_config("api29", 29)],
            ..Default::default()
        };
        let config = PerformanceConfig {
            target_branch_result_source: TargetBranchResultSource::FetchFromOtherBuild {
                target_build_id: "build-0".to_owned(),
            },
            significant_change: 0.1,
        };
        let context = SchedulerContext::new(
            &store,
            &StaticLoader,
            &executor,
            &settings,
            coordinates(),
            inputs(),
        );
        let result = PerformanceTestsScheduler::new(context, &config)
            .schedule()
            .await
            .unwrap();
        let summary = result.performance.unwrap();
        assert!(!summary.baseline_available);
        assert!(summary.comparisons.is_empty());
    }
}
