// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconciling test results with a report store.
//!
//! [`ReportStore`] is the interface to the remote service that keeps reports. [`Report`] is a
//! handle to one report that the scheduler and the action write results into, and [`ReadReport`]
//! reads results back for filtering.

mod batch;
mod junit;
mod local;
mod viewer;

pub use batch::*;
pub use junit::*;
pub use local::*;
pub use viewer::*;

use crate::{config::ReportSettings, errors::ReportStoreError, helpers::now};
use debug_ignore::DebugIgnore;
use std::{fmt, future::Future};
use testfleet_metadata::{
    CrossDeviceSuite, ReportCoordinates, ReportId, ReportInfo, RunResult, RunStatus,
    TestSignature, TestWithTarget,
};
use tracing::{debug, error, info, warn};

/// The analyzer key under which full test suite runs are announced.
pub const TEST_SUITE_ANALYZER_KEY: &str = "test_suite";

/// Metadata attached to a report when it's created.
#[derive(Clone, Debug, Default)]
pub struct CreateParams {
    /// The URL of the API the tests talk to.
    pub api_url: String,

    /// The branch under test.
    pub git_branch: String,

    /// The commit under test.
    pub git_commit: String,
}

/// The result of creating a report.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CreateResult {
    /// A new report was created.
    Created(ReportId),

    /// A report with these coordinates already exists.
    AlreadyCreated,
}

/// A store of reports.
///
/// Every operation is a single request: implementations don't retry.
pub trait ReportStore: Send + Sync {
    /// Creates the report for `coordinates`.
    fn create(
        &self,
        coordinates: &ReportCoordinates,
        params: &CreateParams,
    ) -> impl Future<Output = Result<CreateResult, ReportStoreError>> + Send;

    /// Looks up the report for `coordinates`. Returns `Ok(None)` if there isn't one.
    fn get_report(
        &self,
        coordinates: &ReportCoordinates,
    ) -> impl Future<Output = Result<Option<ReportInfo>, ReportStoreError>> + Send;

    /// Returns every result recorded in the report for `coordinates`.
    ///
    /// A report that doesn't exist yet has no results.
    fn get_tests_for_run_id(
        &self,
        coordinates: &ReportCoordinates,
    ) -> impl Future<Output = Result<Vec<RunResult>, ReportStoreError>> + Send;

    /// Returns every result recorded in the report with the given id.
    fn get_tests_for_report_id(
        &self,
        id: &ReportId,
    ) -> impl Future<Output = Result<Vec<RunResult>, ReportStoreError>> + Send;

    /// Appends results to the report for `coordinates`.
    fn add_tests(
        &self,
        coordinates: &ReportCoordinates,
        tests: &[RunResult],
    ) -> impl Future<Output = Result<(), ReportStoreError>> + Send;

    /// Marks the report for `coordinates` as finished.
    fn set_finished(
        &self,
        coordinates: &ReportCoordinates,
    ) -> impl Future<Output = Result<(), ReportStoreError>> + Send;

    /// Records a manual override that marks a test as successful.
    fn mark_as_successful(
        &self,
        coordinates: &ReportCoordinates,
        signature: &TestSignature,
        author: &str,
        comment: &str,
    ) -> impl Future<Output = Result<(), ReportStoreError>> + Send;

    /// Returns the report's results aggregated across devices.
    fn get_cross_device_test_data(
        &self,
        coordinates: &ReportCoordinates,
    ) -> impl Future<Output = Result<CrossDeviceSuite, ReportStoreError>> + Send;

    /// Attaches analyzer data to a report.
    fn push_prepared_data(
        &self,
        id: &ReportId,
        analyzer_key: &str,
        data: serde_json::Value,
    ) -> impl Future<Output = Result<(), ReportStoreError>> + Send;
}

/// What happened when a report was finished.
#[derive(Clone, Debug)]
pub enum FinishOutcome {
    /// The report was marked finished.
    Finished,

    /// The report has no results and was left open.
    Empty,

    /// The store rejected the request.
    Failed(ReportStoreError),
}

/// A handle to one report in a store.
///
/// The main report of a run and the report for target branch reruns are separate handles.
#[derive(Clone, Debug)]
pub struct Report<'a, S> {
    store: DebugIgnore<&'a S>,
    coordinates: ReportCoordinates,
    batch_size: usize,
    max_concurrent_batches: usize,
}

impl<'a, S: ReportStore> Report<'a, S> {
    /// Creates a new handle.
    pub fn new(store: &'a S, coordinates: ReportCoordinates, settings: &ReportSettings) -> Self {
        Self {
            store: DebugIgnore(store),
            coordinates,
            batch_size: settings.batch_size,
            max_concurrent_batches: settings.max_concurrent_batches,
        }
    }

    /// Returns the coordinates of this report.
    pub fn coordinates(&self) -> &ReportCoordinates {
        &self.coordinates
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &'a S {
        *self.store
    }

    /// Returns a reader for this report.
    pub fn read(&self) -> ReadReport<'a, S> {
        ReadReport::by_coordinates(*self.store, self.coordinates.clone())
    }

    /// Creates the report. An already existing report is fine; failures are logged.
    pub async fn try_create(&self, params: &CreateParams) {
        match self.store.create(&self.coordinates, params).await {
            Ok(CreateResult::Created(id)) => info!("report {} created, id={id}", self.coordinates),
            Ok(CreateResult::AlreadyCreated) => {
                debug!("report {} already created", self.coordinates)
            }
            Err(error) => error!("can't create report {}: {error}", self.coordinates),
        }
    }

    /// Looks up the id of this report. Failures are logged and return `None`.
    pub async fn try_get_id(&self) -> Option<ReportId> {
        match self.store.get_report(&self.coordinates).await {
            Ok(Some(info)) => Some(info.id),
            Ok(None) => {
                error!("can't find report for {}", self.coordinates);
                None
            }
            Err(error) => {
                error!("can't find report for {}: {error}", self.coordinates);
                None
            }
        }
    }

    /// Records tests excluded by the filter as skipped, along with the reason they were skipped.
    pub async fn send_skipped_tests(
        &self,
        skipped: &[(TestWithTarget, String)],
    ) -> BatchSubmission {
        if skipped.is_empty() {
            info!("no skipped tests to report");
            return BatchSubmission::default();
        }

        let timestamp = now();
        let results: Vec<_> = skipped
            .iter()
            .map(|(test, reason)| {
                RunResult::new(test.signature(), RunStatus::Skipped, timestamp)
                    .with_message(reason.as_str())
            })
            .collect();
        self.send_in_batches("skipped", &results).await
    }

    /// Records tests that were dispatched but never reported a result as lost.
    pub async fn send_lost_tests(&self, lost: &[TestWithTarget]) -> BatchSubmission {
        if lost.is_empty() {
            info!("no lost tests to report");
            return BatchSubmission::default();
        }

        let mut message = String::from("there were lost tests:");
        for test in lost {
            message.push_str("\n  ");
            message.push_str(&test.signature().to_string());
        }
        error!("{message}");

        let timestamp = now();
        let results: Vec<_> = lost
            .iter()
            .map(|test| {
                RunResult::new(test.signature(), RunStatus::Lost, timestamp)
                    .with_message("no result was reported for this test")
            })
            .collect();
        self.send_in_batches("lost", &results).await
    }

    /// Records a single completed test. Failures are logged.
    pub async fn send_completed_test(&self, result: &RunResult) {
        match self
            .store
            .add_tests(&self.coordinates, std::slice::from_ref(result))
            .await
        {
            Ok(()) => debug!("test {} reported", result.signature),
            Err(error) => error!("can't report test {}: {error}", result.signature),
        }
    }

    /// Finishes the report.
    ///
    /// An empty report is left open. If this run covered the full test suite, the report is
    /// announced to analyzers as the latest version of the suite before it's finished.
    pub async fn finish(
        &self,
        is_full_test_suite: bool,
        viewer_url: Option<&str>,
    ) -> FinishOutcome {
        let results = match self.store.get_tests_for_run_id(&self.coordinates).await {
            Ok(results) => {
                info!(
                    "report {} has {} results before closing",
                    self.coordinates,
                    results.len()
                );
                results
            }
            Err(error) => {
                error!("failed to read results from report before closing: {error}");
                Vec::new()
            }
        };

        if results.is_empty() {
            info!("skipping finishing report {}: it is empty", self.coordinates);
            return FinishOutcome::Empty;
        }

        if is_full_test_suite && let Some(id) = self.try_get_id().await {
            self.mark_as_full_test_suite(&id).await;
        }

        match self.store.set_finished(&self.coordinates).await {
            Ok(()) => {
                match viewer_url {
                    Some(url) => info!("test run finished: {url}"),
                    None => info!("test run finished: {}", self.coordinates),
                }
                FinishOutcome::Finished
            }
            Err(error) => {
                error!("can't finish report {}: {error}", self.coordinates);
                FinishOutcome::Failed(error)
            }
        }
    }

    /// Returns every result in this report.
    pub async fn get_tests(&self) -> Result<Vec<RunResult>, ReportStoreError> {
        self.store.get_tests_for_run_id(&self.coordinates).await
    }

    /// Marks a test in this report as successful.
    pub async fn mark_as_successful(
        &self,
        signature: &TestSignature,
        author: &str,
        comment: &str,
    ) -> Result<(), ReportStoreError> {
        self.store
            .mark_as_successful(&self.coordinates, signature, author, comment)
            .await
    }

    /// Returns this report's results aggregated across devices.
    pub async fn get_cross_device_test_data(&self) -> Result<CrossDeviceSuite, ReportStoreError> {
        self.store.get_cross_device_test_data(&self.coordinates).await
    }

    async fn mark_as_full_test_suite(&self, id: &ReportId) {
        let version = now().timestamp_millis();
        info!("this is a new version [{version}] of the full test suite");
        let data = serde_json::json!({ "full": true, "version": version });
        if let Err(error) = self
            .store
            .push_prepared_data(id, TEST_SUITE_ANALYZER_KEY, data)
            .await
        {
            error!("can't push test suite info to report {id}: {error}");
        }
    }

    async fn send_in_batches(&self, kind: &str, results: &[RunResult]) -> BatchSubmission {
        let submission = submit_in_batches(
            results,
            self.batch_size,
            self.max_concurrent_batches,
            |index, batch| {
                debug!("reporting {} {kind} tests for batch {index}", batch.len());
                self.store.add_tests(&self.coordinates, batch)
            },
        )
        .await;

        for failed in &submission.failed_batches {
            warn!(
                "can't report {} {kind} tests for batch {}: {}",
                failed.len, failed.index, failed.error
            );
        }
        info!(
            "reported {} {kind} tests in {} batches ({} failed)",
            submission.items,
            submission.batches,
            submission.failed_batches.len()
        );
        submission
    }
}

/// Identifies a report to read results from.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ReportSource {
    /// A report found by its coordinates.
    Coordinates(ReportCoordinates),

    /// A report found by its store id.
    Id(ReportId),
}

impl fmt::Display for ReportSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coordinates(coordinates) => write!(f, "report {coordinates}"),
            Self::Id(id) => write!(f, "report with id {id}"),
        }
    }
}

/// Reads results from a report.
#[derive(Clone, Debug)]
pub struct ReadReport<'a, S> {
    store: DebugIgnore<&'a S>,
    source: ReportSource,
}

impl<'a, S: ReportStore> ReadReport<'a, S> {
    /// Reads the report with the given coordinates.
    pub fn by_coordinates(store: &'a S, coordinates: ReportCoordinates) -> Self {
        Self {
            store: DebugIgnore(store),
            source: ReportSource::Coordinates(coordinates),
        }
    }

    /// Reads the report with the given id.
    pub fn by_id(store: &'a S, id: ReportId) -> Self {
        Self {
            store: DebugIgnore(store),
            source: ReportSource::Id(id),
        }
    }

    /// Returns which report this reads.
    pub fn source(&self) -> &ReportSource {
        &self.source
    }

    /// Returns every result in the report.
    pub async fn get_tests(&self) -> Result<Vec<RunResult>, ReportStoreError> {
        match &self.source {
            ReportSource::Coordinates(coordinates) => {
                self.store.get_tests_for_run_id(coordinates).await
            }
            ReportSource::Id(id) => self.store.get_tests_for_report_id(id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::ReportOperation,
        test_helpers::{FakeReportStore, coordinates, result, test_on},
    };
    use pretty_assertions::assert_eq;

    fn settings(batch_size: usize) -> ReportSettings {
        ReportSettings {
            batch_size,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn finish_empty_report_is_noop() {
        let store = FakeReportStore::new();
        let report = Report::new(&store, coordinates(), &settings(400));
        assert!(matches!(report.finish(true, None).await, FinishOutcome::Empty));
        assert_eq!(store.count(ReportOperation::SetFinished), 0);
        assert_eq!(store.count(ReportOperation::PushPreparedData), 0);
    }

    #[tokio::test]
    async fn finish_full_test_suite_pushes_prepared_data() {
        let store = FakeReportStore::new();
        store.insert_results(
            &coordinates(),
            vec![result("a.B.c", "api29", RunStatus::Success)],
        );
        let report = Report::new(&store, coordinates(), &settings(400));
        assert!(matches!(
            report.finish(true, Some("https://rv/report/app/run-1")).await,
            FinishOutcome::Finished
        ));
        assert_eq!(store.count(ReportOperation::SetFinished), 1);

        let pushed = store.prepared_data();
        assert_eq!(pushed.len(), 1);
        let (id, key, data) = &pushed[0];
        assert_eq!(id, &store.report_id(&coordinates()));
        assert_eq!(key, TEST_SUITE_ANALYZER_KEY);
        assert_eq!(data["full"], serde_json::Value::Bool(true));
        assert!(data["version"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn finish_partial_suite_does_not_push_prepared_data() {
        let store = FakeReportStore::new();
        store.insert_results(
            &coordinates(),
            vec![result("a.B.c", "api29", RunStatus::Failed)],
        );
        let report = Report::new(&store, coordinates(), &settings(400));
        report.finish(false, None).await;
        assert_eq!(store.count(ReportOperation::SetFinished), 1);
        assert_eq!(store.count(ReportOperation::PushPreparedData), 0);
    }

    #[tokio::test]
    async fn skipped_tests_are_batched() {
        let store = FakeReportStore::new();
        let report = Report::new(&store, coordinates(), &settings(2));
        let skipped: Vec<_> = (0..5)
            .map(|i| (test_on(&format!("a.B.t{i}"), "api22", 22), "excluded".to_owned()))
            .collect();
        let submission = report.send_skipped_tests(&skipped).await;
        assert_eq!(submission.batches, 3);
        assert_eq!(store.count(ReportOperation::AddTests), 3);

        let stored = report.get_tests().await.unwrap();
        assert_eq!(stored.len(), 5);
        assert!(stored.iter().all(|r| r.status == RunStatus::Skipped
            && r.message.as_deref() == Some("excluded")));
    }

    #[tokio::test]
    async fn lost_tests_failure_is_non_fatal() {
        let store = FakeReportStore::new();
        store.fail_add_tests_after(1);
        let report = Report::new(&store, coordinates(), &settings(1));
        let lost = vec![test_on("a.B.c", "api22", 22), test_on("a.B.d", "api22", 22)];
        let submission = report.send_lost_tests(&lost).await;
        assert_eq!(submission.batches, 2);
        assert_eq!(submission.failed_batches.len(), 1);
        assert_eq!(report.get_tests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn read_report_by_id() {
        let store = FakeReportStore::new();
        store.insert_results(
            &coordinates(),
            vec![result("a.B.c", "api29", RunStatus::Success)],
        );
        let id = store.report_id(&coordinates());
        let read = ReadReport::by_id(&store, id.clone());
        assert_eq!(read.source(), &ReportSource::Id(id));
        assert_eq!(read.get_tests().await.unwrap().len(), 1);
    }
}
