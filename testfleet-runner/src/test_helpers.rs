// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory collaborators and fixtures for unit tests.

use crate::{
    errors::{DispatchError, ReportOperation, ReportStoreError},
    executor::{ExecutionRequest, RunType, TestExecutor},
    report::{CreateParams, CreateResult, ReportStore},
};
use chrono::{DateTime, FixedOffset};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Mutex,
};
use tokio::sync::mpsc::UnboundedSender;
use testfleet_metadata::{
    CrossDeviceSuite, DeviceConfiguration, DeviceName, ReportCoordinates, ReportId, ReportInfo,
    RunResult, RunStatus, TestSignature, TestStaticData, TestWithTarget,
};

pub(crate) fn coordinates() -> ReportCoordinates {
    ReportCoordinates::new("app", "run-1", "build-1")
}

pub(crate) fn timestamp() -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339("2024-05-01T10:00:00+02:00").unwrap()
}

pub(crate) fn result(name: &str, device: &str, status: RunStatus) -> RunResult {
    RunResult::new(TestSignature::new(name, device), status, timestamp())
}

pub(crate) fn test_on(name: &str, device: &str, api: u32) -> TestWithTarget {
    TestWithTarget {
        test: TestStaticData::new(name),
        target: device_config(device, api),
    }
}

pub(crate) fn device_config(device: &str, api: u32) -> DeviceConfiguration {
    DeviceConfiguration {
        device: DeviceName::new(device),
        api,
    }
}

#[derive(Debug)]
struct FakeReport {
    id: ReportId,
    coordinates: ReportCoordinates,
    finished: bool,
    results: Vec<RunResult>,
}

impl FakeReport {
    fn new(id: ReportId, coordinates: &ReportCoordinates) -> Self {
        Self {
            id,
            coordinates: coordinates.clone(),
            finished: false,
            results: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct FakeState {
    // Keyed by (component, run id), like the local store.
    reports: BTreeMap<(String, String, String), FakeReport>,
    calls: Vec<ReportOperation>,
    failing: Vec<ReportOperation>,
    add_tests_budget: Option<usize>,
    prepared_data: Vec<(ReportId, String, serde_json::Value)>,
}

/// A report store that keeps reports in memory, records every call and can be told to fail.
///
/// Unlike a real store, appending to a report that doesn't exist creates it.
#[derive(Debug, Default)]
pub(crate) struct FakeReportStore {
    state: Mutex<FakeState>,
}

impl FakeReportStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn report_id(&self, coordinates: &ReportCoordinates) -> ReportId {
        ReportId::new(format!(
            "{}/{}/{}",
            coordinates.component, coordinates.build_id, coordinates.run_id
        ))
    }

    /// Seeds a report with results without recording a call.
    pub(crate) fn insert_results(&self, coordinates: &ReportCoordinates, results: Vec<RunResult>) {
        let id = self.report_id(coordinates);
        let mut state = self.state.lock().unwrap();
        state
            .reports
            .entry(key(coordinates))
            .or_insert_with(|| FakeReport::new(id, coordinates))
            .results
            .extend(results);
    }

    pub(crate) fn results(&self, coordinates: &ReportCoordinates) -> Vec<RunResult> {
        let state = self.state.lock().unwrap();
        state
            .reports
            .get(&key(coordinates))
            .map(|report| report.results.clone())
            .unwrap_or_default()
    }

    pub(crate) fn is_finished(&self, coordinates: &ReportCoordinates) -> bool {
        let state = self.state.lock().unwrap();
        state
            .reports
            .get(&key(coordinates))
            .is_some_and(|report| report.finished)
    }

    /// Returns how many times an operation was called.
    pub(crate) fn count(&self, operation: ReportOperation) -> usize {
        let state = self.state.lock().unwrap();
        state.calls.iter().filter(|call| **call == operation).count()
    }

    pub(crate) fn prepared_data(&self) -> Vec<(ReportId, String, serde_json::Value)> {
        self.state.lock().unwrap().prepared_data.clone()
    }

    /// Makes every later call of `operation` fail.
    pub(crate) fn fail(&self, operation: ReportOperation) {
        self.state.lock().unwrap().failing.push(operation);
    }

    /// Lets the next `n` appends succeed, then fails the rest.
    pub(crate) fn fail_add_tests_after(&self, n: usize) {
        self.state.lock().unwrap().add_tests_budget = Some(n);
    }

    fn begin(
        &self,
        operation: ReportOperation,
        target: &dyn std::fmt::Display,
    ) -> Result<std::sync::MutexGuard<'_, FakeState>, ReportStoreError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(operation);
        if state.failing.contains(&operation) {
            return Err(ReportStoreError::new(operation, target, "injected failure"));
        }
        if operation == ReportOperation::AddTests
            && let Some(budget) = &mut state.add_tests_budget
        {
            if *budget == 0 {
                return Err(ReportStoreError::new(operation, target, "injected failure"));
            }
            *budget -= 1;
        }
        Ok(state)
    }
}

fn key(coordinates: &ReportCoordinates) -> (String, String, String) {
    (
        coordinates.component.clone(),
        coordinates.build_id.clone(),
        coordinates.run_id.clone(),
    )
}

impl ReportStore for FakeReportStore {
    async fn create(
        &self,
        coordinates: &ReportCoordinates,
        _params: &CreateParams,
    ) -> Result<CreateResult, ReportStoreError> {
        let id = self.report_id(coordinates);
        let mut state = self.begin(ReportOperation::Create, coordinates)?;
        if state.reports.contains_key(&key(coordinates)) {
            return Ok(CreateResult::AlreadyCreated);
        }
        state.reports.insert(
            key(coordinates),
            FakeReport::new(id.clone(), coordinates),
        );
        Ok(CreateResult::Created(id))
    }

    async fn get_report(
        &self,
        coordinates: &ReportCoordinates,
    ) -> Result<Option<ReportInfo>, ReportStoreError> {
        let state = self.begin(ReportOperation::GetReport, coordinates)?;
        Ok(state.reports.get(&key(coordinates)).map(|report| ReportInfo {
            id: report.id.clone(),
            coordinates: report.coordinates.clone(),
            finished: report.finished,
        }))
    }

    async fn get_tests_for_run_id(
        &self,
        coordinates: &ReportCoordinates,
    ) -> Result<Vec<RunResult>, ReportStoreError> {
        let state = self.begin(ReportOperation::GetTests, coordinates)?;
        Ok(state
            .reports
            .get(&key(coordinates))
            .map(|report| report.results.clone())
            .unwrap_or_default())
    }

    async fn get_tests_for_report_id(
        &self,
        id: &ReportId,
    ) -> Result<Vec<RunResult>, ReportStoreError> {
        let operation = ReportOperation::GetTests;
        let state = self.begin(operation, id)?;
        state
            .reports
            .values()
            .find(|report| &report.id == id)
            .map(|report| report.results.clone())
            .ok_or_else(|| ReportStoreError::new(operation, id, "report does not exist"))
    }

    async fn add_tests(
        &self,
        coordinates: &ReportCoordinates,
        tests: &[RunResult],
    ) -> Result<(), ReportStoreError> {
        let id = self.report_id(coordinates);
        let mut state = self.begin(ReportOperation::AddTests, coordinates)?;
        state
            .reports
            .entry(key(coordinates))
            .or_insert_with(|| FakeReport::new(id, coordinates))
            .results
            .extend_from_slice(tests);
        Ok(())
    }

    async fn set_finished(&self, coordinates: &ReportCoordinates) -> Result<(), ReportStoreError> {
        let operation = ReportOperation::SetFinished;
        let mut state = self.begin(operation, coordinates)?;
        let report = state
            .reports
            .get_mut(&key(coordinates))
            .ok_or_else(|| ReportStoreError::new(operation, coordinates, "report does not exist"))?;
        report.finished = true;
        Ok(())
    }

    async fn mark_as_successful(
        &self,
        coordinates: &ReportCoordinates,
        signature: &TestSignature,
        author: &str,
        comment: &str,
    ) -> Result<(), ReportStoreError> {
        let operation = ReportOperation::MarkAsSuccessful;
        let mut state = self.begin(operation, coordinates)?;
        let report = state
            .reports
            .get_mut(&key(coordinates))
            .ok_or_else(|| ReportStoreError::new(operation, coordinates, "report does not exist"))?;
        report.results.push(
            RunResult::new(signature.clone(), RunStatus::Success, timestamp())
                .with_message(format!("marked as successful by {author}: {comment}")),
        );
        Ok(())
    }

    async fn get_cross_device_test_data(
        &self,
        coordinates: &ReportCoordinates,
    ) -> Result<CrossDeviceSuite, ReportStoreError> {
        let state = self.begin(ReportOperation::GetCrossDeviceTestData, coordinates)?;
        let results = state
            .reports
            .get(&key(coordinates))
            .map(|report| crate::helpers::latest_by_signature(&report.results))
            .unwrap_or_default();
        Ok(CrossDeviceSuite::from_results(&results))
    }

    async fn push_prepared_data(
        &self,
        id: &ReportId,
        analyzer_key: &str,
        data: serde_json::Value,
    ) -> Result<(), ReportStoreError> {
        let mut state = self.begin(ReportOperation::PushPreparedData, id)?;
        state
            .prepared_data
            .push((id.clone(), analyzer_key.to_owned(), data));
        Ok(())
    }
}

/// An executor that sends canned results for each run type and records requests.
#[derive(Debug, Default)]
pub(crate) struct FakeExecutor {
    results: HashMap<RunType, Vec<RunResult>>,
    failing: Vec<RunType>,
    requests: Mutex<Vec<ExecutionRequest>>,
}

impl FakeExecutor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_results(mut self, run_type: RunType, results: Vec<RunResult>) -> Self {
        self.results.insert(run_type, results);
        self
    }

    /// Fails dispatches of `run_type` after sending their results.
    pub(crate) fn failing(mut self, run_type: RunType) -> Self {
        self.failing.push(run_type);
        self
    }

    pub(crate) fn requests(&self) -> Vec<ExecutionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl TestExecutor for FakeExecutor {
    async fn execute(
        &self,
        request: &ExecutionRequest,
        results: UnboundedSender<RunResult>,
    ) -> Result<(), DispatchError> {
        self.requests.lock().unwrap().push(request.clone());
        for result in self.results.get(&request.run_type).into_iter().flatten() {
            let _ = results.send(result.clone());
        }
        if self.failing.contains(&request.run_type) {
            return Err(DispatchError::Executor {
                run_type: request.run_type,
                err: "device pool exhausted".into(),
            });
        }
        Ok(())
    }
}
