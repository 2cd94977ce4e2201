// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The interface to the device fleet that runs tests.
//!
//! Device allocation, APK installation and the instrumentation protocol all live behind
//! [`TestExecutor`]. The scheduler hands it a request and receives terminal results over a
//! channel as tests finish.

use crate::{config::ExecutionParameters, errors::DispatchError};
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt, future::Future};
use testfleet_metadata::{DeviceConfiguration, RunResult, TestWithTarget};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

/// Which dispatch of a run this is.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunType {
    /// The main run on the change under test.
    Run,

    /// A rerun on the target branch.
    Rerun,
}

impl fmt::Display for RunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Run => f.write_str("run"),
            Self::Rerun => f.write_str("rerun"),
        }
    }
}

/// The application and test APKs a run installs.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestArtifacts {
    /// The application under test.
    pub main_apk: Utf8PathBuf,

    /// The instrumentation test APK.
    pub test_apk: Utf8PathBuf,
}

/// Everything an executor needs to run a set of tests.
#[derive(Clone, Debug)]
pub struct ExecutionRequest {
    /// Which dispatch this is.
    pub run_type: RunType,

    /// The tests to run. Each test runs on its own target.
    pub tests: Vec<TestWithTarget>,

    /// The APKs to install.
    pub artifacts: TestArtifacts,

    /// The device pool.
    pub targets: Vec<DeviceConfiguration>,

    /// Parallelism, timeouts and retries.
    pub params: ExecutionParameters,
}

/// Runs tests on devices.
///
/// Implementations send one terminal [`RunResult`] per test to `results` as tests finish, in any
/// order, and return once every test has finished or been given up on. Retries and timeouts are
/// the executor's business: a test that passes after retries is reported once, with its attempt
/// count.
pub trait TestExecutor: Send + Sync {
    /// Runs the tests in `request`.
    fn execute(
        &self,
        request: &ExecutionRequest,
        results: UnboundedSender<RunResult>,
    ) -> impl Future<Output = Result<(), DispatchError>> + Send;
}

/// An executor that replays results recorded in a JSON file instead of running tests.
///
/// The file holds an array of run results. Results for tests that weren't requested are not sent.
#[derive(Clone, Debug)]
pub struct ReplayExecutor {
    run_results: Utf8PathBuf,
    rerun_results: Option<Utf8PathBuf>,
}

impl ReplayExecutor {
    /// Creates an executor that replays `run_results` for every dispatch.
    pub fn new(run_results: impl Into<Utf8PathBuf>) -> Self {
        Self {
            run_results: run_results.into(),
            rerun_results: None,
        }
    }

    /// Replays `rerun_results` for target branch reruns instead.
    pub fn with_rerun_results(mut self, rerun_results: impl Into<Utf8PathBuf>) -> Self {
        self.rerun_results = Some(rerun_results.into());
        self
    }

    async fn read(&self, run_type: RunType) -> Result<Vec<RunResult>, DispatchError> {
        let path = match (run_type, &self.rerun_results) {
            (RunType::Rerun, Some(path)) => path,
            _ => &self.run_results,
        };
        let contents = tokio::fs::read(path)
            .await
            .map_err(|err| DispatchError::ReplayRead {
                path: path.clone(),
                err,
            })?;
        serde_json::from_slice(&contents).map_err(|err| DispatchError::ReplayParse {
            path: path.clone(),
            err,
        })
    }
}

impl TestExecutor for ReplayExecutor {
    async fn execute(
        &self,
        request: &ExecutionRequest,
        results: UnboundedSender<RunResult>,
    ) -> Result<(), DispatchError> {
        let recorded = self.read(request.run_type).await?;
        let requested: HashSet<_> = request.tests.iter().map(|test| test.signature()).collect();

        let mut sent = 0;
        for result in recorded {
            if !requested.contains(&result.signature) {
                continue;
            }
            if results.send(result).is_err() {
                warn!("result receiver closed, stopping replay");
                break;
            }
            sent += 1;
        }
        debug!(
            "replayed {sent} results for {} requested tests ({})",
            request.tests.len(),
            request.run_type
        );
        Ok(())
    }
}
