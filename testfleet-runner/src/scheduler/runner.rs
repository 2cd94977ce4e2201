// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::DispatchError,
    executor::{ExecutionRequest, TestExecutor},
    report::{Report, ReportStore},
};
use debug_ignore::DebugIgnore;
use indexmap::IndexMap;
use std::collections::HashSet;
use testfleet_metadata::{RunResult, TestSignature};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Terminal results collected during one dispatch, keyed by signature.
#[derive(Clone, Debug, Default)]
pub struct CollectedResults {
    /// The first terminal result of each requested test, in arrival order.
    pub results: IndexMap<TestSignature, RunResult>,

    /// Results dropped because the test already had a result.
    pub duplicates: usize,

    /// Results dropped because the test wasn't requested.
    pub unexpected: usize,
}

/// Hands tests to an executor and collects results as they stream back.
///
/// Each accepted result is sent to the report as soon as it arrives.
#[derive(Debug)]
pub struct TestsRunner<'a, 'r, E, S> {
    executor: DebugIgnore<&'a E>,
    report: &'r Report<'a, S>,
}

impl<'a, 'r, E: TestExecutor, S: ReportStore> TestsRunner<'a, 'r, E, S> {
    /// Creates a new runner.
    pub fn new(executor: &'a E, report: &'r Report<'a, S>) -> Self {
        Self {
            executor: DebugIgnore(executor),
            report,
        }
    }

    /// Runs the request to completion.
    ///
    /// The first terminal result for a signature wins. Later results for the same signature and
    /// results for tests that weren't requested are logged and dropped.
    pub async fn run(&self, request: ExecutionRequest) -> Result<CollectedResults, DispatchError> {
        let expected: HashSet<TestSignature> =
            request.tests.iter().map(|test| test.signature()).collect();
        let (sender, receiver) = mpsc::unbounded_channel();

        let (executed, collected) = tokio::join!(
            self.executor.execute(&request, sender),
            self.collect(receiver, &expected),
        );
        executed?;

        let missing = expected.len() - collected.results.len();
        info!(
            "{} dispatch finished: {} results collected, {missing} missing",
            request.run_type,
            collected.results.len()
        );
        Ok(collected)
    }

    async fn collect(
        &self,
        mut receiver: mpsc::UnboundedReceiver<RunResult>,
        expected: &HashSet<TestSignature>,
    ) -> CollectedResults {
        let mut collected = CollectedResults::default();
        while let Some(result) = receiver.recv().await {
            if !expected.contains(&result.signature) {
                warn!("dropping result for unexpected test {}", result.signature);
                collected.unexpected += 1;
                continue;
            }
            if collected.results.contains_key(&result.signature) {
                warn!(
                    "dropping duplicate result for {} ({})",
                    result.signature, result.status
                );
                collected.duplicates += 1;
                continue;
            }

            debug!("{}: {}", result.signature, result.status);
            self.report.send_completed_test(&result).await;
            collected.results.insert(result.signature.clone(), result);
        }
        collected
    }
}
