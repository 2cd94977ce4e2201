// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Loading compiled test suites and applying the initial filter to them.

use crate::{
    errors::LoadError,
    test_filter::{FilterResult, TestsFilter},
};
use camino::Utf8Path;
use serde::Deserialize;
use std::{collections::HashSet, future::Future};
use testfleet_metadata::{DeviceConfiguration, TestStaticData, TestWithTarget};
use tracing::{debug, info};

/// Reads the static data of every test in a compiled test suite.
pub trait TestSuiteLoader: Send + Sync {
    /// Loads the suite from `artifact`.
    fn load(
        &self,
        artifact: &Utf8Path,
    ) -> impl Future<Output = Result<Vec<TestStaticData>, LoadError>> + Send;
}

/// Loads test suites from JSON manifests.
///
/// A manifest is an object with a `tests` array of test static data:
///
/// ```json
/// { "tests": [{ "name": "com.example.LoginTest.signIn", "min-sdk": 24 }] }
/// ```
#[derive(Copy, Clone, Debug, Default)]
pub struct JsonSuiteLoader;

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct SuiteManifest {
    tests: Vec<TestStaticData>,
}

impl TestSuiteLoader for JsonSuiteLoader {
    async fn load(&self, artifact: &Utf8Path) -> Result<Vec<TestStaticData>, LoadError> {
        let contents = tokio::fs::read(artifact)
            .await
            .map_err(|err| LoadError::Read {
                path: artifact.to_owned(),
                err,
            })?;
        let manifest: SuiteManifest =
            serde_json::from_slice(&contents).map_err(|err| LoadError::Parse {
                path: artifact.to_owned(),
                err,
            })?;

        let mut seen = HashSet::new();
        for test in &manifest.tests {
            if !seen.insert(&test.name) {
                return Err(LoadError::DuplicateTest {
                    path: artifact.to_owned(),
                    name: test.name.to_string(),
                });
            }
        }

        debug!("loaded {} tests from {artifact}", manifest.tests.len());
        Ok(manifest.tests)
    }
}

/// A test suite expanded over the device pool, with the initial filter applied.
#[derive(Clone, Debug)]
pub struct TestSuite {
    /// Tests that passed the filter, in target order.
    pub tests_to_run: Vec<TestWithTarget>,

    /// Tests the filter excluded, with the reason.
    pub skipped_tests: Vec<(TestWithTarget, String)>,

    /// The filter that was applied.
    pub applied_filter: TestsFilter,
}

impl TestSuite {
    /// Expands `tests` over `targets` and partitions the result with `filter`.
    pub fn new(
        tests: &[TestStaticData],
        targets: &[DeviceConfiguration],
        filter: TestsFilter,
    ) -> Self {
        let mut tests_to_run = Vec::new();
        let mut skipped_tests = Vec::new();

        for target in targets {
            for test in tests {
                let test = TestWithTarget {
                    test: test.clone(),
                    target: target.clone(),
                };
                match filter.filter(&test) {
                    FilterResult::Included => tests_to_run.push(test),
                    FilterResult::Excluded(reason) => {
                        skipped_tests.push((test, reason.to_string()))
                    }
                }
            }
        }

        info!(
            "{} tests on {} devices: {} to run, {} skipped",
            tests.len(),
            targets.len(),
            tests_to_run.len(),
            skipped_tests.len()
        );
        Self {
            tests_to_run,
            skipped_tests,
            applied_filter: filter,
        }
    }
}
