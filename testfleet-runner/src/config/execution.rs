// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parameters handed to the test executor along with the tests to run.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ExecutionParameters {
    /// The number of devices per configuration to run tests on concurrently.
    pub parallelism: usize,

    /// Time after which the executor gives up on a single test.
    #[serde(with = "humantime_serde")]
    pub timeout_per_test: Duration,

    /// The number of times the executor retries a failing test.
    pub retry_count: u32,
}

impl Default for ExecutionParameters {
    fn default() -> Self {
        Self {
            parallelism: 1,
            timeout_per_test: Duration::from_secs(600),
            retry_count: 0,
        }
    }
}

/// Where the baseline of a performance comparison comes from.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "kebab-case")]
pub enum TargetBranchResultSource {
    /// Run the suite on the target branch artifacts in this process.
    RunInProcess,

    /// Read results already produced by another build.
    FetchFromOtherBuild {
        /// The build that ran the suite on the target branch.
        target_build_id: String,
    },
}

/// Settings for performance runs.
///
/// A configuration with a `performance` table is scheduled with the performance strategy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PerformanceConfig {
    /// Where the target branch metrics come from.
    pub target_branch_result_source: TargetBranchResultSource,

    /// Relative change above which a metric is reported as a regression.
    #[serde(default = "default_significant_change")]
    pub significant_change: f64,
}

fn default_significant_change() -> f64 {
    0.1
}
