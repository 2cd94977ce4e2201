// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{RunResult, RunStatus, TestName};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// The key identifying a logical report in a report store.
///
/// Coordinates are stable for the lifetime of one CI build.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReportCoordinates {
    /// The component (application or module) under test.
    pub component: String,

    /// The identifier of the test run, usually derived from the commit and configuration.
    pub run_id: String,

    /// The CI build that owns the report.
    pub build_id: String,
}

impl ReportCoordinates {
    /// Creates new coordinates.
    pub fn new(
        component: impl Into<String>,
        run_id: impl Into<String>,
        build_id: impl Into<String>,
    ) -> Self {
        Self {
            component: component.into(),
            run_id: run_id.into(),
            build_id: build_id.into(),
        }
    }

    /// Returns the coordinates of the report that holds reruns of this run on the target branch.
    ///
    /// The rerun report lives next to this one, in the same component and build.
    pub fn target_branch(&self) -> Self {
        Self {
            component: self.component.clone(),
            run_id: format!("{}{TARGET_BRANCH_RUN_SUFFIX}", self.run_id),
            build_id: self.build_id.clone(),
        }
    }

    /// Returns the coordinates of the target branch rerun report, owned by another build.
    pub fn target_branch_in_build(&self, build_id: impl Into<String>) -> Self {
        Self {
            build_id: build_id.into(),
            ..self.target_branch()
        }
    }
}

/// The suffix appended to a run id to name its target branch rerun report.
pub const TARGET_BRANCH_RUN_SUFFIX: &str = "-rerun";

impl fmt::Display for ReportCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} (build {})", self.component, self.run_id, self.build_id)
    }
}

/// The store-assigned identifier of an existing report.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportId(String);

impl ReportId {
    /// Creates a new report id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Summary information about a report, as returned by a report lookup.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReportInfo {
    /// The store-assigned id.
    pub id: ReportId,

    /// The coordinates the report was created with.
    pub coordinates: ReportCoordinates,

    /// Whether the report has been marked finished.
    pub finished: bool,
}

/// The status of a test aggregated over every device it ran on.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CrossDeviceStatus {
    /// Passed on every device it ran on.
    Success,

    /// Failed on every device it ran on.
    Failed,

    /// Failed on some devices and passed on others.
    FailedOnSomeDevices,

    /// Lost on at least one device, with no failures.
    LostOnSomeDevices,

    /// Skipped or ignored on every device.
    SkippedOnAllDevices,
}

/// One test in a [`CrossDeviceSuite`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrossDeviceRunTest {
    /// The test name.
    pub name: TestName,

    /// The aggregated status.
    pub status: CrossDeviceStatus,
}

/// All tests of a report with their statuses aggregated across devices.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrossDeviceSuite {
    /// Tests, sorted by name.
    pub tests: Vec<CrossDeviceRunTest>,
}

impl CrossDeviceSuite {
    /// Aggregates run results by test name.
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a RunResult>) -> Self {
        let mut by_name: BTreeMap<&TestName, Vec<RunStatus>> = BTreeMap::new();
        for result in results {
            by_name
                .entry(&result.signature.name)
                .or_default()
                .push(result.status);
        }

        let tests = by_name
            .into_iter()
            .map(|(name, statuses)| CrossDeviceRunTest {
                name: name.clone(),
                status: aggregate_status(&statuses),
            })
            .collect();
        Self { tests }
    }

    /// Returns the number of tests with the given status.
    pub fn count(&self, status: CrossDeviceStatus) -> usize {
        self.tests.iter().filter(|test| test.status == status).count()
    }
}

fn aggregate_status(statuses: &[RunStatus]) -> CrossDeviceStatus {
    let count = |wanted: RunStatus| statuses.iter().filter(|s| **s == wanted).count();
    let failed = count(RunStatus::Failed);
    let success = count(RunStatus::Success);
    let lost = count(RunStatus::Lost);

    if failed > 0 {
        if failed == statuses.len() {
            CrossDeviceStatus::Failed
        } else {
            CrossDeviceStatus::FailedOnSomeDevices
        }
    } else if lost > 0 {
        CrossDeviceStatus::LostOnSomeDevices
    } else if success > 0 {
        CrossDeviceStatus::Success
    } else {
        CrossDeviceStatus::SkippedOnAllDevices
    }
}
