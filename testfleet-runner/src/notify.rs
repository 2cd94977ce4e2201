// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notifications sent at the end of a run.
//!
//! Chat and code review integrations live behind [`Notifier`]. Notification failures are logged by
//! the caller and never change the verdict.

use crate::{errors::NotifyError, helpers::plural, scheduler::FlakyInfo};
use std::{fmt::Write as _, future::Future};
use testfleet_metadata::{CrossDeviceStatus, CrossDeviceSuite, ReportCoordinates, ReportId};
use tracing::info;

/// Sends run summaries to people and dashboards.
pub trait Notifier: Send + Sync {
    /// Reports tests that passed only after retries.
    fn report_flaky_summary(
        &self,
        flaky: &FlakyInfo,
        coordinates: &ReportCoordinates,
    ) -> impl Future<Output = Result<(), NotifyError>> + Send;

    /// Sends aggregated per-test statistics of a finished report.
    fn send_statistics(
        &self,
        id: &ReportId,
        suite: &CrossDeviceSuite,
    ) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// A notifier that writes summaries to the log.
#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    /// Creates a new notifier.
    pub fn new() -> Self {
        Self
    }
}

impl Notifier for LogNotifier {
    async fn report_flaky_summary(
        &self,
        flaky: &FlakyInfo,
        coordinates: &ReportCoordinates,
    ) -> Result<(), NotifyError> {
        info!("{}", flaky_summary(flaky, coordinates));
        Ok(())
    }

    async fn send_statistics(
        &self,
        id: &ReportId,
        suite: &CrossDeviceSuite,
    ) -> Result<(), NotifyError> {
        info!("{}", statistics_summary(id, suite));
        Ok(())
    }
}

pub(crate) fn flaky_summary(flaky: &FlakyInfo, coordinates: &ReportCoordinates) -> String {
    if flaky.tests.is_empty() {
        return format!("no flaky tests in {coordinates}");
    }

    let count = flaky.tests.len();
    let mut summary = format!(
        "{count} flaky {} in {coordinates}, {} wasted on retries:",
        plural::tests_str(count),
        humantime::format_duration(flaky.total_wasted_time()),
    );
    for test in &flaky.tests {
        _ = write!(summary, "\n  {}, {} attempts", test.signature, test.attempts);
    }
    summary
}

pub(crate) fn statistics_summary(id: &ReportId, suite: &CrossDeviceSuite) -> String {
    let count = |status| suite.count(status);
    format!(
        "statistics for report {id}: {} {}, {} passed, {} failed, {} failed on some devices, \
         {} lost on some devices, {} skipped",
        suite.tests.len(),
        plural::tests_str(suite.tests.len()),
        count(CrossDeviceStatus::Success),
        count(CrossDeviceStatus::Failed),
        count(CrossDeviceStatus::FailedOnSomeDevices),
        count(CrossDeviceStatus::LostOnSomeDevices),
        count(CrossDeviceStatus::SkippedOnAllDevices),
    )
}
