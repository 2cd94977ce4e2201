// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Data models for fixture information.

use chrono::{DateTime, FixedOffset};
use testfleet_metadata::{
    DeviceConfiguration, RunResult, RunStatus, TestSignature, TestStaticData,
};

#[derive(Copy, Clone, Debug)]
pub struct TestFixture {
    pub name: &'static str,
    pub min_sdk: Option<u32>,
    pub annotations: &'static [&'static str],
    pub status: FixtureStatus,
}

impl TestFixture {
    pub const fn new(name: &'static str, status: FixtureStatus) -> Self {
        Self {
            name,
            min_sdk: None,
            annotations: &[],
            status,
        }
    }

    pub const fn with_min_sdk(mut self, min_sdk: u32) -> Self {
        self.min_sdk = Some(min_sdk);
        self
    }

    pub const fn with_annotations(mut self, annotations: &'static [&'static str]) -> Self {
        self.annotations = annotations;
        self
    }

    pub fn static_data(&self) -> TestStaticData {
        let mut data = TestStaticData::new(self.name);
        data.min_sdk = self.min_sdk;
        data.annotations = self.annotations.iter().map(|a| (*a).to_owned()).collect();
        data
    }

    /// Returns true if the initial filter keeps this test on `target`.
    pub fn runs_on(&self, target: &DeviceConfiguration) -> bool {
        !self.status.is_ignored() && self.min_sdk.is_none_or(|min_sdk| target.api >= min_sdk)
    }

    /// The result the executor reports for this test on the change under test, if any.
    pub fn run_result(
        &self,
        target: &DeviceConfiguration,
        timestamp: DateTime<FixedOffset>,
    ) -> Option<RunResult> {
        let (status, attempts) = match self.status {
            FixtureStatus::Pass => (RunStatus::Success, 1),
            FixtureStatus::Fail | FixtureStatus::PreExistingFail => (RunStatus::Failed, 1),
            FixtureStatus::Flaky { pass_attempt } => (RunStatus::Success, pass_attempt),
            FixtureStatus::Lost | FixtureStatus::Ignored => return None,
        };
        Some(self.result(target, status, attempts, timestamp))
    }

    /// The result the executor reports for this test on the target branch, if any.
    pub fn rerun_result(
        &self,
        target: &DeviceConfiguration,
        timestamp: DateTime<FixedOffset>,
    ) -> Option<RunResult> {
        let status = match self.status {
            FixtureStatus::PreExistingFail => RunStatus::Failed,
            FixtureStatus::Ignored => return None,
            _ => RunStatus::Success,
        };
        Some(self.result(target, status, 1, timestamp))
    }

    fn result(
        &self,
        target: &DeviceConfiguration,
        status: RunStatus,
        attempts: u32,
        timestamp: DateTime<FixedOffset>,
    ) -> RunResult {
        let signature = TestSignature::new(self.name, target.device.clone());
        let mut result = RunResult::new(signature, status, timestamp)
            .with_device_id(format!("emulator-{}", target.api));
        if status == RunStatus::Failed {
            result = result.with_message("java.lang.AssertionError");
        }
        result.attempts = attempts;
        result
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FixtureStatus {
    Pass,
    /// Fails on the change under test, passes on the target branch.
    Fail,
    /// Fails on both the change under test and the target branch.
    PreExistingFail,
    Flaky {
        pass_attempt: u32,
    },
    /// Never reports a result.
    Lost,
    /// Carries the ignore annotation.
    Ignored,
}

impl FixtureStatus {
    pub fn is_ignored(self) -> bool {
        matches!(self, FixtureStatus::Ignored)
    }
}
