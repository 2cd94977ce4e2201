// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{DeviceName, TestName, TestSignature};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Static metadata for a test, produced once when a compiled test suite is loaded.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestStaticData {
    /// The fully qualified test name.
    pub name: TestName,

    /// The lowest API level the test supports, if restricted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_sdk: Option<u32>,

    /// The highest API level the test supports, if restricted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sdk: Option<u32>,

    /// Fully qualified names of the annotations on the test method and its class.
    #[serde(default)]
    pub annotations: BTreeSet<String>,

    /// Group tags attached to the test.
    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// A human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// The id of the test case in the test management system.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_case_id: Option<u32>,

    /// Whether the test is known to be flaky.
    #[serde(default)]
    pub flakiness: Flakiness,
}

impl TestStaticData {
    /// Creates static data for a test with no annotations or SDK restrictions.
    pub fn new(name: impl Into<TestName>) -> Self {
        Self {
            name: name.into(),
            min_sdk: None,
            max_sdk: None,
            annotations: BTreeSet::new(),
            tags: BTreeSet::new(),
            description: None,
            test_case_id: None,
            flakiness: Flakiness::Stable,
        }
    }

    /// Returns true if the test can run on a device with the given API level.
    pub fn supports_api(&self, api: u32) -> bool {
        self.min_sdk.is_none_or(|min| api >= min) && self.max_sdk.is_none_or(|max| api <= max)
    }
}

/// A known-flakiness marker attached to a test in code.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Flakiness {
    /// The test is not known to be flaky.
    #[default]
    Stable,

    /// The test is known to be flaky.
    Flaky {
        /// Why the test is flaky.
        reason: String,
    },
}

/// A device configuration in the device pool.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeviceConfiguration {
    /// The name of the device configuration.
    pub device: DeviceName,

    /// The API level of the device.
    pub api: u32,
}

/// A test paired with the device configuration it is scheduled on.
///
/// Test suites are expanded over the device pool, so a test appears once per configured device.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestWithTarget {
    /// The static test data.
    pub test: TestStaticData,

    /// The device configuration this instance runs on.
    pub target: DeviceConfiguration,
}

impl TestWithTarget {
    /// Returns the signature of this test instance.
    pub fn signature(&self) -> TestSignature {
        TestSignature {
            name: self.test.name.clone(),
            device_name: Some(self.target.device.clone()),
        }
    }
}
