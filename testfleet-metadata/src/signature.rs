// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{borrow::Borrow, fmt};

/// The fully qualified name of an instrumentation test: `package.Class.method`.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestName(SmolStr);

impl TestName {
    /// Creates a new test name.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(SmolStr::new(name))
    }

    /// Returns the name as a string.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the class part of the name, everything before the last `.`.
    ///
    /// Returns the whole name if it has no `.`.
    pub fn class_name(&self) -> &str {
        match self.0.rsplit_once('.') {
            Some((class_name, _)) => class_name,
            None => self.as_str(),
        }
    }

    /// Returns the method part of the name, everything after the last `.`.
    pub fn method_name(&self) -> &str {
        match self.0.rsplit_once('.') {
            Some((_, method_name)) => method_name,
            None => self.as_str(),
        }
    }
}

impl fmt::Display for TestName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TestName {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl From<&str> for TestName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// The name of a device configuration in the device pool, for example `api29`.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceName(SmolStr);

impl DeviceName {
    /// Creates a new device name.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(SmolStr::new(name))
    }

    /// Returns the name as a string.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for DeviceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// The identity of a test: its name plus the device it is run on.
///
/// Signatures are the join key between the test suite, the results streamed back by an executor,
/// and the results stored in a report. Equality is structural.
///
/// A signature without a device name matches the test on every device. Such signatures are
/// produced from name prefixes configured in code.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestSignature {
    /// The test name.
    pub name: TestName,

    /// The device name, or `None` for any device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<DeviceName>,
}

impl TestSignature {
    /// Creates a signature for a test on a specific device.
    pub fn new(name: impl Into<TestName>, device_name: impl Into<DeviceName>) -> Self {
        Self {
            name: name.into(),
            device_name: Some(device_name.into()),
        }
    }

    /// Creates a signature that matches the test on any device.
    pub fn any_device(name: impl Into<TestName>) -> Self {
        Self {
            name: name.into(),
            device_name: None,
        }
    }
}

impl fmt::Display for TestSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.device_name {
            Some(device_name) => write!(f, "{} ({})", self.name, device_name),
            None => write!(f, "{} (any device)", self.name),
        }
    }
}
