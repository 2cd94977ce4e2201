// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::TestSignature;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, time::Duration};

/// The terminal status of a test attempt.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    /// The test passed.
    Success,

    /// The test failed.
    Failed,

    /// The test was selected to run but never reported a result.
    Lost,

    /// The test was filtered out before dispatch.
    Skipped,

    /// The test is marked as ignored in code.
    Ignored,
}

impl RunStatus {
    /// Returns the list of all variants, in the order they're usually shown.
    pub fn variants() -> &'static [&'static str] {
        &["success", "failed", "lost", "skipped", "ignored"]
    }

    /// Returns the kebab-case name of this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Lost => "lost",
            Self::Skipped => "skipped",
            Self::Ignored => "ignored",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The terminal result of a single test attempt, as produced by an executor or read back from a
/// report.
///
/// Run results are never mutated once recorded. A rerun produces new results.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunResult {
    /// The test and device this result is for.
    pub signature: TestSignature,

    /// The terminal status.
    pub status: RunStatus,

    /// When the result was recorded.
    pub timestamp: DateTime<FixedOffset>,

    /// The identity of the physical device or emulator instance, if the test reached one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    /// The failure message, or the reason a test was skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// The number of attempts the executor made before reaching this status.
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Time spent on the final attempt.
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,

    /// Numeric measurements recorded by performance tests, keyed by metric name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, f64>,
}

fn default_attempts() -> u32 {
    1
}

impl RunResult {
    /// Creates a new result with a single attempt and no message, duration or metrics.
    pub fn new(
        signature: TestSignature,
        status: RunStatus,
        timestamp: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            signature,
            status,
            timestamp,
            device_id: None,
            message: None,
            attempts: 1,
            duration: None,
            metrics: BTreeMap::new(),
        }
    }

    /// Sets the message for this result.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sets the device identity for this result.
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Returns true if this result passed only after executor retries.
    pub fn is_retried_success(&self) -> bool {
        self.status == RunStatus::Success && self.attempts > 1
    }
}
