// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for testfleet-runner.
//!
//! Only [`plural`] is public; it is shared with the command-line front end.

use chrono::{DateTime, FixedOffset, Local};
use indexmap::IndexMap;
use testfleet_metadata::{RunResult, TestSignature};

/// Utilities for pluralizing words based on count.
pub mod plural {
    /// Returns "test" if `count` is 1, otherwise "tests".
    pub fn tests_str(count: usize) -> &'static str {
        if count == 1 { "test" } else { "tests" }
    }

    /// Returns "failure" if `count` is 1, otherwise "failures".
    pub fn failures_str(count: usize) -> &'static str {
        if count == 1 { "failure" } else { "failures" }
    }
}

/// Returns the current local time with its offset.
pub(crate) fn now() -> DateTime<FixedOffset> {
    Local::now().fixed_offset()
}

/// Collapses results to the last result recorded for each signature, in first-seen order.
///
/// Reports are append-only, so a rerun or a manual override shows up as a later result for the
/// same signature.
pub(crate) fn latest_by_signature(results: &[RunResult]) -> Vec<RunResult> {
    let mut latest: IndexMap<&TestSignature, &RunResult> = IndexMap::new();
    for result in results {
        latest.insert(&result.signature, result);
    }
    latest.into_values().cloned().collect()
}
