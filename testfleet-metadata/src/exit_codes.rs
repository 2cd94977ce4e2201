// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `testfleet` failures.
///
/// `testfleet` runs may fail for a variety of reasons. This structure documents the exit codes
/// that may occur in case of expected failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum FleetExitCode {}

impl FleetExitCode {
    /// No errors occurred and testfleet exited normally.
    pub const OK: i32 = 0;

    /// No tests were selected to run, but no other errors occurred.
    pub const NO_TESTS_RUN: i32 = 4;

    /// The run finished with a failed verdict: failed or lost tests that were not suppressed.
    pub const TEST_RUN_FAILED: i32 = 100;

    /// The executor reported a dispatch error.
    pub const DISPATCH_FAILED: i32 = 101;

    /// Querying run history from the report store failed while building the initial filter.
    pub const REPORT_HISTORY_FAILED: i32 = 102;

    /// Loading the compiled test suite failed.
    pub const SUITE_LOAD_FAILED: i32 = 104;

    /// Writing data to stdout, stderr or the output directory produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;

    /// A user issue happened while setting up a testfleet invocation: a malformed config file,
    /// an unknown configuration name or an unreadable input file.
    pub const SETUP_ERROR: i32 = 96;
}
