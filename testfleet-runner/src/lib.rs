// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for testfleet, a runner for Android instrumentation tests on a device fleet.
//!
//! The basic flow of a run lives in [`action::InstrumentationTestsAction`]:
//!
//! 1. The initial [`test_filter::TestsFilter`] is built from configuration and from the history
//!    kept in a [`report::ReportStore`].
//! 2. A [`scheduler::TestsScheduler`] loads the suite, applies the filter and dispatches the
//!    remaining tests to an [`executor::TestExecutor`], optionally rerunning them on the target
//!    branch.
//! 3. The [`verdict`] module decides whether the run passed from the results that made it into
//!    the report.

pub mod action;
pub mod config;
pub mod errors;
pub mod executor;
pub mod helpers;
pub mod notify;
pub mod report;
pub mod scheduler;
pub mod show_config;
pub mod suite;
pub mod test_filter;
#[cfg(test)]
mod test_helpers;
pub mod verdict;
