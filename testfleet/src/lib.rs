// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A command-line runner for Android instrumentation tests on a device fleet.
//!
//! `testfleet plan` shows which tests a configuration selects, `testfleet run` dispatches them,
//! reconciles the report and exits with a code describing the verdict, and
//! `testfleet show-config` prints the resolved configuration.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;
#[cfg(test)]
mod tests_integration;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::OutputWriter;
