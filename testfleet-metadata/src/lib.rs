// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Data model shared by testfleet components.
//!
//! Everything in this crate is plain, serializable data: the identity of a test
//! ([`TestSignature`]), its static metadata ([`TestStaticData`]), the terminal
//! result of a test attempt ([`RunResult`]) and the coordinates of a report in
//! a report store ([`ReportCoordinates`]).
//!
//! The scheduling, filtering and verdict logic lives in `testfleet-runner`.

mod exit_codes;
mod report;
mod run_result;
mod signature;
mod test_data;

pub use exit_codes::*;
pub use report::*;
pub use run_result::*;
pub use signature::*;
pub use test_data::*;
