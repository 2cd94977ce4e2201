// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command dispatch and execution.

mod app;
mod common;
mod run;
mod show_config;

pub use app::TestfleetApp;
