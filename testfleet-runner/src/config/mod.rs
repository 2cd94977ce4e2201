// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for testfleet.
//!
//! Configuration is read from an embedded default file overlaid with the user's
//! `.config/testfleet.toml`. A [`FleetConfig`] holds any number of named configurations, each of
//! which inherits unset settings from the `default` configuration. Resolving a configuration by
//! name produces a [`ConfigurationProfile`], and from it the owned [`RunSettings`] that drive a
//! run.

mod execution;
mod filter;
mod imp;

pub use execution::*;
pub use filter::*;
pub use imp::*;
