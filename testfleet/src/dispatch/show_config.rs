// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Show-config command implementation.

use super::common::ConfigOpts;
use crate::{
    ExpectedError, Result,
    output::{OutputContext, OutputWriter},
};
use clap::Subcommand;
use std::io::Write;
use testfleet_metadata::FleetExitCode;
use testfleet_runner::show_config::{ShowConfigurations, ShowRunSettings};

/// Subcommands for show-config.
#[derive(Debug, Subcommand)]
pub(crate) enum ShowConfigCommand {
    /// List the configurations defined in the config file.
    Configurations {},
    /// Show the settings a run with the selected configuration would use.
    Settings {},
}

impl ShowConfigCommand {
    pub(crate) fn exec(
        self,
        config_opts: &ConfigOpts,
        output: OutputContext,
        output_writer: &mut OutputWriter,
    ) -> Result<i32> {
        let config = config_opts.make_config()?;
        let colorize = output.color.should_colorize(supports_color::Stream::Stdout);
        let mut writer = output_writer.stdout_writer();

        match self {
            Self::Configurations {} => ShowConfigurations::new(&config)
                .write_human(&mut writer, colorize)
                .map_err(|err| ExpectedError::WriteOutputError { err })?,
            Self::Settings {} => {
                let settings = config_opts.run_settings(&config)?;
                ShowRunSettings::new(&settings)
                    .write_human(&mut writer, colorize)
                    .map_err(|err| ExpectedError::WriteOutputError { err })?;
            }
        }

        writer
            .flush()
            .map_err(|err| ExpectedError::WriteOutputError { err })?;
        Ok(FleetExitCode::OK)
    }
}
