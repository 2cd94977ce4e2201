// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Top-level application and command routing.

use super::{
    common::ConfigOpts,
    run::{PlanOpts, RunOpts},
    show_config::ShowConfigCommand,
};
use crate::{
    Result,
    output::{OutputContext, OutputOpts, OutputWriter},
};
use clap::{Parser, Subcommand};

/// Schedules Android instrumentation tests on a device fleet and decides whether the run passed.
#[derive(Debug, Parser)]
#[command(
    name = "testfleet",
    version,
    styles = crate::output::clap_styles(),
    max_term_width = 100,
)]
pub struct TestfleetApp {
    #[clap(flatten)]
    output: OutputOpts,

    #[clap(flatten)]
    config_opts: ConfigOpts,

    #[clap(subcommand)]
    command: Command,
}

impl TestfleetApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app.
    ///
    /// Returns the exit code.
    pub fn exec(self, output: OutputContext, output_writer: &mut OutputWriter) -> Result<i32> {
        match self.command {
            Command::Plan(opts) => opts.exec(&self.config_opts, output, output_writer),
            Command::Run(opts) => opts.exec(&self.config_opts, output, output_writer),
            Command::ShowConfig { command } => {
                command.exec(&self.config_opts, output, output_writer)
            }
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load the suite and show which tests the filter selects, without running anything.
    Plan(Box<PlanOpts>),
    /// Run the selected tests, reconcile the report and print the verdict.
    ///
    /// The process exits with a non-zero code if the verdict is a failure.
    Run(Box<RunOpts>),
    /// Show configuration.
    ShowConfig {
        #[clap(subcommand)]
        command: ShowConfigCommand,
    },
}
