// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Options shared between subcommands.

use crate::{ExpectedError, Result};
use camino::Utf8PathBuf;
use clap::Args;
use testfleet_metadata::ReportCoordinates;
use testfleet_runner::{
    config::{FleetConfig, RunSettings},
    report::LocalReportStore,
};

/// Configuration options.
#[derive(Debug, Args)]
#[command(next_help_heading = "Config options")]
pub(crate) struct ConfigOpts {
    /// Project root [default: current directory].
    #[arg(long, global = true, value_name = "DIR", default_value = ".")]
    pub(crate) project_root: Utf8PathBuf,

    /// Config file [default: project-root/.config/testfleet.toml].
    #[arg(long, global = true, value_name = "PATH")]
    pub(crate) config_file: Option<Utf8PathBuf>,

    /// The configuration to use.
    ///
    /// Every configuration inherits unset settings from the `default` configuration.
    #[arg(
        long,
        short = 'C',
        global = true,
        env = "TESTFLEET_CONFIGURATION",
        default_value = FleetConfig::DEFAULT_CONFIGURATION,
    )]
    pub(crate) configuration: String,
}

impl ConfigOpts {
    pub(crate) fn make_config(&self) -> Result<FleetConfig> {
        FleetConfig::from_sources(&self.project_root, self.config_file.as_deref())
            .map_err(ExpectedError::from)
    }

    pub(crate) fn run_settings(&self, config: &FleetConfig) -> Result<RunSettings> {
        let profile = config.configuration(&self.configuration)?;
        Ok(profile.run_settings())
    }
}

/// Where results are recorded.
#[derive(Debug, Args)]
#[command(next_help_heading = "Report options")]
pub(crate) struct ReportOpts {
    /// The component under test.
    #[arg(long, env = "TESTFLEET_COMPONENT")]
    pub(crate) component: String,

    /// The identifier of this test run.
    #[arg(long, env = "TESTFLEET_RUN_ID")]
    pub(crate) run_id: String,

    /// The identifier of the CI build.
    #[arg(long, env = "TESTFLEET_BUILD_ID")]
    pub(crate) build_id: String,

    /// Directory holding the local report store.
    #[arg(long, value_name = "DIR", env = "TESTFLEET_STORE_DIR")]
    pub(crate) store_dir: Utf8PathBuf,
}

impl ReportOpts {
    pub(crate) fn coordinates(&self) -> ReportCoordinates {
        ReportCoordinates::new(&self.component, &self.run_id, &self.build_id)
    }

    pub(crate) fn store(&self) -> LocalReportStore {
        LocalReportStore::new(&self.store_dir)
    }
}

/// The suite to run and where to write outputs.
#[derive(Debug, Args)]
#[command(next_help_heading = "Suite options")]
pub(crate) struct SuiteOpts {
    /// The test suite manifest (JSON).
    #[arg(long, value_name = "PATH")]
    pub(crate) suite: Utf8PathBuf,

    /// Directory for JUnit output, filter diagnostics and the report viewer link.
    #[arg(long, value_name = "DIR", default_value = "target/testfleet")]
    pub(crate) output_dir: Utf8PathBuf,
}
