// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::StderrStyles;
use owo_colors::OwoColorize;
use std::error::Error;
use testfleet_metadata::FleetExitCode;
use testfleet_runner::errors::{
    ActionError, ConfigParseError, ConfigurationNotFound, DisplayErrorChain, ReportStoreError,
    SchedulerError,
};
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// The #[error()] strings are placeholders: errors are printed with display_to_stderr, which
// colorizes them and appends the source chain.

/// An error testfleet knows how to report.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("configuration not found")]
    ConfigurationNotFound {
        #[from]
        err: ConfigurationNotFound,
    },
    #[error("action failed")]
    ActionError {
        #[from]
        err: ActionError,
    },
    #[error("error writing output")]
    WriteOutputError {
        #[source]
        err: std::io::Error,
    },
    #[error("error serializing output")]
    SerializeOutputError {
        #[source]
        err: serde_json::Error,
    },
    #[error("no tests to run")]
    NoTestsRun,
    #[error("test run failed")]
    TestRunFailed {
        message: String,
        #[source]
        cause: Option<ReportStoreError>,
    },
}

impl ExpectedError {
    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::ConfigParseError { .. } | Self::ConfigurationNotFound { .. } => {
                FleetExitCode::SETUP_ERROR
            }
            Self::ActionError { err } => action_exit_code(err),
            Self::WriteOutputError { .. } | Self::SerializeOutputError { .. } => {
                FleetExitCode::WRITE_OUTPUT_ERROR
            }
            Self::NoTestsRun => FleetExitCode::NO_TESTS_RUN,
            Self::TestRunFailed { .. } => FleetExitCode::TEST_RUN_FAILED,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        error!("{}", self.display_with_causes(styles));
    }

    /// Renders the error message followed by its chain of causes.
    pub(crate) fn display_with_causes(&self, styles: &StderrStyles) -> String {
        let (message, cause) = match self {
            Self::ConfigParseError { err } => (
                format!(
                    "failed to parse testfleet config at `{}`",
                    err.config_file().style(styles.bold)
                ),
                Some(err.kind() as &dyn Error),
            ),
            Self::ConfigurationNotFound { err } => (err.to_string(), err.source()),
            Self::ActionError { err } => (err.to_string(), err.source()),
            Self::WriteOutputError { err } => {
                ("failed to write output".to_owned(), Some(err as &dyn Error))
            }
            Self::SerializeOutputError { err } => (
                "failed to serialize output".to_owned(),
                Some(err as &dyn Error),
            ),
            Self::NoTestsRun => (
                format!(
                    "no tests to run {}",
                    "(check the filter and the configured targets)".style(styles.warning_text)
                ),
                None,
            ),
            Self::TestRunFailed { message, cause } => (
                format!("test run failed: {}", message.style(styles.bold)),
                cause.as_ref().map(|err| err as &dyn Error),
            ),
        };

        match cause {
            Some(cause) => format!("{message}\n  caused by: {}", DisplayErrorChain::new(cause)),
            None => message,
        }
    }
}

fn action_exit_code(err: &ActionError) -> i32 {
    match err {
        ActionError::Scheduler(SchedulerError::SuiteLoad(_)) => FleetExitCode::SUITE_LOAD_FAILED,
        ActionError::Scheduler(SchedulerError::FilterBuild(_)) => {
            FleetExitCode::REPORT_HISTORY_FAILED
        }
        ActionError::Scheduler(SchedulerError::Dispatch(_)) => FleetExitCode::DISPATCH_FAILED,
        ActionError::WriteReport(_) => FleetExitCode::WRITE_OUTPUT_ERROR,
        ActionError::TokioRuntimeCreate(_) => FleetExitCode::SETUP_ERROR,
        _ => 1,
    }
}
