// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by testfleet.

use crate::{
    executor::RunType,
    scheduler::SchedulerState,
    test_filter::SignatureSource,
};
use camino::Utf8PathBuf;
use config::ConfigError;
use std::{error::Error, fmt, sync::Arc};
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse testfleet config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of a [`ConfigParseError`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),

    /// A value was syntactically valid but not acceptable.
    #[error("invalid value for `{key}`: {reason}")]
    InvalidValue {
        /// The key the value was provided for.
        key: String,

        /// Why the value is invalid.
        reason: String,
    },
}

/// An error which indicates that a configuration was requested but not known to testfleet.
#[derive(Clone, Debug, Error)]
#[error(
    "configuration `{name}` not found (known configurations: {})",
    .all_configurations.join(", ")
)]
pub struct ConfigurationNotFound {
    name: String,
    all_configurations: Vec<String>,
}

impl ConfigurationNotFound {
    pub(crate) fn new(
        name: impl Into<String>,
        all_configurations: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut all_configurations: Vec<_> =
            all_configurations.into_iter().map(|s| s.into()).collect();
        all_configurations.sort_unstable();
        Self {
            name: name.into(),
            all_configurations,
        }
    }
}

/// An operation performed against a report store.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReportOperation {
    /// Creating a report.
    Create,

    /// Looking up a report.
    GetReport,

    /// Reading the tests of a report.
    GetTests,

    /// Appending tests to a report.
    AddTests,

    /// Marking a report as finished.
    SetFinished,

    /// Marking a test run as successful.
    MarkAsSuccessful,

    /// Reading cross-device data.
    GetCrossDeviceTestData,

    /// Pushing prepared analyzer data.
    PushPreparedData,
}

impl fmt::Display for ReportOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::GetReport => "get report",
            Self::GetTests => "get tests",
            Self::AddTests => "add tests",
            Self::SetFinished => "set finished",
            Self::MarkAsSuccessful => "mark as successful",
            Self::GetCrossDeviceTestData => "get cross-device test data",
            Self::PushPreparedData => "push prepared data",
        };
        f.write_str(s)
    }
}

/// An error returned by a [`ReportStore`](crate::report::ReportStore).
///
/// Cloneable so that a single failed query can be attached to several verdicts.
#[derive(Clone, Debug, Error)]
#[error("report store operation `{operation}` failed for {target}")]
pub struct ReportStoreError {
    operation: ReportOperation,
    target: String,
    #[source]
    err: Arc<dyn Error + Send + Sync>,
}

impl ReportStoreError {
    /// Creates a new error for `operation` performed on `target` (usually report coordinates or a
    /// report id).
    pub fn new(
        operation: ReportOperation,
        target: impl fmt::Display,
        err: impl Into<Box<dyn Error + Send + Sync>>,
    ) -> Self {
        Self {
            operation,
            target: target.to_string(),
            err: Arc::from(err.into()),
        }
    }

    /// Returns the operation that failed.
    pub fn operation(&self) -> ReportOperation {
        self.operation
    }
}

/// An error that occurred while building the initial test filter.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum FilterBuildError {
    /// Run history could not be read from a report.
    #[error("failed to read run history for the {source_kind} filter from {report}")]
    RunHistory {
        /// The filter source that needed the history.
        source_kind: SignatureSource,

        /// The report that was queried.
        report: String,

        /// The underlying error.
        #[source]
        err: ReportStoreError,
    },
}

/// An error that occurred while loading a compiled test suite.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoadError {
    /// The suite artifact could not be read.
    #[error("error reading test suite from `{path}`")]
    Read {
        /// The artifact path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// The suite artifact is malformed.
    #[error("error parsing test suite from `{path}`")]
    Parse {
        /// The artifact path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: serde_json::Error,
    },

    /// The suite artifact contained the same test more than once.
    #[error("test suite `{path}` lists `{name}` more than once")]
    DuplicateTest {
        /// The artifact path.
        path: Utf8PathBuf,

        /// The duplicated test.
        name: String,
    },
}

/// An error reported by a [`TestExecutor`](crate::executor::TestExecutor).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DispatchError {
    /// The executor failed.
    #[error("executor failed during {run_type} dispatch")]
    Executor {
        /// The dispatch phase.
        run_type: RunType,

        /// The underlying error.
        #[source]
        err: Box<dyn Error + Send + Sync>,
    },

    /// Recorded results could not be read.
    #[error("error reading recorded results from `{path}`")]
    ReplayRead {
        /// The results file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// Recorded results are malformed.
    #[error("error parsing recorded results from `{path}`")]
    ReplayParse {
        /// The results file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: serde_json::Error,
    },
}

/// An error that aborted scheduling.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SchedulerError {
    /// The test suite could not be loaded.
    #[error("error loading test suite")]
    SuiteLoad(#[from] LoadError),

    /// The initial filter could not be built.
    #[error("error building test filter")]
    FilterBuild(#[from] FilterBuildError),

    /// The executor failed.
    #[error("error dispatching tests")]
    Dispatch(#[from] DispatchError),

    /// The scheduler attempted a backward state transition.
    #[error("invalid scheduler transition from {from} to {to}")]
    InvalidTransition {
        /// The current state.
        from: SchedulerState,

        /// The requested state.
        to: SchedulerState,
    },
}

/// An error that occurred while writing a report file to the output directory.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WriteReportError {
    /// A filesystem operation failed.
    #[error("error operating on path `{file}`")]
    Fs {
        /// The file being operated on.
        file: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// Serializing JSON failed.
    #[error("error writing JSON to `{file}`")]
    Json {
        /// The output file.
        file: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: serde_json::Error,
    },

    /// Serializing JUnit XML failed.
    #[error("error writing JUnit output to `{file}`")]
    Junit {
        /// The output file.
        file: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: quick_junit::SerializeError,
    },
}

/// An error that aborted an instrumentation tests action.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ActionError {
    /// Creating the tokio runtime failed.
    #[error("error creating tokio runtime")]
    TokioRuntimeCreate(#[source] std::io::Error),

    /// Scheduling failed.
    #[error("error scheduling tests")]
    Scheduler(#[from] SchedulerError),

    /// Writing output files failed.
    #[error("error writing run output")]
    WriteReport(#[from] WriteReportError),
}

/// An error returned by a [`Notifier`](crate::notify::Notifier).
#[derive(Debug, Error)]
#[error("failed to send {what}")]
pub struct NotifyError {
    what: &'static str,
    #[source]
    err: Box<dyn Error + Send + Sync>,
}

impl NotifyError {
    /// Creates a new error for a notification of the given kind.
    pub fn new(what: &'static str, err: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self {
            what,
            err: err.into(),
        }
    }
}

/// Displays an error along with its chain of sources.
pub struct DisplayErrorChain<E>(E);

impl<E: Error> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain`.
    pub fn new(error: E) -> Self {
        Self(error)
    }
}

impl<E: Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(err) = source {
            write!(f, "\n  caused by: {err}")?;
            source = err.source();
        }
        Ok(())
    }
}
