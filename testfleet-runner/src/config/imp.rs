// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{ExecutionParameters, FilterSpec, PerformanceConfig};
use crate::errors::{ConfigParseError, ConfigParseErrorKind, ConfigurationNotFound};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::BTreeSet;
use testfleet_metadata::DeviceConfiguration;
use tracing::warn;

/// Trait for handling configuration warnings.
pub trait ConfigWarnings {
    /// Handle unknown configuration keys found in a config file.
    fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>);
}

/// Logs configuration warnings with `tracing`.
pub struct DefaultConfigWarnings;

impl ConfigWarnings for DefaultConfigWarnings {
    fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>) {
        let mut unknown_str = String::new();
        if unknown.len() == 1 {
            unknown_str.push_str("key: ");
            unknown_str.extend(unknown.iter().map(|key| key.as_str()));
        } else {
            unknown_str.push_str("keys:\n");
            for ignored_key in unknown {
                unknown_str.push_str("\n  - ");
                unknown_str.push_str(ignored_key);
            }
        }

        warn!("in config file {config_file}, ignoring unknown configuration {unknown_str}");
    }
}

/// Overall testfleet configuration.
///
/// Read from the embedded default configuration, overlaid with `.config/testfleet.toml` in the
/// project root or with a file passed in explicitly.
#[derive(Clone, Debug)]
pub struct FleetConfig {
    project_root: Utf8PathBuf,
    inner: FleetConfigImpl,
}

impl FleetConfig {
    /// The default location of the config within the project root.
    pub const CONFIG_PATH: &'static str = ".config/testfleet.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Configurations specified by the user are overlaid on top of this.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// The name of the configuration every other configuration inherits from.
    pub const DEFAULT_CONFIGURATION: &'static str = "default";

    /// Reads the config from the given file, or if not specified from `.config/testfleet.toml` in
    /// the project root.
    ///
    /// A missing `.config/testfleet.toml` is not an error: the default config is used as-is.
    pub fn from_sources(
        project_root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        Self::from_sources_with_warnings(project_root, config_file, &mut DefaultConfigWarnings)
    }

    /// Reads the config with custom warning handling.
    pub fn from_sources_with_warnings(
        project_root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
        warnings: &mut impl ConfigWarnings,
    ) -> Result<Self, ConfigParseError> {
        let project_root = project_root.into();
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = project_root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let (config, unknown) = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;
        if !unknown.is_empty() {
            warnings.unknown_config_keys(&config_file, &unknown);
        }

        let inner = config
            .into_config_impl()
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;
        Ok(Self {
            project_root,
            inner,
        })
    }

    /// Returns the default config.
    pub fn default_config(project_root: impl Into<Utf8PathBuf>) -> Self {
        let config = Self::make_default_config()
            .build()
            .expect("default config is always valid");
        let deserialized: FleetConfigDeserialize = config
            .try_deserialize()
            .expect("default config is always valid");

        Self {
            project_root: project_root.into(),
            inner: deserialized
                .into_config_impl()
                .expect("default config is always valid"),
        }
    }

    /// Returns the project root.
    pub fn project_root(&self) -> &Utf8Path {
        &self.project_root
    }

    /// Returns the report settings shared by all configurations.
    pub fn report_settings(&self) -> &ReportSettings {
        &self.inner.report
    }

    /// Returns the names of all configurations, `default` first.
    pub fn configuration_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(Self::DEFAULT_CONFIGURATION)
            .chain(self.inner.other_configurations.keys().map(|name| name.as_str()))
    }

    /// Returns the configuration with the given name, or an error if it isn't known.
    pub fn configuration(
        &self,
        name: impl AsRef<str>,
    ) -> Result<ConfigurationProfile<'_>, ConfigurationNotFound> {
        let name = name.as_ref();
        let custom = match name {
            Self::DEFAULT_CONFIGURATION => None,
            other => Some(
                self.inner
                    .other_configurations
                    .get(other)
                    .ok_or_else(|| ConfigurationNotFound::new(name, self.configuration_names()))?,
            ),
        };

        Ok(ConfigurationProfile {
            name: name.to_owned(),
            report: &self.inner.report,
            default: &self.inner.default_configuration,
            custom,
        })
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    /// This returns a tuple of (config, ignored paths).
    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(FleetConfigDeserialize, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: FleetConfigDeserialize = serde_path_to_error::deserialize(ignored_de)
            .map_err(|error| {
                // serde_path_to_error reports the key already, so drop it from the config error.
                let path = error.path().clone();
                let error = match error.into_inner() {
                    ConfigError::At { error, .. } => *error,
                    other => other,
                };
                ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                    path, error,
                )))
            })?;

        Ok((config, ignored))
    }
}

/// Settings for talking to the report store, shared by all configurations.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReportSettings {
    /// The number of results per submission batch.
    pub batch_size: usize,

    /// The number of batches in flight at once.
    pub max_concurrent_batches: usize,

    /// The base URL of the report viewer, if any.
    #[serde(default)]
    pub viewer_url: Option<String>,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            batch_size: 400,
            max_concurrent_batches: 8,
            viewer_url: None,
        }
    }
}

/// A named configuration, resolved against the `default` configuration.
///
/// Returned by [`FleetConfig::configuration`].
#[derive(Clone, Debug)]
pub struct ConfigurationProfile<'cfg> {
    name: String,
    report: &'cfg ReportSettings,
    default: &'cfg DefaultConfigurationImpl,
    custom: Option<&'cfg CustomConfigurationImpl>,
}

macro_rules! inherited_flag {
    ($($(#[$attr:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$attr])*
            pub fn $name(&self) -> bool {
                self.custom
                    .and_then(|custom| custom.$name)
                    .unwrap_or(self.default.$name)
            }
        )*
    };
}

impl<'cfg> ConfigurationProfile<'cfg> {
    /// Returns the name of the configuration.
    pub fn name(&self) -> &str {
        &self.name
    }

    inherited_flag!(
        /// Whether failures are reported but don't fail the build.
        suppress_failure,
        /// Whether failures that also fail on the target branch don't fail the build.
        suppress_flaky,
        /// Whether filtered-out tests are sent to the report as skipped.
        report_skipped_tests,
        /// Whether a summary of flaky tests is sent after the run.
        report_flaky_tests,
        /// Whether failed tests are rerun on the target branch.
        rerun_on_target_branch,
        /// Whether the run covers the full test suite.
        is_full_test_suite,
        /// Whether statistics are sent after the run.
        send_statistics,
    );

    /// Returns the device pool for this configuration.
    pub fn targets(&self) -> &'cfg [DeviceConfiguration] {
        self.custom
            .and_then(|custom| custom.targets.as_deref())
            .unwrap_or(&self.default.targets)
    }

    /// Returns the declarative filter.
    pub fn filter(&self) -> &'cfg FilterSpec {
        self.custom
            .and_then(|custom| custom.filter.as_ref())
            .unwrap_or(&self.default.filter)
    }

    /// Returns the executor parameters.
    pub fn execution(&self) -> &'cfg ExecutionParameters {
        self.custom
            .and_then(|custom| custom.execution.as_ref())
            .unwrap_or(&self.default.execution)
    }

    /// Returns the performance settings, if this is a performance configuration.
    pub fn performance(&self) -> Option<&'cfg PerformanceConfig> {
        self.custom
            .and_then(|custom| custom.performance.as_ref())
            .or(self.default.performance.as_ref())
    }

    /// Returns the report settings.
    pub fn report_settings(&self) -> &'cfg ReportSettings {
        self.report
    }

    /// Resolves every setting into an owned [`RunSettings`].
    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            configuration: self.name.clone(),
            suppress_failure: self.suppress_failure(),
            suppress_flaky: self.suppress_flaky(),
            report_skipped_tests: self.report_skipped_tests(),
            report_flaky_tests: self.report_flaky_tests(),
            rerun_on_target_branch: self.rerun_on_target_branch(),
            is_full_test_suite: self.is_full_test_suite(),
            send_statistics: self.send_statistics(),
            targets: self.targets().to_vec(),
            filter: self.filter().clone(),
            execution: self.execution().clone(),
            performance: self.performance().cloned(),
            report: self.report.clone(),
        }
    }
}

/// Fully resolved settings for one run.
#[derive(Clone, Debug)]
pub struct RunSettings {
    /// The name of the configuration these settings came from.
    pub configuration: String,

    /// Whether failures are reported but don't fail the build.
    pub suppress_failure: bool,

    /// Whether failures that also fail on the target branch don't fail the build.
    pub suppress_flaky: bool,

    /// Whether filtered-out tests are sent to the report as skipped.
    pub report_skipped_tests: bool,

    /// Whether a summary of flaky tests is sent after the run.
    pub report_flaky_tests: bool,

    /// Whether failed tests are rerun on the target branch.
    pub rerun_on_target_branch: bool,

    /// Whether the run covers the full test suite.
    pub is_full_test_suite: bool,

    /// Whether statistics are sent after the run.
    pub send_statistics: bool,

    /// The device pool.
    pub targets: Vec<DeviceConfiguration>,

    /// The declarative filter.
    pub filter: FilterSpec,

    /// The executor parameters.
    pub execution: ExecutionParameters,

    /// The performance settings, if any.
    pub performance: Option<PerformanceConfig>,

    /// The report settings.
    pub report: ReportSettings,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            configuration: FleetConfig::DEFAULT_CONFIGURATION.to_owned(),
            suppress_failure: false,
            suppress_flaky: false,
            report_skipped_tests: true,
            report_flaky_tests: false,
            rerun_on_target_branch: false,
            is_full_test_suite: false,
            send_statistics: false,
            targets: Vec::new(),
            filter: FilterSpec::default(),
            execution: ExecutionParameters::default(),
            performance: None,
            report: ReportSettings::default(),
        }
    }
}

#[derive(Clone, Debug)]
struct FleetConfigImpl {
    report: ReportSettings,
    default_configuration: DefaultConfigurationImpl,
    other_configurations: IndexMap<String, CustomConfigurationImpl>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct FleetConfigDeserialize {
    report: ReportSettings,
    #[serde(rename = "configuration")]
    configurations: IndexMap<String, CustomConfigurationImpl>,
}

impl FleetConfigDeserialize {
    fn into_config_impl(mut self) -> Result<FleetConfigImpl, ConfigParseErrorKind> {
        if self.report.batch_size == 0 {
            return Err(invalid_value("report.batch-size", "must be at least 1"));
        }
        if self.report.max_concurrent_batches == 0 {
            return Err(invalid_value(
                "report.max-concurrent-batches",
                "must be at least 1",
            ));
        }

        let default = self
            .configurations
            .shift_remove(FleetConfig::DEFAULT_CONFIGURATION)
            .expect("default configuration should exist");
        let default_configuration = DefaultConfigurationImpl::new(default);

        validate_configuration(
            FleetConfig::DEFAULT_CONFIGURATION,
            Some(&default_configuration.targets),
            Some(&default_configuration.execution),
            default_configuration.performance.as_ref(),
        )?;
        for (name, custom) in &self.configurations {
            validate_configuration(
                name,
                custom.targets.as_deref(),
                custom.execution.as_ref(),
                custom.performance.as_ref(),
            )?;
        }

        Ok(FleetConfigImpl {
            report: self.report,
            default_configuration,
            other_configurations: self.configurations,
        })
    }
}

fn invalid_value(key: impl Into<String>, reason: impl Into<String>) -> ConfigParseErrorKind {
    ConfigParseErrorKind::InvalidValue {
        key: key.into(),
        reason: reason.into(),
    }
}

#[derive(Clone, Debug)]
struct DefaultConfigurationImpl {
    suppress_failure: bool,
    suppress_flaky: bool,
    report_skipped_tests: bool,
    report_flaky_tests: bool,
    rerun_on_target_branch: bool,
    is_full_test_suite: bool,
    send_statistics: bool,
    targets: Vec<DeviceConfiguration>,
    filter: FilterSpec,
    execution: ExecutionParameters,
    performance: Option<PerformanceConfig>,
}

impl DefaultConfigurationImpl {
    fn new(p: CustomConfigurationImpl) -> Self {
        Self {
            suppress_failure: p
                .suppress_failure
                .expect("suppress-failure present in default configuration"),
            suppress_flaky: p
                .suppress_flaky
                .expect("suppress-flaky present in default configuration"),
            report_skipped_tests: p
                .report_skipped_tests
                .expect("report-skipped-tests present in default configuration"),
            report_flaky_tests: p
                .report_flaky_tests
                .expect("report-flaky-tests present in default configuration"),
            rerun_on_target_branch: p
                .rerun_on_target_branch
                .expect("rerun-on-target-branch present in default configuration"),
            is_full_test_suite: p
                .is_full_test_suite
                .expect("is-full-test-suite present in default configuration"),
            send_statistics: p
                .send_statistics
                .expect("send-statistics present in default configuration"),
            targets: p.targets.unwrap_or_default(),
            filter: p.filter.unwrap_or_default(),
            execution: p.execution.unwrap_or_default(),
            performance: p.performance,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CustomConfigurationImpl {
    #[serde(default)]
    suppress_failure: Option<bool>,
    #[serde(default)]
    suppress_flaky: Option<bool>,
    #[serde(default)]
    report_skipped_tests: Option<bool>,
    #[serde(default)]
    report_flaky_tests: Option<bool>,
    #[serde(default)]
    rerun_on_target_branch: Option<bool>,
    #[serde(default)]
    is_full_test_suite: Option<bool>,
    #[serde(default)]
    send_statistics: Option<bool>,
    #[serde(default)]
    targets: Option<Vec<DeviceConfiguration>>,
    #[serde(default)]
    filter: Option<FilterSpec>,
    #[serde(default)]
    execution: Option<ExecutionParameters>,
    #[serde(default)]
    performance: Option<PerformanceConfig>,
}

fn validate_configuration(
    name: &str,
    targets: Option<&[DeviceConfiguration]>,
    execution: Option<&ExecutionParameters>,
    performance: Option<&PerformanceConfig>,
) -> Result<(), ConfigParseErrorKind> {
    if let Some(execution) = execution
        && execution.parallelism == 0
    {
        return Err(invalid_value(
            format!("configuration.{name}.execution.parallelism"),
            "must be at least 1",
        ));
    }
    if let Some(targets) = targets {
        let mut seen = BTreeSet::new();
        for target in targets {
            if !seen.insert(&target.device) {
                return Err(invalid_value(
                    format!("configuration.{name}.targets"),
                    format!("device `{}` is listed more than once", target.device),
                ));
            }
        }
    }
    if let Some(performance) = performance
        && (performance.significant_change.is_nan() || performance.significant_change < 0.0)
    {
        return Err(invalid_value(
            format!("configuration.{name}.performance.significant-change"),
            "must be a non-negative number",
        ));
    }
    Ok(())
}
