// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Human-readable views of the resolved configuration.

use crate::config::{
    FleetConfig, IncludeExclude, RunSettings, TargetBranchResultSource,
};
use itertools::Itertools;
use owo_colors::{OwoColorize, Style};
use std::{fmt, io};

/// Lists the configurations defined in a [`FleetConfig`].
pub struct ShowConfigurations<'a> {
    config: &'a FleetConfig,
}

impl<'a> ShowConfigurations<'a> {
    /// Construct a new [`ShowConfigurations`].
    pub fn new(config: &'a FleetConfig) -> Self {
        Self { config }
    }

    /// Write the configuration names in human-readable form.
    pub fn write_human(&self, writer: &mut dyn io::Write, colorize: bool) -> io::Result<()> {
        let mut styles = Styles::default();
        if colorize {
            styles.colorize();
        }

        writeln!(writer, "configurations:")?;
        for name in self.config.configuration_names() {
            writeln!(writer, "    - {}", name.style(styles.name))?;
        }
        Ok(())
    }
}

/// Shows the settings a run with a given configuration would use.
pub struct ShowRunSettings<'a> {
    settings: &'a RunSettings,
}

impl<'a> ShowRunSettings<'a> {
    /// Construct a new [`ShowRunSettings`].
    pub fn new(settings: &'a RunSettings) -> Self {
        Self { settings }
    }

    /// Write the settings in human-readable form.
    pub fn write_human(&self, writer: &mut dyn io::Write, colorize: bool) -> io::Result<()> {
        let mut styles = Styles::default();
        if colorize {
            styles.colorize();
        }
        let settings = self.settings;

        writeln!(
            writer,
            "configuration: {}",
            settings.configuration.style(styles.name)
        )?;

        let flags = [
            ("suppress-failure", settings.suppress_failure),
            ("suppress-flaky", settings.suppress_flaky),
            ("report-skipped-tests", settings.report_skipped_tests),
            ("report-flaky-tests", settings.report_flaky_tests),
            ("rerun-on-target-branch", settings.rerun_on_target_branch),
            ("is-full-test-suite", settings.is_full_test_suite),
            ("send-statistics", settings.send_statistics),
        ];
        for (key, value) in flags {
            let style = if value { styles.enabled } else { styles.disabled };
            writeln!(writer, "    {key}: {}", value.style(style))?;
        }

        write!(writer, "targets:")?;
        if settings.targets.is_empty() {
            writeln!(writer, " {}", "(none)".style(styles.warning))?;
        } else {
            writeln!(writer)?;
            for target in &settings.targets {
                writeln!(
                    writer,
                    "    - {} (API {})",
                    target.device.style(styles.name),
                    target.api
                )?;
            }
        }

        let filter = &settings.filter;
        writeln!(writer, "filter:")?;
        write_include_exclude(writer, "annotations", &filter.annotations)?;
        write_include_exclude(writer, "prefixes", &filter.prefixes)?;
        write_include_exclude(writer, "previous-statuses", &filter.previous_statuses)?;
        if let Some(report) = &filter.report {
            writeln!(writer, "    report {}:", report.id.style(styles.name))?;
            write_include_exclude(writer, "  statuses", &report.statuses)?;
        }

        let execution = &settings.execution;
        writeln!(writer, "execution:")?;
        writeln!(writer, "    parallelism: {}", execution.parallelism)?;
        writeln!(
            writer,
            "    timeout-per-test: {}",
            humantime::format_duration(execution.timeout_per_test)
        )?;
        writeln!(writer, "    retry-count: {}", execution.retry_count)?;

        if let Some(performance) = &settings.performance {
            writeln!(writer, "performance:")?;
            match &performance.target_branch_result_source {
                TargetBranchResultSource::RunInProcess => {
                    writeln!(writer, "    baseline: run in process")?;
                }
                TargetBranchResultSource::FetchFromOtherBuild { target_build_id } => {
                    writeln!(
                        writer,
                        "    baseline: fetched from build {}",
                        target_build_id.style(styles.name)
                    )?;
                }
            }
            writeln!(
                writer,
                "    significant-change: {}",
                performance.significant_change
            )?;
        }

        let report = &settings.report;
        writeln!(writer, "report:")?;
        writeln!(writer, "    batch-size: {}", report.batch_size)?;
        writeln!(
            writer,
            "    max-concurrent-batches: {}",
            report.max_concurrent_batches
        )?;
        match &report.viewer_url {
            Some(url) => writeln!(writer, "    viewer-url: {url}")?,
            None => writeln!(writer, "    viewer-url: {}", "(none)".style(styles.disabled))?,
        }

        Ok(())
    }
}

fn write_include_exclude<T: Ord + fmt::Display>(
    writer: &mut dyn io::Write,
    key: &str,
    values: &IncludeExclude<T>,
) -> io::Result<()> {
    if values.is_empty() {
        return Ok(());
    }
    writeln!(
        writer,
        "    {key}: included [{}], excluded [{}]",
        values.included.iter().join(", "),
        values.excluded.iter().join(", "),
    )
}

#[derive(Clone, Debug, Default)]
struct Styles {
    name: Style,
    enabled: Style,
    disabled: Style,
    warning: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.name = Style::new().bold();
        self.enabled = Style::new().bold().green();
        self.disabled = Style::new().dimmed();
        self.warning = Style::new().bold().yellow();
    }
}
