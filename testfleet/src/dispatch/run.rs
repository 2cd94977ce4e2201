// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `plan` and `run` commands.

use super::common::{ConfigOpts, ReportOpts, SuiteOpts};
use crate::{
    ExpectedError, Result,
    output::{OutputContext, OutputWriter, StdoutStyles},
};
use camino::Utf8PathBuf;
use clap::{Args, ValueEnum};
use owo_colors::OwoColorize;
use serde::Serialize;
use std::io::Write;
use testfleet_metadata::{FleetExitCode, TestSignature};
use testfleet_runner::{
    action::{ActionInputs, ActionOutcome, InstrumentationTestsAction},
    executor::{ReplayExecutor, TestArtifacts},
    helpers::plural,
    notify::LogNotifier,
    report::CreateParams,
    suite::{JsonSuiteLoader, TestSuite},
    verdict::Verdict,
};

#[derive(Copy, Clone, Debug, Default, ValueEnum)]
pub(crate) enum MessageFormat {
    #[default]
    Human,
    Json,
}

/// Options for `testfleet plan`.
#[derive(Debug, Args)]
pub(crate) struct PlanOpts {
    #[clap(flatten)]
    report: ReportOpts,

    #[clap(flatten)]
    suite: SuiteOpts,

    /// Output format.
    #[arg(short = 'T', long, value_enum, default_value_t, value_name = "FMT")]
    message_format: MessageFormat,
}

/// Options for `testfleet run`.
#[derive(Debug, Args)]
pub(crate) struct RunOpts {
    #[clap(flatten)]
    report: ReportOpts,

    #[clap(flatten)]
    suite: SuiteOpts,

    #[clap(flatten)]
    artifacts: ArtifactOpts,

    /// Recorded results to replay for the main run (JSON array of run results).
    #[arg(long, value_name = "PATH", help_heading = "Executor options")]
    results: Utf8PathBuf,

    /// Recorded results to replay for the target branch rerun [default: --results].
    #[arg(long, value_name = "PATH", help_heading = "Executor options")]
    rerun_results: Option<Utf8PathBuf>,

    /// The URL of the API the tests talk to.
    #[arg(long, default_value = "", help_heading = "Report options")]
    api_url: String,

    /// The branch under test.
    #[arg(
        long,
        env = "TESTFLEET_GIT_BRANCH",
        default_value = "",
        help_heading = "Report options"
    )]
    git_branch: String,

    /// The commit under test.
    #[arg(
        long,
        env = "TESTFLEET_GIT_COMMIT",
        default_value = "",
        help_heading = "Report options"
    )]
    git_commit: String,

    /// Exit with success even if no tests were selected.
    #[arg(long)]
    allow_no_tests: bool,
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Artifact options")]
struct ArtifactOpts {
    /// The application APK built from the change under test.
    #[arg(long, value_name = "PATH")]
    main_apk: Utf8PathBuf,

    /// The test APK built from the change under test.
    #[arg(long, value_name = "PATH")]
    test_apk: Utf8PathBuf,

    /// The application APK built from the target branch.
    #[arg(long, value_name = "PATH")]
    target_main_apk: Option<Utf8PathBuf>,

    /// The test APK built from the target branch.
    #[arg(long, value_name = "PATH")]
    target_test_apk: Option<Utf8PathBuf>,
}

impl ArtifactOpts {
    fn target_artifacts(&self) -> TestArtifacts {
        // Missing paths are checked like missing files: reruns are skipped.
        TestArtifacts {
            main_apk: self.target_main_apk.clone().unwrap_or_default(),
            test_apk: self.target_test_apk.clone().unwrap_or_default(),
        }
    }
}

fn action_inputs(
    report: &ReportOpts,
    suite: &SuiteOpts,
    artifacts: &ArtifactOpts,
    params: CreateParams,
) -> ActionInputs {
    ActionInputs {
        coordinates: report.coordinates(),
        suite: suite.suite.clone(),
        artifacts: TestArtifacts {
            main_apk: artifacts.main_apk.clone(),
            test_apk: artifacts.test_apk.clone(),
        },
        target_artifacts: artifacts.target_artifacts(),
        create_params: params,
        output_dir: suite.output_dir.clone(),
    }
}

impl PlanOpts {
    pub(crate) fn exec(
        self,
        config_opts: &ConfigOpts,
        output: OutputContext,
        output_writer: &mut OutputWriter,
    ) -> Result<i32> {
        let config = config_opts.make_config()?;
        let settings = config_opts.run_settings(&config)?;
        let store = self.report.store();
        let executor = ReplayExecutor::new(Utf8PathBuf::new());
        let inputs = ActionInputs {
            coordinates: self.report.coordinates(),
            suite: self.suite.suite.clone(),
            artifacts: TestArtifacts {
                main_apk: Utf8PathBuf::new(),
                test_apk: Utf8PathBuf::new(),
            },
            target_artifacts: TestArtifacts {
                main_apk: Utf8PathBuf::new(),
                test_apk: Utf8PathBuf::new(),
            },
            create_params: CreateParams::default(),
            output_dir: self.suite.output_dir.clone(),
        };

        let suite = InstrumentationTestsAction::new(
            &store,
            &JsonSuiteLoader,
            &executor,
            &LogNotifier,
            &settings,
            inputs,
        )
        .plan()?;

        let mut writer = output_writer.stdout_writer();
        match self.message_format {
            MessageFormat::Human => {
                write_plan_human(&suite, &output.stdout_styles(), &mut writer)
            }
            MessageFormat::Json => write_plan_json(&suite, &mut writer),
        }?;
        writer
            .flush()
            .map_err(|err| ExpectedError::WriteOutputError { err })?;
        Ok(FleetExitCode::OK)
    }
}

impl RunOpts {
    pub(crate) fn exec(
        self,
        config_opts: &ConfigOpts,
        output: OutputContext,
        output_writer: &mut OutputWriter,
    ) -> Result<i32> {
        let config = config_opts.make_config()?;
        let settings = config_opts.run_settings(&config)?;
        let store = self.report.store();
        let mut executor = ReplayExecutor::new(&self.results);
        if let Some(rerun_results) = &self.rerun_results {
            executor = executor.with_rerun_results(rerun_results);
        }
        let params = CreateParams {
            api_url: self.api_url.clone(),
            git_branch: self.git_branch.clone(),
            git_commit: self.git_commit.clone(),
        };
        let inputs = action_inputs(&self.report, &self.suite, &self.artifacts, params);

        let outcome = InstrumentationTestsAction::new(
            &store,
            &JsonSuiteLoader,
            &executor,
            &LogNotifier,
            &settings,
            inputs,
        )
        .execute()?;

        let mut writer = output_writer.stdout_writer();
        write_run_summary(&outcome, &output.stdout_styles(), &mut writer)?;
        writer
            .flush()
            .map_err(|err| ExpectedError::WriteOutputError { err })?;

        if outcome.selected == 0 && !self.allow_no_tests {
            return Err(ExpectedError::NoTestsRun);
        }
        check_verdict(outcome.result.verdict())?;
        Ok(FleetExitCode::OK)
    }
}

fn check_verdict(verdict: &Verdict) -> Result<()> {
    match verdict {
        Verdict::Success { .. } => Ok(()),
        Verdict::Failed { message, cause } => Err(ExpectedError::TestRunFailed {
            message: message.clone(),
            cause: cause.clone(),
        }),
    }
}

fn write_plan_human(
    suite: &TestSuite,
    styles: &StdoutStyles,
    writer: &mut impl Write,
) -> Result<()> {
    let selected = suite.tests_to_run.len();
    let skipped = suite.skipped_tests.len();
    let write = |writer: &mut dyn Write| -> std::io::Result<()> {
        for test in &suite.tests_to_run {
            writeln!(writer, "    {}", test.signature())?;
        }
        for (test, reason) in &suite.skipped_tests {
            writeln!(
                writer,
                "{} {} ({reason})",
                "SKIP".style(styles.skip),
                test.signature()
            )?;
        }
        writeln!(
            writer,
            "{} {selected} {} to run, {skipped} skipped",
            "Plan:".style(styles.bold),
            plural::tests_str(selected),
        )
    };
    write(writer).map_err(|err| ExpectedError::WriteOutputError { err })
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct SerializablePlan<'a> {
    tests_to_run: Vec<TestSignature>,
    skipped_tests: Vec<SerializableSkip<'a>>,
}

#[derive(Serialize)]
struct SerializableSkip<'a> {
    test: TestSignature,
    reason: &'a str,
}

fn write_plan_json(suite: &TestSuite, writer: &mut impl Write) -> Result<()> {
    let plan = SerializablePlan {
        tests_to_run: suite.tests_to_run.iter().map(|test| test.signature()).collect(),
        skipped_tests: suite
            .skipped_tests
            .iter()
            .map(|(test, reason)| SerializableSkip {
                test: test.signature(),
                reason,
            })
            .collect(),
    };
    serde_json::to_writer_pretty(&mut *writer, &plan)
        .map_err(|err| ExpectedError::SerializeOutputError { err })?;
    writeln!(writer).map_err(|err| ExpectedError::WriteOutputError { err })
}

fn write_run_summary(
    outcome: &ActionOutcome,
    styles: &StdoutStyles,
    writer: &mut impl Write,
) -> Result<()> {
    let write = |writer: &mut dyn Write| -> std::io::Result<()> {
        let verdict = outcome.result.verdict();
        let (heading, style) = if verdict.is_success() {
            ("PASS", styles.pass)
        } else {
            ("FAIL", styles.fail)
        };
        writeln!(
            writer,
            "{} {} selected, {} skipped: {}",
            heading.style(style),
            outcome.selected,
            outcome.skipped,
            verdict.message()
        )?;

        for compared in outcome.result.failed().failed() {
            writeln!(
                writer,
                "  {} {}",
                "failed".style(styles.fail),
                compared.result.signature
            )?;
        }
        for test in outcome.result.not_reported().lost_tests() {
            writeln!(writer, "  {} {}", "lost".style(styles.fail), test.signature())?;
        }
        if let Some(performance) = &outcome.performance {
            for change in performance.significant_changes() {
                writeln!(
                    writer,
                    "  {} {} {}: {:+.1}%",
                    "changed".style(styles.skip),
                    change.test,
                    change.metric,
                    change.relative_change * 100.0
                )?;
            }
        }

        writeln!(writer, "{} {}", "JUnit:".style(styles.bold), outcome.junit_path)?;
        if let Some(url) = &outcome.viewer_url {
            writeln!(writer, "{} {url}", "Report:".style(styles.bold))?;
        }
        Ok(())
    };
    write(writer).map_err(|err| ExpectedError::WriteOutputError { err })
}
