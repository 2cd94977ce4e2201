// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use clap::{
    Args, ValueEnum,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
};
use owo_colors::{OwoColorize, Style, style};
use std::{
    fmt,
    io::{self, BufWriter, Write},
    sync::Once,
};
use supports_color::Stream;
use tracing::{Event, Level, Subscriber, level_filters::LevelFilter};
use tracing_subscriber::{
    Layer,
    filter::Targets,
    fmt::{FmtContext, FormatEvent, FormatFields, format},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

/// Environment variable holding per-target log levels, e.g. `testfleet_runner=debug`.
pub(crate) const LOG_ENV: &str = "TESTFLEET_LOG";

pub(crate) const fn clap_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
        .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
        .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
        .placeholder(AnsiColor::Cyan.on_default())
}

#[derive(Copy, Clone, Debug, Args)]
#[must_use]
pub(crate) struct OutputOpts {
    /// Verbose output.
    #[arg(long, short, global = true, env = "TESTFLEET_VERBOSE")]
    pub(crate) verbose: bool,

    /// Produce color output: auto, always, never.
    #[arg(
        long,
        value_enum,
        default_value_t,
        hide_possible_values = true,
        global = true,
        value_name = "WHEN",
        env = "TESTFLEET_COLOR"
    )]
    pub(crate) color: Color,
}

impl OutputOpts {
    pub(crate) fn init(self) -> OutputContext {
        init_logging(self.verbose, self.color.should_colorize(Stream::Stderr));
        OutputContext { color: self.color }
    }
}

/// Output settings for the current invocation.
#[derive(Copy, Clone, Debug)]
#[must_use]
pub struct OutputContext {
    pub(crate) color: Color,
}

impl OutputContext {
    /// Returns styles for errors printed to stderr.
    pub fn stderr_styles(&self) -> StderrStyles {
        let mut styles = StderrStyles::default();
        if self.color.should_colorize(Stream::Stderr) {
            styles.bold = style().bold();
            styles.warning_text = style().yellow();
        }
        styles
    }

    /// Returns styles for the plan and the run summary printed to stdout.
    pub(crate) fn stdout_styles(&self) -> StdoutStyles {
        let mut styles = StdoutStyles::default();
        if self.color.should_colorize(Stream::Stdout) {
            styles.bold = style().bold();
            styles.pass = style().green().bold();
            styles.fail = style().red().bold();
            styles.skip = style().yellow().bold();
        }
        styles
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
#[must_use]
pub enum Color {
    #[default]
    Auto,
    Always,
    Never,
}

impl Color {
    pub(crate) fn should_colorize(self, stream: Stream) -> bool {
        match self {
            Color::Auto => supports_color::on_cached(stream).is_some(),
            Color::Always => true,
            Color::Never => false,
        }
    }
}

static INIT_LOGGER: Once = Once::new();

fn init_logging(verbose: bool, colorize: bool) {
    INIT_LOGGER.call_once(|| {
        let default_level = if verbose {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        };
        // An unset or unparseable TESTFLEET_LOG falls back to the default level.
        let targets = std::env::var(LOG_ENV)
            .ok()
            .filter(|value| !value.is_empty())
            .and_then(|value| value.parse::<Targets>().ok())
            .unwrap_or_else(|| Targets::new().with_default(default_level));

        let layer = tracing_subscriber::fmt::layer()
            .event_format(LevelHeading { colorize })
            .with_writer(io::stderr)
            .with_filter(targets);
        tracing_subscriber::registry().with(layer).init();
    });
}

/// Prints events as `<level>: <fields>`, one per line.
struct LevelHeading {
    colorize: bool,
}

impl<S, N> FormatEvent<S, N> for LevelHeading
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let (heading, color) = match *event.metadata().level() {
            Level::ERROR => ("error", style().red().bold()),
            Level::WARN => ("warning", style().yellow().bold()),
            Level::INFO => ("info", style().bold()),
            Level::DEBUG => ("debug", style().bold()),
            Level::TRACE => ("trace", style().dimmed()),
        };
        let color = if self.colorize { color } else { Style::new() };
        write!(writer, "{}: ", heading.style(color))?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Styles for errors printed to stderr.
#[derive(Debug, Default)]
pub struct StderrStyles {
    pub(crate) bold: Style,
    pub(crate) warning_text: Style,
}

#[derive(Debug, Default)]
pub(crate) struct StdoutStyles {
    pub(crate) bold: Style,
    pub(crate) pass: Style,
    pub(crate) fail: Style,
    pub(crate) skip: Style,
}

/// Where command output goes. Tests capture stdout instead of printing it.
#[derive(Default)]
pub enum OutputWriter {
    /// Write to the process's stdout.
    #[default]
    Normal,

    /// Capture stdout in a buffer.
    #[cfg(test)]
    Test {
        /// Captured stdout.
        stdout: Vec<u8>,
    },
}

impl OutputWriter {
    pub(crate) fn stdout_writer(&mut self) -> Box<dyn Write + '_> {
        match self {
            Self::Normal => Box::new(BufWriter::new(io::stdout())),
            #[cfg(test)]
            Self::Test { stdout } => Box::new(stdout),
        }
    }
}
