// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::WriteReportError;
use atomicwrites::{AtomicFile, OverwriteBehavior};
use camino::{Utf8Path, Utf8PathBuf};
use std::io::Write;
use swrite::{SWrite, swrite};
use testfleet_metadata::ReportCoordinates;

/// The name of the HTML redirect to the report viewer written to the output directory.
pub const VIEWER_REDIRECT_FILE_NAME: &str = "rv.html";

/// Builds links into the web UI that displays reports.
#[derive(Clone, Debug)]
pub struct ReportViewer {
    base_url: String,
}

impl ReportViewer {
    /// Creates a viewer for the UI at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url }
    }

    /// Returns the base URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the URL of the report with the given coordinates.
    pub fn report_url(&self, coordinates: &ReportCoordinates, only_failures: bool) -> String {
        let mut url = String::with_capacity(self.base_url.len() + 64);
        swrite!(
            url,
            "{}/report/{}/{}",
            self.base_url,
            coordinates.component,
            coordinates.run_id
        );
        if only_failures {
            url.push_str("?onlyFailures=true");
        }
        url
    }

    /// Writes an HTML page that redirects to `url` into `output_dir`, and returns its path.
    pub fn write_redirect(
        &self,
        output_dir: &Utf8Path,
        url: &str,
    ) -> Result<Utf8PathBuf, WriteReportError> {
        std::fs::create_dir_all(output_dir).map_err(|err| WriteReportError::Fs {
            file: output_dir.to_owned(),
            err,
        })?;
        let path = output_dir.join(VIEWER_REDIRECT_FILE_NAME);
        AtomicFile::new(&path, OverwriteBehavior::AllowOverwrite)
            .write(|f| {
                let url = html_escape(url);
                write!(
                    f,
                    "<!DOCTYPE html>\n\
                     <meta http-equiv=\"refresh\" content=\"0; url={url}\">\n\
                     <a href=\"{url}\">{url}</a>\n"
                )
            })
            .map_err(|err| match err {
                atomicwrites::Error::Internal(err) | atomicwrites::Error::User(err) => {
                    WriteReportError::Fs {
                        file: path.clone(),
                        err,
                    }
                }
            })?;
        Ok(path)
    }
}

fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
