// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::TestsFilter;
use crate::{config::FilterSpec, errors::WriteReportError};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use std::{collections::BTreeMap, io::Write};
use testfleet_metadata::TestWithTarget;
use tracing::debug;

/// The file the declarative filter is written to.
pub const FILTER_CONFIG_FILE_NAME: &str = "filter-config.json";

/// The file the composed initial filter is written to.
pub const APPLIED_FILTER_FILE_NAME: &str = "applied-filter.json";

/// The file skipped tests are written to, grouped by reason.
pub const FILTER_EXCLUDES_FILE_NAME: &str = "filter-excludes.json";

/// Writes filter diagnostics into an output directory.
#[derive(Clone, Debug)]
pub struct FilterInfoWriter {
    output_dir: Utf8PathBuf,
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct ExcludeGroup<'a> {
    reason: &'a str,
    count: usize,
    tests: Vec<String>,
}

impl FilterInfoWriter {
    /// Creates a writer for `output_dir`. The directory is created on first write.
    pub fn new(output_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Returns the output directory.
    pub fn output_dir(&self) -> &Utf8Path {
        &self.output_dir
    }

    /// Writes the declarative filter configuration.
    pub fn write_filter_config(&self, spec: &FilterSpec) -> Result<Utf8PathBuf, WriteReportError> {
        self.write_json(FILTER_CONFIG_FILE_NAME, spec)
    }

    /// Writes the filter that was applied to the suite.
    pub fn write_applied_filter(
        &self,
        filter: &TestsFilter,
    ) -> Result<Utf8PathBuf, WriteReportError> {
        self.write_json(APPLIED_FILTER_FILE_NAME, filter)
    }

    /// Writes the tests the filter excluded, grouped by reason, largest group first.
    pub fn write_filter_excludes(
        &self,
        skipped: &[(TestWithTarget, String)],
    ) -> Result<Utf8PathBuf, WriteReportError> {
        let mut by_reason: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for (test, reason) in skipped {
            by_reason
                .entry(reason.as_str())
                .or_default()
                .push(test.signature().to_string());
        }

        let mut groups: Vec<_> = by_reason
            .into_iter()
            .map(|(reason, tests)| ExcludeGroup {
                reason,
                count: tests.len(),
                tests,
            })
            .collect();
        // Stable, so ties stay sorted by reason.
        groups.sort_by(|a, b| b.count.cmp(&a.count));

        self.write_json(FILTER_EXCLUDES_FILE_NAME, &groups)
    }

    fn write_json<T: Serialize + ?Sized>(
        &self,
        file_name: &str,
        value: &T,
    ) -> Result<Utf8PathBuf, WriteReportError> {
        let path = self.output_dir.join(file_name);
        let contents =
            serde_json::to_vec_pretty(value).map_err(|err| WriteReportError::Json {
                file: path.clone(),
                err,
            })?;

        std::fs::create_dir_all(&self.output_dir).map_err(|err| WriteReportError::Fs {
            file: self.output_dir.clone(),
            err,
        })?;
        AtomicFile::new(&path, OverwriteBehavior::AllowOverwrite)
            .write(|f| f.write_all(&contents))
            .map_err(|err| match err {
                atomicwrites::Error::Internal(err) | atomicwrites::Error::User(err) => {
                    WriteReportError::Fs {
                        file: path.clone(),
                        err,
                    }
                }
            })?;

        debug!("wrote {path}");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::IncludeExclude, test_helpers::test_on};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn read_json(path: &Utf8Path) -> serde_json::Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn writes_filter_config_and_applied_filter() {
        let dir = camino_tempfile::tempdir().unwrap();
        let writer = FilterInfoWriter::new(dir.path().join("output"));
        let spec = FilterSpec {
            prefixes: IncludeExclude::new(["com.example".to_owned()], []),
            ..Default::default()
        };

        let path = writer.write_filter_config(&spec).unwrap();
        assert_eq!(path.file_name(), Some(FILTER_CONFIG_FILE_NAME));
        assert_eq!(read_json(&path)["prefixes"]["included"], json!(["com.example"]));

        let filter = TestsFilter::Composition {
            filters: vec![TestsFilter::ExcludeBySdk],
        };
        let path = writer.write_applied_filter(&filter).unwrap();
        assert_eq!(
            read_json(&path),
            json!({ "type": "composition", "filters": [{ "type": "exclude-by-sdk" }] })
        );
    }

    #[test]
    fn groups_excludes_by_reason() {
        let dir = camino_tempfile::tempdir().unwrap();
        let writer = FilterInfoWriter::new(dir.path());
        let skipped = vec![
            (test_on("a.B.one", "api22", 22), "excluded by sdk".to_owned()),
            (test_on("a.B.two", "api22", 22), "excluded by sdk".to_owned()),
            (test_on("a.B.three", "api29", 29), "excluded by annotation: org.junit.Ignore".to_owned()),
        ];
        let path = writer.write_filter_excludes(&skipped).unwrap();
        assert_eq!(
            read_json(&path),
            json!([
                {
                    "reason": "excluded by sdk",
                    "count": 2,
                    "tests": ["a.B.one (api22)", "a.B.two (api22)"],
                },
                {
                    "reason": "excluded by annotation: org.junit.Ignore",
                    "count": 1,
                    "tests": ["a.B.three (api29)"],
                },
            ])
        );
    }
}
