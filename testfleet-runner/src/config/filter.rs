// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use testfleet_metadata::{ReportId, RunStatus};

/// A pair of included and excluded values.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IncludeExclude<T: Ord> {
    /// Values to keep.
    #[serde(default = "BTreeSet::new")]
    pub included: BTreeSet<T>,

    /// Values to drop.
    #[serde(default = "BTreeSet::new")]
    pub excluded: BTreeSet<T>,
}

impl<T: Ord> IncludeExclude<T> {
    /// Creates a new value from included and excluded sets.
    pub fn new(
        included: impl IntoIterator<Item = T>,
        excluded: impl IntoIterator<Item = T>,
    ) -> Self {
        Self {
            included: included.into_iter().collect(),
            excluded: excluded.into_iter().collect(),
        }
    }

    /// Returns true if neither set has any values.
    pub fn is_empty(&self) -> bool {
        self.included.is_empty() && self.excluded.is_empty()
    }
}

impl<T: Ord> Default for IncludeExclude<T> {
    fn default() -> Self {
        Self {
            included: BTreeSet::new(),
            excluded: BTreeSet::new(),
        }
    }
}

/// Selects tests by their statuses in another report.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReportFilterSpec {
    /// The report to read statuses from.
    pub id: ReportId,

    /// Statuses to include or exclude.
    #[serde(default)]
    pub statuses: IncludeExclude<RunStatus>,
}

/// The declarative filter configuration for one configuration.
///
/// This is the input to [`FilterFactory`](crate::test_filter::FilterFactory). It is also written
/// out as-is to `filter-config.json` for diagnostics.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FilterSpec {
    /// Fully qualified annotation names.
    #[serde(default)]
    pub annotations: IncludeExclude<String>,

    /// Test name prefixes.
    #[serde(default)]
    pub prefixes: IncludeExclude<String>,

    /// Statuses of tests in the previous run of the current report.
    #[serde(default)]
    pub previous_statuses: IncludeExclude<RunStatus>,

    /// Statuses of tests in an arbitrary report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<ReportFilterSpec>,
}
