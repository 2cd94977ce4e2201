// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Filtering tests before dispatch.
//!
//! The main type in this module is [`TestsFilter`], a tree of predicates over tests scheduled on a
//! device. The initial filter for a run is built by [`FilterFactory`] from the declarative
//! [`FilterSpec`](crate::config::FilterSpec) and from historical run data.

mod factory;
mod info;

pub use factory::*;
pub use info::*;

use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt};
use testfleet_metadata::{TestSignature, TestWithTarget};

/// The annotation that marks a test as ignored in code. Tests carrying it are never run.
pub const IGNORE_ANNOTATION: &str = "org.junit.Ignore";

/// Where the signatures of a signature filter came from.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignatureSource {
    /// Name prefixes configured in code. Signature names match test names by prefix.
    Code,

    /// Results of a previous run of the current report.
    PreviousRun,

    /// Results of an arbitrary report.
    Report,
}

impl SignatureSource {
    /// Returns the kebab-case name of this source.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::PreviousRun => "previous-run",
            Self::Report => "report",
        }
    }

    fn name_matches(self, signature_name: &str, test_name: &str) -> bool {
        match self {
            Self::Code => test_name.starts_with(signature_name),
            Self::PreviousRun | Self::Report => signature_name == test_name,
        }
    }
}

impl fmt::Display for SignatureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A predicate over tests scheduled on a device.
///
/// Filters are built once per run and never modified afterwards.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TestsFilter {
    /// Excludes tests whose SDK range doesn't contain the device's API level.
    ExcludeBySdk,

    /// Keeps tests carrying at least one of the annotations.
    IncludeAnnotations {
        /// Fully qualified annotation names.
        annotations: BTreeSet<String>,
    },

    /// Drops tests carrying any of the annotations.
    ExcludeAnnotations {
        /// Fully qualified annotation names.
        annotations: BTreeSet<String>,
    },

    /// Keeps tests matching one of the signatures.
    ///
    /// An empty signature set keeps nothing.
    IncludeByTestSignatures {
        /// Where the signatures came from.
        source: SignatureSource,

        /// The signatures to match against.
        signatures: BTreeSet<TestSignature>,
    },

    /// Drops tests matching any of the signatures.
    ExcludeByTestSignatures {
        /// Where the signatures came from.
        source: SignatureSource,

        /// The signatures to match against.
        signatures: BTreeSet<TestSignature>,
    },

    /// Keeps tests kept by every child filter.
    ///
    /// Children are evaluated in order and the first exclusion is reported.
    Composition {
        /// The child filters.
        filters: Vec<TestsFilter>,
    },
}

impl TestsFilter {
    /// Evaluates the filter against a test.
    pub fn filter(&self, test: &TestWithTarget) -> FilterResult {
        match self {
            Self::ExcludeBySdk => {
                if test.test.supports_api(test.target.api) {
                    FilterResult::Included
                } else {
                    FilterResult::Excluded(ExcludeReason::Sdk {
                        min_sdk: test.test.min_sdk,
                        max_sdk: test.test.max_sdk,
                        api: test.target.api,
                    })
                }
            }
            Self::IncludeAnnotations { annotations } => {
                if test.test.annotations.iter().any(|a| annotations.contains(a)) {
                    FilterResult::Included
                } else {
                    FilterResult::Excluded(ExcludeReason::MissingAnnotations {
                        annotations: annotations.clone(),
                    })
                }
            }
            Self::ExcludeAnnotations { annotations } => {
                match test.test.annotations.iter().find(|a| annotations.contains(*a)) {
                    Some(annotation) => FilterResult::Excluded(ExcludeReason::Annotation {
                        annotation: annotation.clone(),
                    }),
                    None => FilterResult::Included,
                }
            }
            Self::IncludeByTestSignatures { source, signatures } => {
                if matches_any(*source, signatures, test) {
                    FilterResult::Included
                } else {
                    FilterResult::Excluded(ExcludeReason::NotInSignatures { source: *source })
                }
            }
            Self::ExcludeByTestSignatures { source, signatures } => {
                if matches_any(*source, signatures, test) {
                    FilterResult::Excluded(ExcludeReason::InSignatures { source: *source })
                } else {
                    FilterResult::Included
                }
            }
            Self::Composition { filters } => filters
                .iter()
                .map(|filter| filter.filter(test))
                .find(|result| !result.is_included())
                .unwrap_or(FilterResult::Included),
        }
    }

    /// Returns the children of a composition, or a single-element slice for any other filter.
    pub fn filters(&self) -> &[TestsFilter] {
        match self {
            Self::Composition { filters } => filters,
            other => std::slice::from_ref(other),
        }
    }

    /// Returns a short name for the kind of filter, used in logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::ExcludeBySdk => "exclude-by-sdk",
            Self::IncludeAnnotations { .. } => "include-annotations",
            Self::ExcludeAnnotations { .. } => "exclude-annotations",
            Self::IncludeByTestSignatures { .. } => "include-by-test-signatures",
            Self::ExcludeByTestSignatures { .. } => "exclude-by-test-signatures",
            Self::Composition { .. } => "composition",
        }
    }
}

fn matches_any(
    source: SignatureSource,
    signatures: &BTreeSet<TestSignature>,
    test: &TestWithTarget,
) -> bool {
    let test_name = test.test.name.as_str();
    let device = &test.target.device;
    signatures.iter().any(|signature| {
        signature
            .device_name
            .as_ref()
            .is_none_or(|name| name == device)
            && source.name_matches(signature.name.as_str(), test_name)
    })
}

/// The result of evaluating a [`TestsFilter`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FilterResult {
    /// The test is kept.
    Included,

    /// The test is dropped.
    Excluded(ExcludeReason),
}

impl FilterResult {
    /// Returns true if the test is kept.
    pub fn is_included(&self) -> bool {
        matches!(self, Self::Included)
    }
}

/// Why a test was excluded.
///
/// The `Display` output is the skip reason recorded in the report.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExcludeReason {
    /// The device's API level is outside the test's SDK range.
    Sdk {
        /// The lowest supported API level.
        min_sdk: Option<u32>,

        /// The highest supported API level.
        max_sdk: Option<u32>,

        /// The device's API level.
        api: u32,
    },

    /// The test carries an excluded annotation.
    Annotation {
        /// The annotation found on the test.
        annotation: String,
    },

    /// The test carries none of the included annotations.
    MissingAnnotations {
        /// The included annotations.
        annotations: BTreeSet<String>,
    },

    /// The test matched no included signature.
    NotInSignatures {
        /// Where the signatures came from.
        source: SignatureSource,
    },

    /// The test matched an excluded signature.
    InSignatures {
        /// Where the signatures came from.
        source: SignatureSource,
    },
}

impl fmt::Display for ExcludeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sdk {
                min_sdk,
                max_sdk,
                api,
            } => {
                write!(f, "excluded by sdk: test requires api ")?;
                match (min_sdk, max_sdk) {
                    (Some(min), Some(max)) => write!(f, "{min}..={max}")?,
                    (Some(min), None) => write!(f, "{min} or higher")?,
                    (None, Some(max)) => write!(f, "{max} or lower")?,
                    (None, None) => write!(f, "of any level")?,
                }
                write!(f, ", device has {api}")
            }
            Self::Annotation { annotation } => {
                write!(f, "excluded by annotation: {annotation}")
            }
            Self::MissingAnnotations { annotations } => {
                write!(f, "excluded: test has none of the annotations ")?;
                let mut first = true;
                for annotation in annotations {
                    if !first {
                        write!(f, ", ")?;
                    }
                    write!(f, "{annotation}")?;
                    first = false;
                }
                Ok(())
            }
            Self::NotInSignatures { source } => {
                write!(f, "excluded: not selected by the {source} filter")
            }
            Self::InSignatures { source } => {
                write!(f, "excluded by the {source} filter")
            }
        }
    }
}
