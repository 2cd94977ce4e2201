// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{IGNORE_ANNOTATION, SignatureSource, TestsFilter};
use crate::{
    config::{FilterSpec, IncludeExclude},
    errors::{FilterBuildError, ReportStoreError},
    helpers::latest_by_signature,
    report::{ReadReport, ReportSource, ReportStore},
};
use debug_ignore::DebugIgnore;
use std::collections::{BTreeMap, BTreeSet};
use testfleet_metadata::{ReportCoordinates, RunResult, RunStatus, TestSignature};
use tracing::debug;

/// Builds the initial filter of a run from a [`FilterSpec`] and run history.
#[derive(Clone, Debug)]
pub struct FilterFactory<'a, S> {
    spec: &'a FilterSpec,
    current_report: ReportCoordinates,
    store: DebugIgnore<&'a S>,
}

impl<'a, S: ReportStore> FilterFactory<'a, S> {
    /// Creates a new factory.
    ///
    /// `current_report` is the report this run writes into. Its earlier results are the history
    /// for the previous run filters.
    pub fn new(spec: &'a FilterSpec, current_report: ReportCoordinates, store: &'a S) -> Self {
        Self {
            spec,
            current_report,
            store: DebugIgnore(store),
        }
    }

    /// Builds the initial filter.
    ///
    /// The result is a [`TestsFilter::Composition`] with, in order: the SDK filter, the excluded
    /// annotations (always including [`IGNORE_ANNOTATION`]), the included annotations, the name
    /// prefix filters, the previous run filters and the report filters. Optional parts are
    /// present only if configured.
    ///
    /// Each report is read at most once per call. Failing to read a report is an error.
    pub async fn create_initial_filter(&self) -> Result<TestsFilter, FilterBuildError> {
        let spec = self.spec;
        let mut history = HistoryCache::default();

        let mut excluded_annotations = BTreeSet::from([IGNORE_ANNOTATION.to_owned()]);
        excluded_annotations.extend(spec.annotations.excluded.iter().cloned());

        let mut filters = vec![
            TestsFilter::ExcludeBySdk,
            TestsFilter::ExcludeAnnotations {
                annotations: excluded_annotations,
            },
        ];

        if !spec.annotations.included.is_empty() {
            filters.push(TestsFilter::IncludeAnnotations {
                annotations: spec.annotations.included.clone(),
            });
        }

        let prefix_signatures = |prefixes: &BTreeSet<String>| -> BTreeSet<TestSignature> {
            prefixes
                .iter()
                .map(|prefix| TestSignature::any_device(prefix.as_str()))
                .collect()
        };
        if !spec.prefixes.included.is_empty() {
            filters.push(TestsFilter::IncludeByTestSignatures {
                source: SignatureSource::Code,
                signatures: prefix_signatures(&spec.prefixes.included),
            });
        }
        if !spec.prefixes.excluded.is_empty() {
            filters.push(TestsFilter::ExcludeByTestSignatures {
                source: SignatureSource::Code,
                signatures: prefix_signatures(&spec.prefixes.excluded),
            });
        }

        if !spec.previous_statuses.is_empty() {
            let read = ReadReport::by_coordinates(*self.store, self.current_report.clone());
            history_filters(
                &mut filters,
                &mut history,
                SignatureSource::PreviousRun,
                &read,
                &spec.previous_statuses,
            )
            .await?;
        }

        if let Some(report) = &spec.report
            && !report.statuses.is_empty()
        {
            let read = ReadReport::by_id(*self.store, report.id.clone());
            history_filters(
                &mut filters,
                &mut history,
                SignatureSource::Report,
                &read,
                &report.statuses,
            )
            .await?;
        }

        debug!(
            "initial filter has {} parts, {} reports read",
            filters.len(),
            history.results.len()
        );
        Ok(TestsFilter::Composition { filters })
    }
}

async fn history_filters<S: ReportStore>(
    filters: &mut Vec<TestsFilter>,
    history: &mut HistoryCache,
    source: SignatureSource,
    read: &ReadReport<'_, S>,
    statuses: &IncludeExclude<RunStatus>,
) -> Result<(), FilterBuildError> {
    let results = history
        .get(read)
        .await
        .map_err(|err| FilterBuildError::RunHistory {
            source_kind: source,
            report: read.source().to_string(),
            err,
        })?;

    if !statuses.included.is_empty() {
        filters.push(TestsFilter::IncludeByTestSignatures {
            source,
            signatures: signatures_with_status(results, &statuses.included),
        });
    }
    if !statuses.excluded.is_empty() {
        filters.push(TestsFilter::ExcludeByTestSignatures {
            source,
            signatures: signatures_with_status(results, &statuses.excluded),
        });
    }
    Ok(())
}

fn signatures_with_status(
    results: &[RunResult],
    statuses: &BTreeSet<RunStatus>,
) -> BTreeSet<TestSignature> {
    results
        .iter()
        .filter(|result| statuses.contains(&result.status))
        .map(|result| result.signature.clone())
        .collect()
}

/// Results read from reports during one filter construction, by report.
#[derive(Debug, Default)]
struct HistoryCache {
    results: BTreeMap<ReportSource, Vec<RunResult>>,
}

impl HistoryCache {
    async fn get<S: ReportStore>(
        &mut self,
        read: &ReadReport<'_, S>,
    ) -> Result<&[RunResult], ReportStoreError> {
        if !self.results.contains_key(read.source()) {
            let results = read.get_tests().await?;
            debug!("read {} results from {}", results.len(), read.source());
            // Only the latest result of each test counts as its status.
            self.results
                .insert(read.source().clone(), latest_by_signature(&results));
        }
        Ok(&self.results[read.source()])
    }
}
