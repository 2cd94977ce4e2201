// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{CreateParams, CreateResult, ReportStore};
use crate::{
    errors::{ReportOperation, ReportStoreError},
    helpers::{latest_by_signature, now},
};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, io, io::Write};
use testfleet_metadata::{
    CrossDeviceSuite, ReportCoordinates, ReportId, ReportInfo, RunResult, RunStatus,
    TestSignature,
};
use tokio::sync::Mutex;
use tracing::debug;

/// A report store backed by a directory of JSON files.
///
/// Each report lives at `<root>/<component>/<build id>/<run id>.json` and its id is
/// `<component>/<build id>/<run id>`.
/// Writes go through a temporary file and a rename, and read-modify-write updates are serialized
/// within the process.
#[derive(Debug)]
pub struct LocalReportStore {
    root: Utf8PathBuf,
    write_lock: Mutex<()>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct StoredReport {
    id: ReportId,
    coordinates: ReportCoordinates,
    #[serde(default)]
    finished: bool,
    #[serde(default)]
    api_url: String,
    #[serde(default)]
    git_branch: String,
    #[serde(default)]
    git_commit: String,
    #[serde(default)]
    results: Vec<RunResult>,
    #[serde(default)]
    prepared_data: BTreeMap<String, serde_json::Value>,
}

impl StoredReport {
    fn info(&self) -> ReportInfo {
        ReportInfo {
            id: self.id.clone(),
            coordinates: self.coordinates.clone(),
            finished: self.finished,
        }
    }
}

impl LocalReportStore {
    /// Creates a store rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Returns the id a report with these coordinates has in this store.
    pub fn report_id(coordinates: &ReportCoordinates) -> ReportId {
        ReportId::new(format!(
            "{}/{}/{}",
            coordinates.component, coordinates.build_id, coordinates.run_id
        ))
    }

    fn path_for_id(
        &self,
        operation: ReportOperation,
        id: &ReportId,
    ) -> Result<Utf8PathBuf, ReportStoreError> {
        let segments: Vec<_> = id.as_str().split('/').collect();
        match segments.as_slice() {
            [component, build_id, run_id]
                if segments.iter().all(|segment| is_path_segment(segment)) =>
            {
                Ok(self
                    .root
                    .join(component)
                    .join(build_id)
                    .join(format!("{run_id}.json")))
            }
            _ => Err(ReportStoreError::new(
                operation,
                id,
                format!("`{id}` is not a valid report id"),
            )),
        }
    }

    fn path_for(
        &self,
        operation: ReportOperation,
        coordinates: &ReportCoordinates,
    ) -> Result<Utf8PathBuf, ReportStoreError> {
        self.path_for_id(operation, &Self::report_id(coordinates))
            .map_err(|_| {
                ReportStoreError::new(
                    operation,
                    coordinates,
                    "component, build id and run id must be non-empty and must not contain `/`",
                )
            })
    }

    async fn read(
        &self,
        operation: ReportOperation,
        path: &Utf8Path,
    ) -> Result<Option<StoredReport>, ReportStoreError> {
        let contents = match tokio::fs::read(path).await {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(ReportStoreError::new(operation, path, error)),
        };
        serde_json::from_slice(&contents)
            .map(Some)
            .map_err(|error| ReportStoreError::new(operation, path, error))
    }

    async fn write(
        &self,
        operation: ReportOperation,
        path: &Utf8Path,
        report: &StoredReport,
    ) -> Result<(), ReportStoreError> {
        let contents = serde_json::to_vec_pretty(report)
            .map_err(|error| ReportStoreError::new(operation, path, error))?;
        let path = path.to_owned();
        tokio::task::spawn_blocking(move || {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|error| ReportStoreError::new(operation, &path, error))?;
            }
            AtomicFile::new(&path, OverwriteBehavior::AllowOverwrite)
                .write(|file| file.write_all(&contents))
                .map_err(|error| ReportStoreError::new(operation, &path, error))
        })
        .await
        .map_err(|error| ReportStoreError::new(operation, "local report store", error))?
    }

    /// Reads the report, applies `update` and writes it back, all under the write lock.
    async fn update<T>(
        &self,
        operation: ReportOperation,
        coordinates: &ReportCoordinates,
        update: impl FnOnce(&mut StoredReport) -> T + Send,
    ) -> Result<T, ReportStoreError> {
        let path = self.path_for(operation, coordinates)?;
        let _guard = self.write_lock.lock().await;
        let mut report = self.read(operation, &path).await?.ok_or_else(|| {
            ReportStoreError::new(operation, coordinates, "report does not exist")
        })?;
        let ret = update(&mut report);
        self.write(operation, &path, &report).await?;
        Ok(ret)
    }
}

fn is_path_segment(s: &str) -> bool {
    !s.is_empty() && s != "." && s != ".." && !s.contains(['/', '\\'])
}

impl ReportStore for LocalReportStore {
    async fn create(
        &self,
        coordinates: &ReportCoordinates,
        params: &CreateParams,
    ) -> Result<CreateResult, ReportStoreError> {
        let path = self.path_for(ReportOperation::Create, coordinates)?;
        let _guard = self.write_lock.lock().await;
        if self.read(ReportOperation::Create, &path).await?.is_some() {
            return Ok(CreateResult::AlreadyCreated);
        }

        let id = Self::report_id(coordinates);
        let report = StoredReport {
            id: id.clone(),
            coordinates: coordinates.clone(),
            finished: false,
            api_url: params.api_url.clone(),
            git_branch: params.git_branch.clone(),
            git_commit: params.git_commit.clone(),
            results: Vec::new(),
            prepared_data: BTreeMap::new(),
        };
        self.write(ReportOperation::Create, &path, &report).await?;
        debug!("created report at {path}");
        Ok(CreateResult::Created(id))
    }

    async fn get_report(
        &self,
        coordinates: &ReportCoordinates,
    ) -> Result<Option<ReportInfo>, ReportStoreError> {
        let path = self.path_for(ReportOperation::GetReport, coordinates)?;
        Ok(self
            .read(ReportOperation::GetReport, &path)
            .await?
            .map(|report| report.info()))
    }

    async fn get_tests_for_run_id(
        &self,
        coordinates: &ReportCoordinates,
    ) -> Result<Vec<RunResult>, ReportStoreError> {
        let path = self.path_for(ReportOperation::GetTests, coordinates)?;
        Ok(self
            .read(ReportOperation::GetTests, &path)
            .await?
            .map(|report| report.results)
            .unwrap_or_default())
    }

    async fn get_tests_for_report_id(
        &self,
        id: &ReportId,
    ) -> Result<Vec<RunResult>, ReportStoreError> {
        let path = self.path_for_id(ReportOperation::GetTests, id)?;
        match self.read(ReportOperation::GetTests, &path).await? {
            Some(report) => Ok(report.results),
            None => Err(ReportStoreError::new(
                ReportOperation::GetTests,
                id,
                "report does not exist",
            )),
        }
    }

    async fn add_tests(
        &self,
        coordinates: &ReportCoordinates,
        tests: &[RunResult],
    ) -> Result<(), ReportStoreError> {
        self.update(ReportOperation::AddTests, coordinates, |report| {
            report.results.extend_from_slice(tests);
        })
        .await
    }

    async fn set_finished(&self, coordinates: &ReportCoordinates) -> Result<(), ReportStoreError> {
        self.update(ReportOperation::SetFinished, coordinates, |report| {
            report.finished = true;
        })
        .await
    }

    async fn mark_as_successful(
        &self,
        coordinates: &ReportCoordinates,
        signature: &TestSignature,
        author: &str,
        comment: &str,
    ) -> Result<(), ReportStoreError> {
        let operation = ReportOperation::MarkAsSuccessful;
        let found = self
            .update(operation, coordinates, |report| {
                let found = report.results.iter().any(|r| &r.signature == signature);
                if found {
                    report.results.push(
                        RunResult::new(signature.clone(), RunStatus::Success, now())
                            .with_message(format!("marked as successful by {author}: {comment}")),
                    );
                }
                found
            })
            .await?;
        if found {
            Ok(())
        } else {
            Err(ReportStoreError::new(
                operation,
                coordinates,
                format!("no results for {signature}"),
            ))
        }
    }

    async fn get_cross_device_test_data(
        &self,
        coordinates: &ReportCoordinates,
    ) -> Result<CrossDeviceSuite, ReportStoreError> {
        let path = self.path_for(ReportOperation::GetCrossDeviceTestData, coordinates)?;
        let results = self
            .read(ReportOperation::GetCrossDeviceTestData, &path)
            .await?
            .map(|report| report.results)
            .unwrap_or_default();
        Ok(CrossDeviceSuite::from_results(&latest_by_signature(&results)))
    }

    async fn push_prepared_data(
        &self,
        id: &ReportId,
        analyzer_key: &str,
        data: serde_json::Value,
    ) -> Result<(), ReportStoreError> {
        let operation = ReportOperation::PushPreparedData;
        let path = self.path_for_id(operation, id)?;
        let _guard = self.write_lock.lock().await;
        let mut report = self
            .read(operation, &path)
            .await?
            .ok_or_else(|| ReportStoreError::new(operation, id, "report does not exist"))?;
        report.prepared_data.insert(analyzer_key.to_owned(), data);
        self.write(operation, &path, &report).await
    }
}
