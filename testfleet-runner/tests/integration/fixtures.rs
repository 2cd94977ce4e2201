// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8PathBuf;
use camino_tempfile::Utf8TempDir;
use fixture_data::login_suite;
use testfleet_metadata::{ReportCoordinates, RunResult};
use testfleet_runner::{
    action::{ActionInputs, ActionOutcome, InstrumentationTestsAction},
    config::RunSettings,
    errors::ActionError,
    executor::{ReplayExecutor, TestArtifacts},
    notify::LogNotifier,
    report::{CreateParams, LocalReportStore, ReportStore},
    suite::{JsonSuiteLoader, TestSuite},
};

/// A scratch directory holding the login-suite manifest, recorded results, APKs and a report
/// store.
pub(crate) struct FixtureWorkspace {
    dir: Utf8TempDir,
    pub(crate) store: LocalReportStore,
    executor: ReplayExecutor,
}

impl FixtureWorkspace {
    pub(crate) fn new() -> Self {
        let dir = camino_tempfile::tempdir().expect("created temp dir");
        let root = dir.path();

        let manifest = serde_json::json!({ "tests": login_suite::static_data() });
        write_json(&root.join("suite.json"), &manifest);
        write_json(&root.join("run.json"), &login_suite::run_results());
        write_json(&root.join("rerun.json"), &login_suite::rerun_results());
        for apk in ["app.apk", "app-test.apk", "target/app.apk", "target/app-test.apk"] {
            let path = root.join(apk);
            std::fs::create_dir_all(path.parent().expect("apk has a parent"))
                .expect("created apk dir");
            std::fs::write(&path, b"PK").expect("wrote apk");
        }

        let store = LocalReportStore::new(root.join("store"));
        let executor =
            ReplayExecutor::new(root.join("run.json")).with_rerun_results(root.join("rerun.json"));
        Self {
            dir,
            store,
            executor,
        }
    }

    pub(crate) fn coordinates(&self) -> ReportCoordinates {
        ReportCoordinates::new("app", "run-1", "build-1")
    }

    pub(crate) fn output_dir(&self) -> Utf8PathBuf {
        self.dir.path().join("out")
    }

    pub(crate) fn inputs(&self) -> ActionInputs {
        let root = self.dir.path();
        ActionInputs {
            coordinates: self.coordinates(),
            suite: root.join("suite.json"),
            artifacts: TestArtifacts {
                main_apk: root.join("app.apk"),
                test_apk: root.join("app-test.apk"),
            },
            target_artifacts: TestArtifacts {
                main_apk: root.join("target/app.apk"),
                test_apk: root.join("target/app-test.apk"),
            },
            create_params: CreateParams {
                api_url: "https://api.example.com".to_owned(),
                git_branch: "feature/login".to_owned(),
                git_commit: "abc123".to_owned(),
            },
            output_dir: self.output_dir(),
        }
    }

    pub(crate) fn execute(&self, settings: &RunSettings) -> Result<ActionOutcome, ActionError> {
        InstrumentationTestsAction::new(
            &self.store,
            &JsonSuiteLoader,
            &self.executor,
            &LogNotifier,
            settings,
            self.inputs(),
        )
        .execute()
    }

    pub(crate) fn plan(&self, settings: &RunSettings) -> Result<TestSuite, ActionError> {
        InstrumentationTestsAction::new(
            &self.store,
            &JsonSuiteLoader,
            &self.executor,
            &LogNotifier,
            settings,
            self.inputs(),
        )
        .plan()
    }

    /// Reads back every result stored for `coordinates`.
    pub(crate) fn stored_results(&self, coordinates: &ReportCoordinates) -> Vec<RunResult> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("built runtime");
        runtime
            .block_on(self.store.get_tests_for_run_id(coordinates))
            .expect("read stored results")
    }
}

pub(crate) fn settings() -> RunSettings {
    RunSettings {
        targets: login_suite::devices(),
        ..Default::default()
    }
}

fn write_json(path: &camino::Utf8Path, value: &impl serde::Serialize) {
    std::fs::write(path, serde_json::to_vec_pretty(value).expect("serialized"))
        .expect("wrote json");
}
