// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError, OutputWriter, TestfleetApp,
    output::{Color, OutputContext},
};
use camino::Utf8Path;
use camino_tempfile::Utf8TempDir;
use clap::Parser;
use fixture_data::login_suite;
use indoc::indoc;
use pretty_assertions::assert_eq;
use testfleet_metadata::FleetExitCode;

const CONFIG: &str = indoc! {r#"
    [configuration.ci]
    rerun-on-target-branch = true
    suppress-flaky = true
    targets = [
        { device = "api24", api = 24 },
        { device = "api29", api = 29 },
    ]
"#};

fn write(path: &Utf8Path, contents: impl AsRef<[u8]>) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

fn setup() -> Utf8TempDir {
    let dir = camino_tempfile::tempdir().unwrap();
    let root = dir.path();
    write(&root.join(".config/testfleet.toml"), CONFIG);
    write(
        &root.join("suite.json"),
        serde_json::to_vec(&serde_json::json!({ "tests": login_suite::static_data() })).unwrap(),
    );
    write(
        &root.join("run.json"),
        serde_json::to_vec(&login_suite::run_results()).unwrap(),
    );
    write(
        &root.join("rerun.json"),
        serde_json::to_vec(&login_suite::rerun_results()).unwrap(),
    );
    for apk in ["app.apk", "app-test.apk", "target/app.apk", "target/app-test.apk"] {
        write(&root.join(apk), b"PK");
    }
    dir
}

fn output() -> OutputContext {
    OutputContext {
        color: Color::Never,
    }
}

fn exec(args: Vec<String>) -> (Result<i32, ExpectedError>, String) {
    let app = TestfleetApp::try_parse_from(args).unwrap();
    let mut writer = OutputWriter::Test { stdout: Vec::new() };
    let result = app.exec(output(), &mut writer);
    let OutputWriter::Test { stdout } = writer else {
        unreachable!("test writer")
    };
    (result, String::from_utf8(stdout).unwrap())
}

fn common_args(root: &Utf8Path, command: &str) -> Vec<String> {
    [
        "testfleet",
        "--project-root",
        root.as_str(),
        "-C",
        "ci",
        command,
        "--component",
        "app",
        "--run-id",
        "run-1",
        "--build-id",
        "build-1",
        "--store-dir",
        root.join("store").as_str(),
        "--suite",
        root.join("suite.json").as_str(),
        "--output-dir",
        root.join("out").as_str(),
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

#[test]
fn plan_login_suite() {
    let dir = setup();
    let (result, stdout) = exec(common_args(dir.path(), "plan"));

    assert_eq!(result.unwrap(), FleetExitCode::OK);
    assert!(
        stdout.ends_with("Plan: 13 tests to run, 3 skipped\n"),
        "unexpected output:\n{stdout}"
    );
    assert!(stdout.contains("    com.example.login.LoginTest.signIn (api24)\n"));
    assert!(stdout.contains("SKIP com.example.feed.FeedTest.legacy (api29)"));
}

#[test]
fn run_login_suite() {
    let dir = setup();
    let root = dir.path();
    let mut args = common_args(root, "run");
    for (flag, path) in [
        ("--main-apk", "app.apk"),
        ("--test-apk", "app-test.apk"),
        ("--target-main-apk", "target/app.apk"),
        ("--target-test-apk", "target/app-test.apk"),
        ("--results", "run.json"),
        ("--rerun-results", "rerun.json"),
    ] {
        args.push(flag.to_owned());
        args.push(root.join(path).into_string());
    }

    let (result, stdout) = exec(args);

    match result {
        Err(ExpectedError::TestRunFailed { message, cause }) => {
            assert_eq!(message, "2 tests failed, 2 tests lost");
            assert!(cause.is_none(), "the report store answered every query");
        }
        other => panic!("expected a failed run, found {other:?}"),
    }
    assert!(
        stdout.starts_with("FAIL 13 selected, 3 skipped: 2 tests failed, 2 tests lost\n"),
        "unexpected output:\n{stdout}"
    );
    assert!(stdout.contains("  lost com.example.feed.FeedTest.refresh (api24)\n"));
    assert!(stdout.contains("  failed com.example.login.LoginTest.wrongPassword (api29)\n"));
    assert!(stdout.contains(&format!("JUnit: {}", root.join("out/junit-report.xml"))));
    assert!(root.join("store/app/build-1/run-1.json").exists());
    assert!(root.join("store/app/build-1/run-1-rerun.json").exists());
}

#[test]
fn unknown_configuration() {
    let dir = setup();
    let mut args = common_args(dir.path(), "plan");
    args[4] = "nightly".to_owned();

    let (result, _) = exec(args);
    let err = result.unwrap_err();
    assert!(
        matches!(err, ExpectedError::ConfigurationNotFound { .. }),
        "{err:?}"
    );
    assert_eq!(err.process_exit_code(), FleetExitCode::SETUP_ERROR);
}
