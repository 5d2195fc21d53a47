use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;

#[test]
fn replay_local_capture_prints_final_delta() {
    let tmp = tempfile::tempdir().unwrap();
    let capture = tmp.path().join("capture.ndjson");
    fs::write(
        &capture,
        concat!(
            "{\"message\":{\"content\":\"{\\\"a\\\":\\\"create\\\"}\\n\"},\"done\":false}\n",
            "{\"message\":{\"content\":\"{\\\"i\\\":1,\\\"t\\\":\\\"Intro\\\",\\\"l\\\":\\\"center\\\"}\"},\"done\":false}\n",
            "{\"message\":{\"content\":\"\"},\"done\":true,\"done_reason\":\"stop\"}\n",
        ),
    )
    .unwrap();

    Command::cargo_bin("slide")
        .expect("bin")
        .current_dir(tmp.path())
        .args(["replay", "capture.ndjson", "--backend", "local", "--chunk-size", "7"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"action\": \"create\""))
        .stdout(predicate::str::contains("\"layout_suggestion\": \"centered\""))
        .stdout(predicate::str::contains("\"finish_reason\": \"stop\""));
}

#[test]
fn replay_reports_truncation_warning() {
    let tmp = tempfile::tempdir().unwrap();
    let capture = tmp.path().join("capture.sse");
    fs::write(
        &capture,
        concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"{\\\"a\\\":\\\"append\\\"}\\n{\\\"i\\\":1,\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"length\"}]}\n\n",
        ),
    )
    .unwrap();

    Command::cargo_bin("slide")
        .expect("bin")
        .current_dir(tmp.path())
        .args(["replay", "capture.sse"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Max output tokens reached"));
}

#[test]
fn init_config_writes_defaults() {
    let tmp = tempfile::tempdir().unwrap();
    Command::cargo_bin("slide")
        .expect("bin")
        .current_dir(tmp.path())
        .args(["init-config"])
        .assert()
        .success();
    let written = fs::read_to_string(tmp.path().join(".slide/config.toml")).unwrap();
    assert!(written.contains("retrieval_rounds = 1"));
}

#[test]
fn unknown_backend_is_rejected() {
    Command::cargo_bin("slide")
        .expect("bin")
        .args(["replay", "whatever", "--backend", "palm"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown backend"));
}

#[test]
fn missing_config_file_is_reported_as_configuration_error() {
    let tmp = tempfile::tempdir().unwrap();
    Command::cargo_bin("slide")
        .expect("bin")
        .current_dir(tmp.path())
        .args(["--config", "absent.toml", "generate", "three slides on tides"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error: Config file not found"));
}

#[test]
fn unknown_profile_is_reported_before_any_request() {
    let tmp = tempfile::tempdir().unwrap();
    Command::cargo_bin("slide")
        .expect("bin")
        .current_dir(tmp.path())
        .args(["generate", "--profile", "nope", "three slides on tides"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown profile: nope"));
}
