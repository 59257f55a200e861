use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn nexus() -> Command {
    let mut cmd = Command::cargo_bin("nexus").expect("binary is built");
    cmd.env("RUST_LOG", "warn");
    cmd
}

#[test]
fn test_ping_command() {
    nexus()
        .arg("--ping")
        .assert()
        .success()
        .stdout(predicate::str::contains("pong"));
}

#[test]
fn test_no_command_starts_and_stops() {
    nexus()
        .assert()
        .success()
        .stdout(predicate::str::contains("Nexus running with 2 of 2 plugin(s) active"))
        .stdout(predicate::str::contains("pong").not());
}

#[test]
fn test_list_addons_prints_snapshot() {
    nexus()
        .arg("list-addons")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"id\": \"logging\""))
        .stdout(predicate::str::contains("\"id\": \"tasks\""))
        .stdout(predicate::str::contains("\"state\": \"Active\""));
}

#[test]
fn test_execute_ping_round_trip() {
    nexus()
        .args(["execute", "ping"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"ok\": true"))
        .stdout(predicate::str::contains("\"pong\": true"));
}

#[test]
fn test_execute_echo_payload() {
    nexus()
        .args(["execute", "echo", "--payload", r#"{"text":"hi"}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"text\": \"hi\""));
}

#[test]
fn test_execute_unknown_task_fails() {
    nexus()
        .args(["execute", "launch"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("unknown task 'launch'"))
        .stderr(predicate::str::contains("reported failure"));
}

#[test]
fn test_execute_rejects_bad_payload() {
    nexus()
        .args(["execute", "echo", "--payload", "{not json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid --payload"));
}

#[test]
fn test_enable_unknown_plugin_fails() {
    nexus()
        .args(["enable", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not_found"));
}

#[test]
fn test_status_reports_counts() {
    nexus()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"state\": \"Running\""))
        .stdout(predicate::str::contains("\"total\": 2"));
}

#[test]
fn test_config_file_with_disabled_plugin() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nexus.json");
    fs::write(
        &path,
        r#"{
            "plugins": [
                { "id": "logging", "version": "1.0.0", "entry_point": "core-logging" },
                { "id": "tasks", "version": "1.0.0", "entry_point": "core-tasks", "enabled": false }
            ]
        }"#,
    )
    .unwrap();

    nexus()
        .arg("--config")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 of 2 plugin(s) active"));

    nexus()
        .arg("--config")
        .arg(&path)
        .args(["enable", "tasks"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tasks: Active"));
}

#[test]
fn test_cyclic_config_fails_startup() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nexus.yaml");
    fs::write(
        &path,
        "plugins:\n  - id: a\n    version: 1.0.0\n    entry_point: core-logging\n    dependencies: [b]\n  - id: b\n    version: 1.0.0\n    entry_point: core-tasks\n    dependencies: [a]\n",
    )
    .unwrap();

    nexus()
        .arg("--config")
        .arg(&path)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration"));
}

#[test]
fn test_missing_config_file_fails() {
    nexus()
        .args(["--config", "/definitely/not/here.json", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}
