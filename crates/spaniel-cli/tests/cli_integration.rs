use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn spaniel() -> Command {
    let mut cmd = Command::cargo_bin("spaniel").unwrap();
    cmd.env_remove("SPANIEL_DESKTOP")
        .env_remove("SPANIEL_CONFIG")
        .env("RUST_LOG", "off")
        .arg("--desktop")
        .arg(fixture_path("desktop.json"));
    cmd
}

#[test]
fn test_help_exits_zero() {
    Command::cargo_bin("spaniel")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("spaniel"));
}

#[test]
fn test_dump_prints_tree() {
    spaniel()
        .arg("dump")
        .assert()
        .success()
        .stdout(predicate::str::contains("[application | gedit]"))
        .stdout(predicate::str::contains("[push button | OK]"));
}

#[test]
fn test_dump_subtree_as_json() {
    let assert = spaniel()
        .args(["--format", "json", "dump", ".application(\"gedit\").button(\"OK\")"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["role"], "push button");
    assert_eq!(json["name"], "OK");
    assert_eq!(json["actions"][0], "click");
}

#[test]
fn test_find_by_role_skips_hidden() {
    let assert = spaniel()
        .args(["find", "--role", "push button"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert!(stdout.contains("OK"));
    assert!(stdout.contains("Cancel"));
    assert!(!stdout.contains("Close"));

    spaniel()
        .args(["find", "--role", "push button", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Close"));
}

#[test]
fn test_find_json_reports_paths() {
    let assert = spaniel()
        .args(["--format", "json", "find", "--label", "Find:"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let nodes = json.as_array().unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0]["role"], "text");
    assert!(nodes[0]["path"]
        .as_str()
        .unwrap()
        .ends_with(".childLabelled(\"Find:\")"));
}

#[test]
fn test_find_without_filters_is_usage_error() {
    spaniel()
        .arg("find")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("at least one"));
}

#[test]
fn test_path_prints_absolute_path() {
    spaniel()
        .args(["path", ".button(\"OK\")"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            ".application(\"gedit\", recursive=false).window(\"Untitled - gedit\", recursive=false).button(\"OK\")",
        ));
}

#[test]
fn test_path_not_found_fails() {
    spaniel()
        .args(["path", ".button(\"Print\")"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Print"));
}

#[test]
fn test_run_script_and_save() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("after.json");
    spaniel()
        .arg("run")
        .arg(fixture_path("find.spaniel"))
        .arg("--save")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("click"));

    let saved = std::fs::read_to_string(&out).unwrap();
    assert!(saved.contains("\"needle\""));
}

#[test]
fn test_run_insensitive_click_fails_with_line() {
    spaniel()
        .arg("run")
        .arg(fixture_path("insensitive.spaniel"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("line 2"));
}

#[test]
fn test_run_honors_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.json");
    std::fs::write(&config, "{\"ensure_sensitivity\": false}").unwrap();
    spaniel()
        .arg("--config")
        .arg(&config)
        .arg("run")
        .arg(fixture_path("insensitive.spaniel"))
        .assert()
        .success()
        .stdout(predicate::str::contains("click"));
}

#[test]
fn test_run_parse_error_exit_code() {
    spaniel()
        .arg("run")
        .arg(fixture_path("broken.spaniel"))
        .assert()
        .code(2);
}

#[test]
fn test_run_missing_script() {
    spaniel()
        .args(["run", "/nonexistent/script.spaniel"])
        .assert()
        .code(4);
}

#[test]
fn test_missing_desktop_is_usage_error() {
    Command::cargo_bin("spaniel")
        .unwrap()
        .env_remove("SPANIEL_DESKTOP")
        .arg("dump")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("desktop"));
}

#[test]
fn test_record_convert_session() {
    let assert = spaniel()
        .arg("record-convert")
        .arg(fixture_path("session.jsonl"))
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert!(stdout.starts_with("# spaniel script recorded"));
    assert!(stdout.contains("geditApp = root.application(\"gedit\", recursive=false)"));
    assert!(stdout.contains("findNode.typeText(\"needle\")"));
    assert!(stdout.contains("oKButton.click()"));
}

#[test]
fn test_record_convert_stdin() {
    spaniel()
        .arg("record-convert")
        .write_stdin("{\"click\":{\"x\":50,\"y\":65,\"button\":1}}\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("oKButton.click()"));
}

#[test]
fn test_completions_bash() {
    Command::cargo_bin("spaniel")
        .unwrap()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("spaniel"));
}
