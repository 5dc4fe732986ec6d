//! CLI integration tests for wxtoot-post

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const RECORD: &str = r#"{"dateTime": 1413994070, "usUnits": 1, "outTemp": 7.0}"#;

/// Write a config that renders without credentials
fn setup_test_env() -> (TempDir, String) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    let config_content = r#"
[station]
name = "HAL9000"

[format]
template = "{station}: oT: {outTemp:%.1f}"
utc = true

[posting]
skip_upload = true
"#;
    fs::write(&config_path, config_content).unwrap();

    (temp_dir, config_path.to_string_lossy().to_string())
}

#[test]
fn test_help_flag_output() {
    let mut cmd = Command::cargo_bin("wxtoot-post").unwrap();

    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Render one weather record"))
        .stdout(predicate::str::contains("EXIT CODES"))
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--visibility"))
        .stdout(predicate::str::contains("--format"));
}

#[test]
fn test_dry_run_prints_rendered_message() {
    let (_temp_dir, config_path) = setup_test_env();
    let mut cmd = Command::cargo_bin("wxtoot-post").unwrap();

    cmd.arg("--config")
        .arg(&config_path)
        .arg("--dry-run")
        .write_stdin(RECORD)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("HAL9000: oT: 7.0"));
}

#[test]
fn test_dry_run_json_output() {
    let (temp_dir, config_path) = setup_test_env();
    let record_path = temp_dir.path().join("record.json");
    fs::write(
        &record_path,
        format!(r#"{{"binding": "loop", "record": {}}}"#, RECORD),
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("wxtoot-post").unwrap();
    cmd.arg("--config")
        .arg(&config_path)
        .arg("--format")
        .arg("json")
        .arg(&record_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\":\"skipped\""))
        .stdout(predicate::str::contains("HAL9000: oT: 7.0"));
}

#[test]
fn test_missing_config_exits_with_code_2() {
    let temp_dir = TempDir::new().unwrap();
    let mut cmd = Command::cargo_bin("wxtoot-post").unwrap();

    cmd.arg("--config")
        .arg(temp_dir.path().join("absent.toml"))
        .write_stdin(RECORD)
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_missing_credentials_exit_with_code_2() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "[station]\nname = \"HAL9000\"\n").unwrap();

    let mut cmd = Command::cargo_bin("wxtoot-post").unwrap();
    cmd.arg("--config")
        .arg(&config_path)
        .write_stdin(RECORD)
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("mastodon.instance"));
}

#[test]
fn test_invalid_json_exits_with_code_3() {
    let (_temp_dir, config_path) = setup_test_env();
    let mut cmd = Command::cargo_bin("wxtoot-post").unwrap();

    cmd.arg("--config")
        .arg(&config_path)
        .write_stdin("{not json")
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("Invalid record JSON"));
}

#[test]
fn test_empty_input_exits_with_code_3() {
    let (_temp_dir, config_path) = setup_test_env();
    let mut cmd = Command::cargo_bin("wxtoot-post").unwrap();

    cmd.arg("--config")
        .arg(&config_path)
        .write_stdin("   \n")
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("No record provided"));
}

#[test]
fn test_invalid_visibility_exits_with_code_3() {
    let (_temp_dir, config_path) = setup_test_env();
    let mut cmd = Command::cargo_bin("wxtoot-post").unwrap();

    cmd.arg("--config")
        .arg(&config_path)
        .arg("--visibility")
        .arg("everyone")
        .write_stdin(RECORD)
        .assert()
        .failure()
        .code(3);
}
