//! End-to-end CLI tests for the paperfetch binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn paperfetch() -> Command {
    let mut cmd = Command::cargo_bin("paperfetch").unwrap();
    // Keep tests independent of the developer's config file.
    cmd.env_remove("PAPERFETCH_CONFIG")
        .env("XDG_CONFIG_HOME", "/nonexistent-paperfetch-config-home")
        .env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_binary_help_displays_usage() {
    paperfetch()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Resolve DOIs"))
        .stdout(predicate::str::contains("--concurrency"));
}

#[test]
fn test_binary_version_displays_version() {
    paperfetch()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("paperfetch"));
}

#[test]
fn test_binary_invalid_flag_returns_error() {
    paperfetch()
        .arg("--invalid-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_binary_rejects_zero_concurrency() {
    paperfetch()
        .args(["-c", "0", "10.1234/x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_binary_rejects_concurrency_above_limit() {
    paperfetch()
        .args(["--concurrency", "101", "10.1234/x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("101"));
}

#[test]
fn test_binary_without_input_prints_guidance() {
    paperfetch()
        .write_stdin("")
        .assert()
        .success()
        .stdout(predicate::str::contains("DOIs"));
}

#[test]
fn test_binary_invalid_only_input_exits_with_failure() {
    let dir = TempDir::new().unwrap();
    paperfetch()
        .args(["not-a-doi", "--no-summary", "-o"])
        .arg(dir.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("not-a-doi"))
        .stdout(predicate::str::contains("invalid_doi"));
}

#[test]
fn test_binary_invalid_only_input_json_output() {
    let dir = TempDir::new().unwrap();
    paperfetch()
        .args(["doi:bogus", "--json", "--no-summary", "-o"])
        .arg(dir.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("\"status\":\"invalid_doi\""));
}

#[test]
fn test_binary_writes_summary_csv_by_default() {
    let dir = TempDir::new().unwrap();
    paperfetch()
        .args(["not-a-doi", "-q", "-o"])
        .arg(dir.path())
        .assert()
        .code(1);

    let summary = std::fs::read_to_string(dir.path().join("download_summary.csv")).unwrap();
    assert!(summary.starts_with("doi,input,status"), "{summary}");
    assert!(summary.contains("invalid_doi"));
}

#[test]
fn test_binary_missing_config_file_fails() {
    let dir = TempDir::new().unwrap();
    paperfetch()
        .arg("--config")
        .arg(dir.path().join("missing.toml"))
        .arg("10.1234/x")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("missing.toml"));
}

#[test]
fn test_binary_config_with_unknown_key_fails() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("paperfetch.toml");
    std::fs::write(&config, "concurency = 3\n").unwrap();
    paperfetch()
        .arg("--config")
        .arg(&config)
        .arg("10.1234/x")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("concurency"));
}
