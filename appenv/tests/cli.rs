//! Command-line tests for the `appenv` binary

use assert_cmd::Command;
use predicates::prelude::*;

/// `appenv` with an empty env file, so a stray `.env` is never picked up.
fn appenv(env_dir: &tempfile::TempDir) -> Command {
    let env_file = env_dir.path().join("empty.env");
    std::fs::write(&env_file, "").unwrap();

    let mut cmd = Command::cargo_bin("appenv").unwrap();
    cmd.arg("--env-file").arg(env_file);
    cmd
}

#[test]
fn test_keys_lists_logging_variables() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = appenv(&dir);
    cmd.arg("keys").arg("logging");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("PG_LOG_DBNAME"))
        .stdout(predicate::str::contains("PG_LOG_USERNAME"))
        .stdout(predicate::str::contains("PG_LOG_PASSWORD"))
        .stdout(predicate::str::contains("PG_LOG_HOST"))
        .stdout(predicate::str::contains("PG_LOG_PORT"))
        .stdout(predicate::str::contains("PG_APP_").not());
}

#[test]
fn test_keys_rejects_unknown_backend() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = appenv(&dir);
    cmd.arg("keys").arg("metrics");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("unknown backend"));
}

#[test]
fn test_check_reports_invalid_primary_port() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = appenv(&dir);
    cmd.env("PG_APP_HOST", "127.0.0.1")
        .env("PG_APP_PORT", "abc")
        .arg("check")
        .arg("--timeout-secs")
        .arg("1");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("PG_APP_PORT"));
}

#[test]
fn test_check_help() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = appenv(&dir);
    cmd.arg("check").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--logging-db"))
        .stdout(predicate::str::contains("--sslmode"));
}
