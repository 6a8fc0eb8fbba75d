//! Integration tests for the `athdash` binary.
//!
//! Only the non-interactive paths run here: help, version, and
//! `--list-features`, which exits before the terminal is touched.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

const CONFIG: &str = r#"
[user]
id = 12
display_name = "Riley"
role = "coach"

[[features]]
id = "overview"
title = "Overview"

[[features]]
id = "coaching"
title = "Coaching"
component = "workout-tracker"
permissions = ["coach"]

[[features]]
id = "admin-reports"
title = "Reports"
component = "overview"
permissions = ["administrator"]

[[features]]
id = "leaderboard"
title = "Leaderboard"
"#;

// ── Helpers ─────────────────────────────────────────────────────────

/// `athdash` with its env isolated and logs kept inside `dir`.
fn athdash_cmd(dir: &tempfile::TempDir) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("athdash");
    cmd.env("HOME", dir.path())
        .env("XDG_CONFIG_HOME", dir.path())
        .env_remove("ATHDASH_CONFIG")
        .env_remove("ATHDASH_API__BASE_URL")
        .env_remove("ATHDASH_API__NONCE")
        .env_remove("ATHDASH_USER__ROLE")
        .env_remove("RUST_LOG")
        .arg("--log-file")
        .arg(dir.path().join("athdash.log"));
    cmd
}

fn write_config(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    std::fs::write(&path, contents).unwrap();
    path
}

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn help_describes_the_flags() {
    let dir = tempfile::tempdir().unwrap();
    athdash_cmd(&dir).arg("--help").assert().success().stdout(
        predicate::str::contains("athlete profile")
            .and(predicate::str::contains("--list-features"))
            .and(predicate::str::contains("--feature")),
    );
}

#[test]
fn version_flag() {
    let dir = tempfile::tempdir().unwrap();
    athdash_cmd(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("athdash "));
}

#[test]
fn list_features_reports_accessibility() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, CONFIG);

    let output = athdash_cmd(&dir)
        .arg("--config")
        .arg(&config)
        .arg("--list-features")
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    // `leaderboard` has no known component and is skipped.
    assert_eq!(
        lines,
        vec![
            "overview\tOverview\taccessible",
            "coaching\tCoaching\taccessible",
            "admin-reports\tReports\tlocked",
        ]
    );
}

#[test]
fn default_features_without_a_config_file() {
    let dir = tempfile::tempdir().unwrap();
    athdash_cmd(&dir)
        .arg("--config")
        .arg(dir.path().join("missing.toml"))
        .arg("--list-features")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("overview\tOverview\taccessible")
                .and(predicate::str::contains("training-persona")),
        );
}

#[test]
fn malformed_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, "[[features]]\nid = ");

    athdash_cmd(&dir)
        .arg("--config")
        .arg(&config)
        .arg("--list-features")
        .assert()
        .failure();
}
