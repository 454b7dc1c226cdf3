//! CLI integration tests for the Nexus command-line interface.
//!
//! These tests verify help output, argument parsing and the offline target
//! commands. Each test points `NEXUS_CONFIG_DIR` at a temporary directory so
//! the real user config is never touched.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A nexus command isolated in its own config and working directory.
fn nexus(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("nexus").unwrap();
    cmd.env("NEXUS_CONFIG_DIR", dir.path())
        .env_remove("NEXUS_TOKEN")
        .current_dir(dir.path());
    cmd
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_displays() {
    let dir = TempDir::new().unwrap();
    nexus(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nexus"))
        .stdout(predicate::str::contains("MCP servers"));
}

#[test]
fn test_version_displays() {
    let dir = TempDir::new().unwrap();
    nexus(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("nexus"));
}

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    nexus(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("inspect"))
        .stdout(predicate::str::contains("call"))
        .stdout(predicate::str::contains("shell"))
        .stdout(predicate::str::contains("target"))
        .stdout(predicate::str::contains("login"));
}

#[test]
fn test_global_flags_accepted() {
    let dir = TempDir::new().unwrap();
    nexus(&dir).args(["--verbose", "--help"]).assert().success();
    nexus(&dir).args(["--json", "--help"]).assert().success();
}

// ─────────────────────────────────────────────────────────────────────────────
// Subcommand Help Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_inspect_help_shows_connection_flags() {
    let dir = TempDir::new().unwrap();
    nexus(&dir)
        .args(["inspect", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--transport"))
        .stdout(predicate::str::contains("--endpoint"))
        .stdout(predicate::str::contains("--header"))
        .stdout(predicate::str::contains("--token"))
        .stdout(predicate::str::contains("--credentials"))
        .stdout(predicate::str::contains("--filter"));
}

#[test]
fn test_call_help() {
    let dir = TempDir::new().unwrap();
    nexus(&dir)
        .args(["call", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--args"));
}

#[test]
fn test_login_help() {
    let dir = TempDir::new().unwrap();
    nexus(&dir)
        .args(["login", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--username"))
        .stdout(predicate::str::contains("--save"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Argument Validation Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_inspect_requires_target() {
    let dir = TempDir::new().unwrap();
    nexus(&dir)
        .arg("inspect")
        .assert()
        .failure()
        .stderr(predicate::str::contains("TARGET"));
}

#[test]
fn test_unknown_transport_rejected() {
    let dir = TempDir::new().unwrap();
    nexus(&dir)
        .args(["inspect", "http://localhost:1/sse", "--transport", "carrier-pigeon"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown transport"));
}

#[test]
fn test_call_rejects_bad_arguments_before_connecting() {
    let dir = TempDir::new().unwrap();
    nexus(&dir)
        .args(["call", "http://localhost:1/mcp", "echo", "--args", "{bad"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid tool arguments"));
}

#[test]
fn test_call_unreachable_server_reports_hint() {
    let dir = TempDir::new().unwrap();
    nexus(&dir)
        .args([
            "call",
            "http://127.0.0.1:1/mcp",
            "echo",
            "--transport",
            "http",
            "--connect-timeout",
            "5",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("hint:"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Target Management Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_target_list_empty() {
    let dir = TempDir::new().unwrap();
    nexus(&dir)
        .args(["target", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No saved targets"));
}

#[test]
fn test_target_add_list_remove() {
    let dir = TempDir::new().unwrap();

    nexus(&dir)
        .args([
            "target",
            "add",
            "local",
            "http://localhost:8000/mcp",
            "--transport",
            "http",
            "-H",
            "X-Api-Key=abc",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added"));

    let saved = std::fs::read_to_string(dir.path().join("config.toml")).unwrap();
    assert!(saved.contains("name = \"local\""));
    assert!(saved.contains("transport = \"http\""));

    nexus(&dir)
        .args(["--json", "target", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"local\""))
        .stdout(predicate::str::contains("X-Api-Key"));

    nexus(&dir)
        .args(["target", "add", "local", "http://elsewhere/sse"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    nexus(&dir)
        .args(["target", "remove", "local"])
        .assert()
        .success();

    nexus(&dir)
        .args(["target", "remove", "local"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}
