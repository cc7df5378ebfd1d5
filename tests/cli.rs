// ABOUTME: Integration tests for the boxctl CLI binary.
// ABOUTME: Validates help output, argument errors and the configs commands.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn boxctl_cmd(home: &std::path::Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("boxctl"));
    cmd.env("BOXCTL_HOME", home);
    cmd
}

#[test]
fn help_shows_commands() {
    let home = tempfile::tempdir().unwrap();
    boxctl_cmd(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("mounts"))
        .stdout(predicate::str::contains("configs"));
}

#[test]
fn bad_port_is_a_usage_error() {
    let home = tempfile::tempdir().unwrap();
    boxctl_cmd(home.path())
        .args(["run", "--dry-run", "-p", "99999", "--", "true"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("99999"));
}

#[test]
fn malformed_mount_is_a_usage_error() {
    let home = tempfile::tempdir().unwrap();
    boxctl_cmd(home.path())
        .args(["run", "--dry-run", "--ro", "dev@:/srv"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("malformed mount spec"));
}

#[test]
fn conflicting_network_flags_are_rejected() {
    let home = tempfile::tempdir().unwrap();
    boxctl_cmd(home.path())
        .args(["run", "--dry-run", "--no-network", "--internal"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("mutually exclusive"));
}

#[test]
fn configs_list_on_empty_store() {
    let home = tempfile::tempdir().unwrap();
    boxctl_cmd(home.path())
        .args(["configs", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No saved configurations."));

    boxctl_cmd(home.path())
        .args(["--json", "configs", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

#[test]
fn configs_show_and_delete_missing_name() {
    let home = tempfile::tempdir().unwrap();
    boxctl_cmd(home.path())
        .args(["configs", "show", "nope"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no configuration named 'nope'"));

    boxctl_cmd(home.path())
        .args(["configs", "delete", "nope"])
        .assert()
        .code(1);
}

#[test]
fn corrupted_store_is_left_untouched() {
    let home = tempfile::tempdir().unwrap();
    let store = home.path().join("config.json");
    fs::write(&store, "[1, 2").unwrap();

    boxctl_cmd(home.path())
        .args(["configs", "delete", "api"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("corrupted"));

    assert_eq!(fs::read_to_string(&store).unwrap(), "[1, 2");
}
