//! CLI integration tests

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;

/// Build command for the kigraph-cli binary (finds it in target/debug when run via cargo test).
fn kigraph_cli() -> Command {
    cargo_bin_cmd!("kigraph-cli")
}

/// Path to kigraph library test fixtures (relative to workspace).
fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("kigraph")
        .join("tests")
        .join("fixtures")
}

fn main_net() -> PathBuf {
    fixtures_dir().join("main").join("main.net")
}

fn system_config() -> PathBuf {
    fixtures_dir().join("system.yaml")
}

#[test]
fn test_cli_help() {
    let mut cmd = kigraph_cli();

    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("KiCad"));
}

#[test]
fn test_cli_version() {
    let mut cmd = kigraph_cli();

    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_overview_from_path() {
    let mut cmd = kigraph_cli();

    cmd.arg("overview").arg(main_net());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("# Circuit Overview"))
        .stdout(predicate::str::contains("- **U1**: STM32F411CEU6"));
}

#[test]
fn test_cli_pin_json() {
    let mut cmd = kigraph_cli();

    cmd.args(["--format", "json", "pin"])
        .arg(main_net())
        .args(["U1", "12"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"net\": \"/MISO\""))
        .stdout(predicate::str::contains("\"pin_name\": \"PA6\""));
}

#[test]
fn test_cli_trace() {
    let mut cmd = kigraph_cli();

    cmd.arg("trace").arg(main_net()).args(["R1", "J10"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::starts_with("R1 -> "))
        .stdout(predicate::str::contains("-> J10"));
}

#[test]
fn test_cli_unknown_component_fails() {
    let mut cmd = kigraph_cli();

    cmd.arg("component").arg(main_net()).arg("U99");
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Component 'U99' not found"));
}

#[test]
fn test_cli_unknown_board_name_fails() {
    let mut cmd = kigraph_cli();

    cmd.arg("--config")
        .arg(system_config())
        .args(["overview", "nonexistent"]);
    cmd.assert().failure().code(1);
}

#[test]
fn test_cli_missing_config_fails() {
    let mut cmd = kigraph_cli();

    cmd.args(["--config", "no_such_config.yaml", "boards"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_cli_signal_path() {
    let mut cmd = kigraph_cli();

    cmd.arg("--config")
        .arg(system_config())
        .args(["signal", "rig", "/MISO"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("main:U1 (distance 0)"))
        .stdout(predicate::str::contains("--- /MISO : main -> sense ---"))
        .stdout(predicate::str::contains("sense:U5"));
}

#[test]
fn test_cli_cross_board_candidates() {
    let mut cmd = kigraph_cli();

    cmd.arg("--config")
        .arg(system_config())
        .args(["cross-board", "rig", "--candidates"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("linked  /MISO: main <-> sense (spi_link.kicad_sch)"))
        .stdout(predicate::str::contains("skipped /ALERT: main <-> sense (no shared sheet)"));
}

#[test]
fn test_cli_board_by_name_honours_config() {
    let mut cmd = kigraph_cli();

    cmd.arg("--config")
        .arg(system_config())
        .args(["nets", "sense", "--power"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("GND\t5 connections"))
        .stdout(predicate::str::contains("/MISO").not());
}

#[test]
fn test_cli_add_board_and_system() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("kigraph.yaml");
    std::fs::write(&config, "").unwrap();

    kigraph_cli()
        .arg("--config")
        .arg(&config)
        .args(["add-board", "main"])
        .arg(main_net())
        .args(["--description", "Controller", "--ignore", "J9"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added board 'main'"));

    kigraph_cli()
        .arg("--config")
        .arg(&config)
        .args(["add-system", "solo", "main", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ghost"));

    kigraph_cli()
        .arg("--config")
        .arg(&config)
        .arg("boards")
        .assert()
        .success()
        .stdout(predicate::str::contains("main: Controller"));

    let saved = std::fs::read_to_string(&config).unwrap();
    assert!(saved.contains("J9"));
}
