//! Integration tests for the `nray` CLI binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

#[test]
fn help_lists_both_subcommands() {
    let mut cmd = Command::cargo_bin("nray").unwrap();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("server"))
        .stdout(predicate::str::contains("node"));
}

#[test]
fn version_flag_succeeds() {
    let mut cmd = Command::cargo_bin("nray").unwrap();
    cmd.arg("--version");
    cmd.assert().success();
}

#[test]
fn server_without_config_flag_fails() {
    let mut cmd = Command::cargo_bin("nray").unwrap();
    cmd.arg("server");
    cmd.assert().failure();
}

#[test]
fn node_without_server_flag_fails() {
    let mut cmd = Command::cargo_bin("nray").unwrap();
    cmd.arg("node");
    cmd.assert().failure();
}

#[test]
fn node_tls_ca_without_use_tls_is_rejected() {
    let mut cmd = Command::cargo_bin("nray").unwrap();
    cmd.args(["node", "--server", "127.0.0.1:7777", "--tls-ca", "ca.pem"]);
    cmd.assert().failure();
}

#[test]
fn server_rejects_config_with_no_listen_endpoints() {
    let mut config_file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        config_file,
        r#"
        [listen]
        endpoints = []

        [[pools]]
        [pools.targetgenerator]
        "#
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("nray").unwrap();
    cmd.args(["server", "--config", config_file.path().to_str().unwrap()]);
    cmd.assert().failure();
}
