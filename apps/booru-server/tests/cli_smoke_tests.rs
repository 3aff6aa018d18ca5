#![allow(clippy::unwrap_used, clippy::expect_used)]

//! CLI smoke tests for the booru-server binary. None of them needs a
//! database: `check` and `--print-config` exit before connecting.

use std::io::Write;
use std::process::{Command, Output, Stdio};

fn run_booru_server(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_booru-server"))
        .args(args)
        .env_remove("RUST_LOG")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .expect("failed to execute booru-server")
}

fn config_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_cli_help_command() {
    let output = run_booru_server(&["--help"]);

    assert!(output.status.success(), "help should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("run"), "should list the run subcommand");
    assert!(stdout.contains("check"), "should list the check subcommand");
    assert!(stdout.contains("--config"));
}

#[test]
fn test_cli_version_command() {
    let output = run_booru_server(&["--version"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("booru-server"));
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_missing_config_file_fails() {
    let output = run_booru_server(&["--config", "/definitely/not/here.yaml", "check"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("config file does not exist"));
}

#[test]
fn test_check_accepts_valid_config() {
    let file = config_file("cache:\n  backend: none\nlogging:\n  level: warn\n");
    let output = run_booru_server(&["--config", file.path().to_str().unwrap(), "check"]);

    assert!(
        output.status.success(),
        "check failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(String::from_utf8_lossy(&output.stdout).contains("Configuration is valid"));
}

#[test]
fn test_check_rejects_unknown_backend() {
    let file = config_file("cache:\n  backend: redis\n");
    let output = run_booru_server(&["--config", file.path().to_str().unwrap(), "check"]);

    assert!(!output.status.success());
}

#[test]
fn test_print_config_applies_port_and_hides_password() {
    let file = config_file("database:\n  user: app\n  password: hunter2\n");
    let output = run_booru_server(&[
        "--config",
        file.path().to_str().unwrap(),
        "--port",
        "9191",
        "--print-config",
    ]);

    assert!(output.status.success());
    let printed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(printed["database"]["user"], "app");
    assert_eq!(printed["http"]["bind"], "127.0.0.1:9191");
    assert!(!String::from_utf8_lossy(&output.stdout).contains("hunter2"));
}
