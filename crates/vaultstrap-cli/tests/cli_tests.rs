//! Integration tests for the `vaultstrap` binary.
//!
//! These run the CLI as a subprocess and only cover paths that stop before
//! any host tool is invoked: help, version, argument rejection and
//! configuration validation.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;
use std::process::Command;

fn vaultstrap_bin() -> String {
    let path = env!("CARGO_BIN_EXE_vaultstrap");
    assert!(
        Path::new(path).exists(),
        "vaultstrap binary not found at {path}"
    );
    path.to_owned()
}

/// Run vaultstrap with args and return (`exit_code`, stdout, stderr).
fn run(args: &[&str]) -> (i32, String, String) {
    let output = Command::new(vaultstrap_bin())
        .args(args)
        .env_remove("VAULTSTRAP_BASE_DIR")
        .env_remove("VAULTSTRAP_PORT")
        .env_remove("VAULTSTRAP_APP_NAME")
        .env("VAULTSTRAP_LOG", "error")
        .output()
        .expect("failed to execute vaultstrap");

    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (code, stdout, stderr)
}

// ── Version & help ───────────────────────────────────────────────────

#[test]
fn test_version_flag() {
    let (code, stdout, _) = run(&["--version"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("vaultstrap"), "{stdout}");
}

#[test]
fn test_help_lists_subcommands() {
    let (code, stdout, _) = run(&["--help"]);
    assert_eq!(code, 0);
    for word in ["bootstrap", "backup", "stop", "--domain", "--port"] {
        assert!(stdout.contains(word), "help should mention {word}: {stdout}");
    }
}

#[test]
fn test_backup_help() {
    let (code, stdout, _) = run(&["backup", "--help"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("30 days"), "{stdout}");
}

// ── Argument rejection ───────────────────────────────────────────────

#[test]
fn test_unknown_flag_is_rejected() {
    let (code, _, stderr) = run(&["--frobnicate"]);
    assert_eq!(code, 2, "clap usage errors exit 2");
    assert!(stderr.contains("--frobnicate"), "{stderr}");
}

#[test]
fn test_unknown_subcommand_is_rejected() {
    let (code, _, _) = run(&["restore"]);
    assert_eq!(code, 2);
}

#[test]
fn test_unknown_issuer_is_rejected() {
    let (code, _, stderr) = run(&["--issuer", "letsencrypt"]);
    assert_eq!(code, 2);
    assert!(stderr.contains("letsencrypt"), "{stderr}");
}

// ── Configuration validation ─────────────────────────────────────────

#[test]
fn test_zero_port_fails_before_touching_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let base = tmp.path().join("vw");
    let (code, _, stderr) = run(&["--base-dir", base.to_str().unwrap(), "--port", "0"]);

    assert_eq!(code, 1);
    assert!(stderr.contains("✗ Error:"), "{stderr}");
    assert!(stderr.contains("port must be non-zero"), "{stderr}");
    assert!(!base.exists());
}

#[test]
fn test_backup_rejects_app_name_with_whitespace() {
    let tmp = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run(&[
        "backup",
        "--base-dir",
        tmp.path().to_str().unwrap(),
        "--app-name",
        "my vault",
    ]);

    assert_eq!(code, 1);
    assert!(stderr.contains("app name must not contain whitespace"), "{stderr}");
    assert!(!tmp.path().join("backups").exists());
}
