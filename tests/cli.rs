//! End-to-end tests for the q2-provision binary
//!
//! Only paths that never install anything are exercised here: help, version,
//! argument errors and dry-run plans.

use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Path to the built binary, next to the test executable's `deps/` dir.
fn provision_bin() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop();
    path.pop();
    path.push("q2-provision");
    path
}

fn run(args: &[&str], home: &TempDir) -> Output {
    Command::new(provision_bin())
        .args(args)
        .env("XDG_CONFIG_HOME", home.path())
        .env("NO_COLOR", "1")
        .env_remove("Q2_RUNTIME_PREFIX")
        .env_remove("Q2_ENV_PREFIX")
        .env_remove("Q2_PROVISION_CONFIG")
        .output()
        .expect("Failed to execute q2-provision")
}

fn text(output: &Output) -> String {
    format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
}

#[test]
fn test_cli_help() {
    let home = TempDir::new().unwrap();
    let output = run(&["--help"], &home);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--dry-run"));
    assert!(stdout.contains("--runtime-prefix"));
    assert!(stdout.contains("VERSION"));
}

#[test]
fn test_cli_version() {
    let home = TempDir::new().unwrap();
    let output = run(&["--version"], &home);

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("q2-provision"));
}

#[test]
fn test_bad_version_exits_one() {
    let home = TempDir::new().unwrap();
    let output = run(&["2024", "--dry-run"], &home);

    assert_eq!(output.status.code(), Some(1));
    assert!(text(&output).contains("invalid stack version '2024'"));
}

#[test]
fn test_dry_run_plans_a_fresh_host() {
    let home = TempDir::new().unwrap();
    let prefix = home.path().join("host");
    let runtime = prefix.join("miniforge3");
    let env = prefix.join("qiime2_env");

    let output = run(
        &[
            "2023.9",
            "--dry-run",
            "--runtime-prefix",
            runtime.to_str().unwrap(),
            "--env-prefix",
            env.to_str().unwrap(),
            "--no-plugin",
        ],
        &home,
    );

    assert!(output.status.success(), "{}", text(&output));
    let out = text(&output);
    assert!(out.contains("qiime2-amplicon-2023.9-py38-linux-conda.yml"));
    assert!(out.contains("Miniforge3-Linux-x86_64.sh"));
    assert!(out.contains("no plugin configured"));
    assert!(!prefix.exists(), "dry run must not create anything");
}

#[test]
fn test_settings_file_is_read() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("settings.toml");
    let env = home.path().join("custom_env");
    std::fs::write(
        &config,
        format!("env_prefix = {:?}\nplugin = \"q2-picrust2\"\n", env.display().to_string()),
    )
    .unwrap();

    let output = run(&["--dry-run", "-c", config.to_str().unwrap()], &home);

    assert!(output.status.success(), "{}", text(&output));
    let out = text(&output);
    assert!(out.contains(&env.display().to_string()));
    assert!(out.contains("pip install q2-picrust2"));
}

#[test]
fn test_invalid_settings_file_exits_one() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("settings.toml");
    std::fs::write(&config, "prefix = \"/opt\"\n").unwrap();

    let output = run(&["--dry-run", "-c", config.to_str().unwrap()], &home);

    assert_eq!(output.status.code(), Some(1));
    assert!(text(&output).contains("Invalid settings file"));
}

#[test]
fn test_blank_plugin_flag_disables_the_plugin() {
    let home = TempDir::new().unwrap();
    let env = home.path().join("qiime2_env");

    let output = run(
        &["--dry-run", "--plugin", "", "--downloader", "curl", "--env-prefix", env.to_str().unwrap()],
        &home,
    );

    assert!(output.status.success(), "{}", text(&output));
    let out = text(&output);
    assert!(out.contains("no plugin configured"));
    assert!(out.contains("downloader: curl"));
    assert!(!out.contains("pip install"));
}

#[test]
fn test_unknown_downloader_is_rejected() {
    let home = TempDir::new().unwrap();
    let output = run(&["--dry-run", "--downloader", "aria2c"], &home);

    assert!(!output.status.success());
    assert!(text(&output).contains("aria2c"));
}
