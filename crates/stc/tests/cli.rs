use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn stc(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_stc"))
        .env("STC_CONFIG_DIR", root.join("config"))
        .env("STC_CACHE_DIR", root.join("cache"))
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("failed to run stc")
}

#[test]
fn where_reports_overridden_directories() {
    let root = TempDir::new().unwrap();
    let output = stc(root.path(), &["where"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(&root.path().join("config").display().to_string()));
    assert!(stdout.contains(&root.path().join("cache").display().to_string()));
    assert!(stdout.contains("config.toml"));
}

#[test]
fn render_help_lists_input_options() {
    let root = TempDir::new().unwrap();
    let output = stc(root.path(), &["render", "--help"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    for flag in ["--target", "--shader", "--source", "--input", "--filter", "--frame"] {
        assert!(stdout.contains(flag), "missing {flag}");
    }
}

#[test]
fn render_rejects_invalid_size() {
    let root = TempDir::new().unwrap();
    let output = stc(
        root.path(),
        &["render", "--shader", "XsXXDn", "--size", "0x10"],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("greater than zero"), "{stderr}");
}

#[test]
fn invalid_configuration_is_reported() {
    let root = TempDir::new().unwrap();
    let config_dir = root.path().join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join("config.toml"), "[host]\nwidth = 0\n").unwrap();

    let output = stc(root.path(), &["render", "--shader", "XsXXDn"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid configuration"), "{stderr}");
}
