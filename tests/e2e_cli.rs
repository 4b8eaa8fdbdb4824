//! CLI end-to-end tests
//!
//! Tests for the streamgauge command-line interface.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the streamgauge binary
#[allow(deprecated)]
fn streamgauge_cmd() -> Command {
    let mut cmd = Command::cargo_bin("streamgauge").unwrap();
    for var in ["SOURCE_IP", "SCALE_VALUE", "HLS_PATH", "STREAMGAUGE_PORT", "RUST_LOG"] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_cli_no_args_shows_help() {
    streamgauge_cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help_flag() {
    streamgauge_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("streamgauge"))
        .stdout(predicate::str::contains("parse-line"));
}

#[test]
fn test_cli_version_command() {
    streamgauge_cmd()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "streamgauge {}",
            env!("CARGO_PKG_VERSION")
        )));
}

#[test]
fn test_cli_start_help() {
    streamgauge_cmd()
        .args(["start", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Start the HTTP API server"));
}

#[test]
fn test_cli_presets() {
    streamgauge_cmd()
        .arg("presets")
        .assert()
        .success()
        .stdout(predicate::str::contains("720p"))
        .stdout(predicate::str::contains("1280x720"))
        .stdout(predicate::str::contains("3840x2160"));
}

#[test]
fn test_cli_check_tools_lists_program() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("streamgauge.toml");
    fs::write(
        &config_path,
        "[stream]\nprogram = \"nonexistent_stream_tool_xyz\"\n",
    )
    .unwrap();

    streamgauge_cmd()
        .args(["--config", config_path.to_str().unwrap(), "check-tools"])
        .assert()
        .success()
        .stdout(predicate::str::contains("nonexistent_stream_tool_xyz"))
        .stdout(predicate::str::contains("ffprobe"))
        .stdout(predicate::str::contains("is missing"));
}

#[test]
fn test_cli_parse_line_emits_json() {
    let input = "Input #0, mpegts, from 'srt://10.0.0.5:1935':\n\
                 frame=   10 fps=0.0 q=28.0 size=     128kB time=00:00:00.40 bitrate=2621.4kbits/s speed=0.8x\r\
                 frame=   20 fps= 20 q=28.0 size=     256kB time=00:00:00.80 bitrate=2621.4kbits/s speed=1.01x\n";

    let output = assert_cmd::Command::from_std(streamgauge_cmd())
        .arg("parse-line")
        .write_stdin(input)
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["frame"], 10.0);
    assert_eq!(lines[1]["frame"], 20.0);
    assert_eq!(lines[1]["size"], 256.0);
    assert_eq!(lines[1]["time"], "00:00:00.80");
}

#[test]
fn test_cli_validate_valid_config() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("streamgauge.toml");
    fs::write(
        &config_path,
        r#"
[server]
port = 6000

[stream]
program = "sh"
args = ["-c", "exec sleep 30"]
output_dir = "/tmp/hls"
default_resolution = "720p"
"#,
    )
    .unwrap();

    streamgauge_cmd()
        .args(["validate", config_path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("0.0.0.0:6000"))
        .stdout(predicate::str::contains("Default resolution: 720p"));
}

#[test]
fn test_cli_validate_reports_warnings() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("streamgauge.toml");
    fs::write(
        &config_path,
        "[stream]\ndefault_resolution = \"huge\"\ngraceful_timeout_secs = 0\n",
    )
    .unwrap();

    streamgauge_cmd()
        .args(["validate", config_path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Warnings:"))
        .stdout(predicate::str::contains("default resolution 'huge'"))
        .stdout(predicate::str::contains("graceful_timeout_secs"));
}

#[test]
fn test_cli_validate_env_overrides() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("streamgauge.toml");
    fs::write(&config_path, "").unwrap();

    streamgauge_cmd()
        .args(["validate", config_path.to_str().unwrap()])
        .env("SOURCE_IP", "10.1.2.3")
        .env("HLS_PATH", "/srv/hls")
        .assert()
        .success()
        .stdout(predicate::str::contains("Default source: 10.1.2.3"))
        .stdout(predicate::str::contains("Output dir: /srv/hls"));
}

#[test]
fn test_cli_validate_invalid_config() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("bad.toml");
    fs::write(&config_path, "[server]\nport = \"nope\"\n").unwrap();

    streamgauge_cmd()
        .args(["validate", config_path.to_str().unwrap()])
        .assert()
        .failure();
}
