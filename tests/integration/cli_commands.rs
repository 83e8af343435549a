#![allow(missing_docs)]

use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

fn write_config(contents: &str) -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("sessions.toml");
    fs::write(&path, contents).expect("write config");
    (dir, path)
}

#[test]
fn simulate_reports_counters_as_json() {
    let (_dir, config) = write_config("[factory]\ncascade_workers = 2\n");
    let output = cargo_bin_cmd!("sombra-sessions")
        .args(["--format", "json", "--config"])
        .arg(&config)
        .args([
            "simulate",
            "--sessions",
            "10",
            "--attributes",
            "3",
            "--corrupt",
            "2",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: Value = serde_json::from_slice(&output).expect("valid json");

    assert_eq!(json["sessions"], 10);
    assert_eq!(json["evicted"], 5);
    assert_eq!(json["cascade_drained"], true);
    assert_eq!(json["corrupted"], 2);
    assert_eq!(json["reloaded"], 8);
    assert_eq!(json["removed"], 10);
    assert_eq!(json["metrics"]["sessions_corrupt"], 2);
    assert_eq!(json["metrics"]["sessions_purged"], 2);
    assert_eq!(json["metrics"]["attributes_written"], 30);
    assert_eq!(json["metrics"]["cascade_evictions"], 15);
    assert_eq!(json["attribute_store"]["active"], 0);
    assert_eq!(json["names_store"]["active"], 0);
}

#[test]
fn simulate_prints_text_summary() {
    let (_dir, config) = write_config("");
    let output = cargo_bin_cmd!("sombra-sessions")
        .arg("--config")
        .arg(&config)
        .args(["simulate", "--sessions", "4", "--corrupt", "0"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert!(text.contains("Outcome: reloaded=4 removed=4"), "{text}");
}

#[test]
fn config_prints_effective_toml() {
    let (_dir, config) = write_config("[stores.attributes]\ncapacity = 128\npersistent = true\n");
    let output = cargo_bin_cmd!("sombra-sessions")
        .arg("--config")
        .arg(&config)
        .arg("config")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    let parsed: toml::Value = toml::from_str(&text).expect("valid toml");
    assert_eq!(parsed["stores"]["attributes"]["capacity"].as_integer(), Some(128));
    assert_eq!(parsed["stores"]["attributes"]["persistent"].as_bool(), Some(true));
    assert_eq!(parsed["factory"]["cascade_workers"].as_integer(), Some(4));
}

#[test]
fn config_path_flag_echoes_the_resolved_file() {
    let (_dir, config) = write_config("");
    let output = cargo_bin_cmd!("sombra-sessions")
        .arg("--config")
        .arg(&config)
        .args(["config", "--path"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert_eq!(text.trim(), config.display().to_string());
}

#[test]
fn invalid_config_is_rejected() {
    let (_dir, config) = write_config("[factory]\ncascade_workers = 0\n");
    let output = cargo_bin_cmd!("sombra-sessions")
        .arg("--config")
        .arg(&config)
        .arg("config")
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert!(text.contains("invalid sessions config"), "{text}");
}
