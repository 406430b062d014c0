//! End-to-end runs of the `paw` binary with the shell command executor.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const CONFIG: &str = r#"
[settings]
unit_measure_runs = 3

[[profiles]]
name = "sh"
executor = "command"
[profiles.settings]
shell = "/bin/sh"
"#;

fn paw(args: &[&str], cwd: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_paw"))
        .args(args)
        .current_dir(cwd)
        .env("PAW_LOG", "warn")
        .output()
        .expect("failed to run paw")
}

fn write_inputs(dir: &Path, units: &[&str]) -> (PathBuf, PathBuf) {
    let config = dir.join("config.toml");
    std::fs::write(&config, CONFIG).unwrap();

    let quoted: Vec<String> = units.iter().map(|u| format!("{u:?}")).collect();
    let test = dir.join("shell_test.toml");
    std::fs::write(
        &test,
        format!("name = \"shell_test\"\nunits = [{}]\n", quoted.join(", ")),
    )
    .unwrap();
    (config, test)
}

#[test]
fn record_then_view_and_compare() {
    let dir = tempfile::tempdir().unwrap();
    let (config, test) = write_inputs(dir.path(), &["true", "sleep 0.01"]);

    let output = paw(
        &[
            "record",
            test.to_str().unwrap(),
            "-c",
            config.to_str().unwrap(),
            "-p",
            "sh",
            "-o",
            "out",
        ],
        dir.path(),
    );
    assert!(
        output.status.success(),
        "record failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let run = dir.path().join("out");
    assert!(run.join("unit_0").join("unit_record.json").is_file());
    assert!(run.join("unit_1").join("unit_record.json").is_file());
    assert!(run.join("config.toml").is_file());
    assert!(run.join("test.toml").is_file());

    let output = paw(&["view", "out", "--format", "json"], dir.path());
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let units = report["units"].as_array().unwrap();
    assert_eq!(units.len(), 2);
    assert_eq!(units[1]["record"]["unit"], "sleep 0.01");
    assert_eq!(
        units[0]["record"]["execution_times"].as_array().unwrap().len(),
        3
    );

    let output = paw(&["view", "out", "out", "-o", "report"], dir.path());
    assert!(output.status.success());
    let table = String::from_utf8_lossy(&output.stdout);
    assert!(table.contains("2 units compared"));
    assert!(dir.path().join("report").join("index.md").is_file());
}

#[test]
fn failing_unit_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let (config, test) = write_inputs(dir.path(), &["true", "exit 3"]);

    let output = paw(
        &[
            "record",
            test.to_str().unwrap(),
            "-c",
            config.to_str().unwrap(),
            "-p",
            "sh",
            "-o",
            "out",
        ],
        dir.path(),
    );
    assert!(!output.status.success());

    let run = dir.path().join("out");
    assert!(run.join("unit_0").join("unit_record.json").is_file());
    assert!(!run.join("unit_1").join("unit_record.json").exists());
}

#[test]
fn unknown_profile_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (config, test) = write_inputs(dir.path(), &["true"]);

    let output = paw(
        &[
            "record",
            test.to_str().unwrap(),
            "-c",
            config.to_str().unwrap(),
            "-p",
            "postgres",
        ],
        dir.path(),
    );
    assert!(!output.status.success());
    assert!(!dir.path().join("shell_test").exists());
}
