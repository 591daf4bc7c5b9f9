//! End-to-end tests for the `memserve` binary.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

fn write_temp_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp config");
    file.write_all(contents.as_bytes()).expect("write temp config");
    file
}

fn memserve() -> Command {
    let mut cmd = Command::cargo_bin("memserve").expect("memserve binary");
    cmd.env_remove("MEMSERVE_CONFIG").env_remove("RUST_LOG");
    cmd
}

const VALID: &str = r#"
[logging]
level = "warn"
format = "pretty"

[pool]
min_connections = 2
max_connections = 4
max_idle_time_ms = 60000
max_error_count = 3
health_check_interval_ms = 1000

[monitor]
latency_alert_threshold_ms = 250.0
error_rate_alert_threshold = 0.1
sampler_enabled = false

[startup]
timeout_secs = 10
"#;

#[test]
fn check_accepts_valid_config() {
    let config = write_temp_config(VALID);

    memserve()
        .args(["check", "--config"])
        .arg(config.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration file is valid"))
        .stdout(predicate::str::contains("min 2, max 4"));
}

#[test]
fn check_logs_at_configured_level() {
    let config = write_temp_config(&VALID.replace("level = \"warn\"", "level = \"debug\""));

    memserve()
        .args(["check", "--config"])
        .arg(config.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("Configuration loaded"));
}

#[test]
fn check_rejects_inverted_pool_bounds() {
    let config = write_temp_config(
        "[pool]\nmin_connections = 8\nmax_connections = 2\n",
    );

    memserve()
        .args(["check", "--config"])
        .arg(config.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("min_connections"));
}

#[test]
fn check_reports_missing_file() {
    memserve()
        .args(["check", "--config", "/nonexistent/memserve.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read config file"));
}

#[test]
fn check_reads_path_from_environment() {
    let config = write_temp_config(VALID);

    memserve()
        .env("MEMSERVE_CONFIG", config.path())
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration file is valid"));
}

#[test]
fn simulate_prints_ready_health_snapshot() {
    let config = write_temp_config(VALID);

    let output = memserve()
        .args(["simulate", "--requests", "40", "--concurrency", "4"])
        .args(["--latency-ms", "1", "--create-ms", "1", "--config"])
        .arg(config.path())
        .output()
        .expect("run memserve");

    assert!(output.status.success());
    let snapshot: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout is a JSON snapshot");
    assert_eq!(snapshot["ready"], true);
    assert_eq!(
        snapshot["performance"]["operations"]["simulated_request"]["total_calls"],
        40
    );
    assert!(snapshot["pool"]["pool_size"].as_u64().unwrap() <= 4);
}

#[test]
fn simulate_rejects_out_of_range_failure_rate() {
    memserve()
        .args(["simulate", "--failure-rate", "1.5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failure_rate"));
}
