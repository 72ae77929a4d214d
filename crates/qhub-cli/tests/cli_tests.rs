//! End-to-end tests of the `qhub` binary against the simulated service.

use std::process::{Command, Output};

fn qhub(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_qhub"))
        .args(args)
        .env("QHUB_TOKEN", "cli-test-token")
        .env("QHUB_POLL_INTERVAL_MS", "20")
        .env("QHUB_CACHE_BACKEND", "memory")
        .env("QHUB_LOG_LEVEL", "warn")
        .env_remove("QHUB_CONFIG")
        .output()
        .expect("failed to run qhub")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_circuits_lists_library() {
    let output = qhub(&["circuits"]);
    assert!(output.status.success());

    let out = stdout(&output);
    assert!(out.contains("bell_state"));
    assert!(out.contains("quantum_fourier_transform"));
    assert!(out.contains("estimator only"));
}

#[test]
fn test_targets_hides_offline_devices() {
    let output = qhub(&["targets"]);
    assert!(output.status.success(), "{}", stderr(&output));

    let out = stdout(&output);
    assert!(out.contains("sim_kyiv"));
    assert!(out.contains("sim_brisbane"));
    assert!(!out.contains("sim_osaka"));
}

#[test]
fn test_run_bell_state_to_completion() {
    let output = qhub(&[
        "run",
        "bell_state",
        "--target",
        "sim_kyiv",
        "--shots",
        "200",
        "--json",
    ]);
    assert!(output.status.success(), "{}", stderr(&output));

    let out = stdout(&output);
    let json_start = out.find('{').expect("no JSON in output");
    let record: serde_json::Value = serde_json::from_str(&out[json_start..]).unwrap();

    assert_eq!(record["status"]["state"], "COMPLETED");
    assert_eq!(record["outcome"]["program"], "sampler");
    let total: u64 = record["outcome"]["hardware_counts"]
        .as_object()
        .unwrap()
        .values()
        .map(|v| v.as_u64().unwrap())
        .sum();
    assert!(total > 0 && total <= 200);
}

#[test]
fn test_run_estimator_prints_expectation() {
    let output = qhub(&[
        "run",
        "phase_circuit",
        "--target",
        "sim_kyiv",
        "--mode",
        "estimator",
    ]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("Expectation value"));
}

#[test]
fn test_run_without_measurement_fails() {
    let output = qhub(&["run", "phase_circuit", "--target", "sim_kyiv"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Error:"));
}

#[test]
fn test_run_unknown_target_fails() {
    let output = qhub(&["run", "bell_state", "--target", "sim_osaka"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("sim_osaka"));
}

#[test]
fn test_run_rejects_unknown_mode() {
    let output = qhub(&["run", "bell_state", "--target", "sim_kyiv", "--mode", "qaoa"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("qaoa"));
}

#[test]
fn test_run_requires_circuit() {
    let output = qhub(&["run", "--target", "sim_kyiv"]);
    assert!(!output.status.success());
}
