//! CLI integration tests

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const STATIC_CONFIG: &str = r#"
providers:
  demo:
    enabled: true
    kind: static
    readings:
      - service: compute
        amount: 150.5
        region: us-east-1
      - service: storage
        amount: 9.5
alerts:
  - name: daily_budget
    threshold: 100.0
    period: daily
"#;

fn cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_cost-tracker"))
        .args(args)
        .env_remove("COST_TRACKER_CONFIG")
        .env_remove("SLACK_WEBHOOK")
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to execute command")
}

fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, contents).unwrap();
    path
}

fn path_arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = cli(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Multi-cloud cost tracker"), "Should show app name");
    assert!(stdout.contains("run"), "Should show run command");
    assert!(stdout.contains("validate"), "Should show validate command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = cli(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("cost-tracker"), "Should show binary name");
}

#[test]
fn test_run_help_lists_output_flag() {
    let output = cli(&["run", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--output"));
}

#[test]
fn test_run_writes_report() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, STATIC_CONFIG);
    let report_path = dir.path().join("reports").join("report.json");

    let output = cli(&[
        "--config",
        path_arg(&config),
        "run",
        "--output",
        path_arg(&report_path),
    ]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(
        output.status.success(),
        "run should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout.contains("compute"), "Should list services");
    assert!(stdout.contains("$160.00"), "Should show the total");
    assert!(stdout.contains("daily_budget"), "Should show the triggered alert");

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(report["analysis"]["total_cost"].as_f64(), Some(160.0));
    assert_eq!(report["metrics"].as_array().map(Vec::len), Some(2));
    assert!(report["generated_at"].is_string());
}

#[test]
fn test_run_json_output() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, STATIC_CONFIG);

    let output = cli(&["--config", path_arg(&config), "--format", "json", "run"]);
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout)
        .expect("JSON mode should print a single JSON document");
    assert_eq!(value["total_cost"].as_f64(), Some(160.0));
    assert_eq!(value["by_provider"]["demo"].as_f64(), Some(160.0));
    assert_eq!(value["by_service"]["compute"].as_f64(), Some(150.5));
    assert_eq!(value["alerts"][0]["rule_name"], "daily_budget");
}

#[test]
fn test_run_unwritable_output_fails() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, STATIC_CONFIG);
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "file").unwrap();
    let report_path = blocker.join("report.json");

    let output = cli(&[
        "--config",
        path_arg(&config),
        "run",
        "-o",
        path_arg(&report_path),
    ]);

    assert!(!output.status.success(), "unwritable report path should fail");
    assert!(!report_path.exists());
}

#[test]
fn test_run_with_missing_config_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.yaml");

    let output = cli(&["--config", path_arg(&missing), "run"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("No providers enabled"));
    assert!(stdout.contains("$0.00"));
}

#[test]
fn test_validate_accepts_good_config() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, STATIC_CONFIG);

    let output = cli(&["validate", "--config", path_arg(&config)]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("Configuration is valid"));
    assert!(stdout.contains("demo"));
    assert!(stdout.contains("daily_budget"));
}

#[test]
fn test_validate_rejects_unsupported_provider() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "providers:\n  openai:\n    enabled: true\n");

    let output = cli(&["validate", "--config", path_arg(&config)]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("openai"));
}

#[test]
fn test_validate_rejects_non_positive_threshold() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "alerts:\n  - name: broken\n    threshold: 0\n");

    let output = cli(&["validate", "--config", path_arg(&config)]);

    assert!(!output.status.success());
}
