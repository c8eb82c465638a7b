//! CLI integration tests

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn opsguard(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_opsguard"))
        .args(args)
        .env_remove("OPSGUARD_API_URL")
        .env_remove("OPSGUARD_MODELS_DIR")
        .output()
        .expect("Failed to execute command")
}

fn write_metrics(dir: &Path) -> PathBuf {
    let path = dir.join("metrics.csv");
    let mut content = String::from(
        "Timestamp,CPU_Utilization,Memory_Usage_MB,Disk_IO_MBps,Network_In_Mbps,Network_Out_Mbps,Error_Rate_Percentage\n",
    );
    for i in 0..120 {
        let cpu = 42.0 + (i % 15) as f64;
        content.push_str(&format!(
            "2024-01-01 {:02}:{:02}:00,{},{},{},{},{},{}\n",
            i / 60,
            i % 60,
            cpu,
            1500 + i * 37 % 900,
            20 + i * 13 % 80,
            100 + i * 7 % 400,
            90 + i * 11 % 300,
            cpu / 10.0 + (i % 3) as f64 * 0.1
        ));
    }
    std::fs::write(&path, content).unwrap();
    path
}

fn write_logs(dir: &Path) -> PathBuf {
    let path = dir.join("app.log");
    let messages = [
        "ERROR - Disk usage nearing capacity",
        "INFO - Database connection established",
        "WARN - Network latency exceeded threshold",
    ];
    let content: Vec<String> = (0..12)
        .map(|i| format!("2024-01-01 00:00:{:02}.000000 - {}", i, messages[i % 3]))
        .collect();
    std::fs::write(&path, content.join("\n")).unwrap();
    path
}

fn write_snapshot(dir: &Path) -> PathBuf {
    let path = dir.join("snapshot.json");
    std::fs::write(
        &path,
        r#"{
            "groups": {"web-asg": [
                {"instance_id": "i-a", "lifecycle_state": "InService"},
                {"instance_id": "i-b", "lifecycle_state": "InService"}
            ]},
            "cpu": {
                "i-a": [{"age_secs": 60, "value": 91.0}],
                "i-b": [{"age_secs": 60, "value": 12.0}]
            }
        }"#,
    )
    .unwrap();
    path
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = opsguard(&["--help"]);

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    for command in ["train", "detect", "logs", "remediate", "invoke", "status"] {
        assert!(stdout.contains(command), "Should show {command} command");
    }
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = opsguard(&["--version"]);

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("opsguard"), "Should show binary name");
}

/// Test invoke subcommand help
#[test]
fn test_invoke_help() {
    let output = opsguard(&["invoke", "--help"]);

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Invoke help should succeed");
    assert!(stdout.contains("alarm"));
    assert!(stdout.contains("reboot"));
    assert!(stdout.contains("inference"));
}

/// Test that an invalid format is rejected
#[test]
fn test_invalid_format() {
    let output = opsguard(&["--format", "yaml", "status"]);

    assert!(!output.status.success(), "Invalid format should fail");
}

/// Test remediation dry run against a snapshot
#[test]
fn test_remediate_marks_busiest_instance() {
    let dir = TempDir::new().unwrap();
    let snapshot = write_snapshot(dir.path());
    let event = dir.path().join("event.json");
    std::fs::write(&event, r#"{"AutoScalingGroupName": "web-asg"}"#).unwrap();

    let output = opsguard(&[
        "--format",
        "json",
        "remediate",
        "--snapshot",
        snapshot.to_str().unwrap(),
        "--event",
        event.to_str().unwrap(),
    ]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["response"]["statusCode"], 200);
    assert_eq!(report["response"]["body"], "Instance i-a marked as unhealthy");
    assert_eq!(report["actions"][0]["instance_id"], "i-a");
}

/// Test that a malformed event exits with failure
#[test]
fn test_remediate_rejects_malformed_event() {
    let dir = TempDir::new().unwrap();
    let snapshot = write_snapshot(dir.path());
    let event = dir.path().join("event.json");
    std::fs::write(&event, r#"{"unexpected": true}"#).unwrap();

    let output = opsguard(&[
        "remediate",
        "--snapshot",
        snapshot.to_str().unwrap(),
        "--event",
        event.to_str().unwrap(),
    ]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("400"));
}

/// Test log clustering writes the grouped report
#[test]
fn test_logs_writes_report() {
    let dir = TempDir::new().unwrap();
    let logs = write_logs(dir.path());
    let report = dir.path().join("clusters.txt");

    let output = opsguard(&[
        "--format",
        "json",
        "logs",
        logs.to_str().unwrap(),
        "--report",
        report.to_str().unwrap(),
    ]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 3);
    assert!(std::fs::read_to_string(report).unwrap().contains("Cluster 0 Logs:"));
}

/// Test detection requires a trained model
#[test]
fn test_detect_without_model() {
    let dir = TempDir::new().unwrap();
    let metrics = write_metrics(dir.path());
    let models = dir.path().join("models");

    let output = opsguard(&[
        "--models-dir",
        models.to_str().unwrap(),
        "detect",
        metrics.to_str().unwrap(),
    ]);

    assert!(!output.status.success());
}

/// Test training then detection on the same data
#[test]
fn test_train_then_detect() {
    let dir = TempDir::new().unwrap();
    let metrics = write_metrics(dir.path());
    let logs = write_logs(dir.path());
    let models = dir.path().join("models");

    let output = opsguard(&[
        "--models-dir",
        models.to_str().unwrap(),
        "--format",
        "json",
        "train",
        "--metrics",
        metrics.to_str().unwrap(),
        "--logs",
        logs.to_str().unwrap(),
        "--estimators",
        "10",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["artifacts"].as_array().unwrap().len(), 3);
    assert!(models.join("anomaly_model.json").is_file());
    assert!(models.join("anomaly_model.json.sha256").is_file());

    let output = opsguard(&[
        "--models-dir",
        models.to_str().unwrap(),
        "--format",
        "json",
        "detect",
        metrics.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let flagged: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(flagged.is_array());
}
