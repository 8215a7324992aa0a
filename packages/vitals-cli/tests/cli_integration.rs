use assert_cmd::Command;
use predicates::prelude::*;

fn vitals() -> Command {
    let mut cmd = Command::cargo_bin("vitals").unwrap();
    // Keep a developer's .env or shell settings out of the tests
    for key in [
        "VITALS_SERIAL_PORT",
        "VITALS_BAUD_RATE",
        "VITALS_READ_TIMEOUT_MS",
        "VITALS_ACQUIRE_TIMEOUT_MS",
        "VITALS_CAPTURE_WINDOW_MS",
    ] {
        cmd.env_remove(key);
    }
    cmd
}

fn stdout_json(output: &assert_cmd::assert::Assert) -> serde_json::Value {
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    serde_json::from_str(&stdout).unwrap()
}

// =============================================================================
// GENERAL
// =============================================================================

#[test]
fn test_no_args_shows_help() {
    vitals()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_version_flag() {
    vitals()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("vitals"));
}

#[test]
fn test_help_lists_commands() {
    vitals()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("capture"))
        .stdout(predicate::str::contains("watch"));
}

// =============================================================================
// INFO SUBCOMMAND
// =============================================================================

#[test]
fn test_info_subcommand() {
    vitals()
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("vitals CLI v"))
        .stdout(predicate::str::contains("heart_rate"));
}

#[test]
fn test_info_json() {
    let output = vitals().arg("info").arg("--json").assert().success();

    let parsed = stdout_json(&output);
    assert!(parsed.get("cli_version").is_some());
    assert!(parsed.get("serial_supported").is_some());
    assert_eq!(parsed["config"]["acquire_timeout_ms"], 5000);
    assert_eq!(parsed["channels"].as_array().unwrap().len(), 9);
}

#[test]
fn test_info_reports_bad_environment() {
    let output = vitals()
        .env("VITALS_CAPTURE_WINDOW_MS", "soon")
        .arg("info")
        .arg("--json")
        .assert()
        .success();

    let parsed = stdout_json(&output);
    assert!(parsed["config"].is_null());
    assert!(parsed["config_error"]
        .as_str()
        .unwrap()
        .contains("VITALS_CAPTURE_WINDOW_MS"));
}

// =============================================================================
// PARSE SUBCOMMAND
// =============================================================================

#[test]
fn test_parse_six_field_line() {
    let output = vitals()
        .arg("parse")
        .arg("72,98,37,98,0,12")
        .assert()
        .success();

    let parsed = stdout_json(&output);
    assert_eq!(parsed["format"], "csv6");
    assert_eq!(parsed["values"]["heart_rate"], 72.0);
    assert_eq!(parsed["values"]["alcohol_level"], 12.0);
    assert_eq!(parsed["raw"], "72,98,37,98,0,12");
    assert!(parsed["timestamp"].is_string());
}

#[test]
fn test_parse_unrecognized_line() {
    vitals()
        .arg("parse")
        .arg("hello device")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Unrecognized line"));
}

#[test]
fn test_parse_stdin_skips_noise() {
    let output = vitals()
        .arg("parse")
        .arg("--compact")
        .write_stdin("boot v1.2\n72,98\n{\"bp\":{\"sys\":118,\"dia\":76},\"spo2\":97.4}\n\n")
        .assert()
        .success();

    let parsed = stdout_json(&output);
    assert_eq!(parsed["total_lines"], 3);
    assert_eq!(parsed["skipped"], 1);
    assert_eq!(parsed["readings"][1]["values"]["bp_sys"], 118.0);
    assert_eq!(parsed["readings"][1]["values"]["spo2"], 97.4);
}

#[test]
fn test_parse_input_file_to_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("lines.txt");
    let out = dir.path().join("readings.json");
    std::fs::write(&input, "70,99\n71,98,37,98\n").unwrap();

    vitals()
        .arg("parse")
        .arg("--input")
        .arg(&input)
        .arg("--output")
        .arg(&out)
        .assert()
        .success();

    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(parsed["readings"].as_array().unwrap().len(), 2);
    assert_eq!(parsed["readings"][1]["format"], "csv4");
}

#[test]
fn test_parse_missing_input_file() {
    vitals()
        .arg("parse")
        .arg("--input")
        .arg("/nonexistent/lines.txt")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Failed to read"));
}

// =============================================================================
// READ / WATCH / CAPTURE
// =============================================================================

#[test]
fn test_read_simulated_reading() {
    let output = vitals()
        .args(["read", "--simulate", "--seed", "4", "--compact"])
        .assert()
        .success();

    let parsed = stdout_json(&output);
    assert_eq!(parsed["format"], "json");
    assert!(parsed["values"]["heart_rate"].is_number());
    assert!(parsed["values"]["bp_dia"].is_number());
}

#[test]
fn test_read_missing_port_is_connection_error() {
    vitals()
        .args(["read", "--port", "/dev/does-not-exist-vitals"])
        .assert()
        .failure()
        .code(6)
        .stderr(predicate::str::contains("Connection error"));
}

#[test]
fn test_read_rejects_zero_timeout() {
    vitals()
        .args(["read", "--simulate", "--timeout-ms", "0"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn test_read_rejects_bad_environment() {
    vitals()
        .env("VITALS_CAPTURE_WINDOW_MS", "soon")
        .args(["read", "--simulate"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Invalid configuration"))
        .stderr(predicate::str::contains("VITALS_CAPTURE_WINDOW_MS"));
}

#[test]
fn test_watch_stops_after_count() {
    let output = vitals()
        .args(["watch", "--simulate", "--seed", "2", "-n", "3"])
        .assert()
        .success();

    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 3);
    for line in lines {
        let reading: serde_json::Value = serde_json::from_str(line).unwrap();
        assert!(reading["values"]["spo2"].is_number());
    }
}

#[test]
fn test_capture_simulated_window() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("capture.json");

    vitals()
        .args(["capture", "--simulate", "--seed", "8", "--window-ms", "600", "--quiet"])
        .arg("--require-complete")
        .arg("--output")
        .arg(&out)
        .assert()
        .success();

    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(parsed["complete"], true);
    assert!(parsed["committed"]["bp_sys"].is_number());
    assert!(parsed["committed"]["temp_c"].is_number());
    assert_eq!(parsed["session"]["active"], false);
    assert_eq!(parsed["session"]["vitals"]["heart_rate"]["status"], "captured");
}
