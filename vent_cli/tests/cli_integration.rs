use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn vent() -> Command {
    Command::cargo_bin("vent").expect("binary builds")
}

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    file.write_all(content.as_bytes()).expect("write config");
    file
}

#[test]
fn check_config_accepts_a_valid_file() {
    let file = write_config(
        r#"
[metrics]
temp_ideal = 21.0

[modes]
default_mode = "binary"
"#,
    );
    vent()
        .arg("--config")
        .arg(file.path())
        .arg("check-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("OK"));
}

#[test]
fn check_config_rejects_inverted_binary_thresholds() {
    let file = write_config(
        r#"
[modes]
binary_open_threshold = 5.0
binary_close_threshold = 10.0
"#,
    );
    vent()
        .arg("--config")
        .arg(file.path())
        .arg("check-config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("binary_open_threshold"));
}

#[test]
fn check_config_requires_the_file_to_exist() {
    vent()
        .arg("--config")
        .arg("definitely/not/here.toml")
        .arg("check-config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot read config file"));
}

#[test]
fn status_json_emits_a_parseable_snapshot() {
    let output = vent()
        .args(["--log-level", "error", "--json", "status"])
        .output()
        .expect("run status");
    assert!(output.status.success(), "status must succeed");
    let stdout = String::from_utf8(output.stdout).expect("utf-8");
    let snapshot: serde_json::Value =
        serde_json::from_str(stdout.trim()).expect("stdout must be one JSON object");
    assert_eq!(snapshot["position"], 0, "homed rig reports closed");
    assert!(snapshot["co2_ppm"].is_number());
    assert!(snapshot["total_metric"].is_number());
}

#[test]
fn status_human_output_names_the_position() {
    vent()
        .args(["--log-level", "error", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("position: 0/9"));
}

#[test]
fn simulated_run_completes_a_bounded_session() {
    vent()
        .args([
            "--log-level",
            "error",
            "run",
            "--duration",
            "120",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("session complete"));
}

#[test]
fn run_rejects_unknown_modes() {
    vent()
        .args(["run", "--duration", "1", "--mode", "turbo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown mode"));
}
