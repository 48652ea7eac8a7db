use assert_cmd::Command;
use std::fs;
use tempfile::tempdir;

fn write_manifest(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("pipeline.yaml");
    fs::write(&path, body).expect("failed to write manifest");
    path
}

#[test]
fn run_executes_stages_in_the_working_directory() {
    let temp = tempdir().unwrap();
    let manifest = write_manifest(
        temp.path(),
        r#"
version: 1
stages:
  - name: build
    commands:
      - echo built > build.out
  - name: test
    commands:
      - test -f build.out
"#,
    );

    Command::cargo_bin("conveyor")
        .expect("binary present")
        .args(["run"])
        .arg(&manifest)
        .arg("--workdir")
        .arg(temp.path())
        .assert()
        .success();

    assert!(temp.path().join("build.out").is_file());
}

#[test]
fn failing_required_stage_yields_nonzero_exit() {
    let temp = tempdir().unwrap();
    let manifest = write_manifest(
        temp.path(),
        r#"
version: 1
stages:
  - name: test
    commands:
      - exit 1
"#,
    );

    Command::cargo_bin("conveyor")
        .expect("binary present")
        .args(["run"])
        .arg(&manifest)
        .arg("--workdir")
        .arg(temp.path())
        .assert()
        .failure();
}

#[test]
fn failing_best_effort_stage_exits_zero() {
    let temp = tempdir().unwrap();
    let manifest = write_manifest(
        temp.path(),
        r#"
version: 1
stages:
  - name: lint
    policy: best-effort
    commands:
      - exit 1
  - name: test
    commands:
      - "true"
"#,
    );

    Command::cargo_bin("conveyor")
        .expect("binary present")
        .args(["run"])
        .arg(&manifest)
        .arg("--workdir")
        .arg(temp.path())
        .assert()
        .success();
}

#[test]
fn run_writes_the_report_json() {
    let temp = tempdir().unwrap();
    let manifest = write_manifest(
        temp.path(),
        r#"
version: 1
stages:
  - name: test
    commands:
      - echo ok
"#,
    );
    let report_path = temp.path().join("report.json");

    Command::cargo_bin("conveyor")
        .expect("binary present")
        .args(["run"])
        .arg(&manifest)
        .arg("--workdir")
        .arg(temp.path())
        .arg("--report-json")
        .arg(&report_path)
        .assert()
        .success();

    let report = fs::read_to_string(&report_path).unwrap();
    assert!(report.contains("\"verdict\": \"succeeded\""));
    assert!(report.contains("\"name\": \"test\""));
}

#[test]
fn validate_rejects_a_broken_manifest() {
    let temp = tempdir().unwrap();
    let manifest = write_manifest(
        temp.path(),
        r#"
version: 1
stages: []
"#,
    );

    Command::cargo_bin("conveyor")
        .expect("binary present")
        .args(["validate"])
        .arg(&manifest)
        .assert()
        .failure();
}

#[test]
fn dry_run_does_not_execute_commands() {
    let temp = tempdir().unwrap();
    let manifest = write_manifest(
        temp.path(),
        r#"
version: 1
stages:
  - name: test
    commands:
      - touch should_not_exist
"#,
    );

    Command::cargo_bin("conveyor")
        .expect("binary present")
        .args(["run"])
        .arg(&manifest)
        .arg("--workdir")
        .arg(temp.path())
        .arg("--dry-run")
        .assert()
        .success();

    assert!(!temp.path().join("should_not_exist").exists());
}
