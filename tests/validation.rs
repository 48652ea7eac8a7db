use std::collections::BTreeMap;
use std::fs;

use conveyor::lockfile::generate_lock;
use conveyor::manifest::{
    DeploySpec, FailurePolicy, Manifest, StageSpec, TriggerSpec,
};
use conveyor::validation::validate_manifest;
use tempfile::tempdir;

fn stage(name: &str, commands: &[&str]) -> StageSpec {
    StageSpec {
        name: name.to_string(),
        policy: FailurePolicy::Required,
        commands: commands.iter().map(|c| c.to_string()).collect(),
    }
}

fn base_manifest(stages: Vec<StageSpec>) -> Manifest {
    Manifest {
        version: 1,
        runtime: None,
        packages: Vec::new(),
        package_command: None,
        env: BTreeMap::new(),
        install: Vec::new(),
        stages,
        after_success: Vec::new(),
        deploy: None,
        branches: None,
    }
}

#[test]
fn empty_pipeline_is_rejected() {
    let manifest = base_manifest(Vec::new());
    let report = validate_manifest(&manifest);
    assert!(!report.is_ok());
    assert!(report.errors.iter().any(|e| e.contains("at least one stage")));
}

#[test]
fn duplicate_stage_names_are_rejected() {
    let manifest = base_manifest(vec![stage("test", &["true"]), stage("test", &["true"])]);
    let report = validate_manifest(&manifest);
    assert!(report.errors.iter().any(|e| e.contains("Duplicate stage")));
}

#[test]
fn unsupported_version_is_rejected() {
    let mut manifest = base_manifest(vec![stage("test", &["true"])]);
    manifest.version = 2;
    let report = validate_manifest(&manifest);
    assert!(!report.is_ok());
}

#[test]
fn incomplete_deploy_section_is_rejected() {
    let mut manifest = base_manifest(vec![stage("test", &["true"])]);
    manifest.deploy = Some(DeploySpec {
        provider: "registry".into(),
        username: None,
        password_env: String::new(),
        build: Vec::new(),
        artifacts: Vec::new(),
        upload: "upload {username} {artifact}".into(),
        on: TriggerSpec::default(),
    });

    let report = validate_manifest(&manifest);
    assert!(report.errors.iter().any(|e| e.contains("password_env")));
    assert!(report.errors.iter().any(|e| e.contains("artifacts")));
    assert!(
        report
            .warnings
            .iter()
            .any(|w| w.contains("{username}")),
        "expected a warning about the unexpanded username placeholder"
    );
}

#[test]
fn always_on_deploy_trigger_is_warned_about() {
    let mut manifest = base_manifest(vec![stage("test", &["true"])]);
    manifest.deploy = Some(DeploySpec {
        provider: "registry".into(),
        username: Some("builder".into()),
        password_env: "TOKEN".into(),
        build: Vec::new(),
        artifacts: vec!["dist/*".into()],
        upload: "upload {artifact}".into(),
        on: TriggerSpec { tags: false },
    });

    let report = validate_manifest(&manifest);
    assert!(report.is_ok());
    assert!(report.warnings.iter().any(|w| w.contains("every successful run")));
}

#[test]
fn lockfile_fingerprints_the_manifest() {
    let temp = tempdir().unwrap();
    let mut manifest = base_manifest(vec![
        stage("lint", &["flake8 ."]),
        stage("test", &["pytest"]),
    ]);
    manifest.runtime = Some(conveyor::manifest::RuntimeSpec {
        language: "python".into(),
        version: Some("3.8".into()),
        probe: None,
    });

    let lock_path = temp.path().join("conveyor.lock");
    generate_lock(&manifest, &lock_path).unwrap();

    let content = fs::read_to_string(&lock_path).unwrap();
    assert!(content.contains("manifest_version: 1"));
    assert!(content.contains("runtime: python 3.8"));
    assert!(content.contains("commands_hash"));

    // Same manifest, same stage hashes.
    let second = temp.path().join("conveyor2.lock");
    generate_lock(&manifest, &second).unwrap();
    let hash_lines = |text: &str| {
        text.lines()
            .filter(|l| l.contains("commands_hash"))
            .map(str::to_string)
            .collect::<Vec<_>>()
    };
    assert_eq!(
        hash_lines(&content),
        hash_lines(&fs::read_to_string(&second).unwrap())
    );
}
