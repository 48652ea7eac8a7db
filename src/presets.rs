use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
struct PresetManifest {
    version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    runtime: Option<RuntimePreset>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    packages: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    env: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    install: Vec<String>,
    stages: Vec<StagePreset>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    after_success: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deploy: Option<DeployPreset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    branches: Option<BranchesPreset>,
}

#[derive(Debug, Clone, Serialize)]
struct RuntimePreset {
    language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct StagePreset {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    policy: Option<String>,
    commands: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
struct DeployPreset {
    provider: String,
    username: String,
    password_env: String,
    build: Vec<String>,
    artifacts: Vec<String>,
    upload: String,
}

#[derive(Debug, Clone, Serialize)]
struct BranchesPreset {
    only: Vec<String>,
}

pub fn generate_preset(name: &str, destination: &Path) -> Result<PathBuf> {
    let preset = match name {
        "python-package" => python_package_preset(),
        "node-service" => node_service_preset(),
        "rust-crate" => rust_crate_preset(),
        other => anyhow::bail!("Unknown preset '{other}'"),
    };

    let rendered = serde_yaml::to_string(&preset)?;
    if let Some(parent) = destination.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(destination, rendered)
        .with_context(|| format!("Failed to write preset manifest: {}", destination.display()))?;

    Ok(destination.to_path_buf())
}

fn python_package_preset() -> PresetManifest {
    PresetManifest {
        version: 1,
        runtime: Some(RuntimePreset {
            language: "python".into(),
            version: Some("3".into()),
        }),
        packages: Vec::new(),
        env: BTreeMap::new(),
        install: vec![
            "pip install -r requirements.txt".into(),
            "pip install pytest pytest-cov flake8".into(),
        ],
        stages: vec![
            stage("lint", Some("best-effort"), vec!["flake8 ."]),
            stage("test", None, vec!["pytest --cov"]),
        ],
        after_success: vec!["codecov".into()],
        deploy: Some(DeployPreset {
            provider: "pypi".into(),
            username: "builder".into(),
            password_env: "PYPI_TOKEN".into(),
            build: vec!["python -m build".into()],
            artifacts: vec!["dist/*".into()],
            upload: "twine upload --username {username} {artifact}".into(),
        }),
        branches: Some(BranchesPreset {
            only: vec!["master".into()],
        }),
    }
}

fn node_service_preset() -> PresetManifest {
    PresetManifest {
        version: 1,
        runtime: Some(RuntimePreset {
            language: "node".into(),
            version: None,
        }),
        packages: Vec::new(),
        env: BTreeMap::new(),
        install: vec!["npm ci".into()],
        stages: vec![
            stage("lint", Some("best-effort"), vec!["npm run lint"]),
            stage("test", None, vec!["npm test"]),
        ],
        after_success: Vec::new(),
        deploy: None,
        branches: Some(BranchesPreset {
            only: vec!["main".into()],
        }),
    }
}

fn rust_crate_preset() -> PresetManifest {
    PresetManifest {
        version: 1,
        runtime: Some(RuntimePreset {
            language: "cargo".into(),
            version: None,
        }),
        packages: Vec::new(),
        env: BTreeMap::new(),
        install: Vec::new(),
        stages: vec![
            stage("lint", Some("best-effort"), vec!["cargo clippy --all-targets"]),
            stage("test", None, vec!["cargo test"]),
        ],
        after_success: Vec::new(),
        deploy: Some(DeployPreset {
            provider: "crates-io".into(),
            username: "builder".into(),
            password_env: "CARGO_REGISTRY_TOKEN".into(),
            build: vec!["cargo package".into()],
            artifacts: vec!["target/package/*.crate".into()],
            upload: "cargo publish".into(),
        }),
        branches: None,
    }
}

fn stage(name: &str, policy: Option<&str>, commands: Vec<&str>) -> StagePreset {
    StagePreset {
        name: name.into(),
        policy: policy.map(Into::into),
        commands: commands.into_iter().map(Into::into).collect(),
    }
}
