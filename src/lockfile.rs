use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::manifest::{Manifest, StageSpec};

#[derive(Debug, Serialize)]
pub struct ManifestLock {
    pub manifest_version: u32,
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    pub install_hash: String,
    pub stages: Vec<StageLock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deploy: Option<DeployLock>,
}

#[derive(Debug, Serialize)]
pub struct StageLock {
    pub name: String,
    pub commands_hash: String,
}

#[derive(Debug, Serialize)]
pub struct DeployLock {
    pub provider: String,
    pub upload_hash: String,
}

/// Write a deterministic fingerprint of the manifest, so reviewers can
/// detect pipeline drift without diffing whole YAML documents.
pub fn generate_lock(manifest: &Manifest, path: &Path) -> Result<()> {
    let stages = manifest
        .stages
        .iter()
        .map(|spec| StageLock {
            name: spec.name.clone(),
            commands_hash: hash_stage(spec),
        })
        .collect();

    let lock = ManifestLock {
        manifest_version: manifest.version,
        generated_at: Utc::now(),
        runtime: manifest.runtime.as_ref().map(|runtime| {
            match &runtime.version {
                Some(version) => format!("{} {}", runtime.language, version),
                None => runtime.language.clone(),
            }
        }),
        install_hash: hash_lines(manifest.install.iter().map(|spec| spec.command())),
        stages,
        deploy: manifest.deploy.as_ref().map(|deploy| DeployLock {
            provider: deploy.provider.clone(),
            upload_hash: hash_lines(std::iter::once(deploy.upload.as_str())),
        }),
    };

    let file = File::create(path)
        .with_context(|| format!("Failed to create lockfile: {}", path.display()))?;
    serde_yaml::to_writer(file, &lock)
        .with_context(|| format!("Failed to write lockfile: {}", path.display()))?;

    Ok(())
}

fn hash_stage(spec: &StageSpec) -> String {
    let mut hasher = Sha256::new();
    hasher.update(spec.name.as_bytes());
    for command in &spec.commands {
        hasher.update([0u8]);
        hasher.update(command.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

fn hash_lines<'a>(lines: impl Iterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for line in lines {
        hasher.update(line.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}
