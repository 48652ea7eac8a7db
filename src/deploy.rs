use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use glob::glob;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::context::RunContext;
use crate::error::{Result, RunnerError};
use crate::manifest::DeploySpec;
use crate::shell::{CommandRecord, run_shell};

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactRecord {
    pub path: PathBuf,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeployRecord {
    pub provider: String,
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub build: Vec<CommandRecord>,
    pub artifacts: Vec<ArtifactRecord>,
    pub uploads: Vec<CommandRecord>,
}

/// Trigger predicate. With `on.tags` (the default) the deployer fires only
/// when the context carries a tag; branch membership is irrelevant here.
/// With `on.tags: false` every successful run deploys.
pub fn should_deploy(deploy: &DeploySpec, ctx: &RunContext) -> bool {
    if deploy.on.tags { ctx.tag_present() } else { true }
}

/// Build the distributable artifacts and upload each to the registry.
///
/// The credential named by `password_env` is resolved here, handed to the
/// upload commands through the child environment only, and never logged.
pub fn run_deploy(deploy: &DeploySpec, ctx: &RunContext) -> Result<DeployRecord> {
    let credential = resolve_credential(deploy, ctx)?;

    let mut build_records = Vec::with_capacity(deploy.build.len());
    for command in &deploy.build {
        info!(command = command.as_str(), "Deploy build step");
        let record = run_shell(command, ctx, &[]);
        if !record.success {
            return Err(RunnerError::Deployment(format!(
                "build command '{}' exited with code {}",
                command, record.exit_code
            )));
        }
        build_records.push(record);
    }

    let artifacts = collect_artifacts(deploy, ctx)?;
    info!(
        provider = deploy.provider.as_str(),
        artifacts = artifacts.len(),
        "Uploading artifacts"
    );

    let credential_env = [(deploy.password_env.clone(), credential)];
    let mut uploads = Vec::with_capacity(artifacts.len());
    for artifact in &artifacts {
        let command = expand_upload_command(deploy, &artifact.path);
        let record = run_shell(&command, ctx, &credential_env);
        if !record.success {
            return Err(RunnerError::Deployment(format!(
                "registry rejected upload of '{}' (exit code {})",
                artifact.path.display(),
                record.exit_code
            )));
        }
        uploads.push(record);
    }

    Ok(DeployRecord {
        provider: deploy.provider.clone(),
        tag: ctx.tag.clone(),
        build: build_records,
        artifacts,
        uploads,
    })
}

fn resolve_credential(deploy: &DeploySpec, ctx: &RunContext) -> Result<String> {
    if deploy.password_env.is_empty() {
        return Err(RunnerError::Deployment(
            "deploy.password_env is not configured".to_string(),
        ));
    }
    let from_ctx = ctx
        .env
        .iter()
        .find(|(key, _)| key == &deploy.password_env)
        .map(|(_, value)| value.clone());
    from_ctx
        .or_else(|| std::env::var(&deploy.password_env).ok())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            RunnerError::Deployment(format!(
                "credential variable '{}' is not set",
                deploy.password_env
            ))
        })
}

fn collect_artifacts(deploy: &DeploySpec, ctx: &RunContext) -> Result<Vec<ArtifactRecord>> {
    let mut artifacts = Vec::new();
    for pattern in &deploy.artifacts {
        let absolute = ctx.workdir().join(pattern);
        let pattern_str = absolute.to_string_lossy().to_string();
        let matches = glob(&pattern_str).map_err(|err| {
            RunnerError::Deployment(format!("invalid artifact pattern '{pattern}': {err}"))
        })?;
        let mut found = false;
        for entry in matches {
            let path = entry.map_err(|err| {
                RunnerError::Deployment(format!("unreadable artifact match: {err}"))
            })?;
            if path.is_file() {
                let sha256 = compute_sha256(&path)?;
                artifacts.push(ArtifactRecord { path, sha256 });
                found = true;
            }
        }
        if !found {
            return Err(RunnerError::Deployment(format!(
                "no artifacts matched pattern '{pattern}'"
            )));
        }
    }
    if artifacts.is_empty() {
        return Err(RunnerError::Deployment(
            "deploy section lists no artifact patterns".to_string(),
        ));
    }
    Ok(artifacts)
}

fn expand_upload_command(deploy: &DeploySpec, artifact: &Path) -> String {
    deploy
        .upload
        .replace("{artifact}", &artifact.to_string_lossy())
        .replace("{username}", deploy.username.as_deref().unwrap_or(""))
}

fn compute_sha256(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|err| {
        RunnerError::Deployment(format!("failed to open artifact '{}': {err}", path.display()))
    })?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = reader.read(&mut buffer).map_err(|err| {
            RunnerError::Deployment(format!("failed to read artifact '{}': {err}", path.display()))
        })?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::TriggerSpec;

    fn deploy_spec(tags: bool) -> DeploySpec {
        DeploySpec {
            provider: "registry".into(),
            username: Some("builder".into()),
            password_env: "REGISTRY_TOKEN".into(),
            build: Vec::new(),
            artifacts: vec!["dist/*".into()],
            upload: "upload --user {username} {artifact}".into(),
            on: TriggerSpec { tags },
        }
    }

    #[test]
    fn tag_predicate_gates_deploy() {
        let ctx = RunContext::new(".");
        assert!(!should_deploy(&deploy_spec(true), &ctx));
        let tagged = ctx.clone().with_tag(Some("v1.0.0".into()));
        assert!(should_deploy(&deploy_spec(true), &tagged));
        assert!(should_deploy(&deploy_spec(false), &RunContext::new(".")));
    }

    #[test]
    fn upload_template_expansion() {
        let spec = deploy_spec(true);
        let command = expand_upload_command(&spec, Path::new("dist/pkg-1.0.tar.gz"));
        assert_eq!(command, "upload --user builder dist/pkg-1.0.tar.gz");
    }
}
