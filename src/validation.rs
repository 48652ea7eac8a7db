use std::collections::HashSet;

use serde::Serialize;

use crate::manifest::Manifest;

#[derive(Debug, Default, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

pub fn validate_manifest(manifest: &Manifest) -> ValidationReport {
    let mut report = ValidationReport::default();

    if manifest.version != 1 {
        report
            .errors
            .push(format!("Unsupported manifest version: {}", manifest.version));
    }

    if let Some(runtime) = &manifest.runtime
        && runtime.language.trim().is_empty()
    {
        report.errors.push("Runtime language cannot be empty".into());
    }

    for (idx, package) in manifest.packages.iter().enumerate() {
        if package.trim().is_empty() {
            report
                .errors
                .push(format!("System package {} is empty", idx + 1));
        }
    }

    for key in manifest.env.keys() {
        if key.trim().is_empty() {
            report.errors.push("Environment keys cannot be empty".into());
        }
    }

    for (idx, spec) in manifest.install.iter().enumerate() {
        if spec.command().trim().is_empty() {
            report
                .errors
                .push(format!("Install command {} is empty", idx + 1));
        }
    }

    report.merge(validate_stages(manifest));

    for (idx, command) in manifest.after_success.iter().enumerate() {
        if command.trim().is_empty() {
            report
                .errors
                .push(format!("after_success command {} is empty", idx + 1));
        }
    }

    if let Some(deploy) = &manifest.deploy {
        report.merge(validate_deploy(deploy));
    }

    if let Some(branches) = &manifest.branches {
        for branch in &branches.only {
            if branch.trim().is_empty() {
                report
                    .errors
                    .push("branches.only entries cannot be empty".into());
            }
        }
    }

    report
}

fn validate_stages(manifest: &Manifest) -> ValidationReport {
    let mut report = ValidationReport::default();

    if manifest.stages.is_empty() {
        report
            .errors
            .push("Pipeline must contain at least one stage".into());
    }

    let mut seen = HashSet::new();
    for (idx, stage) in manifest.stages.iter().enumerate() {
        if stage.name.trim().is_empty() {
            report.errors.push(format!("Stage {} has no name", idx + 1));
        } else if !seen.insert(stage.name.as_str()) {
            report
                .errors
                .push(format!("Duplicate stage name '{}'", stage.name));
        }
        if stage.commands.is_empty() {
            report
                .errors
                .push(format!("Stage '{}' has no commands", stage.name));
        }
        for command in &stage.commands {
            if command.trim().is_empty() {
                report
                    .errors
                    .push(format!("Stage '{}' contains an empty command", stage.name));
            }
        }
    }

    report
}

fn validate_deploy(deploy: &crate::manifest::DeploySpec) -> ValidationReport {
    let mut report = ValidationReport::default();

    if deploy.provider.trim().is_empty() {
        report.errors.push("deploy.provider cannot be empty".into());
    }
    if deploy.upload.trim().is_empty() {
        report
            .errors
            .push("deploy.upload command cannot be empty".into());
    }
    if deploy.password_env.trim().is_empty() {
        report
            .errors
            .push("deploy.password_env cannot be empty".into());
    }
    if deploy.artifacts.is_empty() {
        report
            .errors
            .push("deploy.artifacts must list at least one pattern".into());
    }
    for (idx, pattern) in deploy.artifacts.iter().enumerate() {
        if let Err(err) = glob::Pattern::new(pattern) {
            report.errors.push(format!(
                "Artifact pattern {} ('{}') is not a valid glob: {}",
                idx + 1,
                pattern,
                err
            ));
        }
    }
    if deploy.upload.contains("{username}") && deploy.username.is_none() {
        report.warnings.push(
            "deploy.upload references {username} but deploy.username is not set".into(),
        );
    }
    if !deploy.on.tags {
        report
            .warnings
            .push("deploy.on.tags is false: every successful run will deploy".into());
    }

    report
}
