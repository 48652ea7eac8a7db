use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::context::RunContext;
use crate::deploy::{DeployRecord, run_deploy, should_deploy};
use crate::error::{Result, RunnerError};
use crate::executor::{RunVerdict, StageOutcome, StageStatus, execute_stages};
use crate::install::install_dependencies;
use crate::manifest::{FailurePolicy, Manifest};
use crate::observability::MetricsCollector;
use crate::provision::provision;
use crate::reporter::{ReporterOutcome, run_reporters};
use crate::shell::CommandRecord;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeploymentOutcome {
    Skipped { reason: String },
    Deployed { record: DeployRecord },
    Failed { error: String },
}

/// Full record of one pipeline run, serializable as the `--report-json`
/// output.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub branch: Option<String>,
    pub tag: Option<String>,
    /// True when the branch gate skipped the run entirely.
    pub gated: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub provision: Vec<CommandRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub install: Vec<CommandRecord>,
    pub stages: Vec<StageOutcome>,
    pub verdict: RunVerdict,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reporters: Vec<ReporterOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment: Option<DeploymentOutcome>,
}

impl RunReport {
    /// Overall verdict: the logical AND of the non-ignorable stage
    /// outcomes and the deployer outcome when it ran.
    pub fn overall(&self) -> RunVerdict {
        if !self.verdict.is_success() {
            return RunVerdict::Failed;
        }
        if matches!(self.deployment, Some(DeploymentOutcome::Failed { .. })) {
            return RunVerdict::Failed;
        }
        RunVerdict::Succeeded
    }

    /// The error that should drive a nonzero exit, if the run failed.
    pub fn failure(&self) -> Option<RunnerError> {
        if let Some(stage) = self
            .stages
            .iter()
            .find(|s| s.status == StageStatus::Failed && s.policy == FailurePolicy::Required)
        {
            let (command, exit_code) = stage
                .first_failure()
                .map(|record| (record.command.clone(), record.exit_code))
                .unwrap_or_else(|| (String::new(), -1));
            return Some(RunnerError::Stage {
                stage: stage.name.clone(),
                command,
                exit_code,
            });
        }
        if let Some(DeploymentOutcome::Failed { error }) = &self.deployment {
            return Some(RunnerError::Deployment(error.clone()));
        }
        None
    }

    fn gated(ctx: &RunContext, started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: Utc::now(),
            branch: ctx.branch.clone(),
            tag: ctx.tag.clone(),
            gated: true,
            provision: Vec::new(),
            install: Vec::new(),
            stages: Vec::new(),
            verdict: RunVerdict::Succeeded,
            reporters: Vec::new(),
            deployment: None,
        }
    }
}

/// Execute a whole pipeline run: provision, install, stages, reporters,
/// deploy — strictly in that order, in a single thread.
///
/// Provisioning and installation failures abort immediately with an
/// error. Stage and deployment failures are captured in the report; use
/// [`RunReport::failure`] to map them to the process exit status.
pub fn run_pipeline(
    manifest: &Manifest,
    ctx: &RunContext,
    metrics: &MetricsCollector,
) -> Result<RunReport> {
    let started_at = Utc::now();
    let total_start = Instant::now();
    metrics.reset();

    // Manifest env first so the invocation context can override it.
    let mut env = manifest.global_env();
    env.extend(ctx.env.iter().cloned());
    let ctx = ctx.clone().with_env(env);

    if let Some(branches) = &manifest.branches
        && !branches.allows(ctx.branch.as_deref())
        && !ctx.tag_present()
    {
        info!(
            branch = ctx.branch.as_deref().unwrap_or("<none>"),
            "Branch excluded by manifest filter; skipping run"
        );
        return Ok(RunReport::gated(&ctx, started_at));
    }

    let provision_records = provision(manifest, &ctx)?;
    let install_records = install_dependencies(&manifest.install, &ctx)?;
    let (stages, verdict) = execute_stages(&manifest.stages, &ctx, metrics);

    let reporters = if verdict.is_success() {
        run_reporters(&manifest.after_success, &ctx, metrics)
    } else {
        Vec::new()
    };

    let deployment = manifest.deploy.as_ref().map(|deploy| {
        if !verdict.is_success() {
            DeploymentOutcome::Skipped {
                reason: "run failed before deploy".to_string(),
            }
        } else if !should_deploy(deploy, &ctx) {
            DeploymentOutcome::Skipped {
                reason: "trigger predicate not met".to_string(),
            }
        } else {
            match run_deploy(deploy, &ctx) {
                Ok(record) => DeploymentOutcome::Deployed { record },
                Err(err) => DeploymentOutcome::Failed {
                    error: err.to_string(),
                },
            }
        }
    });

    metrics.record_total_duration(total_start.elapsed());

    Ok(RunReport {
        started_at,
        finished_at: Utc::now(),
        branch: ctx.branch.clone(),
        tag: ctx.tag.clone(),
        gated: false,
        provision: provision_records,
        install: install_records,
        stages,
        verdict,
        reporters,
        deployment,
    })
}
