use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use crate::context::RunContext;
use crate::manifest::{FailurePolicy, StageSpec};
use crate::observability::MetricsCollector;
use crate::shell::{CommandRecord, run_shell};

/// Lifecycle of a single stage. Stages start `Pending`, move to `Running`
/// when dispatched and settle in exactly one terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Skipped => write!(f, "SKIPPED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunVerdict {
    Succeeded,
    Failed,
}

impl RunVerdict {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageOutcome {
    pub name: String,
    pub policy: FailurePolicy,
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<CommandRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_because: Option<String>,
}

impl StageOutcome {
    fn skipped(spec: &StageSpec, reason: String) -> Self {
        Self {
            name: spec.name.clone(),
            policy: spec.policy,
            status: StageStatus::Skipped,
            commands: Vec::new(),
            skipped_because: Some(reason),
        }
    }

    /// First failing command of the stage, if any.
    pub fn first_failure(&self) -> Option<&CommandRecord> {
        self.commands.iter().find(|record| !record.success)
    }
}

/// Run the manifest stages strictly in order.
///
/// A `Required` stage failure marks every remaining stage `Skipped` and
/// the verdict `Failed`. A `BestEffort` failure is logged and the run
/// carries on with the verdict untouched.
pub fn execute_stages(
    stages: &[StageSpec],
    ctx: &RunContext,
    metrics: &MetricsCollector,
) -> (Vec<StageOutcome>, RunVerdict) {
    let mut outcomes = Vec::with_capacity(stages.len());
    let mut verdict = RunVerdict::Succeeded;
    let mut abort_reason: Option<String> = None;

    for spec in stages {
        if let Some(reason) = &abort_reason {
            outcomes.push(StageOutcome::skipped(spec, reason.clone()));
            continue;
        }

        let outcome = run_stage(spec, ctx, metrics);
        if outcome.status == StageStatus::Failed {
            match spec.policy {
                FailurePolicy::Required => {
                    verdict = RunVerdict::Failed;
                    abort_reason = Some(format!("stage '{}' failed", spec.name));
                }
                FailurePolicy::BestEffort => {
                    warn!(stage = spec.name.as_str(), "Best-effort stage failed; continuing");
                }
            }
        }
        outcomes.push(outcome);
    }

    (outcomes, verdict)
}

fn run_stage(spec: &StageSpec, ctx: &RunContext, metrics: &MetricsCollector) -> StageOutcome {
    let span = tracing::span!(tracing::Level::DEBUG, "stage", stage = spec.name.as_str());
    let _span_guard = span.enter();
    let _timer = metrics.start_stage(&spec.name);

    info!(stage = spec.name.as_str(), "Stage running");
    let mut status = StageStatus::Running;
    let mut records = Vec::with_capacity(spec.commands.len());

    for command in &spec.commands {
        let record = run_shell(command, ctx, &[]);
        let duration = std::time::Duration::from_secs_f64(record.duration_ms / 1_000.0);
        metrics.record_command(&spec.name, duration);
        let failed = !record.success;
        let exit_code = record.exit_code;
        records.push(record);
        if failed {
            warn!(
                stage = spec.name.as_str(),
                command = command.as_str(),
                exit_code,
                "Stage command failed"
            );
            status = StageStatus::Failed;
            break;
        }
    }

    if status == StageStatus::Running {
        status = StageStatus::Succeeded;
    }
    info!(stage = spec.name.as_str(), status = %status, "Stage finished");

    StageOutcome {
        name: spec.name.clone(),
        policy: spec.policy,
        status,
        commands: records,
        skipped_because: None,
    }
}
