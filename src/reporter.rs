use serde::Serialize;
use tracing::{info, warn};

use crate::context::RunContext;
use crate::error::RunnerError;
use crate::observability::MetricsCollector;
use crate::shell::{CommandRecord, run_shell};

#[derive(Debug, Clone, Serialize)]
pub struct ReporterOutcome {
    pub command: String,
    pub succeeded: bool,
    pub record: CommandRecord,
}

impl ReporterOutcome {
    /// The taxonomy entry for a failed reporter. Reporters are best-effort,
    /// so this is only ever logged, never returned from a run.
    pub fn error(&self) -> Option<RunnerError> {
        if self.succeeded {
            None
        } else {
            Some(RunnerError::Reporting {
                command: self.command.clone(),
                exit_code: self.record.exit_code,
            })
        }
    }
}

/// Run the after-success commands in order with best-effort semantics:
/// a failure is logged and counted, and the next reporter still runs.
pub fn run_reporters(
    after_success: &[String],
    ctx: &RunContext,
    metrics: &MetricsCollector,
) -> Vec<ReporterOutcome> {
    let mut outcomes = Vec::with_capacity(after_success.len());

    for command in after_success {
        info!(command = command.as_str(), "Reporter running");
        let record = run_shell(command, ctx, &[]);
        let outcome = ReporterOutcome {
            command: command.clone(),
            succeeded: record.success,
            record,
        };
        if let Some(err) = outcome.error() {
            metrics.record_reporter_failure();
            warn!(
                error = %err,
                "Reporter failed; continuing with remaining reporters"
            );
        }
        outcomes.push(outcome);
    }

    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn failed_reporter_maps_to_the_reporting_error() {
        let temp = tempdir().unwrap();
        let ctx = RunContext::new(temp.path());
        let outcomes = run_reporters(
            &["exit 3".to_string(), "true".to_string()],
            &ctx,
            &MetricsCollector::new(),
        );

        assert!(matches!(
            outcomes[0].error(),
            Some(RunnerError::Reporting { exit_code: 3, .. })
        ));
        assert!(outcomes[1].error().is_none());
    }
}
