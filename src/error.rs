use thiserror::Error;

/// Failure taxonomy for a pipeline run.
///
/// `Provisioning`, `Installation` and `Stage` abort the run with a nonzero
/// exit. `Reporting` is best-effort and only ever logged. `Deployment` is
/// fatal even when every stage passed.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("provisioning failed: {0}")]
    Provisioning(String),

    #[error("install command failed: {command} (exit code {exit_code})")]
    Installation { command: String, exit_code: i32 },

    #[error("stage '{stage}' failed: {command} (exit code {exit_code})")]
    Stage {
        stage: String,
        command: String,
        exit_code: i32,
    },

    #[error("reporter command failed: {command} (exit code {exit_code})")]
    Reporting { command: String, exit_code: i32 },

    #[error("deployment failed: {0}")]
    Deployment(String),
}

pub type Result<T> = std::result::Result<T, RunnerError>;
