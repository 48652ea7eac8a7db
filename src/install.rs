use tracing::{info, warn};

use crate::context::RunContext;
use crate::error::{Result, RunnerError};
use crate::manifest::{FailurePolicy, InstallSpec};
use crate::shell::{CommandRecord, run_shell};

/// Run the install commands in manifest order. A nonzero exit aborts the
/// run unless the entry is marked best-effort.
pub fn install_dependencies(
    install: &[InstallSpec],
    ctx: &RunContext,
) -> Result<Vec<CommandRecord>> {
    let mut records = Vec::with_capacity(install.len());

    for spec in install {
        let command = spec.command();
        info!(command, "Install step");
        let record = run_shell(command, ctx, &[]);
        if !record.success {
            match spec.policy() {
                FailurePolicy::Required => {
                    return Err(RunnerError::Installation {
                        command: command.to_string(),
                        exit_code: record.exit_code,
                    });
                }
                FailurePolicy::BestEffort => {
                    warn!(
                        command,
                        exit_code = record.exit_code,
                        "Best-effort install step failed; continuing"
                    );
                }
            }
        }
        records.push(record);
    }

    Ok(records)
}
