use tracing::{debug, info};

use crate::context::RunContext;
use crate::error::{Result, RunnerError};
use crate::manifest::Manifest;
use crate::shell::{CommandRecord, run_shell};

const DEFAULT_PACKAGE_COMMAND: &str = "apt-get install -y";

/// Prepare the execution environment: probe the requested runtime, then
/// install the requested system packages. Any failure is fatal to the run.
pub fn provision(manifest: &Manifest, ctx: &RunContext) -> Result<Vec<CommandRecord>> {
    let mut records = Vec::new();

    if let Some(runtime) = &manifest.runtime {
        let probe = runtime.probe_command();
        info!(
            language = runtime.language.as_str(),
            version = runtime.version.as_deref().unwrap_or("any"),
            probe = probe.as_str(),
            "Probing runtime"
        );
        let record = run_shell(&probe, ctx, &[]);
        if !record.success {
            return Err(RunnerError::Provisioning(format!(
                "runtime '{}' is not available ('{}' exited with code {})",
                runtime.language, probe, record.exit_code
            )));
        }
        if let Some(version) = &runtime.version {
            // Probe output is the only version signal we have locally.
            let announced = format!("{}{}", record.stdout.trim(), record.stderr.trim());
            if !announced.contains(version.as_str()) {
                return Err(RunnerError::Provisioning(format!(
                    "runtime '{}' version '{}' not found in probe output '{}'",
                    runtime.language,
                    version,
                    announced.trim()
                )));
            }
        }
        records.push(record);
    } else {
        debug!("No runtime requested; skipping probe");
    }

    if !manifest.packages.is_empty() {
        let template = manifest
            .package_command
            .as_deref()
            .unwrap_or(DEFAULT_PACKAGE_COMMAND);
        let command = format!("{} {}", template, manifest.packages.join(" "));
        info!(packages = manifest.packages.len(), "Installing system packages");
        let record = run_shell(&command, ctx, &[]);
        if !record.success {
            return Err(RunnerError::Provisioning(format!(
                "system package install failed ('{}' exited with code {})",
                command, record.exit_code
            )));
        }
        records.push(record);
    }

    Ok(records)
}
