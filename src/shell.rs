use std::process::Command;
use std::time::Instant;

use serde::Serialize;
use tracing::debug;

use crate::context::RunContext;

/// Captured result of one shell invocation.
#[derive(Debug, Clone, Serialize)]
pub struct CommandRecord {
    pub command: String,
    pub exit_code: i32,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: f64,
}

impl CommandRecord {
    fn spawn_failure(command: &str, err: std::io::Error, duration_ms: f64) -> Self {
        Self {
            command: command.to_string(),
            exit_code: -1,
            success: false,
            stdout: String::new(),
            stderr: format!("failed to spawn command: {err}"),
            duration_ms,
        }
    }
}

/// Run one command line through the platform shell, blocking until it
/// exits. Spawn failures are folded into the record (exit code -1) so a
/// broken command never panics the run.
pub fn run_shell(
    command: &str,
    ctx: &RunContext,
    extra_env: &[(String, String)],
) -> CommandRecord {
    #[cfg(windows)]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    };

    #[cfg(not(windows))]
    let mut cmd = {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    };

    cmd.current_dir(ctx.workdir());
    for (key, value) in &ctx.env {
        cmd.env(key, value);
    }
    for (key, value) in extra_env {
        cmd.env(key, value);
    }

    debug!(command, "Spawning shell command");
    let started_at = Instant::now();
    let record = match cmd.output() {
        Ok(out) => CommandRecord {
            command: command.to_string(),
            exit_code: out.status.code().unwrap_or(-1),
            success: out.status.success(),
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
            duration_ms: started_at.elapsed().as_secs_f64() * 1_000.0,
        },
        Err(err) => {
            CommandRecord::spawn_failure(command, err, started_at.elapsed().as_secs_f64() * 1_000.0)
        }
    };

    debug!(
        command,
        exit_code = record.exit_code,
        duration_ms = record.duration_ms,
        "Shell command finished"
    );
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RunContext {
        RunContext::new(std::env::temp_dir())
    }

    #[test]
    fn captures_stdout_and_exit_code() {
        let record = run_shell("echo hello", &ctx(), &[]);
        assert!(record.success);
        assert_eq!(record.exit_code, 0);
        assert_eq!(record.stdout.trim(), "hello");
    }

    #[test]
    fn nonzero_exit_is_captured_not_fatal() {
        let record = run_shell("exit 3", &ctx(), &[]);
        assert!(!record.success);
        assert_eq!(record.exit_code, 3);
    }

    #[test]
    fn extra_env_reaches_the_child() {
        let record = run_shell(
            "echo \"$CONVEYOR_TEST_VALUE\"",
            &ctx(),
            &[("CONVEYOR_TEST_VALUE".to_string(), "sentinel".to_string())],
        );
        assert_eq!(record.stdout.trim(), "sentinel");
    }
}
