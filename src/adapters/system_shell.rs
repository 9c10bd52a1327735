use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::domain::DomainError;
use crate::ports::{CommandOutput, HostShell};

/// Host shell backed by real processes.
///
/// Stdin is inherited so `sudo` can ask for a password.
#[derive(Debug, Default)]
pub struct SystemShell;

impl SystemShell {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HostShell for SystemShell {
    fn locate(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, DomainError> {
        debug!(program = program, args = ?args, "Running host command");
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => DomainError::Io(format!("'{}' was not found on PATH", program)),
                _ => DomainError::Io(format!("failed to run {}: {}", program, e)),
            })?;

        let result = CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(program = program, success = result.success, code = ?result.code, "Host command finished");
        Ok(result)
    }
}
