use std::path::PathBuf;

use async_trait::async_trait;

use crate::domain::DomainError;

/// Captured result of a finished host or engine command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Output of a command that exited with `code`.
    pub fn exited(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            success: code == 0,
            code: Some(code),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Trimmed stderr, falling back to stdout when stderr is empty.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Host commands outside the container engine: service managers, package
/// managers, GPU vendor tools.
#[async_trait]
pub trait HostShell: Send + Sync {
    /// Full path of `program` on the search path.
    fn locate(&self, program: &str) -> Option<PathBuf>;

    fn has_program(&self, program: &str) -> bool {
        self.locate(program).is_some()
    }

    /// Run `program` to completion.
    ///
    /// `Err` only when the program could not be spawned; a non-zero exit is
    /// reported through [`CommandOutput::success`].
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, DomainError>;
}
