use crate::domain::{DomainError, Secret};

/// User-facing progress output and prompts.
///
/// Kept apart from tracing so that logs stay machine-oriented and the
/// terminal only shows what the user needs.
pub trait Console: Send + Sync {
    fn info(&self, message: &str);

    fn success(&self, message: &str);

    fn warn(&self, message: &str);

    /// Ask a yes/no question. Non-interactive consoles return `default`.
    fn confirm(&self, prompt: &str, default: bool) -> Result<bool, DomainError>;

    /// Ask for a secret without echoing it. `None` when the user skips.
    fn secret(&self, prompt: &str) -> Result<Option<Secret>, DomainError>;
}
