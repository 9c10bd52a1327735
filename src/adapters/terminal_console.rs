use colored::Colorize;
use dialoguer::{Confirm, Password};
use tracing::debug;

use crate::domain::{DomainError, Secret};
use crate::ports::Console;

/// Console on the user's terminal.
///
/// Messages go to stderr so stdout carries only command results.
pub struct TerminalConsole {
    interactive: bool,
}

impl TerminalConsole {
    /// With `interactive` false, prompts are never shown and answer with
    /// their defaults.
    pub fn new(interactive: bool) -> Self {
        Self { interactive }
    }
}

impl Console for TerminalConsole {
    fn info(&self, message: &str) {
        eprintln!("{} {}", "→".cyan(), message);
    }

    fn success(&self, message: &str) {
        eprintln!("{} {}", "✓".green(), message);
    }

    fn warn(&self, message: &str) {
        eprintln!("{} {}", "!".yellow(), message.yellow());
    }

    fn confirm(&self, prompt: &str, default: bool) -> Result<bool, DomainError> {
        if !self.interactive {
            debug!(prompt = prompt, default = default, "Non-interactive, using default answer");
            return Ok(default);
        }
        Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()
            .map_err(|e| DomainError::Prompt(e.to_string()))
    }

    fn secret(&self, prompt: &str) -> Result<Option<Secret>, DomainError> {
        if !self.interactive {
            return Ok(None);
        }
        let value = Password::new()
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()
            .map_err(|e| DomainError::Prompt(e.to_string()))?;
        Ok(Secret::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_interactive_uses_defaults() {
        let console = TerminalConsole::new(false);

        assert!(console.confirm("Proceed?", true).unwrap());
        assert!(!console.confirm("Proceed?", false).unwrap());
        assert!(console.secret("Token").unwrap().is_none());
    }
}
