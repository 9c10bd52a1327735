use std::time::Duration;

use thiserror::Error;

/// Process exit code for failures without a more specific class.
pub const EXIT_GENERIC: u8 = 1;
/// Process exit code when the container engine is missing or cannot be started.
pub const EXIT_ENGINE_UNAVAILABLE: u8 = 2;
/// Process exit code when the backend port is already taken.
pub const EXIT_PORT_IN_USE: u8 = 3;
/// Process exit code when the container could not be created or started.
pub const EXIT_CONTAINER: u8 = 4;
/// Process exit code when the backend never became ready.
pub const EXIT_READINESS: u8 = 5;
/// Process exit code after a user interrupt (128 + SIGINT).
pub const EXIT_INTERRUPTED: u8 = 130;

/// Domain-level errors for Solo Server.
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Container engine unavailable: {reason}. {hint}")]
    EngineUnavailable { reason: String, hint: String },

    #[error("GPU container toolkit is not usable: {0}")]
    GpuToolkitUnusable(String),

    #[error("GPU toolkit installation failed: {0}")]
    ToolkitInstall(String),

    #[error("Port {port} is already in use; stop whatever is listening there or pick another port with --port")]
    PortInUse { port: u16 },

    #[error("Failed to create container '{name}': {reason}")]
    ContainerCreateFailed { name: String, reason: String },

    #[error("Container '{name}' is in a failed state; re-run with --recreate to replace it")]
    ContainerFailed { name: String },

    #[error("{}", readiness_message(.name, .timeout, .never_responded, .last_error))]
    ReadinessTimeout {
        name: String,
        timeout: Duration,
        never_responded: bool,
        last_error: Option<String>,
    },

    #[error("Engine command `{command}` failed (exit code {code:?}): {stderr}")]
    EngineCommand {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Unsupported hardware: {0}")]
    UnsupportedHardware(String),

    #[error("Failed to persist configuration: {0}")]
    ConfigPersistenceFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("HTTP request failed: {0}")]
    HttpRequest(String),

    #[error("Hardware detection error: {0}")]
    Hardware(String),

    #[error("Prompt failed: {0}")]
    Prompt(String),

    #[error("Interrupted by user")]
    Interrupted,
}

fn readiness_message(
    name: &str,
    timeout: &Duration,
    never_responded: &bool,
    last_error: &Option<String>,
) -> String {
    let detail = last_error.as_deref().unwrap_or("no output");
    if *never_responded {
        format!(
            "Backend '{}' never responded within {}s (last error: {})",
            name,
            timeout.as_secs_f64(),
            detail
        )
    } else {
        format!(
            "Backend '{}' responded with errors and was not ready within {}s (last error: {})",
            name,
            timeout.as_secs_f64(),
            detail
        )
    }
}

impl DomainError {
    /// Exit code class for this error, so scripts can branch on the failure kind.
    pub fn exit_code(&self) -> u8 {
        match self {
            DomainError::EngineUnavailable { .. } => EXIT_ENGINE_UNAVAILABLE,
            DomainError::PortInUse { .. } => EXIT_PORT_IN_USE,
            DomainError::ContainerCreateFailed { .. } | DomainError::ContainerFailed { .. } => {
                EXIT_CONTAINER
            }
            DomainError::ReadinessTimeout { .. } => EXIT_READINESS,
            DomainError::Interrupted => EXIT_INTERRUPTED,
            _ => EXIT_GENERIC,
        }
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for DomainError {
    fn from(err: toml::de::Error) -> Self {
        DomainError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for DomainError {
    fn from(err: toml::ser::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}
