use async_trait::async_trait;

use crate::domain::{ContainerRecord, DomainError, GpuFlags, LaunchSpec};

use super::shell::CommandOutput;

/// Facts reported by a responsive engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineInfo {
    pub server_version: String,
    /// Container runtimes the daemon knows about, e.g. `runc`, `nvidia`.
    pub runtimes: Vec<String>,
}

/// Throwaway container used for smoke tests; removed when it exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EphemeralRun {
    pub image: String,
    pub gpu: GpuFlags,
    pub command: Vec<String>,
}

/// Port over the container engine.
///
/// Every method is a fresh round-trip; implementations keep no container
/// state of their own.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Query the daemon. Fails with `EngineUnavailable` if it does not answer.
    async fn info(&self) -> Result<EngineInfo, DomainError>;

    /// Containers whose name is exactly `name`, running or not.
    async fn list(&self, name: &str) -> Result<Vec<ContainerRecord>, DomainError>;

    /// Fetch `image`, streaming progress to the user.
    async fn pull(&self, image: &str) -> Result<(), DomainError>;

    /// Create and start a detached container. Returns the container id.
    async fn create(&self, spec: &LaunchSpec) -> Result<String, DomainError>;

    async fn start(&self, name: &str) -> Result<(), DomainError>;

    async fn stop(&self, name: &str) -> Result<(), DomainError>;

    /// Force-remove a container, running or not.
    async fn remove(&self, name: &str) -> Result<(), DomainError>;

    /// Run a command inside a running container.
    async fn exec(&self, name: &str, command: &[String]) -> Result<CommandOutput, DomainError>;

    /// Run a throwaway container to completion.
    async fn run_ephemeral(&self, run: &EphemeralRun) -> Result<CommandOutput, DomainError>;
}
