use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::{
    ContainerHandle, ContainerRecord, ContainerState, DomainError, LaunchSpec, StartTransition,
    StopOutcome,
};
use crate::ports::{ContainerEngine, PortProbe};

/// Maps backend handles to real containers.
///
/// Holds no container state: every operation asks the engine first, because
/// other terminals may change the same container at any time.
pub struct LifecycleManager {
    engine: Arc<dyn ContainerEngine>,
    ports: Arc<dyn PortProbe>,
}

impl LifecycleManager {
    pub fn new(engine: Arc<dyn ContainerEngine>, ports: Arc<dyn PortProbe>) -> Self {
        Self { engine, ports }
    }

    async fn record(&self, name: &str) -> Result<Option<ContainerRecord>, DomainError> {
        let record = self.engine.list(name).await?.into_iter().next();
        match &record {
            Some(record) => debug!(
                name = name,
                id = %record.id,
                image = %record.image,
                status = %record.status,
                state = %record.state,
                ports = %record.ports,
                "Container found"
            ),
            None => debug!(name = name, "No such container"),
        }
        Ok(record)
    }

    /// Current state of the container called `name`.
    pub async fn state(&self, name: &str) -> Result<ContainerState, DomainError> {
        Ok(self
            .record(name)
            .await?
            .map(|r| r.state)
            .unwrap_or(ContainerState::Absent))
    }

    /// Host port a running container publishes for `container_port`.
    ///
    /// `None` when the container is absent, stopped or shares the host network.
    pub async fn published_port(
        &self,
        name: &str,
        container_port: u16,
    ) -> Result<Option<u16>, DomainError> {
        Ok(self
            .record(name)
            .await?
            .filter(|r| r.state == ContainerState::Running)
            .and_then(|r| r.host_port(container_port)))
    }

    /// Side-effect free status query.
    pub async fn status(&self, name: &str) -> Result<ContainerHandle, DomainError> {
        Ok(ContainerHandle::new(name, self.state(name).await?))
    }

    /// Bring the container described by `spec` to the running state.
    ///
    /// An existing container is only ever started as-is; it is never
    /// recreated here, so arguments in `spec` only apply to new containers.
    pub async fn ensure_started(&self, spec: &LaunchSpec) -> Result<StartTransition, DomainError> {
        let name = spec.name.as_str();
        match self.state(name).await? {
            ContainerState::Running => {
                info!(name = name, "Container already running");
                Ok(StartTransition::AlreadyRunning)
            }
            ContainerState::Stopped => {
                info!(name = name, "Resuming existing container");
                self.engine.start(name).await.map_err(|e| match e {
                    DomainError::EngineUnavailable { .. } => e,
                    other => DomainError::ContainerCreateFailed {
                        name: name.to_string(),
                        reason: format!("starting the existing container failed: {}", other),
                    },
                })?;
                Ok(StartTransition::Resumed)
            }
            ContainerState::Failed => Err(DomainError::ContainerFailed {
                name: name.to_string(),
            }),
            ContainerState::Absent => {
                self.create(spec).await?;
                Ok(StartTransition::Created)
            }
        }
    }

    async fn create(&self, spec: &LaunchSpec) -> Result<(), DomainError> {
        let name = spec.name.as_str();
        if !self.ports.is_free(spec.port) {
            warn!(name = name, port = spec.port, "Port already in use");
            return Err(DomainError::PortInUse { port: spec.port });
        }

        let created = async {
            self.engine.pull(&spec.image).await?;
            self.engine.create(spec).await
        }
        .await;

        match created {
            Ok(id) => {
                info!(name = name, id = %id, "Container created");
                Ok(())
            }
            Err(e @ DomainError::EngineUnavailable { .. }) => Err(e),
            Err(e) => {
                warn!(name = name, error = %e, "Container creation failed, cleaning up");
                self.cleanup(name).await;
                Err(DomainError::ContainerCreateFailed {
                    name: name.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Remove whatever a failed or abandoned creation left behind. Best effort.
    pub async fn cleanup(&self, name: &str) {
        match self.state(name).await {
            Ok(ContainerState::Absent) => {}
            Ok(_) => {
                if let Err(e) = self.engine.remove(name).await {
                    warn!(name = name, error = %e, "Cleanup of partial container failed");
                }
            }
            Err(e) => warn!(name = name, error = %e, "Could not query state during cleanup"),
        }
    }

    /// Stop the container if it runs. Never removes it.
    pub async fn ensure_stopped(&self, name: &str) -> Result<StopOutcome, DomainError> {
        match self.state(name).await? {
            ContainerState::Absent => Ok(StopOutcome::Absent),
            ContainerState::Running => {
                self.engine.stop(name).await?;
                info!(name = name, "Container stopped");
                Ok(StopOutcome::Stopped)
            }
            ContainerState::Stopped | ContainerState::Failed => Ok(StopOutcome::AlreadyStopped),
        }
    }

    /// Delete the container, stopping it first. Returns false if it did not exist.
    pub async fn remove(&self, name: &str) -> Result<bool, DomainError> {
        match self.state(name).await? {
            ContainerState::Absent => Ok(false),
            state => {
                if state == ContainerState::Running {
                    self.engine.stop(name).await?;
                }
                self.engine.remove(name).await?;
                info!(name = name, "Container removed");
                Ok(true)
            }
        }
    }
}
