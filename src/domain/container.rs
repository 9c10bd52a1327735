use serde::{Deserialize, Serialize};

/// Lifecycle state of a managed container.
///
/// `Failed` is reported for containers the engine marks dead; they cannot be
/// started again and must be recreated explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Absent,
    Stopped,
    Running,
    Failed,
}

impl ContainerState {
    /// Map the engine's textual state (`docker ps` "State" column) to a lifecycle state.
    pub fn from_engine_state(state: &str) -> Self {
        match state.trim().to_lowercase().as_str() {
            "running" | "restarting" => ContainerState::Running,
            "dead" => ContainerState::Failed,
            // created, exited, paused, removing
            _ => ContainerState::Stopped,
        }
    }
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerState::Absent => write!(f, "absent"),
            ContainerState::Stopped => write!(f, "stopped"),
            ContainerState::Running => write!(f, "running"),
            ContainerState::Failed => write!(f, "failed"),
        }
    }
}

/// One container as listed by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRecord {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: ContainerState,
    /// Human-readable status, e.g. "Up 5 minutes".
    pub status: String,
    /// Published ports, e.g. "0.0.0.0:8080->8080/tcp, [::]:8080->8080/tcp".
    /// Empty for stopped containers and host networking.
    pub ports: String,
}

impl ContainerRecord {
    /// Host port mapped to `container_port`, if the engine reports one.
    pub fn host_port(&self, container_port: u16) -> Option<u16> {
        self.ports.split(',').find_map(|mapping| {
            let (host, target) = mapping.trim().split_once("->")?;
            let target = target.split('/').next()?.parse::<u16>().ok()?;
            if target != container_port {
                return None;
            }
            host.rsplit_once(':')?.1.parse().ok()
        })
    }
}

/// Freshly observed view of a named container.
///
/// Never cached: other terminals can change the real container at any time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerHandle {
    pub name: String,
    pub state: ContainerState,
}

impl ContainerHandle {
    pub fn new(name: impl Into<String>, state: ContainerState) -> Self {
        Self {
            name: name.into(),
            state,
        }
    }

    pub fn exists(&self) -> bool {
        self.state != ContainerState::Absent
    }
}

/// What `ensure_started` did to reach the running state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartTransition {
    /// Already running; no engine mutation was issued.
    AlreadyRunning,
    /// Existing stopped container was started as-is.
    Resumed,
    /// A new container was created from the launch spec.
    Created,
}

impl StartTransition {
    /// Whether this run changed the container, and so owns cleanup on interrupt.
    pub fn mutated(&self) -> bool {
        !matches!(self, StartTransition::AlreadyRunning)
    }
}

/// What `ensure_stopped` found and did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    Absent,
    AlreadyStopped,
    Stopped,
}
