pub mod backend;
pub mod config;
pub mod container;
pub mod error;
pub mod hardware;
pub mod launch;
pub mod readiness;
pub mod secret;

pub use backend::{BackendKind, BackendSelection};
pub use config::{AppConfig, BackendSettings, HUGGING_FACE};
pub use container::{ContainerHandle, ContainerRecord, ContainerState, StartTransition, StopOutcome};
pub use error::DomainError;
pub use hardware::{ComputeBackend, GpuInfo, GpuVendor, HardwareProfile, OsFamily};
pub use launch::{GpuFlags, LaunchContext, LaunchSpec, ReadinessProbeSpec, SecretEnv, VolumeMount};
pub use readiness::{ProbeOutcome, ReadinessResult};
pub use secret::Secret;
