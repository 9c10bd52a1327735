use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

use crate::adapters::{
    DockerCli, ReqwestHttpClient, SystemHardwareDetector, SystemShell, TcpPortProbe,
    TerminalConsole, TomlConfigStore,
};
use crate::domain::DomainError;
use crate::infrastructure::init_logging;
use crate::ports::{ConfigStore, Console, ContainerEngine};

use super::lifecycle::LifecycleManager;
use super::orchestrator::{Orchestrator, OrchestratorDeps};
use super::prerequisites::{EngineSettings, PrerequisiteChecker};

/// Application controller that loads configuration, sets up logging and
/// wires the production adapters into the orchestrator.
pub struct AppController {
    orchestrator: Orchestrator,
    _log_guard: Option<WorkerGuard>,
}

impl AppController {
    /// Initialize the application controller.
    ///
    /// With `interactive` false every prompt takes its default answer.
    pub fn new(verbose: bool, interactive: bool) -> Result<Self, DomainError> {
        let config_store = Arc::new(TomlConfigStore::new()?);
        let config = config_store.load()?;

        let log_guard = init_logging(
            &config_store.logs_dir(),
            &config.logging.level,
            config.logging.file_logging,
            verbose,
        )?;

        info!(
            config = %config_store.config_path().display(),
            engine = %config.engine.binary,
            "Solo Server starting up"
        );

        let engine: Arc<dyn ContainerEngine> = Arc::new(DockerCli::new(config.engine.binary.clone()));
        let console: Arc<dyn Console> = Arc::new(TerminalConsole::new(interactive));
        let prerequisites = PrerequisiteChecker::new(
            engine.clone(),
            Arc::new(SystemShell::new()),
            console.clone(),
            EngineSettings::from(&config.engine),
        );
        let lifecycle = LifecycleManager::new(engine.clone(), Arc::new(TcpPortProbe::new()));

        let deps = OrchestratorDeps {
            engine,
            hardware: Arc::new(SystemHardwareDetector::new()),
            config_store,
            http: Arc::new(ReqwestHttpClient::new()?),
            console,
            prerequisites,
            lifecycle,
        };
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            orchestrator: Orchestrator::new(deps, config, home_dir),
            _log_guard: log_guard,
        })
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }
}
