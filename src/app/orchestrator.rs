use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::{
    AppConfig, BackendKind, BackendSelection, ContainerHandle, ContainerState, DomainError,
    GpuVendor, HardwareProfile, LaunchContext, LaunchSpec, ReadinessResult, Secret,
    StartTransition, StopOutcome, HUGGING_FACE,
};
use crate::ports::{ConfigStore, Console, ContainerEngine, HardwareDetector, HttpClient};

use super::lifecycle::LifecycleManager;
use super::prerequisites::PrerequisiteChecker;
use super::readiness::{probe_for, ReadinessPoller};

/// Everything a start needs from the caller.
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub kind: BackendKind,
    /// Never use the GPU, even when it would work.
    pub force_cpu: bool,
    pub port: Option<u16>,
    pub model: Option<String>,
    /// Replace an existing container (after confirmation).
    pub recreate: bool,
    pub refresh_hardware: bool,
    pub hf_token: Option<Secret>,
    pub api_url: Option<String>,
    pub api_key: Option<Secret>,
    /// Take the default for every decision and never install anything.
    pub unattended: bool,
}

impl StartRequest {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            force_cpu: false,
            port: None,
            model: None,
            recreate: false,
            refresh_hardware: false,
            hf_token: None,
            api_url: None,
            api_key: None,
            unattended: false,
        }
    }
}

/// Outcome of a successful start.
#[derive(Debug, Clone)]
pub struct StartReport {
    pub kind: BackendKind,
    /// `None` for externally managed backends.
    pub handle: Option<ContainerHandle>,
    pub transition: Option<StartTransition>,
    pub use_gpu: bool,
    pub endpoint: String,
    pub readiness: Option<ReadinessResult>,
}

/// Status line for one backend kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendStatus {
    pub backend: BackendKind,
    /// Container name, absent for externally managed backends.
    pub handle: Option<String>,
    pub state: Option<ContainerState>,
    pub endpoint: Option<String>,
}

/// What `remove` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    Absent,
    Cancelled,
}

/// Ports the orchestrator drives.
pub struct OrchestratorDeps {
    pub engine: Arc<dyn ContainerEngine>,
    pub hardware: Arc<dyn HardwareDetector>,
    pub config_store: Arc<dyn ConfigStore>,
    pub http: Arc<dyn HttpClient>,
    pub console: Arc<dyn Console>,
    pub prerequisites: PrerequisiteChecker,
    pub lifecycle: LifecycleManager,
}

/// Public entry point: sequences hardware detection, prerequisites,
/// container lifecycle and readiness.
pub struct Orchestrator {
    engine: Arc<dyn ContainerEngine>,
    hardware: Arc<dyn HardwareDetector>,
    config_store: Arc<dyn ConfigStore>,
    http: Arc<dyn HttpClient>,
    console: Arc<dyn Console>,
    prerequisites: PrerequisiteChecker,
    lifecycle: LifecycleManager,
    poller: ReadinessPoller,
    config: Mutex<AppConfig>,
    home_dir: PathBuf,
}

impl Orchestrator {
    pub fn new(deps: OrchestratorDeps, config: AppConfig, home_dir: PathBuf) -> Self {
        let interval = Duration::from_millis(config.engine.readiness_poll_interval_ms.max(1));
        Self {
            engine: deps.engine,
            hardware: deps.hardware,
            config_store: deps.config_store,
            http: deps.http,
            console: deps.console,
            prerequisites: deps.prerequisites,
            lifecycle: deps.lifecycle,
            poller: ReadinessPoller::new(interval),
            config: Mutex::new(config),
            home_dir,
        }
    }

    /// Bring a backend up and wait until it serves requests.
    ///
    /// `interrupt` resolving aborts the run. Once containers are touched, a
    /// container this run created is removed again, and one it started is
    /// stopped. A container that was already running is left alone.
    pub async fn start(
        &self,
        request: StartRequest,
        interrupt: impl Future<Output = ()>,
    ) -> Result<StartReport, DomainError> {
        if request.kind == BackendKind::CustomApi {
            return self.start_custom_api(request);
        }

        tokio::pin!(interrupt);

        let mut spec = tokio::select! {
            biased;
            _ = &mut interrupt => {
                info!("Interrupted before any container change");
                return Err(DomainError::Interrupted);
            }
            spec = self.prepare(&request) => spec?,
        };

        if request.recreate {
            self.recreate(&spec, request.unattended).await?;
        }

        self.console.info(&format!(
            "Starting {} in container '{}' ({})",
            request.kind,
            spec.name,
            if spec.has_gpu_flags() { "GPU" } else { "CPU" }
        ));
        let before = self.lifecycle.state(&spec.name).await?;
        let transition = tokio::select! {
            biased;
            _ = &mut interrupt => {
                warn!(name = %spec.name, "Interrupted while starting the container");
                self.abandon_start(&spec.name, before).await;
                return Err(DomainError::Interrupted);
            }
            transition = self.lifecycle.ensure_started(&spec) => transition?,
        };
        match transition {
            StartTransition::AlreadyRunning => {
                self.console.info(&format!("'{}' is already running", spec.name))
            }
            StartTransition::Resumed => self
                .console
                .info(&format!("Started existing container '{}'", spec.name)),
            StartTransition::Created => {
                self.remember_backend_settings(&request, &spec);
                self.console
                    .info(&format!("Created container '{}' from {}", spec.name, spec.image))
            }
        }
        if transition != StartTransition::Created {
            self.adopt_existing_port(&request, &mut spec).await;
        }

        self.console.info(&format!(
            "Waiting for {} to become ready (up to {}s)...",
            request.kind,
            spec.readiness_timeout.as_secs()
        ));
        let probe = probe_for(&spec, self.engine.clone(), self.http.clone());
        let readiness = tokio::select! {
            biased;
            _ = &mut interrupt => {
                warn!(name = %spec.name, "Interrupted while waiting for readiness");
                if transition.mutated() {
                    self.stop_best_effort(&spec.name).await;
                }
                return Err(DomainError::Interrupted);
            }
            result = self.poller.wait_ready(&*probe, spec.readiness_timeout) => result,
        };

        if !readiness.ready {
            self.console
                .warn(&format!("{} did not become ready, stopping '{}'", request.kind, spec.name));
            self.stop_best_effort(&spec.name).await;
            return Err(DomainError::ReadinessTimeout {
                name: spec.name.clone(),
                timeout: spec.readiness_timeout,
                never_responded: !readiness.responded,
                last_error: readiness.last_error,
            });
        }

        let endpoint = spec.endpoint();
        self.console
            .success(&format!("{} is ready at {}", request.kind, endpoint));
        Ok(StartReport {
            kind: request.kind,
            handle: Some(ContainerHandle::new(&spec.name, ContainerState::Running)),
            transition: Some(transition),
            use_gpu: spec.has_gpu_flags(),
            endpoint,
            readiness: Some(readiness),
        })
    }

    /// Everything before the first container mutation: hardware, engine,
    /// GPU decision, credentials and the launch spec.
    async fn prepare(&self, request: &StartRequest) -> Result<LaunchSpec, DomainError> {
        let profile = self.profile(request.refresh_hardware);
        self.prerequisites.ensure_engine_running(profile.os).await?;

        let toolkit_usable = if request.force_cpu {
            self.console.info("Using CPU as requested");
            false
        } else {
            self.resolve_gpu(&profile, request.unattended).await?
        };

        let kind = request.kind;
        let (port, model, readiness_timeout) = {
            let config = self.config.lock();
            let settings = config.backends.get(kind);
            let port = request
                .port
                .or(settings.map(|s| s.port))
                .unwrap_or_else(|| kind.default_port());
            let model = request
                .model
                .clone()
                .or_else(|| settings.and_then(|s| s.model.clone()))
                .or_else(|| kind.default_model().map(String::from))
                .unwrap_or_default();
            (port, model, settings.and_then(|s| s.readiness_timeout()))
        };
        let selection = BackendSelection::new(kind, &profile, toolkit_usable, port, model);
        debug!(selection = ?selection, "Backend selected");

        let hf_token = if kind.wants_hf_token() {
            self.resolve_hf_token(request.hf_token.clone(), request.unattended)?
        } else {
            None
        };

        let context = LaunchContext {
            home_dir: self.home_dir.clone(),
            hf_token,
            readiness_timeout,
        };
        LaunchSpec::for_selection(&selection, &profile, &context)
    }

    /// Decide whether containers get the GPU. Falls back to CPU visibly.
    async fn resolve_gpu(&self, profile: &HardwareProfile, unattended: bool) -> Result<bool, DomainError> {
        let vendor = profile.gpu_vendor;
        if !vendor.supports_container_gpu() {
            return Ok(false);
        }
        if self.prerequisites.gpu_toolkit_usable(profile.os, vendor).await {
            self.console
                .info(&format!("{} GPU available to containers", vendor));
            return Ok(true);
        }

        let unusable = DomainError::GpuToolkitUnusable(format!(
            "{} GPU detected but containers cannot use it",
            vendor
        ));
        self.console.warn(&unusable.to_string());

        if vendor == GpuVendor::Nvidia && !unattended {
            let install = self
                .console
                .confirm("Install the NVIDIA Container Toolkit now?", false)?;
            if install {
                match self.prerequisites.install_gpu_toolkit(profile.os).await {
                    Ok(()) => {
                        if self.prerequisites.gpu_toolkit_usable(profile.os, vendor).await {
                            return Ok(true);
                        }
                        self.console.warn(
                            "Toolkit installed but the GPU is still not reachable from containers",
                        );
                    }
                    Err(e) => self.console.warn(&e.to_string()),
                }
            }
        }

        self.console.warn("Continuing on CPU");
        Ok(false)
    }

    /// Token from the request, or the saved one, or a prompt.
    fn resolve_hf_token(
        &self,
        provided: Option<Secret>,
        unattended: bool,
    ) -> Result<Option<Secret>, DomainError> {
        let saved = self.config.lock().credentials.get(HUGGING_FACE).cloned();

        if let Some(token) = provided {
            if self.should_replace(
                saved.as_ref(),
                &token,
                "Replace the saved Hugging Face token with the one provided?",
            )? {
                self.save_credential(HUGGING_FACE, token.clone());
            }
            return Ok(Some(token));
        }

        match saved {
            Some(saved) => {
                if unattended
                    || !self
                        .console
                        .confirm("A Hugging Face token is already saved. Replace it?", false)?
                {
                    return Ok(Some(saved));
                }
                match self.console.secret("New Hugging Face token")? {
                    Some(token) => {
                        self.save_credential(HUGGING_FACE, token.clone());
                        Ok(Some(token))
                    }
                    None => Ok(Some(saved)),
                }
            }
            None if unattended => Ok(None),
            None => {
                self.console
                    .info("Gated models need a Hugging Face token (leave empty to skip)");
                match self.console.secret("Hugging Face token")? {
                    Some(token) => {
                        if self.console.confirm("Save this token for next time?", true)? {
                            self.save_credential(HUGGING_FACE, token.clone());
                        }
                        Ok(Some(token))
                    }
                    None => Ok(None),
                }
            }
        }
    }

    /// Whether `new` should replace `saved`. Asks when both exist and differ.
    fn should_replace(
        &self,
        saved: Option<&Secret>,
        new: &Secret,
        prompt: &str,
    ) -> Result<bool, DomainError> {
        match saved {
            None => Ok(true),
            Some(saved) if saved == new => Ok(false),
            Some(_) => {
                let replace = self.console.confirm(prompt, false)?;
                if !replace {
                    self.console
                        .info("Keeping the saved credential; the new one is used for this run only");
                }
                Ok(replace)
            }
        }
    }

    fn save_credential(&self, provider: &str, secret: Secret) {
        self.config
            .lock()
            .credentials
            .insert(provider.to_string(), secret);
        self.persist();
        info!(provider = provider, "Credential saved");
    }

    fn start_custom_api(&self, request: StartRequest) -> Result<StartReport, DomainError> {
        let saved_url = self.config.lock().custom_api.url.clone();
        let url = request
            .api_url
            .or(saved_url)
            .ok_or_else(|| DomainError::Config("the custom API needs --api-url".to_string()))?;
        Url::parse(&url).map_err(|e| DomainError::Config(format!("invalid API URL '{}': {}", url, e)))?;

        self.config.lock().custom_api.url = Some(url.clone());
        if let Some(key) = request.api_key {
            let saved = self.config.lock().custom_api.api_key.clone();
            if self.should_replace(
                saved.as_ref(),
                &key,
                "Replace the saved API key with the one provided?",
            )? {
                self.config.lock().custom_api.api_key = Some(key);
            }
        }
        self.persist();

        self.console
            .success(&format!("Using custom API at {}", url));
        Ok(StartReport {
            kind: BackendKind::CustomApi,
            handle: None,
            transition: None,
            use_gpu: false,
            endpoint: url,
            readiness: None,
        })
    }

    /// Remove an existing container so the next start creates it fresh.
    async fn recreate(&self, spec: &LaunchSpec, unattended: bool) -> Result<(), DomainError> {
        if !self.lifecycle.status(&spec.name).await?.exists() {
            return Ok(());
        }
        let confirmed = !unattended
            && self.console.confirm(
                &format!("Remove container '{}' and create it again?", spec.name),
                false,
            )?;
        if confirmed {
            self.lifecycle.remove(&spec.name).await?;
            self.console.info(&format!("Removed '{}'", spec.name));
        } else {
            self.console.info("Keeping the existing container");
        }
        Ok(())
    }

    /// Undo what an interrupted `ensure_started` may have done.
    async fn abandon_start(&self, name: &str, before: ContainerState) {
        match before {
            ContainerState::Absent => self.lifecycle.cleanup(name).await,
            ContainerState::Stopped => self.stop_best_effort(name).await,
            ContainerState::Running | ContainerState::Failed => {}
        }
    }

    /// An existing container keeps the port it was created with; probe and
    /// report that one.
    async fn adopt_existing_port(&self, request: &StartRequest, spec: &mut LaunchSpec) {
        let port = match self
            .lifecycle
            .published_port(&spec.name, spec.container_port)
            .await
        {
            Ok(Some(port)) => port,
            Ok(None) => self.configured_port(request.kind),
            Err(e) => {
                warn!(name = %spec.name, error = %e, "Could not read published port");
                return;
            }
        };
        if port == spec.port {
            return;
        }
        if request.port.is_some() {
            self.console.warn(&format!(
                "'{}' already uses port {}; start with --recreate to move it to {}",
                spec.name, port, spec.port
            ));
        }
        debug!(name = %spec.name, port = port, "Using the existing container's port");
        spec.port = port;
    }

    fn configured_port(&self, kind: BackendKind) -> u16 {
        self.config
            .lock()
            .backends
            .get(kind)
            .map(|s| s.port)
            .unwrap_or_else(|| kind.default_port())
    }

    async fn stop_best_effort(&self, name: &str) {
        if let Err(e) = self.lifecycle.ensure_stopped(name).await {
            warn!(name = name, error = %e, "Best-effort stop failed");
        }
    }

    /// Stop a backend. `None` for externally managed backends.
    pub async fn stop(&self, kind: BackendKind) -> Result<Option<StopOutcome>, DomainError> {
        let Some(name) = kind.handle_name() else {
            self.console
                .info(&format!("{} is managed outside Solo Server", kind));
            return Ok(None);
        };
        let outcome = self.lifecycle.ensure_stopped(name).await?;
        match outcome {
            StopOutcome::Absent => self.console.info(&format!("No '{}' container", name)),
            StopOutcome::AlreadyStopped => {
                self.console.info(&format!("'{}' is not running", name))
            }
            StopOutcome::Stopped => self.console.success(&format!("Stopped '{}'", name)),
        }
        Ok(Some(outcome))
    }

    /// Query one backend kind, or all of them.
    pub async fn status(&self, kind: Option<BackendKind>) -> Result<Vec<BackendStatus>, DomainError> {
        let kinds = match kind {
            Some(kind) => vec![kind],
            None => BackendKind::ALL.to_vec(),
        };

        let mut statuses = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let status = match kind.handle_name() {
                Some(name) => {
                    let state = self.lifecycle.state(name).await?;
                    let endpoint = if state == ContainerState::Running {
                        let port = self
                            .lifecycle
                            .published_port(name, kind.container_port())
                            .await?
                            .unwrap_or_else(|| self.configured_port(kind));
                        Some(format!("http://localhost:{}", port))
                    } else {
                        None
                    };
                    BackendStatus {
                        backend: kind,
                        handle: Some(name.to_string()),
                        state: Some(state),
                        endpoint,
                    }
                }
                None => BackendStatus {
                    backend: kind,
                    handle: None,
                    state: None,
                    endpoint: self.config.lock().custom_api.url.clone(),
                },
            };
            statuses.push(status);
        }
        Ok(statuses)
    }

    /// Delete a backend's container after confirmation.
    pub async fn remove(&self, kind: BackendKind) -> Result<RemoveOutcome, DomainError> {
        let name = kind.handle_name().ok_or_else(|| {
            DomainError::Config(format!("{} has no container to remove", kind))
        })?;
        if !self.lifecycle.status(name).await?.exists() {
            self.console.info(&format!("No '{}' container", name));
            return Ok(RemoveOutcome::Absent);
        }
        let prompt = format!(
            "Remove container '{}'? Downloaded models in volumes are kept.",
            name
        );
        if !self.console.confirm(&prompt, false)? {
            self.console.info("Nothing removed");
            return Ok(RemoveOutcome::Cancelled);
        }
        self.lifecycle.remove(name).await?;
        self.console.success(&format!("Removed '{}'", name));
        Ok(RemoveOutcome::Removed)
    }

    /// Hardware profile for this host, from the cache when it is fresh.
    pub fn hardware(&self, refresh: bool) -> HardwareProfile {
        self.profile(refresh)
    }

    /// Start unattended and return the base URL a load generator should hit.
    pub async fn benchmark_setup(
        &self,
        kind: BackendKind,
        port: Option<u16>,
        model: Option<String>,
        interrupt: impl Future<Output = ()>,
    ) -> Result<String, DomainError> {
        let request = StartRequest {
            port,
            model,
            unattended: true,
            ..StartRequest::new(kind)
        };
        let report = self.start(request, interrupt).await?;
        Ok(report.endpoint)
    }

    fn profile(&self, refresh: bool) -> HardwareProfile {
        let host = self.hardware.host_id();
        let now = Utc::now();
        if !refresh {
            if let Some(profile) = self.config.lock().hardware.fresh_profile(&host, now) {
                debug!(host = %host, "Using cached hardware profile");
                return profile.clone();
            }
        }

        let profile = self.hardware.detect();
        self.config
            .lock()
            .hardware
            .remember(&host, profile.clone(), now);
        self.persist();
        profile
    }

    /// Remember the port and model a new container was created with, so
    /// status reports the right endpoint.
    fn remember_backend_settings(&self, request: &StartRequest, spec: &LaunchSpec) {
        if request.port.is_none() && request.model.is_none() {
            return;
        }
        {
            let mut config = self.config.lock();
            let settings = match request.kind {
                BackendKind::Ollama => &mut config.backends.ollama,
                BackendKind::Vllm => &mut config.backends.vllm,
                BackendKind::LlamaCpp => &mut config.backends.llama_cpp,
                BackendKind::CustomApi => return,
            };
            settings.port = spec.port;
            if let Some(model) = &request.model {
                settings.model = Some(model.clone());
            }
        }
        self.persist();
    }

    /// Write the configuration. Failure is logged and otherwise ignored.
    fn persist(&self) {
        let config = self.config.lock().clone();
        if let Err(e) = self.config_store.save(&config) {
            let err = DomainError::ConfigPersistenceFailed(e.to_string());
            warn!(error = %err, "Continuing without saving configuration");
        }
    }
}
