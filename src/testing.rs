//! In-memory fakes for every port, shared by the unit tests.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::{
    AppConfig, ContainerRecord, ContainerState, DomainError, GpuInfo, HardwareProfile,
    LaunchSpec, OsFamily, Secret,
};
use crate::ports::{
    CommandOutput, ConfigStore, Console, ContainerEngine, EngineInfo, EphemeralRun,
    HardwareDetector, HostShell, HttpClient, PortProbe,
};

/// One call received by [`FakeEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Info,
    List(String),
    Pull(String),
    Create(String),
    Start(String),
    Stop(String),
    Remove(String),
    Exec(String),
    RunEphemeral(String),
}

impl EngineCall {
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            EngineCall::Pull(_)
                | EngineCall::Create(_)
                | EngineCall::Start(_)
                | EngineCall::Stop(_)
                | EngineCall::Remove(_)
        )
    }
}

/// How a simulated `create` fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateFailure {
    /// Nothing is left behind.
    Clean,
    /// The container exists (created, never started) when the error is returned.
    LeavesPartial,
}

#[derive(Default)]
struct EngineState {
    /// Info calls that fail before the daemon answers. `None` means never.
    down_for: Option<u32>,
    containers: BTreeMap<String, ContainerState>,
    /// Host and container port published by each container.
    published: BTreeMap<String, (u16, u16)>,
    calls: Vec<EngineCall>,
    created: Vec<LaunchSpec>,
    fail_pull: bool,
    pull_delay: Option<Duration>,
    fail_create: Option<CreateFailure>,
    exec_results: VecDeque<CommandOutput>,
    ephemeral_ok: bool,
}

/// Simulated container engine with a call journal.
pub struct FakeEngine {
    state: Mutex<EngineState>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EngineState {
                down_for: Some(0),
                ephemeral_ok: true,
                ..EngineState::default()
            }),
        }
    }

    /// Engine whose daemon never answers.
    pub fn down() -> Self {
        let engine = Self::new();
        engine.state.lock().down_for = None;
        engine
    }

    /// Engine whose daemon starts answering after `attempts` failed info calls.
    pub fn comes_up_after(attempts: u32) -> Self {
        let engine = Self::new();
        engine.state.lock().down_for = Some(attempts);
        engine
    }

    pub fn with_container(self, name: &str, state: ContainerState) -> Self {
        self.state.lock().containers.insert(name.to_string(), state);
        self
    }

    pub fn with_published_port(self, name: &str, host: u16, container: u16) -> Self {
        self.state
            .lock()
            .published
            .insert(name.to_string(), (host, container));
        self
    }

    /// Make every `pull` take `delay` before it completes.
    pub fn slow_pull(self, delay: Duration) -> Self {
        self.state.lock().pull_delay = Some(delay);
        self
    }

    pub fn fail_pull(self) -> Self {
        self.state.lock().fail_pull = true;
        self
    }

    pub fn fail_create(self, failure: CreateFailure) -> Self {
        self.state.lock().fail_create = Some(failure);
        self
    }

    pub fn fail_gpu_smoke_test(self) -> Self {
        self.state.lock().ephemeral_ok = false;
        self
    }

    /// Queue results for successive `exec` calls. Once drained, exec succeeds.
    pub fn push_exec(&self, output: CommandOutput) {
        self.state.lock().exec_results.push_back(output);
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().calls.clone()
    }

    pub fn mutating_calls(&self) -> Vec<EngineCall> {
        self.calls().into_iter().filter(EngineCall::is_mutating).collect()
    }

    pub fn created_specs(&self) -> Vec<LaunchSpec> {
        self.state.lock().created.clone()
    }

    pub fn state_of(&self, name: &str) -> ContainerState {
        self.state
            .lock()
            .containers
            .get(name)
            .copied()
            .unwrap_or(ContainerState::Absent)
    }

    fn record(&self, call: EngineCall) -> Result<(), DomainError> {
        let mut state = self.state.lock();
        state.calls.push(call);
        match state.down_for {
            Some(0) => Ok(()),
            _ => Err(unavailable()),
        }
    }
}

fn unavailable() -> DomainError {
    DomainError::EngineUnavailable {
        reason: "Cannot connect to the Docker daemon".to_string(),
        hint: "start Docker".to_string(),
    }
}

fn engine_error(command: &str, stderr: &str) -> DomainError {
    DomainError::EngineCommand {
        command: command.to_string(),
        code: Some(1),
        stderr: stderr.to_string(),
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn info(&self) -> Result<EngineInfo, DomainError> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::Info);
        match state.down_for {
            Some(0) => Ok(EngineInfo {
                server_version: "27.0.0".to_string(),
                runtimes: vec!["runc".to_string()],
            }),
            Some(n) => {
                state.down_for = Some(n - 1);
                Err(unavailable())
            }
            None => Err(unavailable()),
        }
    }

    async fn list(&self, name: &str) -> Result<Vec<ContainerRecord>, DomainError> {
        self.record(EngineCall::List(name.to_string()))?;
        let state = self.state.lock();
        // Like the real engine, ports are only listed while running.
        let ports = match (state.containers.get(name), state.published.get(name)) {
            (Some(ContainerState::Running), Some((host, container))) => {
                format!("0.0.0.0:{}->{}/tcp", host, container)
            }
            _ => String::new(),
        };
        Ok(state
            .containers
            .get(name)
            .map(|s| ContainerRecord {
                id: format!("id-{}", name),
                name: name.to_string(),
                image: "image".to_string(),
                state: *s,
                status: s.to_string(),
                ports,
            })
            .into_iter()
            .collect())
    }

    async fn pull(&self, image: &str) -> Result<(), DomainError> {
        self.record(EngineCall::Pull(image.to_string()))?;
        let delay = self.state.lock().pull_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.state.lock().fail_pull {
            return Err(engine_error("docker pull", "manifest unknown"));
        }
        Ok(())
    }

    async fn create(&self, spec: &LaunchSpec) -> Result<String, DomainError> {
        self.record(EngineCall::Create(spec.name.clone()))?;
        let mut state = self.state.lock();
        state.created.push(spec.clone());
        match state.fail_create {
            Some(CreateFailure::Clean) => Err(engine_error("docker run", "invalid reference format")),
            Some(CreateFailure::LeavesPartial) => {
                state
                    .containers
                    .insert(spec.name.clone(), ContainerState::Stopped);
                Err(engine_error("docker run", "could not select device driver"))
            }
            None => {
                state
                    .containers
                    .insert(spec.name.clone(), ContainerState::Running);
                if spec.publish_port {
                    state
                        .published
                        .insert(spec.name.clone(), (spec.port, spec.container_port));
                }
                Ok(format!("id-{}", spec.name))
            }
        }
    }

    async fn start(&self, name: &str) -> Result<(), DomainError> {
        self.record(EngineCall::Start(name.to_string()))?;
        let mut state = self.state.lock();
        match state.containers.get_mut(name) {
            Some(s) if *s != ContainerState::Failed => {
                *s = ContainerState::Running;
                Ok(())
            }
            Some(_) => Err(engine_error("docker start", "container is dead")),
            None => Err(engine_error("docker start", "No such container")),
        }
    }

    async fn stop(&self, name: &str) -> Result<(), DomainError> {
        self.record(EngineCall::Stop(name.to_string()))?;
        let mut state = self.state.lock();
        match state.containers.get_mut(name) {
            Some(s) => {
                *s = ContainerState::Stopped;
                Ok(())
            }
            None => Err(engine_error("docker stop", "No such container")),
        }
    }

    async fn remove(&self, name: &str) -> Result<(), DomainError> {
        self.record(EngineCall::Remove(name.to_string()))?;
        let mut state = self.state.lock();
        state.containers.remove(name);
        state.published.remove(name);
        Ok(())
    }

    async fn exec(&self, name: &str, _command: &[String]) -> Result<CommandOutput, DomainError> {
        self.record(EngineCall::Exec(name.to_string()))?;
        let mut state = self.state.lock();
        if state.containers.get(name) != Some(&ContainerState::Running) {
            return Ok(CommandOutput::exited(1, "", format!("container {} is not running", name)));
        }
        Ok(state
            .exec_results
            .pop_front()
            .unwrap_or_else(|| CommandOutput::exited(0, "NAME ID SIZE MODIFIED", "")))
    }

    async fn run_ephemeral(&self, run: &EphemeralRun) -> Result<CommandOutput, DomainError> {
        self.record(EngineCall::RunEphemeral(run.image.clone()))?;
        if self.state.lock().ephemeral_ok {
            Ok(CommandOutput::exited(0, "ok", ""))
        } else {
            Ok(CommandOutput::exited(
                125,
                "",
                "could not select device driver \"\" with capabilities: [[gpu]]",
            ))
        }
    }
}

/// Host shell with a fixed set of programs and scripted results.
#[derive(Default)]
pub struct FakeShell {
    programs: BTreeSet<String>,
    failing: BTreeSet<String>,
    runs: Mutex<Vec<String>>,
}

impl FakeShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(mut self, program: &str) -> Self {
        self.programs.insert(program.to_string());
        self
    }

    /// Commands whose rendered line starts with `prefix` exit with status 1.
    pub fn failing(mut self, prefix: &str) -> Self {
        self.failing.insert(prefix.to_string());
        self
    }

    /// Every command line run so far.
    pub fn runs(&self) -> Vec<String> {
        self.runs.lock().clone()
    }
}

#[async_trait]
impl HostShell for FakeShell {
    fn locate(&self, program: &str) -> Option<PathBuf> {
        self.programs
            .contains(program)
            .then(|| PathBuf::from("/usr/bin").join(program))
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, DomainError> {
        let line = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        self.runs.lock().push(line.clone());
        if self.failing.iter().any(|prefix| line.starts_with(prefix.as_str())) {
            Ok(CommandOutput::exited(1, "", "permission denied"))
        } else {
            Ok(CommandOutput::exited(0, "", ""))
        }
    }
}

/// Console with queued answers and a transcript of everything shown.
#[derive(Default)]
pub struct ScriptedConsole {
    confirms: Mutex<VecDeque<bool>>,
    secrets: Mutex<VecDeque<Option<String>>>,
    lines: Mutex<Vec<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue confirmation answers. Unanswered prompts take their default.
    pub fn confirming(self, answers: &[bool]) -> Self {
        self.confirms.lock().extend(answers.iter().copied());
        self
    }

    pub fn entering_secret(self, value: Option<&str>) -> Self {
        self.secrets.lock().push_back(value.map(String::from));
        self
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    pub fn transcript(&self) -> String {
        self.lines().join("\n")
    }
}

impl Console for ScriptedConsole {
    fn info(&self, message: &str) {
        self.lines.lock().push(format!("info: {}", message));
    }

    fn success(&self, message: &str) {
        self.lines.lock().push(format!("success: {}", message));
    }

    fn warn(&self, message: &str) {
        self.lines.lock().push(format!("warn: {}", message));
    }

    fn confirm(&self, prompt: &str, default: bool) -> Result<bool, DomainError> {
        self.prompts.lock().push(prompt.to_string());
        Ok(self.confirms.lock().pop_front().unwrap_or(default))
    }

    fn secret(&self, prompt: &str) -> Result<Option<Secret>, DomainError> {
        self.prompts.lock().push(prompt.to_string());
        Ok(self.secrets.lock().pop_front().flatten().and_then(Secret::new))
    }
}

/// HTTP client answering from a queue; the last answer repeats.
pub struct FakeHttp {
    answers: Mutex<VecDeque<Result<u16, String>>>,
    requests: Mutex<Vec<String>>,
}

impl FakeHttp {
    pub fn new(answers: Vec<Result<u16, String>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl HttpClient for FakeHttp {
    async fn get_status(&self, url: &str) -> Result<u16, DomainError> {
        self.requests.lock().push(url.to_string());
        let mut answers = self.answers.lock();
        let answer = if answers.len() > 1 {
            answers.pop_front()
        } else {
            answers.front().cloned()
        };
        match answer {
            Some(Ok(status)) => Ok(status),
            Some(Err(e)) => Err(DomainError::HttpRequest(e)),
            None => Err(DomainError::HttpRequest("connection refused".to_string())),
        }
    }
}

/// Port probe with an explicit set of busy ports.
#[derive(Default)]
pub struct FakePortProbe {
    busy: BTreeSet<u16>,
}

impl FakePortProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn busy(mut self, port: u16) -> Self {
        self.busy.insert(port);
        self
    }
}

impl PortProbe for FakePortProbe {
    fn is_free(&self, port: u16) -> bool {
        !self.busy.contains(&port)
    }
}

/// Config store kept in memory.
pub struct FakeConfigStore {
    config: Mutex<AppConfig>,
    saves: Mutex<u32>,
    fail_save: bool,
}

impl FakeConfigStore {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Mutex::new(config),
            saves: Mutex::new(0),
            fail_save: false,
        }
    }

    pub fn failing_saves(mut self) -> Self {
        self.fail_save = true;
        self
    }

    pub fn saved(&self) -> AppConfig {
        self.config.lock().clone()
    }

    pub fn save_count(&self) -> u32 {
        *self.saves.lock()
    }
}

impl ConfigStore for FakeConfigStore {
    fn load(&self) -> Result<AppConfig, DomainError> {
        Ok(self.config.lock().clone())
    }

    fn save(&self, config: &AppConfig) -> Result<(), DomainError> {
        if self.fail_save {
            return Err(DomainError::Io("read-only file system".to_string()));
        }
        *self.config.lock() = config.clone();
        *self.saves.lock() += 1;
        Ok(())
    }

    fn config_path(&self) -> PathBuf {
        PathBuf::from("/tmp/solo-test/config.toml")
    }

    fn logs_dir(&self) -> PathBuf {
        PathBuf::from("/tmp/solo-test/logs")
    }
}

/// Hardware detector returning a fixed profile and counting probes.
pub struct FixedHardware {
    profile: HardwareProfile,
    detections: Mutex<u32>,
}

impl FixedHardware {
    pub fn new(profile: HardwareProfile) -> Self {
        Self {
            profile,
            detections: Mutex::new(0),
        }
    }

    pub fn cpu_only() -> Self {
        Self::new(HardwareProfile::new(
            OsFamily::Linux,
            "Intel Core i7-12700",
            12,
            32.0,
            None,
        ))
    }

    pub fn nvidia() -> Self {
        Self::new(HardwareProfile::new(
            OsFamily::Linux,
            "AMD Ryzen 9 7950X",
            16,
            64.0,
            Some(GpuInfo {
                model: "NVIDIA GeForce RTX 4090".to_string(),
                memory_mib: 24564.0,
                compute_capability: Some(8.9),
            }),
        ))
    }

    pub fn detections(&self) -> u32 {
        *self.detections.lock()
    }
}

impl HardwareDetector for FixedHardware {
    fn detect(&self) -> HardwareProfile {
        *self.detections.lock() += 1;
        self.profile.clone()
    }

    fn host_id(&self) -> String {
        "test-host".to_string()
    }
}
