use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::domain::{ContainerRecord, ContainerState, DomainError, GpuFlags, LaunchSpec};
use crate::ports::{CommandOutput, ContainerEngine, EngineInfo, EphemeralRun};

/// Stderr fragments the Docker CLI prints when the daemon is not reachable.
const DAEMON_DOWN_MARKERS: &[&str] = &[
    "cannot connect to the docker daemon",
    "error during connect",
    "is the docker daemon running",
    "docker daemon is not running",
];

/// Container engine driven through the Docker CLI.
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args).stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    async fn output(&self, mut cmd: Command, args: &[String]) -> Result<CommandOutput, DomainError> {
        debug!(binary = %self.binary, args = ?args, "Running engine command");
        let output = cmd.output().await.map_err(|e| self.spawn_error(e))?;

        let result = CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(
            args = ?args,
            success = result.success,
            code = ?result.code,
            "Engine command finished"
        );
        Ok(result)
    }

    /// Run a command and turn a non-zero exit into an error.
    async fn checked(&self, args: Vec<String>) -> Result<CommandOutput, DomainError> {
        let output = self.output(self.command(&args), &args).await?;
        self.check(&args, output)
    }

    fn check(&self, args: &[String], output: CommandOutput) -> Result<CommandOutput, DomainError> {
        if output.success {
            return Ok(output);
        }
        if daemon_unreachable(&output.stderr) {
            return Err(self.unavailable(output.diagnostic()));
        }
        Err(DomainError::EngineCommand {
            command: format!("{} {}", self.binary, args.join(" ")),
            code: output.code,
            stderr: output.diagnostic(),
        })
    }

    fn spawn_error(&self, err: std::io::Error) -> DomainError {
        if err.kind() == ErrorKind::NotFound {
            self.unavailable(format!("'{}' was not found on PATH", self.binary))
        } else {
            DomainError::Io(format!("failed to run {}: {}", self.binary, err))
        }
    }

    fn unavailable(&self, reason: String) -> DomainError {
        DomainError::EngineUnavailable {
            reason,
            hint: "Install Docker from https://docs.docker.com/get-docker/ and make sure the daemon is running".to_string(),
        }
    }
}

fn daemon_unreachable(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    DAEMON_DOWN_MARKERS.iter().any(|m| stderr.contains(m))
}

fn gpu_arguments(gpu: GpuFlags) -> Vec<String> {
    match gpu {
        GpuFlags::None => Vec::new(),
        GpuFlags::NvidiaAll => vec!["--gpus".to_string(), "all".to_string()],
        GpuFlags::AmdDevices => vec![
            "--device=/dev/kfd".to_string(),
            "--device=/dev/dri".to_string(),
        ],
    }
}

/// Arguments for `docker run` that create a backend container.
///
/// Secret values are never part of the result: only `--env NAME` is emitted
/// and the value is set on the engine process environment.
pub fn run_arguments(spec: &LaunchSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        spec.name.clone(),
    ];
    args.extend(gpu_arguments(spec.gpu));
    if spec.publish_port {
        args.push("-p".to_string());
        args.push(format!("{}:{}", spec.port, spec.container_port));
    }
    for volume in &spec.volumes {
        args.push("-v".to_string());
        args.push(format!("{}:{}", volume.source, volume.target));
    }
    for (name, value) in &spec.env {
        args.push("--env".to_string());
        args.push(format!("{}={}", name, value));
    }
    for secret in &spec.secrets {
        args.push("--env".to_string());
        args.push(secret.name.clone());
    }
    args.extend(spec.extra_flags.iter().cloned());
    args.push(spec.image.clone());
    args.extend(spec.args.iter().cloned());
    args
}

/// One row of `docker ps --format '{{json .}}'`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PsRow {
    #[serde(rename = "ID")]
    id: String,
    names: String,
    #[serde(default)]
    image: String,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    status: String,
    #[serde(default)]
    ports: String,
}

/// Parse `docker ps` JSON lines, keeping rows whose name is exactly `name`.
fn parse_ps_output(stdout: &str, name: &str) -> Result<Vec<ContainerRecord>, DomainError> {
    let mut records = Vec::new();
    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let row: PsRow = serde_json::from_str(line)?;
        if !row.names.split(',').any(|n| n.trim() == name) {
            continue;
        }
        let state = match row.state.as_deref() {
            Some(state) => ContainerState::from_engine_state(state),
            // Old engines omit State; Status reads "Up 3 minutes" when running.
            None if row.status.starts_with("Up") => ContainerState::Running,
            None => ContainerState::Stopped,
        };
        records.push(ContainerRecord {
            id: row.id,
            name: name.to_string(),
            image: row.image,
            state,
            status: row.status,
            ports: row.ports,
        });
    }
    Ok(records)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InfoDoc {
    #[serde(default)]
    server_version: Option<String>,
    #[serde(default)]
    runtimes: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    server_errors: Vec<String>,
}

fn parse_info_output(stdout: &str) -> Result<EngineInfo, String> {
    let doc: InfoDoc = serde_json::from_str(stdout.trim()).map_err(|e| e.to_string())?;
    if let Some(first) = doc.server_errors.first() {
        return Err(first.clone());
    }
    let server_version = doc
        .server_version
        .filter(|v| !v.is_empty())
        .ok_or_else(|| "engine reported no server version".to_string())?;
    Ok(EngineInfo {
        server_version,
        runtimes: doc.runtimes.into_keys().collect(),
    })
}

#[async_trait]
impl ContainerEngine for DockerCli {
    async fn info(&self) -> Result<EngineInfo, DomainError> {
        let args: Vec<String> = ["info", "--format", "{{json .}}"].map(String::from).into();
        let output = self.output(self.command(&args), &args).await?;

        match parse_info_output(&output.stdout) {
            Ok(info) => {
                debug!(version = %info.server_version, runtimes = ?info.runtimes, "Engine responded");
                Ok(info)
            }
            Err(reason) => {
                let reason = if output.success { reason } else { output.diagnostic() };
                Err(self.unavailable(reason))
            }
        }
    }

    async fn list(&self, name: &str) -> Result<Vec<ContainerRecord>, DomainError> {
        let args = vec![
            "ps".to_string(),
            "-a".to_string(),
            "--no-trunc".to_string(),
            "--filter".to_string(),
            format!("name=^{}$", name),
            "--format".to_string(),
            "{{json .}}".to_string(),
        ];
        let output = self.checked(args).await?;
        parse_ps_output(&output.stdout, name)
    }

    async fn pull(&self, image: &str) -> Result<(), DomainError> {
        info!(image = image, "Pulling image");
        let args = vec!["pull".to_string(), image.to_string()];
        let mut cmd = self.command(&args);
        // Progress goes to our stderr so stdout stays clean for scripts.
        cmd.stdout(std::io::stderr());
        let output = self.output(cmd, &args).await?;
        self.check(&args, output).map(|_| ())
    }

    async fn create(&self, spec: &LaunchSpec) -> Result<String, DomainError> {
        let args = run_arguments(spec);
        let mut cmd = self.command(&args);
        for secret in &spec.secrets {
            cmd.env(&secret.name, secret.value.expose());
        }
        info!(name = %spec.name, image = %spec.image, gpu = ?spec.gpu, "Creating container");
        let output = self.output(cmd, &args).await?;
        let output = self.check(&args, output)?;
        Ok(output.stdout.trim().to_string())
    }

    async fn start(&self, name: &str) -> Result<(), DomainError> {
        info!(name = name, "Starting container");
        self.checked(vec!["start".to_string(), name.to_string()])
            .await
            .map(|_| ())
    }

    async fn stop(&self, name: &str) -> Result<(), DomainError> {
        info!(name = name, "Stopping container");
        self.checked(vec!["stop".to_string(), name.to_string()])
            .await
            .map(|_| ())
    }

    async fn remove(&self, name: &str) -> Result<(), DomainError> {
        info!(name = name, "Removing container");
        self.checked(vec!["rm".to_string(), "-f".to_string(), name.to_string()])
            .await
            .map(|_| ())
    }

    async fn exec(&self, name: &str, command: &[String]) -> Result<CommandOutput, DomainError> {
        let mut args = vec!["exec".to_string(), name.to_string()];
        args.extend(command.iter().cloned());
        let output = self.output(self.command(&args), &args).await?;
        if !output.success && daemon_unreachable(&output.stderr) {
            warn!(name = name, "Engine stopped answering during exec");
            return Err(self.unavailable(output.diagnostic()));
        }
        Ok(output)
    }

    async fn run_ephemeral(&self, run: &EphemeralRun) -> Result<CommandOutput, DomainError> {
        let mut args = vec!["run".to_string(), "--rm".to_string()];
        args.extend(gpu_arguments(run.gpu));
        args.push(run.image.clone());
        args.extend(run.command.iter().cloned());
        self.output(self.command(&args), &args).await
    }
}
