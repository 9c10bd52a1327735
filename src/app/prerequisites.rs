use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::domain::config::EngineConfig;
use crate::domain::{DomainError, GpuFlags, GpuVendor, OsFamily};
use crate::ports::{Console, ContainerEngine, EphemeralRun, HostShell};

/// Image used to prove that NVIDIA GPUs reach containers.
pub const CUDA_SMOKE_IMAGE: &str = "nvidia/cuda:11.0.3-base-ubuntu20.04";
/// Image used to prove that ROCm device nodes reach containers.
pub const ROCM_SMOKE_IMAGE: &str = "alpine";

const TOOLKIT_GUIDE: &str =
    "https://docs.nvidia.com/datacenter/cloud-native/container-toolkit/latest/install-guide.html";

/// Linux install steps for the NVIDIA container toolkit on apt-based systems.
const NVIDIA_APT_STEPS: &[(&str, &str)] = &[
    (
        "Adding the NVIDIA repository key",
        "curl -fsSL https://nvidia.github.io/libnvidia-container/gpgkey | sudo gpg --dearmor --yes -o /usr/share/keyrings/nvidia-container-toolkit-keyring.gpg",
    ),
    (
        "Adding the NVIDIA package repository",
        "curl -s -L https://nvidia.github.io/libnvidia-container/stable/deb/nvidia-container-toolkit.list | sed 's#deb https://#deb [signed-by=/usr/share/keyrings/nvidia-container-toolkit-keyring.gpg] https://#g' | sudo tee /etc/apt/sources.list.d/nvidia-container-toolkit.list",
    ),
    ("Refreshing package lists", "sudo apt-get update"),
    (
        "Installing nvidia-container-toolkit",
        "sudo apt-get install -y nvidia-container-toolkit",
    ),
    (
        "Configuring the Docker runtime",
        "sudo nvidia-ctk runtime configure --runtime=docker",
    ),
    ("Restarting Docker", "sudo systemctl restart docker"),
];

/// Engine start timing, resolved from configuration.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub binary: String,
    pub start_timeout: Duration,
    pub poll_interval: Duration,
}

impl From<&EngineConfig> for EngineSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            start_timeout: Duration::from_secs(config.start_timeout_secs),
            poll_interval: Duration::from_secs(config.start_poll_interval_secs.max(1)),
        }
    }
}

/// Checks and repairs what a backend needs before a container can start.
pub struct PrerequisiteChecker {
    engine: Arc<dyn ContainerEngine>,
    shell: Arc<dyn HostShell>,
    console: Arc<dyn Console>,
    settings: EngineSettings,
}

impl PrerequisiteChecker {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        shell: Arc<dyn HostShell>,
        console: Arc<dyn Console>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            engine,
            shell,
            console,
            settings,
        }
    }

    /// Whether the engine daemon answers right now.
    pub async fn engine_available(&self) -> bool {
        match self.engine.info().await {
            Ok(info) => {
                debug!(version = %info.server_version, "Engine available");
                true
            }
            Err(e) => {
                debug!(error = %e, "Engine not available");
                false
            }
        }
    }

    /// Make sure the engine answers, starting it if needed.
    ///
    /// Waits at most the configured start timeout after the start attempt.
    /// Failure is final and carries a remediation hint.
    pub async fn ensure_engine_running(&self, os: OsFamily) -> Result<(), DomainError> {
        if self.engine_available().await {
            return Ok(());
        }

        if !self.shell.has_program(&self.settings.binary) {
            return Err(DomainError::EngineUnavailable {
                reason: format!("'{}' is not installed", self.settings.binary),
                hint: "Install Docker from https://docs.docker.com/get-docker/".to_string(),
            });
        }

        self.console
            .info("Docker is installed but not running. Trying to start it...");
        self.start_engine(os).await;

        let started = Instant::now();
        loop {
            tokio::time::sleep(self.settings.poll_interval).await;
            if self.engine_available().await {
                self.console.success("Docker is running");
                return Ok(());
            }
            if started.elapsed() >= self.settings.start_timeout {
                break;
            }
            debug!(elapsed = ?started.elapsed(), "Waiting for engine to come up");
        }

        warn!(timeout = ?self.settings.start_timeout, "Engine did not start");
        Err(DomainError::EngineUnavailable {
            reason: format!(
                "Docker did not respond within {}s",
                self.settings.start_timeout.as_secs()
            ),
            hint: start_hint(os).to_string(),
        })
    }

    /// Run the OS-specific start sequence. Failures are logged; the caller
    /// finds out by polling.
    async fn start_engine(&self, os: OsFamily) {
        match os {
            OsFamily::Linux => {
                if !self.run_step("sudo", &["systemctl", "start", "docker"]).await {
                    self.run_step("systemctl", &["--user", "start", "docker-desktop"])
                        .await;
                }
            }
            OsFamily::MacOS => {
                self.run_step("open", &["-a", "Docker"]).await;
            }
            OsFamily::Windows => {
                if self.run_step("sc", &["start", "docker"]).await {
                    return;
                }
                let desktop = self
                    .shell
                    .locate(&self.settings.binary)
                    .and_then(|cli| docker_desktop_path(&cli));
                match desktop {
                    Some(path) => {
                        let command = format!("Start-Process -FilePath '{}'", path.display());
                        self.run_step("powershell", &["-NoProfile", "-Command", command.as_str()])
                            .await;
                    }
                    None => warn!("Could not locate Docker Desktop"),
                }
            }
            OsFamily::Unknown => warn!("No known way to start Docker on this OS"),
        }
    }

    async fn run_step(&self, program: &str, args: &[&str]) -> bool {
        match self.shell.run(program, args).await {
            Ok(output) if output.success => true,
            Ok(output) => {
                debug!(program = program, error = %output.diagnostic(), "Command step failed");
                false
            }
            Err(e) => {
                debug!(program = program, error = %e, "Start step could not run");
                false
            }
        }
    }

    /// End-to-end check that containers can use the GPU.
    ///
    /// The host tool must work and a throwaway GPU container must run;
    /// a driver alone is not enough.
    pub async fn gpu_toolkit_usable(&self, os: OsFamily, vendor: GpuVendor) -> bool {
        let (host_tool, run) = match (vendor, os) {
            (GpuVendor::Nvidia, OsFamily::Linux | OsFamily::Windows) => (
                "nvidia-smi",
                EphemeralRun {
                    image: CUDA_SMOKE_IMAGE.to_string(),
                    gpu: GpuFlags::NvidiaAll,
                    command: vec!["nvidia-smi".to_string()],
                },
            ),
            (GpuVendor::Amd, OsFamily::Linux) => (
                "rocm-smi",
                EphemeralRun {
                    image: ROCM_SMOKE_IMAGE.to_string(),
                    gpu: GpuFlags::AmdDevices,
                    command: vec!["ls".to_string(), "/dev/kfd".to_string()],
                },
            ),
            _ => return false,
        };

        if !self.run_step(host_tool, &[]).await {
            info!(vendor = %vendor, tool = host_tool, "GPU host tool not usable");
            return false;
        }

        match self.engine.run_ephemeral(&run).await {
            Ok(output) if output.success => {
                info!(vendor = %vendor, "GPU container smoke test passed");
                true
            }
            Ok(output) => {
                info!(vendor = %vendor, error = %output.diagnostic(), "GPU container smoke test failed");
                false
            }
            Err(e) => {
                warn!(vendor = %vendor, error = %e, "GPU container smoke test could not run");
                false
            }
        }
    }

    /// Install the NVIDIA container toolkit. Not retried on failure.
    pub async fn install_gpu_toolkit(&self, os: OsFamily) -> Result<(), DomainError> {
        match os {
            OsFamily::Linux => {
                if !self.shell.has_program("apt-get") {
                    return Err(DomainError::ToolkitInstall(format!(
                        "automatic installation needs apt-get; follow {}",
                        TOOLKIT_GUIDE
                    )));
                }
                for &(title, script) in NVIDIA_APT_STEPS {
                    self.console.info(title);
                    let output = self.shell.run("sh", &["-c", script]).await?;
                    if !output.success {
                        return Err(DomainError::ToolkitInstall(format!(
                            "{} failed: {}",
                            title,
                            output.diagnostic()
                        )));
                    }
                }
                self.console
                    .success("NVIDIA Container Toolkit installed");
                Ok(())
            }
            OsFamily::Windows => {
                self.console.info("Enable NVIDIA GPU support on Windows:");
                self.console.info(
                    "  1. Install or update the NVIDIA driver: https://www.nvidia.com/Download/index.aspx",
                );
                self.console.info(
                    "  2. Install the CUDA toolkit: https://developer.nvidia.com/cuda-downloads",
                );
                self.console.info(
                    "  3. In Docker Desktop, enable 'Use the WSL 2 based engine'",
                );
                self.console
                    .info("Restart Solo Server once these steps are done.");
                Err(DomainError::ToolkitInstall(
                    "manual setup required on Windows".to_string(),
                ))
            }
            other => Err(DomainError::ToolkitInstall(format!(
                "no GPU container toolkit for {}",
                other
            ))),
        }
    }
}

/// Docker Desktop executable next to a Windows Docker CLI install
/// (`...\Docker\Docker\resources\bin\docker.exe`).
pub fn docker_desktop_path(cli: &Path) -> Option<PathBuf> {
    let bin = cli.parent()?;
    let resources = bin.parent()?;
    let named = |p: &Path, expected: &str| {
        p.file_name()
            .map(|n| n.to_string_lossy().eq_ignore_ascii_case(expected))
            .unwrap_or(false)
    };
    if !named(bin, "bin") || !named(resources, "resources") {
        return None;
    }
    Some(resources.parent()?.join("Docker Desktop.exe"))
}

fn start_hint(os: OsFamily) -> &'static str {
    match os {
        OsFamily::Linux => {
            "Start it with 'sudo systemctl start docker' or add your user to the docker group"
        }
        OsFamily::MacOS => "Start Docker Desktop from Applications",
        OsFamily::Windows => "Start Docker Desktop, or run this terminal as Administrator",
        OsFamily::Unknown => "Start the Docker daemon manually",
    }
}
