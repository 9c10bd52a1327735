use std::path::PathBuf;
use std::time::Duration;

use super::backend::{BackendKind, BackendSelection};
use super::error::DomainError;
use super::hardware::{GpuVendor, HardwareProfile};
use super::secret::Secret;

/// Environment variable vLLM reads the Hugging Face token from.
pub const HF_TOKEN_ENV: &str = "HUGGING_FACE_HUB_TOKEN";

/// GPU passthrough requested for a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuFlags {
    None,
    /// `--gpus all` through the NVIDIA container toolkit.
    NvidiaAll,
    /// ROCm device nodes (`/dev/kfd`, `/dev/dri`).
    AmdDevices,
}

impl GpuFlags {
    pub fn for_vendor(vendor: Option<GpuVendor>) -> Self {
        match vendor {
            Some(GpuVendor::Nvidia) => GpuFlags::NvidiaAll,
            Some(GpuVendor::Amd) => GpuFlags::AmdDevices,
            _ => GpuFlags::None,
        }
    }
}

/// Bind mount or named volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub source: String,
    pub target: String,
}

impl VolumeMount {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Secret injected as a runtime environment value.
///
/// Only the variable name is ever placed on a command line; the value travels
/// through the engine process environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretEnv {
    pub name: String,
    pub value: Secret,
}

/// How to decide that a started backend can serve requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessProbeSpec {
    /// Run a command inside the container; exit code 0 means ready.
    Exec { command: Vec<String> },
    /// GET a path on the published port; a 2xx status means ready.
    Http { path: String },
}

/// Inputs to launch spec construction that do not come from hardware.
#[derive(Debug, Clone)]
pub struct LaunchContext {
    pub home_dir: PathBuf,
    pub hf_token: Option<Secret>,
    /// Overrides the backend kind's readiness timeout.
    pub readiness_timeout: Option<Duration>,
}

/// Fully resolved arguments for creating a backend container.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchSpec {
    pub name: String,
    pub image: String,
    pub gpu: GpuFlags,
    /// Host port the backend is reachable on.
    pub port: u16,
    pub container_port: u16,
    /// False when the container shares the host network and needs no mapping.
    pub publish_port: bool,
    pub volumes: Vec<VolumeMount>,
    pub env: Vec<(String, String)>,
    pub secrets: Vec<SecretEnv>,
    /// Engine flags placed before the image, e.g. `--ipc=host`.
    pub extra_flags: Vec<String>,
    /// Arguments passed to the image entrypoint.
    pub args: Vec<String>,
    pub readiness: ReadinessProbeSpec,
    pub readiness_timeout: Duration,
}

impl LaunchSpec {
    /// Build the launch spec for a backend selection.
    pub fn for_selection(
        selection: &BackendSelection,
        profile: &HardwareProfile,
        context: &LaunchContext,
    ) -> Result<Self, DomainError> {
        let kind = selection.kind();
        let name = kind.handle_name().ok_or_else(|| {
            DomainError::Config(format!("{} backends are not container-managed", kind))
        })?;

        let mut spec = Self {
            name: name.to_string(),
            image: String::new(),
            gpu: GpuFlags::for_vendor(selection.gpu_vendor()),
            port: selection.port(),
            container_port: kind.container_port(),
            publish_port: true,
            volumes: Vec::new(),
            env: Vec::new(),
            secrets: Vec::new(),
            extra_flags: Vec::new(),
            args: Vec::new(),
            readiness: ReadinessProbeSpec::Exec {
                command: Vec::new(),
            },
            readiness_timeout: context
                .readiness_timeout
                .unwrap_or_else(|| kind.readiness_timeout()),
        };

        match kind {
            BackendKind::Ollama => spec.configure_ollama(),
            BackendKind::Vllm => spec.configure_vllm(selection, profile, context)?,
            BackendKind::LlamaCpp => spec.configure_llama_cpp(selection, context),
            BackendKind::CustomApi => {
                return Err(DomainError::Config(
                    "custom API backends have no launch recipe".to_string(),
                ))
            }
        }

        Ok(spec)
    }

    fn configure_ollama(&mut self) {
        self.image = match self.gpu {
            GpuFlags::AmdDevices => "ollama/ollama:rocm",
            _ => "ollama/ollama",
        }
        .to_string();
        self.volumes
            .push(VolumeMount::new("ollama", "/root/.ollama"));
        self.readiness = ReadinessProbeSpec::Exec {
            command: vec!["ollama".to_string(), "list".to_string()],
        };
    }

    fn configure_vllm(
        &mut self,
        selection: &BackendSelection,
        profile: &HardwareProfile,
        context: &LaunchContext,
    ) -> Result<(), DomainError> {
        match self.gpu {
            GpuFlags::NvidiaAll => {
                self.image = "vllm/vllm-openai:latest".to_string();
            }
            GpuFlags::AmdDevices => {
                self.image = "rocm/vllm".to_string();
                // Host networking: the server binds the host port directly.
                self.publish_port = false;
                self.container_port = self.port;
                self.extra_flags.extend(
                    [
                        "--network=host",
                        "--group-add=video",
                        "--cap-add=SYS_PTRACE",
                        "--security-opt",
                        "seccomp=unconfined",
                    ]
                    .map(String::from),
                );
            }
            GpuFlags::None if profile.is_apple_silicon() => {
                self.image = "getsolo/vllm-arm".to_string();
            }
            GpuFlags::None => {
                return Err(DomainError::UnsupportedHardware(
                    "vLLM needs an NVIDIA or AMD GPU with a working container toolkit, \
                     or an Apple-silicon Mac"
                        .to_string(),
                ));
            }
        }

        let cache = context.home_dir.join(".cache").join("huggingface");
        self.volumes.push(VolumeMount::new(
            cache.display().to_string(),
            "/root/.cache/huggingface",
        ));
        if let Some(token) = &context.hf_token {
            self.secrets.push(SecretEnv {
                name: HF_TOKEN_ENV.to_string(),
                value: token.clone(),
            });
        }
        self.extra_flags.push("--ipc=host".to_string());

        self.args = vec![
            "--model".to_string(),
            selection.model().to_string(),
            "--max_model_len=4096".to_string(),
        ];
        if !self.publish_port {
            self.args
                .extend(["--port".to_string(), self.port.to_string()]);
        }
        if self.gpu == GpuFlags::NvidiaAll {
            self.args.push("--gpu_memory_utilization=0.95".to_string());
            // Pre-Ampere GPUs have no bfloat16 support.
            if let Some(capability) = profile.gpu_compute_capability {
                if capability > 5.0 && capability < 8.0 {
                    self.args.push("--dtype=half".to_string());
                }
            }
        }

        self.readiness = ReadinessProbeSpec::Http {
            path: "/v1/models".to_string(),
        };
        Ok(())
    }

    fn configure_llama_cpp(&mut self, selection: &BackendSelection, context: &LaunchContext) {
        self.image = match self.gpu {
            GpuFlags::NvidiaAll => "ghcr.io/ggml-org/llama.cpp:server-cuda",
            GpuFlags::AmdDevices => "ghcr.io/ggml-org/llama.cpp:server-rocm",
            GpuFlags::None => "ghcr.io/ggml-org/llama.cpp:server",
        }
        .to_string();

        let cache = context.home_dir.join(".cache").join("llama.cpp");
        self.volumes.push(VolumeMount::new(
            cache.display().to_string(),
            "/root/.cache/llama.cpp",
        ));
        self.env
            .push(("LLAMA_CACHE".to_string(), "/root/.cache/llama.cpp".to_string()));

        self.args = vec![
            "-hf".to_string(),
            selection.model().to_string(),
            "--host".to_string(),
            "0.0.0.0".to_string(),
            "--port".to_string(),
            self.container_port.to_string(),
        ];
        if self.gpu != GpuFlags::None {
            self.args.extend(["-ngl".to_string(), "99".to_string()]);
        }

        self.readiness = ReadinessProbeSpec::Http {
            path: "/health".to_string(),
        };
    }

    pub fn has_gpu_flags(&self) -> bool {
        self.gpu != GpuFlags::None
    }

    /// URL for `path` on the published host port.
    pub fn local_url(&self, path: &str) -> String {
        format!("http://localhost:{}{}", self.port, path)
    }

    pub fn endpoint(&self) -> String {
        self.local_url("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hardware::{GpuInfo, OsFamily};

    fn context(token: Option<&str>) -> LaunchContext {
        LaunchContext {
            home_dir: PathBuf::from("/home/dev"),
            hf_token: token.and_then(Secret::new),
            readiness_timeout: None,
        }
    }

    fn profile(gpu: Option<(&str, Option<f32>)>, cpu: &str) -> HardwareProfile {
        HardwareProfile::new(
            OsFamily::Linux,
            cpu,
            8,
            32.0,
            gpu.map(|(model, cc)| GpuInfo {
                model: model.to_string(),
                memory_mib: 16384.0,
                compute_capability: cc,
            }),
        )
    }

    #[test]
    fn test_ollama_cpu_has_no_gpu_flags() {
        let hw = profile(None, "Intel Core i7");
        let selection = BackendSelection::new(BackendKind::Ollama, &hw, false, 11434, "");
        let spec = LaunchSpec::for_selection(&selection, &hw, &context(None)).unwrap();

        assert_eq!(spec.name, "solo-ollama");
        assert_eq!(spec.image, "ollama/ollama");
        assert!(!spec.has_gpu_flags());
        assert_eq!(spec.volumes, vec![VolumeMount::new("ollama", "/root/.ollama")]);
        assert_eq!(spec.readiness_timeout, Duration::from_secs(30));
        assert_eq!(
            spec.readiness,
            ReadinessProbeSpec::Exec {
                command: vec!["ollama".to_string(), "list".to_string()]
            }
        );
    }

    #[test]
    fn test_ollama_amd_uses_rocm_image() {
        let hw = profile(Some(("AMD Radeon RX 7900 XTX", None)), "AMD Ryzen");
        let selection = BackendSelection::new(BackendKind::Ollama, &hw, true, 11434, "");
        let spec = LaunchSpec::for_selection(&selection, &hw, &context(None)).unwrap();

        assert_eq!(spec.image, "ollama/ollama:rocm");
        assert_eq!(spec.gpu, GpuFlags::AmdDevices);
    }

    #[test]
    fn test_vllm_nvidia_on_older_gpu_uses_half_precision() {
        let hw = profile(Some(("NVIDIA Tesla T4", Some(7.5))), "Intel Xeon");
        let selection = BackendSelection::new(
            BackendKind::Vllm,
            &hw,
            true,
            8000,
            "meta-llama/Llama-3.2-1B",
        );
        let spec = LaunchSpec::for_selection(&selection, &hw, &context(Some("hf_x"))).unwrap();

        assert_eq!(spec.image, "vllm/vllm-openai:latest");
        assert_eq!(spec.gpu, GpuFlags::NvidiaAll);
        assert!(spec.args.contains(&"--dtype=half".to_string()));
        assert!(spec.args.contains(&"--gpu_memory_utilization=0.95".to_string()));
        assert_eq!(spec.secrets.len(), 1);
        assert_eq!(spec.secrets[0].name, HF_TOKEN_ENV);
        assert_eq!(
            spec.volumes[0].source,
            PathBuf::from("/home/dev/.cache/huggingface").display().to_string()
        );
        assert_eq!(
            spec.readiness,
            ReadinessProbeSpec::Http {
                path: "/v1/models".to_string()
            }
        );
        assert_eq!(spec.local_url("/v1/models"), "http://localhost:8000/v1/models");
    }

    #[test]
    fn test_vllm_ampere_keeps_default_dtype() {
        let hw = profile(Some(("NVIDIA GeForce RTX 3090", Some(8.6))), "AMD Ryzen");
        let selection = BackendSelection::new(BackendKind::Vllm, &hw, true, 8000, "m");
        let spec = LaunchSpec::for_selection(&selection, &hw, &context(None)).unwrap();

        assert!(!spec.args.contains(&"--dtype=half".to_string()));
        assert!(spec.secrets.is_empty());
    }

    #[test]
    fn test_vllm_amd_shares_host_network() {
        let hw = profile(Some(("AMD Instinct MI300X", None)), "AMD EPYC");
        let selection = BackendSelection::new(BackendKind::Vllm, &hw, true, 8000, "m");
        let spec = LaunchSpec::for_selection(&selection, &hw, &context(None)).unwrap();

        assert_eq!(spec.image, "rocm/vllm");
        assert!(!spec.publish_port);
        assert!(spec.extra_flags.contains(&"--network=host".to_string()));
    }

    #[test]
    fn test_vllm_amd_listens_on_requested_port() {
        let hw = profile(Some(("AMD Instinct MI300X", None)), "AMD EPYC");
        let selection = BackendSelection::new(BackendKind::Vllm, &hw, true, 9000, "m");
        let spec = LaunchSpec::for_selection(&selection, &hw, &context(None)).unwrap();

        let port_flag = spec.args.iter().position(|a| a == "--port").unwrap();
        assert_eq!(spec.args[port_flag + 1], "9000");
        assert_eq!(spec.local_url("/v1/models"), "http://localhost:9000/v1/models");
    }

    #[test]
    fn test_vllm_nvidia_keeps_default_server_port() {
        let hw = profile(Some(("NVIDIA GeForce RTX 4090", Some(8.9))), "AMD Ryzen 9");
        let selection = BackendSelection::new(BackendKind::Vllm, &hw, true, 9000, "m");
        let spec = LaunchSpec::for_selection(&selection, &hw, &context(None)).unwrap();

        assert!(spec.publish_port);
        assert_eq!(spec.container_port, 8000);
        assert!(!spec.args.contains(&"--port".to_string()));
    }

    #[test]
    fn test_vllm_apple_silicon_runs_on_cpu_image() {
        let hw = HardwareProfile::new(
            OsFamily::MacOS,
            "Apple M2 Pro",
            12,
            32.0,
            Some(GpuInfo {
                model: "Apple Silicon (integrated GPU)".to_string(),
                ..GpuInfo::default()
            }),
        );
        let selection = BackendSelection::new(BackendKind::Vllm, &hw, false, 8000, "m");
        let spec = LaunchSpec::for_selection(&selection, &hw, &context(None)).unwrap();

        assert_eq!(spec.image, "getsolo/vllm-arm");
        assert!(!spec.has_gpu_flags());
    }

    #[test]
    fn test_vllm_without_usable_gpu_is_unsupported() {
        let hw = profile(Some(("NVIDIA GeForce GTX 1080", Some(6.1))), "Intel Core i7");
        let selection = BackendSelection::new(BackendKind::Vllm, &hw, false, 8000, "m");
        let result = LaunchSpec::for_selection(&selection, &hw, &context(None));

        assert!(matches!(result, Err(DomainError::UnsupportedHardware(_))));
    }

    #[test]
    fn test_llama_cpp_offloads_layers_on_gpu() {
        let hw = profile(Some(("NVIDIA RTX 4070", Some(8.9))), "Intel Core i9");
        let selection = BackendSelection::new(BackendKind::LlamaCpp, &hw, true, 8081, "org/model");
        let spec = LaunchSpec::for_selection(&selection, &hw, &context(None)).unwrap();

        assert_eq!(spec.image, "ghcr.io/ggml-org/llama.cpp:server-cuda");
        assert_eq!(spec.port, 8081);
        assert_eq!(spec.container_port, 8080);
        assert!(spec.args.windows(2).any(|w| w == ["-ngl", "99"]));
        assert_eq!(spec.local_url("/health"), "http://localhost:8081/health");
        assert_eq!(spec.endpoint(), "http://localhost:8081");
    }

    #[test]
    fn test_readiness_timeout_override() {
        let hw = profile(None, "cpu");
        let selection = BackendSelection::new(BackendKind::Ollama, &hw, false, 11434, "");
        let ctx = LaunchContext {
            readiness_timeout: Some(Duration::from_millis(250)),
            ..context(None)
        };
        let spec = LaunchSpec::for_selection(&selection, &hw, &ctx).unwrap();

        assert_eq!(spec.readiness_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_custom_api_has_no_launch_spec() {
        let hw = profile(None, "cpu");
        let selection = BackendSelection::new(BackendKind::CustomApi, &hw, false, 0, "");
        assert!(LaunchSpec::for_selection(&selection, &hw, &context(None)).is_err());
    }
}
