use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::hardware::{GpuVendor, HardwareProfile};

/// Model-serving runtime that Solo Server can provision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Ollama,
    Vllm,
    LlamaCpp,
    CustomApi,
}

impl BackendKind {
    /// Every kind, in the order shown by `status`.
    pub const ALL: [BackendKind; 4] = [
        BackendKind::Ollama,
        BackendKind::Vllm,
        BackendKind::LlamaCpp,
        BackendKind::CustomApi,
    ];

    /// Stable container name for this kind, or `None` when no container is managed.
    pub fn handle_name(&self) -> Option<&'static str> {
        match self {
            BackendKind::Ollama => Some("solo-ollama"),
            BackendKind::Vllm => Some("solo-vllm"),
            BackendKind::LlamaCpp => Some("solo-llamacpp"),
            BackendKind::CustomApi => None,
        }
    }

    /// Host port the backend is published on unless configured otherwise.
    pub fn default_port(&self) -> u16 {
        match self {
            BackendKind::Ollama => 11434,
            BackendKind::Vllm => 8000,
            BackendKind::LlamaCpp => 8080,
            BackendKind::CustomApi => 0,
        }
    }

    /// Port the server listens on inside its container.
    pub fn container_port(&self) -> u16 {
        match self {
            BackendKind::Ollama => 11434,
            BackendKind::Vllm => 8000,
            BackendKind::LlamaCpp => 8080,
            BackendKind::CustomApi => 0,
        }
    }

    /// Model loaded at container start, for kinds that need one.
    pub fn default_model(&self) -> Option<&'static str> {
        match self {
            BackendKind::Vllm => Some("meta-llama/Llama-3.2-1B"),
            BackendKind::LlamaCpp => Some("ggml-org/gemma-3-1b-it-GGUF"),
            BackendKind::Ollama | BackendKind::CustomApi => None,
        }
    }

    /// How long to wait for readiness after a start.
    ///
    /// Kinds that download and load weights on first start get a longer window.
    pub fn readiness_timeout(&self) -> Duration {
        match self {
            BackendKind::Ollama => Duration::from_secs(30),
            BackendKind::Vllm | BackendKind::LlamaCpp => Duration::from_secs(300),
            BackendKind::CustomApi => Duration::ZERO,
        }
    }

    /// Whether the launch needs a Hugging Face token.
    pub fn wants_hf_token(&self) -> bool {
        matches!(self, BackendKind::Vllm)
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Ollama => write!(f, "Ollama"),
            BackendKind::Vllm => write!(f, "vLLM"),
            BackendKind::LlamaCpp => write!(f, "llama.cpp"),
            BackendKind::CustomApi => write!(f, "Custom API"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(BackendKind::Ollama),
            "vllm" => Ok(BackendKind::Vllm),
            "llama.cpp" | "llamacpp" | "llama-cpp" => Ok(BackendKind::LlamaCpp),
            "custom" | "custom api" | "custom-api" => Ok(BackendKind::CustomApi),
            other => Err(format!(
                "unknown backend '{}' (expected ollama, vllm, llama.cpp or custom)",
                other
            )),
        }
    }
}

/// Resolved backend choice for one start.
///
/// `use_gpu` can only be true for NVIDIA or AMD hardware whose container
/// toolkit check passed; the constructor enforces this.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendSelection {
    kind: BackendKind,
    use_gpu: bool,
    gpu_vendor: GpuVendor,
    port: u16,
    model: String,
}

impl BackendSelection {
    pub fn new(
        kind: BackendKind,
        profile: &HardwareProfile,
        toolkit_usable: bool,
        port: u16,
        model: impl Into<String>,
    ) -> Self {
        let use_gpu = toolkit_usable && profile.gpu_vendor.supports_container_gpu();
        Self {
            kind,
            use_gpu,
            gpu_vendor: profile.gpu_vendor,
            port,
            model: model.into(),
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn use_gpu(&self) -> bool {
        self.use_gpu
    }

    /// GPU vendor driving the launch flags, or `None` when running on CPU.
    pub fn gpu_vendor(&self) -> Option<GpuVendor> {
        self.use_gpu.then_some(self.gpu_vendor)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}
