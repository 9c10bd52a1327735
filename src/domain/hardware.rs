use serde::{Deserialize, Serialize};

/// Sentinel used for fields that could not be probed.
pub const UNKNOWN: &str = "Unknown";

/// Operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OsFamily {
    Linux,
    Windows,
    MacOS,
    Unknown,
}

impl OsFamily {
    /// Detect the current operating system.
    pub fn detect() -> Self {
        match std::env::consts::OS {
            "linux" => OsFamily::Linux,
            "windows" => OsFamily::Windows,
            "macos" => OsFamily::MacOS,
            _ => OsFamily::Unknown,
        }
    }
}

impl std::fmt::Display for OsFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OsFamily::Linux => write!(f, "Linux"),
            OsFamily::Windows => write!(f, "Windows"),
            OsFamily::MacOS => write!(f, "macOS"),
            OsFamily::Unknown => write!(f, "Unknown"),
        }
    }
}

/// GPU vendor, as inferred from the GPU model string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GpuVendor {
    None,
    Nvidia,
    Amd,
    IntelGpu,
    AppleSilicon,
    Unknown,
}

/// Vendor keywords in match priority order.
const VENDOR_KEYWORDS: &[(GpuVendor, &[&str])] = &[
    (GpuVendor::Nvidia, &["nvidia", "geforce", "quadro", "tesla"]),
    (GpuVendor::Amd, &["amd", "radeon", "instinct"]),
    (GpuVendor::IntelGpu, &["intel"]),
    (GpuVendor::AppleSilicon, &["apple"]),
];

impl GpuVendor {
    /// Infer the vendor from a GPU model string.
    ///
    /// Matching is case-insensitive and follows a fixed priority, so a string
    /// mentioning several vendors resolves to the first one in the table.
    /// An empty model (or the literal "None") means no GPU was found.
    pub fn from_model_name(model: &str) -> Self {
        let normalized = model.trim().to_lowercase();
        if normalized.is_empty() || normalized == "none" {
            return GpuVendor::None;
        }

        VENDOR_KEYWORDS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| normalized.contains(k)))
            .map(|(vendor, _)| *vendor)
            .unwrap_or(GpuVendor::Unknown)
    }

    /// Whether containers can be given access to this vendor's GPUs.
    pub fn supports_container_gpu(&self) -> bool {
        matches!(self, GpuVendor::Nvidia | GpuVendor::Amd)
    }
}

impl std::fmt::Display for GpuVendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpuVendor::None => write!(f, "None"),
            GpuVendor::Nvidia => write!(f, "NVIDIA"),
            GpuVendor::Amd => write!(f, "AMD"),
            GpuVendor::IntelGpu => write!(f, "Intel"),
            GpuVendor::AppleSilicon => write!(f, "Apple Silicon"),
            GpuVendor::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Compute backend recommended for the detected hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComputeBackend {
    Cpu,
    Cuda,
    Hip,
    OpenClSycl,
    Metal,
}

impl From<GpuVendor> for ComputeBackend {
    fn from(vendor: GpuVendor) -> Self {
        match vendor {
            GpuVendor::Nvidia => ComputeBackend::Cuda,
            GpuVendor::Amd => ComputeBackend::Hip,
            GpuVendor::IntelGpu => ComputeBackend::OpenClSycl,
            GpuVendor::AppleSilicon => ComputeBackend::Metal,
            GpuVendor::None | GpuVendor::Unknown => ComputeBackend::Cpu,
        }
    }
}

impl std::fmt::Display for ComputeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComputeBackend::Cpu => write!(f, "CPU"),
            ComputeBackend::Cuda => write!(f, "CUDA"),
            ComputeBackend::Hip => write!(f, "HIP"),
            ComputeBackend::OpenClSycl => write!(f, "OpenCL/SYCL"),
            ComputeBackend::Metal => write!(f, "Metal"),
        }
    }
}

/// Raw GPU facts gathered by a probe, before vendor inference.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpuInfo {
    pub model: String,
    pub memory_mib: f64,
    /// CUDA compute capability, e.g. 8.6. Only reported for NVIDIA GPUs.
    pub compute_capability: Option<f32>,
}

/// Hardware profile of the host.
///
/// Computed once per invocation and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareProfile {
    pub os: OsFamily,
    pub cpu_model: String,
    pub cpu_cores: u32,
    pub memory_gib: f64,
    pub gpu_vendor: GpuVendor,
    pub gpu_model: String,
    pub gpu_memory_mib: f64,
    #[serde(default)]
    pub gpu_compute_capability: Option<f32>,
    pub recommended_backend: ComputeBackend,
}

impl HardwareProfile {
    /// Assemble a profile, deriving the vendor and backend from the GPU model.
    ///
    /// Out-of-range values degrade to sentinels instead of failing.
    pub fn new(
        os: OsFamily,
        cpu_model: impl Into<String>,
        cpu_cores: u32,
        memory_gib: f64,
        gpu: Option<GpuInfo>,
    ) -> Self {
        let cpu_model = cpu_model.into();
        let cpu_model = if cpu_model.trim().is_empty() {
            UNKNOWN.to_string()
        } else {
            cpu_model.trim().to_string()
        };

        let gpu = gpu.unwrap_or_default();
        let gpu_vendor = GpuVendor::from_model_name(&gpu.model);
        let gpu_model = if gpu_vendor == GpuVendor::None {
            "None".to_string()
        } else {
            gpu.model.trim().to_string()
        };

        Self {
            os,
            cpu_model,
            cpu_cores: cpu_cores.max(1),
            memory_gib: non_negative(memory_gib),
            gpu_vendor,
            gpu_model,
            gpu_memory_mib: non_negative(gpu.memory_mib),
            gpu_compute_capability: gpu.compute_capability,
            recommended_backend: ComputeBackend::from(gpu_vendor),
        }
    }

    /// Apple-silicon host, whether detected through the GPU or the CPU brand.
    pub fn is_apple_silicon(&self) -> bool {
        self.gpu_vendor == GpuVendor::AppleSilicon || self.cpu_model.starts_with("Apple")
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_from_model_name() {
        assert_eq!(
            GpuVendor::from_model_name("NVIDIA GeForce RTX 4090"),
            GpuVendor::Nvidia
        );
        assert_eq!(
            GpuVendor::from_model_name("Advanced Micro Devices, Inc. [AMD/ATI] Navi 31"),
            GpuVendor::Amd
        );
        assert_eq!(
            GpuVendor::from_model_name("Intel Corporation UHD Graphics 620"),
            GpuVendor::IntelGpu
        );
        assert_eq!(
            GpuVendor::from_model_name("Apple Silicon (integrated GPU)"),
            GpuVendor::AppleSilicon
        );
        assert_eq!(GpuVendor::from_model_name("Matrox G200eW"), GpuVendor::Unknown);
        assert_eq!(GpuVendor::from_model_name(""), GpuVendor::None);
        assert_eq!(GpuVendor::from_model_name("None"), GpuVendor::None);
    }

    #[test]
    fn test_vendor_priority_prefers_nvidia() {
        // Hybrid laptops sometimes report both GPUs in one string.
        assert_eq!(
            GpuVendor::from_model_name("Intel Iris Xe + NVIDIA GeForce RTX 3050"),
            GpuVendor::Nvidia
        );
    }

    #[test]
    fn test_backend_follows_vendor() {
        assert_eq!(ComputeBackend::from(GpuVendor::Nvidia), ComputeBackend::Cuda);
        assert_eq!(ComputeBackend::from(GpuVendor::Amd), ComputeBackend::Hip);
        assert_eq!(
            ComputeBackend::from(GpuVendor::IntelGpu),
            ComputeBackend::OpenClSycl
        );
        assert_eq!(ComputeBackend::from(GpuVendor::AppleSilicon), ComputeBackend::Metal);
        assert_eq!(ComputeBackend::from(GpuVendor::Unknown), ComputeBackend::Cpu);
    }

    #[test]
    fn test_profile_degrades_to_sentinels() {
        let profile = HardwareProfile::new(OsFamily::Linux, "  ", 0, f64::NAN, None);

        assert_eq!(profile.cpu_model, UNKNOWN);
        assert_eq!(profile.cpu_cores, 1);
        assert_eq!(profile.memory_gib, 0.0);
        assert_eq!(profile.gpu_vendor, GpuVendor::None);
        assert_eq!(profile.gpu_model, "None");
        assert_eq!(profile.recommended_backend, ComputeBackend::Cpu);
    }

    #[test]
    fn test_profile_with_nvidia_gpu() {
        let profile = HardwareProfile::new(
            OsFamily::Linux,
            "AMD Ryzen 9 7950X",
            16,
            64.0,
            Some(GpuInfo {
                model: "NVIDIA GeForce RTX 3090".to_string(),
                memory_mib: 24576.0,
                compute_capability: Some(8.6),
            }),
        );

        assert_eq!(profile.gpu_vendor, GpuVendor::Nvidia);
        assert_eq!(profile.recommended_backend, ComputeBackend::Cuda);
        assert_eq!(profile.gpu_memory_mib, 24576.0);
        assert!(!profile.is_apple_silicon());
    }
}
