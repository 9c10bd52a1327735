use std::process::Command;
use std::sync::OnceLock;

use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tracing::{debug, info};

use crate::domain::hardware::UNKNOWN;
use crate::domain::{GpuInfo, GpuVendor, HardwareProfile, OsFamily};
use crate::ports::HardwareDetector;

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Hardware detector backed by sysinfo for CPU and memory and by vendor tools
/// (`nvidia-smi`, `rocm-smi`, `lspci`, `wmic`, `system_profiler`) for the GPU.
///
/// Results are cached for the lifetime of the detector.
pub struct SystemHardwareDetector {
    profile: OnceLock<HardwareProfile>,
}

impl SystemHardwareDetector {
    pub fn new() -> Self {
        Self {
            profile: OnceLock::new(),
        }
    }

    fn detect_hardware() -> HardwareProfile {
        let os = OsFamily::detect();
        let sys = System::new_with_specifics(
            RefreshKind::new()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );

        let cpu_model = sys
            .cpus()
            .first()
            .map(|cpu| cpu.brand().to_string())
            .unwrap_or_default();
        // Logical processors; SMT layouts differ too much across vendors to
        // report physical cores reliably.
        let cpu_cores = sys.cpus().len() as u32;
        let memory_gib = sys.total_memory() as f64 / BYTES_PER_GIB;
        let gpu = detect_gpu(os);

        let profile = HardwareProfile::new(os, cpu_model, cpu_cores, memory_gib, gpu);
        info!(
            os = %profile.os,
            cpu = %profile.cpu_model,
            cores = profile.cpu_cores,
            memory_gib = profile.memory_gib,
            gpu_vendor = %profile.gpu_vendor,
            gpu = %profile.gpu_model,
            backend = %profile.recommended_backend,
            "Hardware profile detected"
        );
        profile
    }
}

impl Default for SystemHardwareDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareDetector for SystemHardwareDetector {
    fn detect(&self) -> HardwareProfile {
        self.profile.get_or_init(Self::detect_hardware).clone()
    }

    fn host_id(&self) -> String {
        System::host_name().unwrap_or_else(|| UNKNOWN.to_string())
    }
}

/// Stdout of a successful probe command, or `None` if it is missing or failed.
fn probe(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        debug!(program = program, code = ?output.status.code(), "GPU probe failed");
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn detect_gpu(os: OsFamily) -> Option<GpuInfo> {
    match os {
        OsFamily::Linux => probe(
            "nvidia-smi",
            &[
                "--query-gpu=name,memory.total,compute_cap",
                "--format=csv,noheader,nounits",
            ],
        )
        .and_then(|out| parse_nvidia_smi(&out))
        .or_else(|| {
            probe("rocm-smi", &["--showproductname"]).and_then(|out| parse_rocm_smi(&out))
        })
        .or_else(|| probe("lspci", &[]).and_then(|out| parse_lspci(&out))),
        OsFamily::Windows => probe(
            "nvidia-smi",
            &[
                "--query-gpu=name,memory.total,compute_cap",
                "--format=csv,noheader,nounits",
            ],
        )
        .and_then(|out| parse_nvidia_smi(&out))
        .or_else(|| {
            probe("wmic", &["path", "win32_VideoController", "get", "Name"])
                .and_then(|out| parse_wmic(&out))
        }),
        OsFamily::MacOS if cfg!(target_arch = "aarch64") => Some(GpuInfo {
            model: "Apple Silicon (integrated GPU)".to_string(),
            ..GpuInfo::default()
        }),
        OsFamily::MacOS => probe("system_profiler", &["SPDisplaysDataType"])
            .and_then(|out| parse_system_profiler(&out)),
        OsFamily::Unknown => None,
    }
}

/// Parse `nvidia-smi --query-gpu=name,memory.total,compute_cap --format=csv,noheader,nounits`.
///
/// Only the first GPU is reported.
fn parse_nvidia_smi(stdout: &str) -> Option<GpuInfo> {
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    let mut fields = line.split(',').map(str::trim);
    let model = fields.next().filter(|m| !m.is_empty())?.to_string();
    let memory_mib = fields.next().and_then(|m| m.parse().ok()).unwrap_or(0.0);
    let compute_capability = fields.next().and_then(|c| c.parse().ok());
    Some(GpuInfo {
        model,
        memory_mib,
        compute_capability,
    })
}

/// Parse `rocm-smi --showproductname`, e.g. `GPU[0] : Card series: Navi 31 [Radeon RX 7900 XTX]`.
fn parse_rocm_smi(stdout: &str) -> Option<GpuInfo> {
    let line = stdout.lines().find(|l| {
        let lower = l.to_lowercase();
        lower.contains("card series") || lower.contains("card model")
    })?;
    let value = line.rsplit(':').next()?.trim();
    if value.is_empty() {
        return None;
    }
    let model = if GpuVendor::from_model_name(value) == GpuVendor::Amd {
        value.to_string()
    } else {
        format!("AMD {}", value)
    };
    Some(GpuInfo {
        model,
        ..GpuInfo::default()
    })
}

/// Pick a display adapter from `lspci`, preferring discrete GPUs.
fn parse_lspci(stdout: &str) -> Option<GpuInfo> {
    let adapters: Vec<&str> = stdout
        .lines()
        .filter_map(|line| {
            let (_, rest) = line
                .split_once("VGA compatible controller: ")
                .or_else(|| line.split_once("3D controller: "))
                .or_else(|| line.split_once("Display controller: "))?;
            Some(rest.trim())
        })
        .collect();
    pick_adapter(&adapters)
}

/// Parse `wmic path win32_VideoController get Name`.
fn parse_wmic(stdout: &str) -> Option<GpuInfo> {
    let adapters: Vec<&str> = stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && *l != "Name")
        .collect();
    pick_adapter(&adapters)
}

/// Parse `system_profiler SPDisplaysDataType` on Intel Macs.
fn parse_system_profiler(stdout: &str) -> Option<GpuInfo> {
    let adapters: Vec<&str> = stdout
        .lines()
        .filter_map(|l| l.trim().strip_prefix("Chipset Model:"))
        .map(str::trim)
        .collect();
    pick_adapter(&adapters)
}

fn pick_adapter(adapters: &[&str]) -> Option<GpuInfo> {
    let chosen = adapters
        .iter()
        .find(|a| GpuVendor::from_model_name(a).supports_container_gpu())
        .or_else(|| adapters.first())?;
    Some(GpuInfo {
        model: chosen.to_string(),
        ..GpuInfo::default()
    })
}
