use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::backend::BackendKind;
use super::hardware::HardwareProfile;
use super::secret::Secret;

/// Credential key for the Hugging Face token.
pub const HUGGING_FACE: &str = "hugging_face";

/// Upper bound for configured readiness timeouts.
pub const MAX_READINESS_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Enable file logging with rotation.
    pub file_logging: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_logging: true,
        }
    }
}

/// Container engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine CLI binary.
    pub binary: String,
    /// How long to wait for the engine after trying to start it.
    pub start_timeout_secs: u64,
    /// Delay between engine availability checks.
    pub start_poll_interval_secs: u64,
    /// Delay between readiness probe attempts.
    pub readiness_poll_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: "docker".to_string(),
            start_timeout_secs: 60,
            start_poll_interval_secs: 5,
            readiness_poll_interval_ms: 1000,
        }
    }
}

/// A cached hardware profile and when it was probed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedProfile {
    pub detected_at: DateTime<Utc>,
    pub profile: HardwareProfile,
}

/// Host-keyed hardware profile cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    /// Entries older than this are probed again. 0 disables the cache.
    pub cache_ttl_hours: u64,
    pub profiles: BTreeMap<String, CachedProfile>,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            cache_ttl_hours: 168,
            profiles: BTreeMap::new(),
        }
    }
}

impl HardwareConfig {
    /// Cached profile for `host`, if one exists and is younger than the TTL.
    pub fn fresh_profile(&self, host: &str, now: DateTime<Utc>) -> Option<&HardwareProfile> {
        if self.cache_ttl_hours == 0 {
            return None;
        }
        let entry = self.profiles.get(host)?;
        let age = now.signed_duration_since(entry.detected_at);
        // A timestamp from the future means the clock moved; treat as stale.
        if age < chrono::Duration::zero() {
            return None;
        }
        // TTLs beyond what a TimeDelta can hold never expire.
        let expired = i64::try_from(self.cache_ttl_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .is_some_and(|ttl| age >= ttl);
        (!expired).then_some(&entry.profile)
    }

    pub fn remember(&mut self, host: &str, profile: HardwareProfile, now: DateTime<Utc>) {
        self.profiles.insert(
            host.to_string(),
            CachedProfile {
                detected_at: now,
                profile,
            },
        );
    }
}

/// Per-backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSettings {
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Overrides the kind's readiness timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_timeout_secs: Option<f64>,
}

impl BackendSettings {
    fn for_kind(kind: BackendKind) -> Self {
        Self {
            port: kind.default_port(),
            model: kind.default_model().map(String::from),
            readiness_timeout_secs: None,
        }
    }

    /// Configured readiness timeout, capped at [`MAX_READINESS_TIMEOUT`].
    pub fn readiness_timeout(&self) -> Option<Duration> {
        let secs = self.readiness_timeout_secs.filter(|secs| *secs > 0.0)?;
        let timeout = Duration::try_from_secs_f64(secs).unwrap_or(MAX_READINESS_TIMEOUT);
        Some(timeout.min(MAX_READINESS_TIMEOUT))
    }
}

/// Settings for each container-managed backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendsConfig {
    pub ollama: BackendSettings,
    pub vllm: BackendSettings,
    pub llama_cpp: BackendSettings,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            ollama: BackendSettings::for_kind(BackendKind::Ollama),
            vllm: BackendSettings::for_kind(BackendKind::Vllm),
            llama_cpp: BackendSettings::for_kind(BackendKind::LlamaCpp),
        }
    }
}

impl BackendsConfig {
    /// Settings for `kind`. Custom API backends have no container settings.
    pub fn get(&self, kind: BackendKind) -> Option<&BackendSettings> {
        match kind {
            BackendKind::Ollama => Some(&self.ollama),
            BackendKind::Vllm => Some(&self.vllm),
            BackendKind::LlamaCpp => Some(&self.llama_cpp),
            BackendKind::CustomApi => None,
        }
    }
}

/// Externally managed OpenAI-compatible endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomApiConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "Secret::deserialize_optional"
    )]
    pub api_key: Option<Secret>,
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub engine: EngineConfig,
    pub hardware: HardwareConfig,
    pub backends: BackendsConfig,
    /// Saved credentials keyed by provider name. Blank entries are dropped.
    #[serde(deserialize_with = "Secret::deserialize_map")]
    pub credentials: BTreeMap<String, Secret>,
    pub custom_api: CustomApiConfig,
}

impl AppConfig {
    /// Create a new AppConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }
}
