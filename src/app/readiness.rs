use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::domain::{LaunchSpec, ProbeOutcome, ReadinessProbeSpec, ReadinessResult};
use crate::ports::{ContainerEngine, HttpClient};

/// Stderr fragments meaning the server inside the container is not up yet.
const NOT_UP_MARKERS: &[&str] = &[
    "is not running",
    "no such container",
    "could not connect",
    "connection refused",
];

/// A single readiness check against a started backend.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn probe(&self) -> ProbeOutcome;
}

/// Runs a command inside the container; exit code 0 means ready.
pub struct ExecProbe {
    engine: Arc<dyn ContainerEngine>,
    name: String,
    command: Vec<String>,
}

impl ExecProbe {
    pub fn new(engine: Arc<dyn ContainerEngine>, name: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            engine,
            name: name.into(),
            command,
        }
    }
}

#[async_trait]
impl ReadinessProbe for ExecProbe {
    async fn probe(&self) -> ProbeOutcome {
        match self.engine.exec(&self.name, &self.command).await {
            Ok(output) if output.success => ProbeOutcome::Ready,
            Ok(output) => {
                let detail = output.diagnostic();
                let lower = detail.to_lowercase();
                if NOT_UP_MARKERS.iter().any(|m| lower.contains(m)) {
                    ProbeOutcome::NoResponse(detail)
                } else {
                    ProbeOutcome::Error(detail)
                }
            }
            Err(e) => ProbeOutcome::NoResponse(e.to_string()),
        }
    }
}

/// GETs a URL on the published port; any 2xx status means ready.
pub struct HttpProbe {
    http: Arc<dyn HttpClient>,
    url: String,
}

impl HttpProbe {
    pub fn new(http: Arc<dyn HttpClient>, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ReadinessProbe for HttpProbe {
    async fn probe(&self) -> ProbeOutcome {
        match self.http.get_status(&self.url).await {
            Ok(status) if (200..300).contains(&status) => ProbeOutcome::Ready,
            Ok(status) => ProbeOutcome::Error(format!("HTTP {} from {}", status, self.url)),
            Err(e) => ProbeOutcome::NoResponse(e.to_string()),
        }
    }
}

/// Build the probe a launch spec asks for.
pub fn probe_for(
    spec: &LaunchSpec,
    engine: Arc<dyn ContainerEngine>,
    http: Arc<dyn HttpClient>,
) -> Box<dyn ReadinessProbe> {
    match &spec.readiness {
        ReadinessProbeSpec::Exec { command } => {
            Box::new(ExecProbe::new(engine, spec.name.clone(), command.clone()))
        }
        ReadinessProbeSpec::Http { path } => Box::new(HttpProbe::new(http, spec.local_url(path))),
    }
}

/// Polls a readiness probe at a fixed interval under a hard time bound.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessPoller {
    interval: Duration,
}

impl ReadinessPoller {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Probe until ready or until `timeout` elapses.
    ///
    /// Always returns within `timeout + interval`, even if a probe attempt
    /// hangs. Never rolls anything back; the caller decides what to undo.
    pub async fn wait_ready(&self, probe: &dyn ReadinessProbe, timeout: Duration) -> ReadinessResult {
        let started = Instant::now();
        let mut attempts = 0u32;
        let mut last_error: Option<String> = None;
        let mut responded = false;

        let polling = async {
            loop {
                attempts += 1;
                match probe.probe().await {
                    ProbeOutcome::Ready => return true,
                    ProbeOutcome::NoResponse(e) => {
                        debug!(attempt = attempts, error = %e, "Backend not responding yet");
                        last_error = Some(e);
                    }
                    ProbeOutcome::Error(e) => {
                        debug!(attempt = attempts, error = %e, "Backend answered with an error");
                        responded = true;
                        last_error = Some(e);
                    }
                }
                if started.elapsed() + self.interval > timeout {
                    return false;
                }
                tokio::time::sleep(self.interval).await;
            }
        };

        let ready = tokio::time::timeout(timeout.saturating_add(self.interval), polling)
            .await
            .unwrap_or(false);

        let result = ReadinessResult {
            ready,
            elapsed: started.elapsed(),
            attempts,
            last_error: if ready {
                None
            } else {
                last_error.or_else(|| Some("probe did not complete in time".to_string()))
            },
            responded,
        };

        if result.ready {
            info!(attempts = result.attempts, elapsed = ?result.elapsed, "Backend ready");
        } else {
            warn!(
                attempts = result.attempts,
                elapsed = ?result.elapsed,
                responded = result.responded,
                last_error = ?result.last_error,
                "Backend did not become ready"
            );
        }
        result
    }
}
