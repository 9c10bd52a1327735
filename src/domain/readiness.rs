use std::time::Duration;

/// Result of a single readiness probe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Ready,
    /// Nothing answered (connection refused, container not up yet).
    NoResponse(String),
    /// The backend answered, but not with success.
    Error(String),
}

/// Outcome of waiting for a backend to become ready.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadinessResult {
    pub ready: bool,
    pub elapsed: Duration,
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Whether any attempt got an answer from the backend.
    pub responded: bool,
}
