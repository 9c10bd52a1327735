use async_trait::async_trait;

use crate::domain::DomainError;

/// HTTP client port used by readiness probes.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// GET `url` and return the response status code.
    ///
    /// Any status, including 4xx/5xx, is `Ok`. `Err` means nothing answered:
    /// connection refused, reset, or timed out.
    async fn get_status(&self, url: &str) -> Result<u16, DomainError>;
}
