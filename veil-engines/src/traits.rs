use async_trait::async_trait;
use std::time::Duration;
use veil_common::{Category, EngineId, EnginePayload};
use veil_http::HttpError;

/// What an adapter receives for one upstream call.
///
/// Carries only the query fields; nothing about the inbound client
/// (address, headers, cookies) ever reaches an adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineRequest {
    pub text: String,
    pub category: Category,
    pub language: Option<String>,
    pub page: u32,
    pub timeout: Duration,
}

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("unexpected payload: {0}")]
    Payload(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, EngineError::Http(e) if e.is_timeout())
    }
}

/// One configured upstream search backend.
#[async_trait]
pub trait Engine: Send + Sync {
    fn id(&self) -> &EngineId;

    /// Perform a single upstream call. Implementations must not retry.
    async fn issue(&self, request: &EngineRequest) -> Result<EnginePayload, EngineError>;
}
