//! Error taxonomy for the pipeline layer.
//!
//! Record-level problems (`MalformedSourceData`) are recovered where they
//! occur and counted; request-level problems are retried by the fetch layer;
//! `SourceUnavailable` drives orchestrator fallback and only surfaces to the
//! caller when every configured source for a target has failed.

use crate::store::StoreError;

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// A network-level failure that may succeed on retry.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// The upstream answered HTTP 429; retried once after a cooldown.
    #[error("rate limited by upstream")]
    RateLimited,

    /// Non-retryable HTTP failure.
    #[error("upstream returned status {status}")]
    Http { status: u16, body: String },

    /// A record or payload that cannot be interpreted. Skipped and counted,
    /// never fatal for a batch.
    #[error("malformed source data: {0}")]
    MalformedSourceData(String),

    /// A whole source failed (probe, empty result, or unrecoverable error);
    /// the orchestrator advances to the next source in priority order.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// The record already exists under its canonical key. Treated as a
    /// skip, not a failure.
    #[error("record already exists")]
    PersistenceConflict,

    #[error("cache error: {0}")]
    Cache(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The run-level cancellation flag was raised.
    #[error("operation cancelled")]
    Cancelled,
}

impl PipelineError {
    /// True when the fetch layer should retry with backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::TransientNetwork(_) => true,
            PipelineError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<plenario_api::Error> for PipelineError {
    fn from(e: plenario_api::Error) -> Self {
        match e {
            plenario_api::Error::HttpStatus { status: 429, .. } => PipelineError::RateLimited,
            plenario_api::Error::HttpStatus { status, body } => {
                PipelineError::Http { status, body }
            }
            plenario_api::Error::RequestFailed => {
                PipelineError::TransientNetwork("request failed".to_string())
            }
            plenario_api::Error::Decode(msg) => PipelineError::MalformedSourceData(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability() {
        assert!(PipelineError::TransientNetwork("timeout".into()).is_retryable());
        assert!(PipelineError::Http {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!PipelineError::Http {
            status: 404,
            body: String::new()
        }
        .is_retryable());
        assert!(!PipelineError::RateLimited.is_retryable());
        assert!(!PipelineError::MalformedSourceData("x".into()).is_retryable());
    }

    #[test]
    fn api_429_maps_to_rate_limited() {
        let e: PipelineError = plenario_api::Error::HttpStatus {
            status: 429,
            body: "slow down".into(),
        }
        .into();
        assert!(matches!(e, PipelineError::RateLimited));
    }
}
