use std::sync::Arc;

use reqwest::{Response, StatusCode};
use thiserror::Error;

/// Failure surfaced to callers of the marketplace API.
///
/// Cloneable so a single refresh failure can be handed to every queued waiter.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("request failed with status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("transport error: {0}")]
    Transport(#[source] Arc<reqwest_middleware::Error>),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("invalid header value: {0}")]
    InvalidHeader(String),

    #[error("token refresh was abandoned before it completed")]
    RefreshAborted,
}

pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    /// Consumes an error response, keeping its status and body for the caller to inspect.
    pub async fn from_response(response: Response) -> Self {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        ApiError::Status { status, body }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(err) => err.status(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }
}

impl From<reqwest_middleware::Error> for ApiError {
    fn from(err: reqwest_middleware::Error) -> Self {
        match err {
            // Errors raised by our own middleware travel wrapped in anyhow; unwrap them.
            reqwest_middleware::Error::Middleware(inner) => match inner.downcast::<ApiError>() {
                Ok(api_error) => api_error,
                Err(other) => ApiError::Transport(Arc::new(reqwest_middleware::Error::Middleware(other))),
            },
            other => ApiError::Transport(Arc::new(other)),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Transport(Arc::new(reqwest_middleware::Error::Reqwest(err)))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}

impl From<ApiError> for reqwest_middleware::Error {
    fn from(err: ApiError) -> Self {
        reqwest_middleware::Error::Middleware(anyhow::Error::new(err))
    }
}
