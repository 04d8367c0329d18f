//! Routing error taxonomy.
//!
//! Per-attempt failures ([`ForwardError`]) are recovered inside the forwarder
//! by retrying elsewhere; only [`RouterError`] reaches the caller.

use std::time::Duration;

use axum::http::StatusCode;

use crate::load_balancer::SelectionError;

/// Why a single backend attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("backend did not respond within {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(#[source] hyper_util::client::legacy::Error),

    #[error("backend answered with failure status {0}")]
    FailureStatus(StatusCode),
}

impl ForwardError {
    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::Timeout(_) => "timeout",
            ForwardError::Transport(_) => "transport",
            ForwardError::FailureStatus(_) => "failure_status",
        }
    }
}

/// Errors surfaced to the client.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("no eligible backend available")]
    AllBackendsUnavailable,

    #[error("forwarding failed after {attempts} attempt(s): {last}")]
    BackendForwardingFailed {
        attempts: u32,
        #[source]
        last: ForwardError,
    },

    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("failed to read request body: {0}")]
    InvalidRequestBody(#[source] axum::Error),

    #[error("request cannot be forwarded: {0}")]
    InvalidUpstreamRequest(#[source] axum::http::Error),
}

impl RouterError {
    /// Stable machine-readable code used in error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            RouterError::AllBackendsUnavailable => "all_backends_unavailable",
            RouterError::BackendForwardingFailed { .. } => "backend_forwarding_failed",
            RouterError::BodyTooLarge { .. } => "payload_too_large",
            RouterError::InvalidRequestBody(_) => "invalid_request_body",
            RouterError::InvalidUpstreamRequest(_) => "invalid_upstream_request",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RouterError::AllBackendsUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            RouterError::BackendForwardingFailed { .. } => StatusCode::BAD_GATEWAY,
            RouterError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            RouterError::InvalidRequestBody(_) | RouterError::InvalidUpstreamRequest(_) => {
                StatusCode::BAD_REQUEST
            }
        }
    }
}

impl From<SelectionError> for RouterError {
    fn from(err: SelectionError) -> Self {
        match err {
            SelectionError::AllBackendsUnavailable => RouterError::AllBackendsUnavailable,
        }
    }
}
