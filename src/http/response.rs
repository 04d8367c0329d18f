//! Response handling.
//!
//! # Responsibilities
//! - Hand backend responses back untouched (status, headers, streamed body)
//! - Map router errors to status codes with a structured JSON body
//!
//! # Design Decisions
//! - Streaming responses avoid buffering the backend body
//! - Backend application errors are passed through, never rewritten

use axum::body::Body;
use axum::http::Response as HttpResponse;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hyper::body::Incoming;
use serde::{Deserialize, Serialize};

use crate::error::RouterError;

/// JSON body of every router-generated error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl IntoResponse for RouterError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code().to_string(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Wrap a backend response for the client without touching it.
pub fn passthrough(response: HttpResponse<Incoming>) -> Response {
    response.map(Body::new)
}
