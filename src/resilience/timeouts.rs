//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap backend calls with a per-attempt deadline
//! - Cancel the in-flight call when the deadline passes
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; dropping the future cancels the call
//! - Expiry is an ordinary failed attempt, distinct from transport errors

use std::future::Future;
use std::time::Duration;

use crate::error::ForwardError;

/// Run `call` with a deadline of `limit`.
pub async fn with_deadline<T, F>(limit: Duration, call: F) -> Result<T, ForwardError>
where
    F: Future<Output = Result<T, hyper_util::client::legacy::Error>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(ForwardError::Transport(e)),
        Err(_) => Err(ForwardError::Timeout(limit)),
    }
}
