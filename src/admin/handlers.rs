use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::BackendConfig;
use crate::http::response::ErrorBody;
use crate::http::server::AppState;
use crate::load_balancer::Backend;

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub backends: usize,
    pub selectable: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BackendStatus {
    pub id: String,
    pub address: String,
    pub load: f64,
    pub state: String,
    pub consecutive_failures: u32,
    /// Remaining cool-down, when unavailable.
    pub unavailable_for_ms: Option<u64>,
}

impl BackendStatus {
    fn of(backend: &Backend, now: Instant) -> Self {
        Self {
            id: backend.id.clone(),
            address: backend.address.to_string(),
            load: backend.load,
            state: backend.state.as_str().to_string(),
            consecutive_failures: backend.consecutive_failures,
            unavailable_for_ms: backend
                .unavailable_until
                .map(|until| until.saturating_duration_since(now).as_millis() as u64),
        }
    }
}

type AdminError = (StatusCode, Json<ErrorBody>);

fn admin_error(status: StatusCode, error: &str, message: String) -> AdminError {
    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
            message,
        }),
    )
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let snapshot = state.registry.snapshot();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "operational".to_string(),
        backends: snapshot.len(),
        selectable: snapshot.iter().filter(|b| b.is_selectable()).count(),
    })
}

pub async fn get_backends(State(state): State<AppState>) -> Json<Vec<BackendStatus>> {
    let now = Instant::now();
    let snapshot = state.registry.snapshot();
    Json(snapshot.iter().map(|b| BackendStatus::of(b, now)).collect())
}

pub async fn add_backend(
    State(state): State<AppState>,
    Json(config): Json<BackendConfig>,
) -> Result<(StatusCode, Json<BackendStatus>), AdminError> {
    if config.id.trim().is_empty() {
        return Err(admin_error(
            StatusCode::BAD_REQUEST,
            "invalid_backend",
            "backend id must not be empty".to_string(),
        ));
    }

    let backend = Backend::parse(config.id.clone(), &config.address).map_err(|e| {
        admin_error(StatusCode::BAD_REQUEST, "invalid_backend", e.to_string())
    })?;
    let status = BackendStatus::of(&backend, Instant::now());

    if !state.register(backend) {
        return Err(admin_error(
            StatusCode::CONFLICT,
            "duplicate_backend",
            format!("backend '{}' is already registered", config.id),
        ));
    }
    Ok((StatusCode::CREATED, Json(status)))
}

pub async fn remove_backend(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    state.deregister(&id);
    StatusCode::NO_CONTENT
}
