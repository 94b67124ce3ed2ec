use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub active_jobs: usize,
    pub running_batches: usize,
    /// False when the configured policy file failed to load and the built-in
    /// policy is in use.
    pub policy_loaded: bool,
}

/// GET /health: liveness plus pipeline load.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let response = HealthResponse {
        status: if state.policy_loaded {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            active_jobs: state.orchestrator.context().registry.active_count(),
            running_batches: state.running_batches(),
            policy_loaded: state.policy_loaded,
        },
    };

    (StatusCode::OK, Json(response))
}
