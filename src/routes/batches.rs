use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::batch::BatchRequest;

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmittedJob {
    pub id: Uuid,
    pub source_ref: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitBatchResponse {
    pub batch_id: Uuid,
    pub jobs: Vec<SubmittedJob>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchPending {
    pub batch_id: Uuid,
    pub status: String,
}

/// POST /api/v1/batches: accept rows and run them in the background.
pub async fn submit_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> Result<(StatusCode, Json<SubmitBatchResponse>), StatusCode> {
    if request.rows.is_empty() {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }

    let prepared = state.orchestrator.prepare(request);
    let response = SubmitBatchResponse {
        batch_id: prepared.batch_id,
        jobs: prepared
            .rows
            .iter()
            .map(|planned| SubmittedJob {
                id: planned.job_id,
                source_ref: planned.row.source_ref.clone(),
            })
            .collect(),
    };

    state.track(&prepared);
    let task = state.orchestrator.spawn_batch(prepared);
    state.watch(task);

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// GET /api/v1/batches/{batch_id}: settled result, or 202 while running.
pub async fn get_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> Response {
    if let Some(result) = state.batch_result(batch_id) {
        return Json(result).into_response();
    }
    if state.is_running(batch_id) {
        let pending = BatchPending {
            batch_id,
            status: "running".to_string(),
        };
        return (StatusCode::ACCEPTED, Json(pending)).into_response();
    }
    StatusCode::NOT_FOUND.into_response()
}
