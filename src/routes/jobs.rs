use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::{AppState, JobLookup};

/// A job whose batch is running but which has not been admitted yet.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobPending {
    pub job_id: Uuid,
    pub batch_id: Uuid,
    pub status: String,
}

/// GET /api/v1/jobs/{job_id}: latest snapshot of a job, or 202 while it
/// waits for a slot in its batch.
pub async fn get_job(State(state): State<AppState>, Path(job_id): Path<Uuid>) -> Response {
    match state.job(job_id) {
        Some(JobLookup::Snapshot(job)) => Json(job).into_response(),
        Some(JobLookup::Pending { batch_id }) => {
            let pending = JobPending {
                job_id,
                batch_id,
                status: "pending".to_string(),
            };
            (StatusCode::ACCEPTED, Json(pending)).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
