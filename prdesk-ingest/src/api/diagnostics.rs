//! Diagnostic endpoints
//!
//! - POST /diagnostics/parse: detection + parse with nothing persisted
//! - GET /jobs/:id: ingestion job lookup

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{jobs, queries};
use crate::models::IngestionJob;
use crate::services::DryRunReport;
use crate::{ApiError, ApiResult, AppState};

/// POST /diagnostics/parse request
#[derive(Debug, Deserialize)]
pub struct DryRunRequest {
    #[serde(default)]
    pub subject: String,
    pub body_text: String,
    #[serde(default)]
    pub from: String,
}

/// GET /jobs/:id response
#[derive(Debug, Serialize)]
pub struct JobResponse {
    #[serde(flatten)]
    pub job: IngestionJob,
    /// Ids of the queries this job persisted
    pub query_ids: Vec<Uuid>,
}

pub async fn dry_run(
    State(state): State<AppState>,
    Json(request): Json<DryRunRequest>,
) -> ApiResult<Json<DryRunReport>> {
    if request.body_text.trim().is_empty() {
        return Err(ApiError::BadRequest("body_text cannot be blank".to_string()));
    }

    let report = state
        .orchestrator
        .dry_run(&request.subject, &request.body_text, &request.from)
        .await;
    Ok(Json(report))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<JobResponse>> {
    let job = jobs::load_job(&state.db, job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Ingestion job {}", job_id)))?;
    let query_ids = queries::list_for_job(&state.db, job_id)
        .await?
        .into_iter()
        .map(|query| query.id)
        .collect();

    Ok(Json(JobResponse { job, query_ids }))
}

/// Build diagnostic routes
pub fn diagnostic_routes() -> Router<AppState> {
    Router::new()
        .route("/diagnostics/parse", post(dry_run))
        .route("/jobs/:id", get(get_job))
}
