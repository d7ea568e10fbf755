//! Review queue handlers
//!
//! - GET /agencies/:agency_id/queries/pending
//! - GET /queries/:id
//! - POST /queries/:id/review
//! - POST /queries/:id/assign

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::queries;
use crate::models::{ParseEvidence, ParsedQuery, QueryStatus};
use crate::{ApiError, ApiResult, AppState};

/// GET /agencies/:agency_id/queries/pending response
#[derive(Debug, Serialize)]
pub struct PendingQueriesResponse {
    pub agency_id: String,
    pub count: usize,
    pub queries: Vec<ParsedQuery>,
}

/// GET /queries/:id response
#[derive(Debug, Serialize)]
pub struct QueryDetailResponse {
    #[serde(flatten)]
    pub query: ParsedQuery,
    pub evidence: Vec<ParseEvidence>,
}

/// POST /queries/:id/review request
#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    /// `approved` or `discarded`
    pub decision: String,
    pub reviewer: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// POST /queries/:id/assign request
#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub client_ids: Vec<String>,
    pub assigned_by: String,
}

pub async fn list_pending(
    State(state): State<AppState>,
    Path(agency_id): Path<String>,
) -> ApiResult<Json<PendingQueriesResponse>> {
    let queries = queries::list_pending(&state.db, &agency_id).await?;

    Ok(Json(PendingQueriesResponse {
        agency_id,
        count: queries.len(),
        queries,
    }))
}

pub async fn get_query(
    State(state): State<AppState>,
    Path(query_id): Path<Uuid>,
) -> ApiResult<Json<QueryDetailResponse>> {
    let query = queries::get_query(&state.db, query_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Parsed query {}", query_id)))?;
    let evidence = queries::list_evidence(&state.db, query_id).await?;

    Ok(Json(QueryDetailResponse { query, evidence }))
}

/// POST /queries/:id/review
///
/// **Errors:**
/// - 400 Bad Request: decision other than approved/discarded, blank reviewer
/// - 404 Not Found: unknown query id
pub async fn review_query(
    State(state): State<AppState>,
    Path(query_id): Path<Uuid>,
    Json(request): Json<ReviewRequest>,
) -> ApiResult<Json<ParsedQuery>> {
    let decision = match QueryStatus::parse(request.decision.trim()) {
        Some(decision @ (QueryStatus::Approved | QueryStatus::Discarded)) => decision,
        _ => {
            return Err(ApiError::BadRequest(format!(
                "Unknown review decision '{}' (expected approved or discarded)",
                request.decision
            )))
        }
    };

    let reviewer = request.reviewer.trim();
    if reviewer.is_empty() {
        return Err(ApiError::BadRequest("Reviewer cannot be blank".to_string()));
    }

    let notes = request
        .notes
        .as_deref()
        .map(str::trim)
        .filter(|notes| !notes.is_empty());

    let query = queries::review_query(&state.db, query_id, decision, reviewer, notes).await?;
    Ok(Json(query))
}

/// POST /queries/:id/assign
///
/// **Errors:**
/// - 400 Bad Request: blank assigner
/// - 404 Not Found: unknown query id
/// - 409 Conflict: query was discarded
pub async fn assign_query(
    State(state): State<AppState>,
    Path(query_id): Path<Uuid>,
    Json(request): Json<AssignRequest>,
) -> ApiResult<Json<ParsedQuery>> {
    let assigned_by = request.assigned_by.trim();
    if assigned_by.is_empty() {
        return Err(ApiError::BadRequest("assigned_by cannot be blank".to_string()));
    }

    let current = queries::get_query(&state.db, query_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Parsed query {}", query_id)))?;
    if current.review.status == QueryStatus::Discarded {
        return Err(ApiError::Conflict(format!(
            "Parsed query {} was discarded and cannot be assigned",
            query_id
        )));
    }

    let query = queries::assign_query(&state.db, query_id, &request.client_ids, assigned_by).await?;
    Ok(Json(query))
}

/// Build review routes
pub fn review_routes() -> Router<AppState> {
    Router::new()
        .route("/agencies/:agency_id/queries/pending", get(list_pending))
        .route("/queries/:id", get(get_query))
        .route("/queries/:id/review", post(review_query))
        .route("/queries/:id/assign", post(assign_query))
}
