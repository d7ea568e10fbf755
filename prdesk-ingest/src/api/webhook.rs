//! Inbound email webhook
//!
//! POST /webhooks/email/:agency_id

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::models::{InboundEmailPayload, JobStatus};
use crate::services::IngestOutcome;
use crate::{ApiError, ApiResult, AppState};

pub const API_KEY_HEADER: &str = "x-api-key";

/// Webhook response body
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: IngestOutcome,
}

/// POST /webhooks/email/:agency_id
///
/// **Errors:**
/// - 401 Unauthorized: presented key does not match the configured secret
/// - 400 Bad Request: blank agency id or missing `from`/`subject`/`body_text`
/// - 500 Internal Server Error: job ended FAILED (body still carries the job)
pub async fn receive_email(
    State(state): State<AppState>,
    Path(agency_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<InboundEmailPayload>,
) -> ApiResult<(StatusCode, Json<WebhookResponse>)> {
    authorize(state.webhook_secret.as_deref(), &payload, &headers)?;

    let agency_id = agency_id.trim();
    if agency_id.is_empty() {
        return Err(ApiError::BadRequest("Agency id cannot be blank".to_string()));
    }

    let email = payload
        .validate()
        .map_err(|missing| ApiError::BadRequest(missing.to_string()))?;

    info!(
        agency_id,
        from = %email.from,
        message_id = ?email.message_id,
        "Inbound email received"
    );

    let outcome = state
        .orchestrator
        .ingest(agency_id, email, payload.to_audit_json())
        .await?;

    let success = outcome.status != JobStatus::Failed;
    let status = if success {
        StatusCode::OK
    } else {
        if let Some(error) = &outcome.error {
            *state.last_error.write().await = Some(format!("job {}: {}", outcome.job_id, error));
        }
        StatusCode::INTERNAL_SERVER_ERROR
    };

    Ok((status, Json(WebhookResponse { success, outcome })))
}

/// Check a presented key (body or `X-Api-Key` header) against the shared secret
///
/// Only a mismatch is rejected; requests that carry no key pass.
fn authorize(
    secret: Option<&str>,
    payload: &InboundEmailPayload,
    headers: &HeaderMap,
) -> ApiResult<()> {
    let Some(secret) = secret else {
        return Ok(());
    };

    let presented = payload.api_key.as_deref().or_else(|| {
        headers
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
    });

    match presented {
        Some(key) if key != secret => {
            warn!("Webhook rejected: shared secret mismatch");
            Err(ApiError::Unauthorized("Invalid API key".to_string()))
        }
        _ => Ok(()),
    }
}

/// Build webhook routes
pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/webhooks/email/:agency_id", post(receive_email))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_open_webhook_without_secret() {
        let payload = InboundEmailPayload::default();
        assert!(authorize(None, &payload, &HeaderMap::new()).is_ok());
    }

    #[test]
    fn test_body_key_or_header_accepted() {
        let payload = InboundEmailPayload {
            api_key: Some("s3cret".to_string()),
            ..Default::default()
        };
        assert!(authorize(Some("s3cret"), &payload, &HeaderMap::new()).is_ok());

        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("s3cret"));
        assert!(authorize(Some("s3cret"), &InboundEmailPayload::default(), &headers).is_ok());
    }

    #[test]
    fn test_wrong_key_rejected() {
        let payload = InboundEmailPayload {
            api_key: Some("guess".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            authorize(Some("s3cret"), &payload, &HeaderMap::new()),
            Err(ApiError::Unauthorized(_))
        ));

        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("guess"));
        assert!(matches!(
            authorize(Some("s3cret"), &InboundEmailPayload::default(), &headers),
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_missing_key_accepted_when_secret_configured() {
        assert!(authorize(Some("s3cret"), &InboundEmailPayload::default(), &HeaderMap::new()).is_ok());
    }
}
