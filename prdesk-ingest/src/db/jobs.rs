//! Ingestion job persistence
//!
//! Jobs are inserted once (message-id idempotent) and then updated in place
//! as the orchestrator moves them through their lifecycle. Nothing deletes
//! them.

use prdesk_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{parse_optional_timestamp, parse_timestamp, parse_uuid};
use crate::models::{InboundEmail, IngestionJob, JobStatus, SourceType};
use crate::utils::retry_on_lock;

const JOB_COLUMNS: &str = r#"
    id, agency_id, from_address, to_address, subject, body_text, body_html,
    received_at, message_id, folder_id, thread_id, has_attachments,
    source_type, status, queries_created, processing_started_at,
    processing_completed_at, error_message, error_details, raw_payload, created_at
"#;

/// Insert a new job unless its message id was already ingested
///
/// Returns `false` when the UNIQUE(message_id) index rejected the row: a
/// concurrent delivery of the same email won the race.
pub async fn insert_job_if_new(pool: &SqlitePool, job: &IngestionJob) -> Result<bool> {
    let raw_payload = serde_json::to_string(&job.raw_payload)
        .map_err(|e| Error::Internal(format!("Failed to serialize raw payload: {}", e)))?;

    let result = sqlx::query(
        r#"
        INSERT INTO ingestion_jobs (
            id, agency_id, from_address, to_address, subject, body_text, body_html,
            received_at, message_id, folder_id, thread_id, has_attachments,
            source_type, status, queries_created, processing_started_at,
            processing_completed_at, error_message, error_details, raw_payload, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(message_id) DO NOTHING
        "#,
    )
    .bind(job.id.to_string())
    .bind(&job.agency_id)
    .bind(&job.email.from)
    .bind(&job.email.to)
    .bind(&job.email.subject)
    .bind(&job.email.body_text)
    .bind(&job.email.body_html)
    .bind(job.email.received_at.to_rfc3339())
    .bind(&job.email.message_id)
    .bind(&job.email.folder_id)
    .bind(&job.email.thread_id)
    .bind(job.email.has_attachments)
    .bind(job.source_type.map(|s| s.as_str()))
    .bind(job.status.as_str())
    .bind(job.queries_created as i64)
    .bind(job.processing_started_at.map(|t| t.to_rfc3339()))
    .bind(job.processing_completed_at.map(|t| t.to_rfc3339()))
    .bind(&job.error_message)
    .bind(job.error_details.as_ref().map(|d| d.to_string()))
    .bind(&raw_payload)
    .bind(job.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Persist the mutable part of a job (status, counters, errors)
///
/// Retries on lock contention for up to `max_wait_ms`.
pub async fn save_job(pool: &SqlitePool, job: &IngestionJob, max_wait_ms: u64) -> Result<()> {
    // Prepare all data before touching the database
    let id = job.id.to_string();
    let source_type = job.source_type.map(|s| s.as_str());
    let status = job.status.as_str();
    let queries_created = job.queries_created as i64;
    let started_at = job.processing_started_at.map(|t| t.to_rfc3339());
    let completed_at = job.processing_completed_at.map(|t| t.to_rfc3339());
    let error_details = job.error_details.as_ref().map(|d| d.to_string());

    retry_on_lock("save_job", max_wait_ms, || async {
        let result = sqlx::query(
            r#"
            UPDATE ingestion_jobs SET
                source_type = ?,
                status = ?,
                queries_created = ?,
                processing_started_at = ?,
                processing_completed_at = ?,
                error_message = ?,
                error_details = ?
            WHERE id = ?
            "#,
        )
        .bind(source_type)
        .bind(status)
        .bind(queries_created)
        .bind(&started_at)
        .bind(&completed_at)
        .bind(&job.error_message)
        .bind(&error_details)
        .bind(&id)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Ingestion job {}", id)));
        }
        Ok(())
    })
    .await
}

pub async fn load_job(pool: &SqlitePool, job_id: Uuid) -> Result<Option<IngestionJob>> {
    let row = sqlx::query(&format!("SELECT {} FROM ingestion_jobs WHERE id = ?", JOB_COLUMNS))
        .bind(job_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_job).transpose()
}

/// Job already holding this external message id, if any
pub async fn find_by_message_id(pool: &SqlitePool, message_id: &str) -> Result<Option<IngestionJob>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM ingestion_jobs WHERE message_id = ?",
        JOB_COLUMNS
    ))
    .bind(message_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_job).transpose()
}

fn row_to_job(row: &SqliteRow) -> Result<IngestionJob> {
    let status: String = row.get("status");
    let status = JobStatus::parse(&status)
        .ok_or_else(|| Error::Internal(format!("Unknown job status in database: {}", status)))?;

    let source_type: Option<String> = row.get("source_type");
    let source_type = source_type
        .map(|s| {
            SourceType::parse(&s)
                .ok_or_else(|| Error::Internal(format!("Unknown source type in database: {}", s)))
        })
        .transpose()?;

    let error_details: Option<String> = row.get("error_details");
    let error_details = error_details
        .map(|d| serde_json::from_str(&d))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to parse error_details: {}", e)))?;

    let raw_payload: String = row.get("raw_payload");
    let raw_payload = serde_json::from_str(&raw_payload)
        .map_err(|e| Error::Internal(format!("Failed to parse raw_payload: {}", e)))?;

    let received_at: String = row.get("received_at");
    let created_at: String = row.get("created_at");

    Ok(IngestionJob {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        agency_id: row.get("agency_id"),
        email: InboundEmail {
            from: row.get("from_address"),
            to: row.get("to_address"),
            subject: row.get("subject"),
            body_text: row.get("body_text"),
            body_html: row.get("body_html"),
            received_at: parse_timestamp(&received_at)?,
            message_id: row.get("message_id"),
            folder_id: row.get("folder_id"),
            thread_id: row.get("thread_id"),
            has_attachments: row.get("has_attachments"),
        },
        source_type,
        status,
        queries_created: row.get::<i64, _>("queries_created") as usize,
        processing_started_at: parse_optional_timestamp(row.get("processing_started_at"))?,
        processing_completed_at: parse_optional_timestamp(row.get("processing_completed_at"))?,
        error_message: row.get("error_message"),
        error_details,
        raw_payload,
        created_at: parse_timestamp(&created_at)?,
    })
}
