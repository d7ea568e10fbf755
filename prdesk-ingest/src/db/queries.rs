//! Parsed query and evidence persistence
//!
//! List attributes (`expert_roles`, `similar_query_ids`, ...) are stored as
//! JSON text and decoded on read. Enums are stored as their snake_case
//! names.

use chrono::{NaiveDate, Utc};
use prdesk_common::{Error, Result};
use serde::de::DeserializeOwned;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{parse_optional_timestamp, parse_timestamp, parse_uuid};
use crate::models::{
    DedupeAction, ExtractedQuery, FieldEvidence, ParseEvidence, ParseMethod, ParsedQuery,
    QueryStatus, RequestType, ReviewState, SourceType,
};

const QUERY_COLUMNS: &str = r#"
    id, agency_id, job_id, source_type,
    headline, summary, category, request_type, full_text,
    expert_roles, constraints, questions, tags,
    deadline_date, deadline_time, deadline_timezone, deadline_at, is_hard_deadline,
    broadcast_at, broadcast_duration_minutes,
    journalist_name, journalist_title, journalist_email, reply_alias,
    journalist_profile_url, outlet_name, outlet_website,
    fingerprint, dedupe_action, duplicate_of_id, similar_query_ids,
    confidence, parse_method,
    status, reviewed_by, reviewed_at, review_notes,
    assigned_client_ids, assigned_by, assigned_at, published_opportunity_id,
    created_at
"#;

fn to_json<T: serde::Serialize>(value: &T, column: &str) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| Error::Internal(format!("Failed to serialize {}: {}", column, e)))
}

fn from_json<T: DeserializeOwned>(text: &str, column: &str) -> Result<T> {
    serde_json::from_str(text)
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

/// Insert one query and its evidence atomically
///
/// A UNIQUE(agency_id, fingerprint) conflict rolls everything back and is
/// returned as a database error (`Error::is_unique_violation`).
pub async fn insert_query_with_evidence(
    pool: &SqlitePool,
    query: &ParsedQuery,
    evidence: &[ParseEvidence],
) -> Result<()> {
    let c = &query.content;
    let expert_roles = to_json(&c.expert_roles, "expert_roles")?;
    let constraints = to_json(&c.constraints, "constraints")?;
    let questions = to_json(&c.questions, "questions")?;
    let tags = to_json(&c.tags, "tags")?;
    let similar = to_json(&query.similar_query_ids, "similar_query_ids")?;
    let assigned = to_json(&query.review.assigned_client_ids, "assigned_client_ids")?;

    let mut tx = pool.begin().await?;

    sqlx::query(&format!(
        "INSERT INTO parsed_queries ({}) VALUES ({})",
        QUERY_COLUMNS,
        vec!["?"; 42].join(", ")
    ))
    .bind(query.id.to_string())
    .bind(&query.agency_id)
    .bind(query.job_id.to_string())
    .bind(query.source_type.as_str())
    .bind(&c.headline)
    .bind(&c.summary)
    .bind(&c.category)
    .bind(c.request_type.as_str())
    .bind(&c.full_text)
    .bind(&expert_roles)
    .bind(&constraints)
    .bind(&questions)
    .bind(&tags)
    .bind(c.deadline_date.map(|d| d.format("%Y-%m-%d").to_string()))
    .bind(&c.deadline_time)
    .bind(&c.deadline_timezone)
    .bind(c.deadline_at.map(|t| t.to_rfc3339()))
    .bind(c.is_hard_deadline)
    .bind(c.broadcast_at.map(|t| t.to_rfc3339()))
    .bind(c.broadcast_duration_minutes.map(i64::from))
    .bind(&c.journalist_name)
    .bind(&c.journalist_title)
    .bind(&c.journalist_email)
    .bind(&c.reply_alias)
    .bind(&c.journalist_profile_url)
    .bind(&c.outlet_name)
    .bind(&c.outlet_website)
    .bind(&query.fingerprint)
    .bind(query.dedupe_action.as_str())
    .bind(query.duplicate_of_id.map(|id| id.to_string()))
    .bind(&similar)
    .bind(c.confidence)
    .bind(c.parse_method.as_str())
    .bind(query.review.status.as_str())
    .bind(&query.review.reviewed_by)
    .bind(query.review.reviewed_at.map(|t| t.to_rfc3339()))
    .bind(&query.review.review_notes)
    .bind(&assigned)
    .bind(&query.review.assigned_by)
    .bind(query.review.assigned_at.map(|t| t.to_rfc3339()))
    .bind(&query.review.published_opportunity_id)
    .bind(query.created_at.to_rfc3339())
    .execute(&mut *tx)
    .await?;

    for item in evidence {
        sqlx::query(
            r#"
            INSERT INTO parse_evidence (
                id, query_id, field_name, extracted_value, source_excerpt,
                char_start, char_end, confidence, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(item.id.to_string())
        .bind(item.query_id.to_string())
        .bind(&item.field.field_name)
        .bind(&item.field.extracted_value)
        .bind(&item.field.source_excerpt)
        .bind(item.field.char_start.map(|v| v as i64))
        .bind(item.field.char_end.map(|v| v as i64))
        .bind(item.field.confidence)
        .bind(item.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn get_query(pool: &SqlitePool, query_id: Uuid) -> Result<Option<ParsedQuery>> {
    let row = sqlx::query(&format!("SELECT {} FROM parsed_queries WHERE id = ?", QUERY_COLUMNS))
        .bind(query_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_query).transpose()
}

/// Queries awaiting review for one agency, oldest first
pub async fn list_pending(pool: &SqlitePool, agency_id: &str) -> Result<Vec<ParsedQuery>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM parsed_queries WHERE agency_id = ? AND status = ? ORDER BY created_at, id",
        QUERY_COLUMNS
    ))
    .bind(agency_id)
    .bind(QueryStatus::PendingReview.as_str())
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_query).collect()
}

/// Queries created by one ingestion job
pub async fn list_for_job(pool: &SqlitePool, job_id: Uuid) -> Result<Vec<ParsedQuery>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM parsed_queries WHERE job_id = ? ORDER BY created_at, id",
        QUERY_COLUMNS
    ))
    .bind(job_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_query).collect()
}

pub async fn list_evidence(pool: &SqlitePool, query_id: Uuid) -> Result<Vec<ParseEvidence>> {
    let rows = sqlx::query(
        r#"
        SELECT id, query_id, field_name, extracted_value, source_excerpt,
               char_start, char_end, confidence, created_at
        FROM parse_evidence
        WHERE query_id = ?
        ORDER BY rowid
        "#,
    )
    .bind(query_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let created_at: String = row.get("created_at");
            Ok(ParseEvidence {
                id: parse_uuid(&row.get::<String, _>("id"))?,
                query_id: parse_uuid(&row.get::<String, _>("query_id"))?,
                field: FieldEvidence {
                    field_name: row.get("field_name"),
                    extracted_value: row.get("extracted_value"),
                    source_excerpt: row.get("source_excerpt"),
                    char_start: row.get::<Option<i64>, _>("char_start").map(|v| v as usize),
                    char_end: row.get::<Option<i64>, _>("char_end").map(|v| v as usize),
                    confidence: row.get("confidence"),
                },
                created_at: parse_timestamp(&created_at)?,
            })
        })
        .collect()
}

/// Record a reviewer decision (approved or discarded)
pub async fn review_query(
    pool: &SqlitePool,
    query_id: Uuid,
    decision: QueryStatus,
    reviewer: &str,
    notes: Option<&str>,
) -> Result<ParsedQuery> {
    if decision == QueryStatus::PendingReview {
        return Err(Error::InvalidInput(
            "Review decision must be 'approved' or 'discarded'".to_string(),
        ));
    }

    let result = sqlx::query(
        r#"
        UPDATE parsed_queries
        SET status = ?, reviewed_by = ?, reviewed_at = ?, review_notes = ?
        WHERE id = ?
        "#,
    )
    .bind(decision.as_str())
    .bind(reviewer)
    .bind(Utc::now().to_rfc3339())
    .bind(notes)
    .bind(query_id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Parsed query {}", query_id)));
    }

    tracing::info!(query_id = %query_id, decision = decision.as_str(), reviewer, "Query reviewed");

    get_query(pool, query_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Parsed query {}", query_id)))
}

/// Assign a query to agency clients (replaces the previous assignment)
pub async fn assign_query(
    pool: &SqlitePool,
    query_id: Uuid,
    client_ids: &[String],
    assigned_by: &str,
) -> Result<ParsedQuery> {
    let current = get_query(pool, query_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Parsed query {}", query_id)))?;

    if current.review.status == QueryStatus::Discarded {
        return Err(Error::InvalidInput(format!(
            "Parsed query {} was discarded and cannot be assigned",
            query_id
        )));
    }

    let mut ids: Vec<String> = Vec::new();
    for id in client_ids.iter().map(|id| id.trim()).filter(|id| !id.is_empty()) {
        if !ids.iter().any(|existing| existing == id) {
            ids.push(id.to_string());
        }
    }

    sqlx::query(
        "UPDATE parsed_queries SET assigned_client_ids = ?, assigned_by = ?, assigned_at = ? WHERE id = ?",
    )
    .bind(to_json(&ids, "assigned_client_ids")?)
    .bind(assigned_by)
    .bind(Utc::now().to_rfc3339())
    .bind(query_id.to_string())
    .execute(pool)
    .await?;

    tracing::info!(query_id = %query_id, clients = ids.len(), assigned_by, "Query assigned");

    get_query(pool, query_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Parsed query {}", query_id)))
}

fn parse_enum<T>(value: String, column: &str, parse: fn(&str) -> Option<T>) -> Result<T> {
    parse(&value).ok_or_else(|| Error::Internal(format!("Unknown {} in database: {}", column, value)))
}

fn row_to_query(row: &SqliteRow) -> Result<ParsedQuery> {
    let deadline_date: Option<String> = row.get("deadline_date");
    let deadline_date = deadline_date
        .map(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d"))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to parse deadline_date: {}", e)))?;

    let duplicate_of_id: Option<String> = row.get("duplicate_of_id");
    let created_at: String = row.get("created_at");

    let content = ExtractedQuery {
        headline: row.get("headline"),
        summary: row.get("summary"),
        category: row.get("category"),
        request_type: parse_enum(row.get("request_type"), "request_type", RequestType::parse)?,
        full_text: row.get("full_text"),
        expert_roles: from_json(&row.get::<String, _>("expert_roles"), "expert_roles")?,
        constraints: from_json(&row.get::<String, _>("constraints"), "constraints")?,
        questions: from_json(&row.get::<String, _>("questions"), "questions")?,
        tags: from_json(&row.get::<String, _>("tags"), "tags")?,
        deadline_date,
        deadline_time: row.get("deadline_time"),
        deadline_timezone: row.get("deadline_timezone"),
        deadline_at: parse_optional_timestamp(row.get("deadline_at"))?,
        is_hard_deadline: row.get("is_hard_deadline"),
        broadcast_at: parse_optional_timestamp(row.get("broadcast_at"))?,
        broadcast_duration_minutes: row
            .get::<Option<i64>, _>("broadcast_duration_minutes")
            .map(|v| v as u32),
        journalist_name: row.get("journalist_name"),
        journalist_title: row.get("journalist_title"),
        journalist_email: row.get("journalist_email"),
        reply_alias: row.get("reply_alias"),
        journalist_profile_url: row.get("journalist_profile_url"),
        outlet_name: row.get("outlet_name"),
        outlet_website: row.get("outlet_website"),
        confidence: row.get("confidence"),
        parse_method: parse_enum(row.get("parse_method"), "parse_method", ParseMethod::parse)?,
    };

    let review = ReviewState {
        status: parse_enum(row.get("status"), "status", QueryStatus::parse)?,
        reviewed_by: row.get("reviewed_by"),
        reviewed_at: parse_optional_timestamp(row.get("reviewed_at"))?,
        review_notes: row.get("review_notes"),
        assigned_client_ids: from_json(&row.get::<String, _>("assigned_client_ids"), "assigned_client_ids")?,
        assigned_by: row.get("assigned_by"),
        assigned_at: parse_optional_timestamp(row.get("assigned_at"))?,
        published_opportunity_id: row.get("published_opportunity_id"),
    };

    Ok(ParsedQuery {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        agency_id: row.get("agency_id"),
        job_id: parse_uuid(&row.get::<String, _>("job_id"))?,
        source_type: parse_enum(row.get("source_type"), "source_type", SourceType::parse)?,
        content,
        fingerprint: row.get("fingerprint"),
        dedupe_action: parse_enum(row.get("dedupe_action"), "dedupe_action", DedupeAction::parse)?,
        duplicate_of_id: duplicate_of_id.as_deref().map(parse_uuid).transpose()?,
        similar_query_ids: from_json(&row.get::<String, _>("similar_query_ids"), "similar_query_ids")?,
        review,
        created_at: parse_timestamp(&created_at)?,
    })
}
