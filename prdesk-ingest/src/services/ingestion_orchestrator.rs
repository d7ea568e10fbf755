//! Ingestion orchestrator
//!
//! Runs one inbound email through the pipeline and owns its job record:
//!
//! ```text
//! RECEIVED → PARSING → detect → parse → fingerprint/dedupe → persist
//!                    → COMPLETED     (≥1 query persisted)
//!                    → NEEDS_REVIEW  (parser ran, nothing persisted)
//!                    → FAILED        (unhandled error, details recorded)
//! ```
//!
//! A message id seen before short-circuits to the existing job. The check
//! runs twice: an optimistic lookup, then the UNIQUE(message_id) index at
//! insert time for concurrent deliveries.

use anyhow::Context;
use chrono::Utc;
use chrono_tz::Tz;
use prdesk_common::{Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use super::dedupe_engine::{fingerprint, DedupeEngine};
use super::llm_client::ExtractionBackend;
use super::single_parser::LlmFallback;
use super::{digest_parser, single_parser, source_detector, structured_parser, ParseContext};
use crate::db::{jobs, queries};
use crate::models::{
    DedupeAction, InboundEmail, IngestionJob, JobStatus, ParseEvidence, ParseOutput, ParsedQuery,
    QueryCandidate, ReviewState, SourceDetection, SourceType,
};
use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(20);

/// Result of one ingest call, as returned to the webhook caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestOutcome {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub source_type: Option<SourceType>,
    pub queries_created: usize,
    /// True when the message id was ingested before
    pub duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IngestOutcome {
    fn from_job(job: &IngestionJob, duplicate: bool) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            source_type: job.source_type,
            queries_created: job.queries_created,
            duplicate,
            error: job.error_message.clone(),
        }
    }
}

/// Detection and parse results without persistence
#[derive(Debug, Clone, Serialize)]
pub struct DryRunReport {
    pub detection: SourceDetection,
    pub output: ParseOutput,
    /// Fingerprint each candidate would be stored under, in candidate order
    pub fingerprints: Vec<String>,
}

/// Progress of one pipeline run, kept for the job's error details
#[derive(Debug, Default)]
struct PipelineReport {
    stage: &'static str,
    row_errors: Vec<String>,
    persisted: usize,
    auto_merged: usize,
    parse_confidence: f64,
    parse_method: Option<&'static str>,
}

impl PipelineReport {
    fn details(&self) -> serde_json::Value {
        serde_json::json!({
            "row_errors": self.row_errors,
            "auto_merged": self.auto_merged,
            "parse_confidence": self.parse_confidence,
            "parse_method": self.parse_method,
        })
    }
}

pub struct IngestionOrchestrator {
    db: SqlitePool,
    dedupe: DedupeEngine,
    backend: Option<Arc<dyn ExtractionBackend>>,
    llm_timeout: Duration,
    default_tz: Tz,
    lock_wait_ms: u64,
}

impl IngestionOrchestrator {
    pub fn new(db: SqlitePool, default_tz: Tz) -> Self {
        Self {
            dedupe: DedupeEngine::new(db.clone()),
            db,
            backend: None,
            llm_timeout: DEFAULT_LLM_TIMEOUT,
            default_tz,
            lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    /// Enable the LLM fallback of the single-query parser
    pub fn with_backend(mut self, backend: Option<Arc<dyn ExtractionBackend>>, timeout: Duration) -> Self {
        self.backend = backend;
        self.llm_timeout = timeout;
        self
    }

    pub fn with_lock_wait_ms(mut self, lock_wait_ms: u64) -> Self {
        self.lock_wait_ms = lock_wait_ms;
        self
    }

    pub fn llm_enabled(&self) -> bool {
        self.backend.is_some()
    }

    fn llm_fallback(&self) -> Option<LlmFallback<'_>> {
        self.backend.as_deref().map(|backend| LlmFallback {
            backend,
            timeout: self.llm_timeout,
        })
    }

    /// Ingest one validated email for an agency
    ///
    /// Pipeline failures end in a FAILED job, not an `Err`. `Err` means the
    /// job record itself could not be written.
    pub async fn ingest(
        &self,
        agency_id: &str,
        email: InboundEmail,
        raw_payload: serde_json::Value,
    ) -> Result<IngestOutcome> {
        if let Some(message_id) = email.message_id.as_deref() {
            if let Some(existing) = jobs::find_by_message_id(&self.db, message_id).await? {
                info!(job_id = %existing.id, message_id, "Message already ingested");
                return Ok(IngestOutcome::from_job(&existing, true));
            }
        }

        let mut job = IngestionJob::new(agency_id.to_string(), email, raw_payload);
        job.transition_to(JobStatus::Parsing)?;

        let inserted = retry_on_lock("insert_job", self.lock_wait_ms, || {
            jobs::insert_job_if_new(&self.db, &job)
        })
        .await?;
        if !inserted {
            // Lost the race against a concurrent delivery of the same message
            let message_id = job.email.message_id.as_deref().unwrap_or_default();
            let existing = jobs::find_by_message_id(&self.db, message_id)
                .await?
                .ok_or_else(|| {
                    Error::Internal(format!("Job for message {} rejected but not found", message_id))
                })?;
            info!(job_id = %existing.id, message_id, "Message ingested concurrently");
            return Ok(IngestOutcome::from_job(&existing, true));
        }

        info!(job_id = %job.id, agency_id, status = job.status.as_str(), "Ingestion job created");

        let ctx = ParseContext::new(self.default_tz);
        let mut report = PipelineReport::default();

        match self.run_pipeline(&mut job, &ctx, &mut report).await {
            Ok(()) => {
                job.queries_created = report.persisted;
                let next = if report.persisted > 0 {
                    JobStatus::Completed
                } else {
                    JobStatus::NeedsReview
                };
                if next == JobStatus::NeedsReview || !report.row_errors.is_empty() {
                    job.error_details = Some(report.details());
                }
                let transition = job.transition_to(next)?;
                info!(
                    job_id = %job.id,
                    from = transition.old_status.as_str(),
                    to = transition.new_status.as_str(),
                    queries_created = job.queries_created,
                    auto_merged = report.auto_merged,
                    row_errors = report.row_errors.len(),
                    "Ingestion job finished"
                );
            }
            Err(e) => {
                job.queries_created = report.persisted;
                let message = format!("{:#}", e);
                let mut details = report.details();
                details["stage"] = serde_json::json!(report.stage);
                details["error"] = serde_json::json!(format!("{:?}", e));
                warn!(job_id = %job.id, stage = report.stage, error = %message, "Ingestion job failed");
                job.fail(message, details)?;
            }
        }

        jobs::save_job(&self.db, &job, self.lock_wait_ms).await?;
        Ok(IngestOutcome::from_job(&job, false))
    }

    async fn run_pipeline(
        &self,
        job: &mut IngestionJob,
        ctx: &ParseContext,
        report: &mut PipelineReport,
    ) -> anyhow::Result<()> {
        report.stage = "detect";
        let detection = source_detector::detect(&job.email.subject, &job.email.body_text, &job.email.from);
        job.source_type = Some(detection.source_type);
        info!(
            job_id = %job.id,
            source_type = detection.source_type.as_str(),
            confidence = detection.confidence,
            indicators = ?detection.indicators,
            "Source detected"
        );

        report.stage = "parse";
        let output = self
            .parse(detection.source_type, &job.email.subject, &job.email.body_text, ctx)
            .await;
        for row_error in &output.row_errors {
            warn!(job_id = %job.id, row_error = %row_error, "Parser row error");
        }
        report.row_errors = output.row_errors.clone();
        report.parse_confidence = output.confidence;
        report.parse_method = Some(output.method.as_str());

        for candidate in output.candidates {
            report.stage = "dedupe";
            let fp = fingerprint(&candidate.query);
            let decision = self
                .dedupe
                .classify(&job.agency_id, &fp)
                .await
                .context("dedupe classification failed")?;

            if decision.action == DedupeAction::AutoMerged {
                report.auto_merged += 1;
                continue;
            }

            report.stage = "persist";
            let (query, evidence) = build_records(job, candidate, fp, decision);
            let inserted = retry_on_lock("insert_query", self.lock_wait_ms, || {
                queries::insert_query_with_evidence(&self.db, &query, &evidence)
            })
            .await;
            match inserted {
                Ok(()) => report.persisted += 1,
                Err(e) if e.is_unique_violation() => {
                    // A concurrent job stored the same fingerprint first
                    info!(job_id = %job.id, fingerprint = %query.fingerprint, "Fingerprint conflict, auto-merging");
                    report.auto_merged += 1;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("failed to persist query '{}'", query.content.headline));
                }
            }
        }

        Ok(())
    }

    async fn parse(
        &self,
        source_type: SourceType,
        subject: &str,
        body: &str,
        ctx: &ParseContext,
    ) -> ParseOutput {
        match source_type {
            SourceType::Structured => structured_parser::parse(body, ctx),
            SourceType::Digest => digest_parser::parse(body, ctx),
            SourceType::Single | SourceType::Other => {
                single_parser::parse(subject, body, ctx, self.llm_fallback()).await
            }
        }
    }

    /// Detection + parse with nothing persisted
    pub async fn dry_run(&self, subject: &str, body: &str, from: &str) -> DryRunReport {
        let ctx = ParseContext::new(self.default_tz);
        let detection = source_detector::detect(subject, body, from);
        let output = self.parse(detection.source_type, subject, body, &ctx).await;
        let fingerprints = output
            .candidates
            .iter()
            .map(|candidate| fingerprint(&candidate.query))
            .collect();

        DryRunReport {
            detection,
            output,
            fingerprints,
        }
    }
}

fn build_records(
    job: &IngestionJob,
    candidate: QueryCandidate,
    fingerprint: String,
    decision: super::dedupe_engine::DedupeDecision,
) -> (ParsedQuery, Vec<ParseEvidence>) {
    let now = Utc::now();
    let query = ParsedQuery {
        id: Uuid::new_v4(),
        agency_id: job.agency_id.clone(),
        job_id: job.id,
        source_type: job.source_type.unwrap_or(SourceType::Other),
        content: candidate.query,
        fingerprint,
        dedupe_action: decision.action,
        duplicate_of_id: decision.duplicate_of_id,
        similar_query_ids: decision.similar_query_ids,
        review: ReviewState::default(),
        created_at: now,
    };

    let evidence = candidate
        .evidence
        .into_iter()
        .map(|field| ParseEvidence {
            id: Uuid::new_v4(),
            query_id: query.id,
            field,
            created_at: now,
        })
        .collect();

    (query, evidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prdesk_common::db::init_memory_database;

    fn email(subject: &str, body: &str, from: &str, message_id: Option<&str>) -> InboundEmail {
        InboundEmail {
            from: from.to_string(),
            to: None,
            subject: subject.to_string(),
            body_text: body.to_string(),
            body_html: None,
            received_at: Utc::now(),
            message_id: message_id.map(str::to_string),
            folder_id: None,
            thread_id: None,
            has_attachments: false,
        }
    }

    #[tokio::test]
    async fn test_unparseable_email_needs_review() {
        let pool = init_memory_database().await.unwrap();
        let orchestrator = IngestionOrchestrator::new(pool.clone(), chrono_tz::America::New_York);

        let outcome = orchestrator
            .ingest(
                "agency-a",
                email("Lunch?", "Are you free Thursday?", "friend@example.com", None),
                serde_json::json!({}),
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, JobStatus::NeedsReview);
        assert_eq!(outcome.source_type, Some(SourceType::Other));
        assert_eq!(outcome.queries_created, 0);
        assert!(!outcome.duplicate);

        let job = jobs::load_job(&pool, outcome.job_id).await.unwrap().unwrap();
        let details = job.error_details.unwrap();
        assert_eq!(details["row_errors"].as_array().unwrap().len(), 1);
        assert!(job.processing_started_at.is_some());
        assert!(job.processing_completed_at.is_some());
    }

    #[tokio::test]
    async fn test_repeat_message_id_short_circuits() {
        let pool = init_memory_database().await.unwrap();
        let orchestrator = IngestionOrchestrator::new(pool.clone(), chrono_tz::America::New_York);
        let message = email("Lunch?", "Are you free Thursday?", "friend@example.com", Some("<x@y>"));

        let first = orchestrator
            .ingest("agency-a", message.clone(), serde_json::json!({}))
            .await
            .unwrap();
        let second = orchestrator
            .ingest("agency-a", message, serde_json::json!({}))
            .await
            .unwrap();

        assert!(!first.duplicate);
        assert!(second.duplicate);
        assert_eq!(second.job_id, first.job_id);
        assert_eq!(second.status, first.status);
    }

    #[tokio::test]
    async fn test_dry_run_persists_nothing() {
        let pool = init_memory_database().await.unwrap();
        let orchestrator = IngestionOrchestrator::new(pool.clone(), chrono_tz::America::New_York);

        let body = "I'm a producer at Morning Report working on a segment about winter driving.\nReply to q-77@reply.tmxmail.com\n";
        let report = orchestrator.dry_run("Winter driving", body, "alerts@tmxmail.com").await;

        assert_eq!(report.detection.source_type, SourceType::Single);
        assert!(report.output.success);
        assert_eq!(report.fingerprints.len(), 1);
        assert_eq!(report.fingerprints[0].len(), 20);

        let jobs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ingestion_jobs")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(jobs, 0);
    }
}
