//! Ingestion job state machine
//!
//! One job per inbound email:
//! RECEIVED → PARSING → {COMPLETED | NEEDS_REVIEW | FAILED}
//!
//! Jobs are append-only audit records. Only the orchestrator mutates them and
//! nothing deletes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::inbound_email::InboundEmail;
use super::SourceType;

/// Ingestion job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Email accepted, nothing run yet
    Received,
    /// Detection, parsing and dedupe in progress
    Parsing,
    /// At least one query persisted
    Completed,
    /// Parser ran but nothing was persisted
    NeedsReview,
    /// Unhandled error; details recorded on the job
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Received => "received",
            JobStatus::Parsing => "parsing",
            JobStatus::Completed => "completed",
            JobStatus::NeedsReview => "needs_review",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "received" => Some(JobStatus::Received),
            "parsing" => Some(JobStatus::Parsing),
            "completed" => Some(JobStatus::Completed),
            "needs_review" => Some(JobStatus::NeedsReview),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::NeedsReview | JobStatus::Failed
        )
    }

    /// Legal edges of the lifecycle graph
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Received, JobStatus::Parsing)
                | (JobStatus::Received, JobStatus::Failed)
                | (JobStatus::Parsing, JobStatus::Completed)
                | (JobStatus::Parsing, JobStatus::NeedsReview)
                | (JobStatus::Parsing, JobStatus::Failed)
        )
    }
}

/// State transition record (logged by the orchestrator)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub job_id: Uuid,
    pub old_status: JobStatus,
    pub new_status: JobStatus,
    pub transitioned_at: DateTime<Utc>,
}

/// One processing attempt for one inbound email
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionJob {
    pub id: Uuid,

    /// Tenant that owns the email; every lookup is scoped to it
    pub agency_id: String,

    /// Source email metadata
    pub email: InboundEmail,

    /// Detected source type (None until detection ran)
    pub source_type: Option<SourceType>,

    pub status: JobStatus,

    /// Records persisted by this job
    pub queries_created: usize,

    pub processing_started_at: Option<DateTime<Utc>>,
    pub processing_completed_at: Option<DateTime<Utc>>,

    pub error_message: Option<String>,

    /// Structured detail blob (row errors, failing stage, error chain)
    pub error_details: Option<serde_json::Value>,

    /// Inbound payload as received, secret stripped
    pub raw_payload: serde_json::Value,

    pub created_at: DateTime<Utc>,
}

impl IngestionJob {
    /// Create new job in RECEIVED
    pub fn new(agency_id: String, email: InboundEmail, raw_payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            agency_id,
            email,
            source_type: None,
            status: JobStatus::Received,
            queries_created: 0,
            processing_started_at: None,
            processing_completed_at: None,
            error_message: None,
            error_details: None,
            raw_payload,
            created_at: Utc::now(),
        }
    }

    /// Transition to new state
    ///
    /// Stamps `processing_started_at` on entering PARSING and
    /// `processing_completed_at` on any terminal state.
    pub fn transition_to(&mut self, new_status: JobStatus) -> prdesk_common::Result<StateTransition> {
        if !self.status.can_transition_to(new_status) {
            return Err(prdesk_common::Error::Internal(format!(
                "Invalid job transition {} -> {} (job {})",
                self.status.as_str(),
                new_status.as_str(),
                self.id
            )));
        }

        let now = Utc::now();
        let transition = StateTransition {
            job_id: self.id,
            old_status: self.status,
            new_status,
            transitioned_at: now,
        };
        self.status = new_status;

        if new_status == JobStatus::Parsing {
            self.processing_started_at = Some(now);
        }
        if new_status.is_terminal() {
            self.processing_completed_at = Some(now);
        }

        Ok(transition)
    }

    /// Record an unhandled failure and move to FAILED
    pub fn fail(
        &mut self,
        message: String,
        details: serde_json::Value,
    ) -> prdesk_common::Result<StateTransition> {
        self.error_message = Some(message);
        self.error_details = Some(details);
        self.transition_to(JobStatus::Failed)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
