//! Parsed media queries and their evidence
//!
//! A parser produces [`QueryCandidate`]s (content + evidence). The
//! orchestrator turns the ones that survive dedupe into persisted
//! [`ParsedQuery`] rows.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SourceType;

/// How the journalist wants to engage with a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Live,
    Phone,
    InPerson,
    Emailed,
    #[default]
    Quote,
    Background,
    ContactRequest,
    Other,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Live => "live",
            RequestType::Phone => "phone",
            RequestType::InPerson => "in_person",
            RequestType::Emailed => "emailed",
            RequestType::Quote => "quote",
            RequestType::Background => "background",
            RequestType::ContactRequest => "contact_request",
            RequestType::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "live" => Some(RequestType::Live),
            "phone" => Some(RequestType::Phone),
            "in_person" => Some(RequestType::InPerson),
            "emailed" => Some(RequestType::Emailed),
            "quote" => Some(RequestType::Quote),
            "background" => Some(RequestType::Background),
            "contact_request" => Some(RequestType::ContactRequest),
            "other" => Some(RequestType::Other),
            _ => None,
        }
    }
}

/// Which extraction path produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseMethod {
    #[default]
    Regex,
    Llm,
}

impl ParseMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseMethod::Regex => "regex",
            ParseMethod::Llm => "llm",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "regex" => Some(ParseMethod::Regex),
            "llm" => Some(ParseMethod::Llm),
            _ => None,
        }
    }
}

/// Relation of a candidate to already-stored records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupeAction {
    /// No stored record shares the fingerprint or its prefix
    #[default]
    None,
    /// Identical fingerprint; collapsed into the existing record
    AutoMerged,
    /// Same outlet + headline start; kept, flagged for a human
    MergeSuggested,
    /// Reserved for reviewer-side classification
    PossibleDuplicate,
}

impl DedupeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DedupeAction::None => "none",
            DedupeAction::AutoMerged => "auto_merged",
            DedupeAction::MergeSuggested => "merge_suggested",
            DedupeAction::PossibleDuplicate => "possible_duplicate",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(DedupeAction::None),
            "auto_merged" => Some(DedupeAction::AutoMerged),
            "merge_suggested" => Some(DedupeAction::MergeSuggested),
            "possible_duplicate" => Some(DedupeAction::PossibleDuplicate),
            _ => None,
        }
    }
}

/// Review workflow state of a persisted query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    #[default]
    PendingReview,
    Approved,
    Discarded,
}

impl QueryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryStatus::PendingReview => "pending_review",
            QueryStatus::Approved => "approved",
            QueryStatus::Discarded => "discarded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending_review" => Some(QueryStatus::PendingReview),
            "approved" => Some(QueryStatus::Approved),
            "discarded" => Some(QueryStatus::Discarded),
            _ => None,
        }
    }
}

/// Source-text justification for one extracted field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldEvidence {
    pub field_name: String,
    pub extracted_value: String,
    /// Verbatim excerpt of the email body
    pub source_excerpt: String,
    /// Byte offsets of the excerpt in the body, when known
    pub char_start: Option<usize>,
    pub char_end: Option<usize>,
    pub confidence: f64,
}

/// Fields extracted from one media request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedQuery {
    // Client-safe
    pub headline: String,
    pub summary: Option<String>,
    pub category: Option<String>,
    pub request_type: RequestType,
    pub full_text: String,
    pub expert_roles: Vec<String>,
    pub constraints: Vec<String>,
    pub questions: Vec<String>,
    pub tags: Vec<String>,
    pub deadline_date: Option<NaiveDate>,
    /// Deadline time as written in the email
    pub deadline_time: Option<String>,
    pub deadline_timezone: Option<String>,
    pub deadline_at: Option<DateTime<Utc>>,
    pub is_hard_deadline: bool,
    pub broadcast_at: Option<DateTime<Utc>>,
    pub broadcast_duration_minutes: Option<u32>,

    // Agency-only
    pub journalist_name: Option<String>,
    pub journalist_title: Option<String>,
    pub journalist_email: Option<String>,
    pub reply_alias: Option<String>,
    pub journalist_profile_url: Option<String>,
    pub outlet_name: Option<String>,
    pub outlet_website: Option<String>,

    // Parse quality
    pub confidence: f64,
    pub parse_method: ParseMethod,
}

/// Parser output for one media request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryCandidate {
    pub query: ExtractedQuery,
    pub evidence: Vec<FieldEvidence>,
}

/// Reviewer-owned fields, mutated by the review interface only
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewState {
    pub status: QueryStatus,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub assigned_client_ids: Vec<String>,
    pub assigned_by: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub published_opportunity_id: Option<String>,
}

/// Persisted media request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedQuery {
    pub id: Uuid,
    pub agency_id: String,
    pub job_id: Uuid,
    pub source_type: SourceType,

    #[serde(flatten)]
    pub content: ExtractedQuery,

    // Dedupe
    pub fingerprint: String,
    pub dedupe_action: DedupeAction,
    pub duplicate_of_id: Option<Uuid>,
    pub similar_query_ids: Vec<Uuid>,

    #[serde(flatten)]
    pub review: ReviewState,

    pub created_at: DateTime<Utc>,
}

/// Persisted evidence row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseEvidence {
    pub id: Uuid,
    pub query_id: Uuid,
    #[serde(flatten)]
    pub field: FieldEvidence,
    pub created_at: DateTime<Utc>,
}
