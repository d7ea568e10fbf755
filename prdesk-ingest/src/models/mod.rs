//! Data models for prdesk-ingest
//!
//! - Ingestion job state machine
//! - Inbound webhook payload
//! - Parsed queries, evidence, dedupe and review fields
//! - Detector and parser outputs

pub mod inbound_email;
pub mod ingestion_job;
pub mod parse_output;
pub mod parsed_query;

pub use inbound_email::{InboundEmail, InboundEmailPayload, MissingFields};
pub use ingestion_job::{IngestionJob, JobStatus, StateTransition};
pub use parse_output::{ParseOutput, SourceDetection, SourceType};
pub use parsed_query::{
    DedupeAction, ExtractedQuery, FieldEvidence, ParseEvidence, ParseMethod, ParsedQuery,
    QueryCandidate, QueryStatus, RequestType, ReviewState,
};
