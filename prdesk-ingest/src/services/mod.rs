//! Service modules for the ingestion pipeline
//!
//! - Source detection and the three parsers (structured, digest, single)
//! - Shared field extraction and deadline resolution
//! - Fingerprinting and dedupe classification
//! - Optional LLM extraction backends
//! - The orchestrator that drives one email through all of the above

pub mod deadline;
pub mod dedupe_engine;
pub mod digest_parser;
pub mod extraction;
pub mod ingestion_orchestrator;
pub mod llm_client;
pub mod parse_context;
pub mod single_parser;
pub mod source_detector;
pub mod structured_parser;

pub use dedupe_engine::{DedupeDecision, DedupeEngine};
pub use ingestion_orchestrator::{DryRunReport, IngestOutcome, IngestionOrchestrator};
pub use llm_client::{backend_from_config, ExtractionBackend, LlmError};
pub use parse_context::ParseContext;
