//! Test Helper Utilities
//!
//! Shared fixtures, fake LLM backends and app builders for prdesk-ingest
//! integration tests.

#![allow(dead_code)]

pub mod backends;
pub mod fixtures;

pub use backends::{CannedBackend, FailingBackend};
pub use fixtures::{
    digest_email, inbound, pitch_email, structured_block, structured_email, webhook_payload,
};

use prdesk_common::db::init_memory_database;
use prdesk_ingest::services::{ExtractionBackend, IngestionOrchestrator};
use prdesk_ingest::AppState;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

/// In-memory database with the full schema
pub async fn create_test_db() -> SqlitePool {
    init_memory_database()
        .await
        .expect("Failed to create in-memory database")
}

/// Orchestrator over a fresh in-memory database
pub async fn create_test_orchestrator(
    backend: Option<Arc<dyn ExtractionBackend>>,
) -> (IngestionOrchestrator, SqlitePool) {
    let pool = create_test_db().await;
    let orchestrator = IngestionOrchestrator::new(pool.clone(), chrono_tz::America::New_York)
        .with_backend(backend, Duration::from_millis(500))
        .with_lock_wait_ms(200);
    (orchestrator, pool)
}

/// Router over a fresh in-memory database
pub async fn create_test_app(webhook_secret: Option<&str>) -> (axum::Router, SqlitePool) {
    let (orchestrator, pool) = create_test_orchestrator(None).await;
    let state = AppState::new(pool.clone(), orchestrator, webhook_secret.map(str::to_string));
    (prdesk_ingest::build_router(state), pool)
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .expect("Failed to count rows")
}
