//! Database initialization
//!
//! Creates the SQLite database on first run and brings the schema up to date
//! with idempotent `CREATE TABLE IF NOT EXISTS` statements. Write-time
//! invariants of the ingestion pipeline live here as UNIQUE indexes:
//! - one ingestion job per external message id
//! - one parsed query per (agency, fingerprint)

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// SQLite busy timeout before a "database is locked" error surfaces
const BUSY_TIMEOUT_MS: u64 = 250;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Pragmas set on the connect options apply to every pooled connection
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// In-memory database with the full schema
///
/// Pinned to a single connection: every SQLite `:memory:` connection is a
/// separate database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create every table and index (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_ingestion_jobs_table(pool).await?;
    create_parsed_queries_table(pool).await?;
    create_parse_evidence_table(pool).await?;

    info!("Database tables initialized (settings, ingestion_jobs, parsed_queries, parse_evidence)");
    Ok(())
}

/// Create the settings table
///
/// Stores application configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_ingestion_jobs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ingestion_jobs (
            id TEXT PRIMARY KEY,
            agency_id TEXT NOT NULL,
            from_address TEXT NOT NULL,
            to_address TEXT,
            subject TEXT NOT NULL,
            body_text TEXT NOT NULL,
            body_html TEXT,
            received_at TEXT NOT NULL,
            message_id TEXT,
            folder_id TEXT,
            thread_id TEXT,
            has_attachments INTEGER NOT NULL DEFAULT 0,
            source_type TEXT,
            status TEXT NOT NULL,
            queries_created INTEGER NOT NULL DEFAULT 0,
            processing_started_at TEXT,
            processing_completed_at TEXT,
            error_message TEXT,
            error_details TEXT,
            raw_payload TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // NULL message ids are not constrained (SQLite treats NULLs as distinct)
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_ingestion_jobs_message_id ON ingestion_jobs(message_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_ingestion_jobs_agency ON ingestion_jobs(agency_id, created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_parsed_queries_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS parsed_queries (
            id TEXT PRIMARY KEY,
            agency_id TEXT NOT NULL,
            job_id TEXT NOT NULL REFERENCES ingestion_jobs(id),
            source_type TEXT NOT NULL,

            headline TEXT NOT NULL,
            summary TEXT,
            category TEXT,
            request_type TEXT NOT NULL,
            full_text TEXT NOT NULL,
            expert_roles TEXT NOT NULL DEFAULT '[]',
            constraints TEXT NOT NULL DEFAULT '[]',
            questions TEXT NOT NULL DEFAULT '[]',
            tags TEXT NOT NULL DEFAULT '[]',
            deadline_date TEXT,
            deadline_time TEXT,
            deadline_timezone TEXT,
            deadline_at TEXT,
            is_hard_deadline INTEGER NOT NULL DEFAULT 0,
            broadcast_at TEXT,
            broadcast_duration_minutes INTEGER,

            journalist_name TEXT,
            journalist_title TEXT,
            journalist_email TEXT,
            reply_alias TEXT,
            journalist_profile_url TEXT,
            outlet_name TEXT,
            outlet_website TEXT,

            fingerprint TEXT NOT NULL,
            dedupe_action TEXT NOT NULL,
            duplicate_of_id TEXT,
            similar_query_ids TEXT NOT NULL DEFAULT '[]',

            confidence REAL NOT NULL,
            parse_method TEXT NOT NULL,

            status TEXT NOT NULL DEFAULT 'pending_review',
            reviewed_by TEXT,
            reviewed_at TEXT,
            review_notes TEXT,
            assigned_client_ids TEXT NOT NULL DEFAULT '[]',
            assigned_by TEXT,
            assigned_at TEXT,
            published_opportunity_id TEXT,

            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_parsed_queries_fingerprint ON parsed_queries(agency_id, fingerprint)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_parsed_queries_status ON parsed_queries(agency_id, status, created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_parse_evidence_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS parse_evidence (
            id TEXT PRIMARY KEY,
            query_id TEXT NOT NULL REFERENCES parsed_queries(id) ON DELETE CASCADE,
            field_name TEXT NOT NULL,
            extracted_value TEXT NOT NULL,
            source_excerpt TEXT NOT NULL,
            char_start INTEGER,
            char_end INTEGER,
            confidence REAL NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_parse_evidence_query ON parse_evidence(query_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
