//! Shared helpers for prdesk-ingest

pub mod db_retry;

pub use db_retry::{is_lock_error, retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};
