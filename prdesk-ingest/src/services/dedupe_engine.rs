//! Query fingerprinting and duplicate classification
//!
//! A fingerprint is two 10-hex-char SHA-256 halves:
//! `sha256(outlet|headline)[..10] + sha256(deadline_date|journalist_email)[..10]`.
//! The first half alone identifies outlet + headline, so records that share
//! it but differ in deadline or contact are near-duplicates.
//!
//! **Classification** (against the same agency only, strict priority):
//! 1. exact fingerprint match → `auto_merged` (never persisted)
//! 2. prefix match → `merge_suggested` (persisted, linked to the matches)
//! 3. otherwise → `none`

use prdesk_common::{Error, Result};
use sha2::{Digest, Sha256};
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

use crate::models::{DedupeAction, ExtractedQuery};

/// Hex chars per fingerprint half
pub const FINGERPRINT_PREFIX_LEN: usize = 10;

const MAX_NORMALIZED_CHARS: usize = 40;
const MAX_SIMILAR_IDS: i64 = 20;

/// Dedupe classification for one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupeDecision {
    pub action: DedupeAction,
    pub duplicate_of_id: Option<Uuid>,
    pub similar_query_ids: Vec<Uuid>,
}

impl DedupeDecision {
    pub fn unique() -> Self {
        Self {
            action: DedupeAction::None,
            duplicate_of_id: None,
            similar_query_ids: Vec::new(),
        }
    }

    pub fn auto_merged(original: Uuid) -> Self {
        Self {
            action: DedupeAction::AutoMerged,
            duplicate_of_id: Some(original),
            similar_query_ids: Vec::new(),
        }
    }
}

/// Lower-case, alphanumerics separated by single spaces, at most 40 chars
pub fn normalize(text: &str) -> String {
    let spaced: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let squashed = spaced.split_whitespace().collect::<Vec<_>>().join(" ");
    squashed
        .chars()
        .take(MAX_NORMALIZED_CHARS)
        .collect::<String>()
        .trim_end()
        .to_string()
}

fn hex_prefix(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut hex = format!("{:x}", digest);
    hex.truncate(FINGERPRINT_PREFIX_LEN);
    hex
}

/// 20-hex-char fingerprint of an extracted query
pub fn fingerprint(query: &ExtractedQuery) -> String {
    let outlet = normalize(query.outlet_name.as_deref().unwrap_or(""));
    let headline = normalize(&query.headline);
    let date = query
        .deadline_date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default();
    let email = query
        .journalist_email
        .as_deref()
        .map(|e| e.trim().to_lowercase())
        .unwrap_or_default();

    let mut fingerprint = hex_prefix(&format!("{}|{}", outlet, headline));
    fingerprint.push_str(&hex_prefix(&format!("{}|{}", date, email)));
    fingerprint
}

/// Outlet + headline half of a fingerprint
pub fn fingerprint_prefix(fingerprint: &str) -> &str {
    fingerprint.get(..FINGERPRINT_PREFIX_LEN).unwrap_or(fingerprint)
}

/// Classifies candidates against persisted queries
pub struct DedupeEngine {
    db: Pool<Sqlite>,
}

impl DedupeEngine {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    /// Classify a fingerprint within one agency
    pub async fn classify(&self, agency_id: &str, fingerprint: &str) -> Result<DedupeDecision> {
        let exact: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM parsed_queries WHERE agency_id = ? AND fingerprint = ? LIMIT 1",
        )
        .bind(agency_id)
        .bind(fingerprint)
        .fetch_optional(&self.db)
        .await?;

        if let Some((id,)) = exact {
            let original = parse_id(&id)?;
            tracing::info!(
                agency_id = %agency_id,
                fingerprint = %fingerprint,
                original = %original,
                "Exact duplicate query, auto-merging"
            );
            return Ok(DedupeDecision::auto_merged(original));
        }

        let similar: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT id FROM parsed_queries
            WHERE agency_id = ? AND substr(fingerprint, 1, ?) = ?
            ORDER BY created_at
            LIMIT ?
            "#,
        )
        .bind(agency_id)
        .bind(FINGERPRINT_PREFIX_LEN as i64)
        .bind(fingerprint_prefix(fingerprint))
        .bind(MAX_SIMILAR_IDS)
        .fetch_all(&self.db)
        .await?;

        if similar.is_empty() {
            return Ok(DedupeDecision::unique());
        }

        let similar_query_ids = similar
            .iter()
            .map(|(id,)| parse_id(id))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            agency_id = %agency_id,
            fingerprint = %fingerprint,
            similar = similar_query_ids.len(),
            "Near-duplicate query, suggesting merge"
        );

        Ok(DedupeDecision {
            action: DedupeAction::MergeSuggested,
            duplicate_of_id: None,
            similar_query_ids,
        })
    }
}

fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).map_err(|e| Error::Internal(format!("Invalid UUID in database: {}", e)))
}
