//! Source detection and parser results
//!
//! Row-level parser errors are plain strings: they are shown to reviewers
//! and stored in the job's `error_details`, never matched on.

use serde::{Deserialize, Serialize};

use super::{ParseMethod, QueryCandidate};

/// Third-party email format a message matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Consistently-labeled numbered blocks
    Structured,
    /// Category headers with numbered title/synopsis/sent-from items
    Digest,
    /// One free-form request
    Single,
    /// No known format
    Other,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Structured => "structured",
            SourceType::Digest => "digest",
            SourceType::Single => "single",
            SourceType::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "structured" => Some(SourceType::Structured),
            "digest" => Some(SourceType::Digest),
            "single" => Some(SourceType::Single),
            "other" => Some(SourceType::Other),
            _ => None,
        }
    }
}

/// Transient detector output, never persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDetection {
    pub source_type: SourceType,
    pub confidence: f64,
    /// Names of the indicators that matched
    pub indicators: Vec<String>,
}

/// Result of one parser run over one email body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseOutput {
    pub candidates: Vec<QueryCandidate>,
    /// Blocks/items that failed their grammar; parsing continued past them
    pub row_errors: Vec<String>,
    /// Aggregate confidence (0.0 - 1.0)
    pub confidence: f64,
    pub success: bool,
    pub method: ParseMethod,
}

impl ParseOutput {
    /// Aggregate for multi-record formats: base confidence scaled by the
    /// share of rows that matched their grammar
    pub fn from_rows(
        candidates: Vec<QueryCandidate>,
        row_errors: Vec<String>,
        base_confidence: f64,
    ) -> Self {
        let total = candidates.len() + row_errors.len();
        let confidence = if total == 0 {
            0.0
        } else {
            base_confidence * candidates.len() as f64 / total as f64
        };

        Self {
            success: !candidates.is_empty(),
            candidates,
            row_errors,
            confidence,
            method: ParseMethod::Regex,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows_scales_confidence() {
        let output = ParseOutput::from_rows(
            Vec::new(),
            vec!["block 1: missing Query".to_string()],
            0.95,
        );
        assert!(!output.success);
        assert_eq!(output.confidence, 0.0);

        let empty = ParseOutput::from_rows(Vec::new(), Vec::new(), 0.95);
        assert_eq!(empty.confidence, 0.0);
        assert!(!empty.success);
    }

    #[test]
    fn test_source_type_round_trip() {
        for source in [
            SourceType::Structured,
            SourceType::Digest,
            SourceType::Single,
            SourceType::Other,
        ] {
            assert_eq!(SourceType::parse(source.as_str()), Some(source));
        }
    }
}
