//! Source-type detection
//!
//! Classifies an inbound email as one of the known third-party formats by
//! counting named indicator checks. Pure and infallible: worst case the
//! result is `other`.
//!
//! **Selection order:**
//! 1. structured if ≥5 of 9 structured indicators match
//! 2. digest-family if ≥4 of 8 digest indicators match; then digest when the
//!    body repeats the item shape (≥2 "Sent from" lines or ≥2 numbered
//!    items), otherwise single
//! 3. single if the body carries a reply-relay alias
//! 4. other

use once_cell::sync::Lazy;
use regex::Regex;

use super::extraction::REPLY_ALIAS;
use crate::models::{SourceDetection, SourceType};

pub const STRUCTURED_THRESHOLD: usize = 5;
pub const DIGEST_THRESHOLD: usize = 4;

/// Confidence of the reply-alias fallback
const FALLBACK_CONFIDENCE: f64 = 0.5;

/// Digest category headers (one word on its own line, optional colon)
pub const CATEGORY_WORDS: &[&str] = &[
    "Business",
    "Technology",
    "Tech",
    "Health",
    "Wellness",
    "Lifestyle",
    "Finance",
    "Education",
    "Entertainment",
    "Travel",
    "Sports",
    "Politics",
    "Science",
    "Food",
    "Beauty",
    "Fashion",
    "Parenting",
    "Legal",
    "Marketing",
    "Environment",
    "Energy",
    "Automotive",
    "Pets",
    "Home",
    "General",
];

static STRUCTURED_SENDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)@(?:[a-z0-9-]+\.)*sourceofsources\.(?:com|org|net)\b")
        .expect("Invalid structured sender regex")
});

static STRUCTURED_SUBJECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bsource of sources\b|\bSOS\b|\bqueries for\b")
        .expect("Invalid structured subject regex")
});

static SUMMARY_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*\d+\)[ \t]*Summary:").expect("Invalid summary label regex")
});

static DIGEST_SENDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)@(?:[a-z0-9-]+\.)*tmx(?:mail)?\.(?:com|net|io)\b")
        .expect("Invalid digest sender regex")
});

static DIGEST_SUBJECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bmedia (?:queries|requests|opportunities)\b|\bjournalist requests?\b|\bdaily digest\b|\[TMX\]")
        .expect("Invalid digest subject regex")
});

static SENT_FROM_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[ \t]*sent[ \t]+from[ \t]+\S").expect("Invalid sent-from line regex")
});

static NUMBERED_ITEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*\d{1,3}\.[ \t]+\S").expect("Invalid numbered item regex")
});

static REQUEST_PHRASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:looking for|seeking|searching for|in search of|want(?:s)? to (?:speak|talk) (?:with|to))\b")
        .expect("Invalid request phrase regex")
});

static ALERT_FOOTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bunsubscribe\b|\bmanage (?:your )?alerts\b|\byou are receiving this\b")
        .expect("Invalid alert footer regex")
});

fn label_present(body: &str, label: &str) -> bool {
    body.lines()
        .any(|line| line.trim_start().starts_with(label))
}

/// True when `line` is a digest category header; returns the category
pub fn category_header(line: &str) -> Option<&'static str> {
    let word = line.trim().trim_end_matches(':').trim();
    CATEGORY_WORDS
        .iter()
        .find(|category| category.eq_ignore_ascii_case(word))
        .copied()
}

/// Named structured-format checks, in a fixed order
fn structured_indicators(subject: &str, body: &str, from: &str) -> Vec<(&'static str, bool)> {
    vec![
        ("sender_domain", STRUCTURED_SENDER.is_match(from)),
        ("subject_marker", STRUCTURED_SUBJECT.is_match(subject)),
        ("summary_label", SUMMARY_LABEL.is_match(body)),
        ("category_label", label_present(body, "Category:")),
        ("name_label", label_present(body, "Name:")),
        ("email_label", label_present(body, "Email:")),
        ("outlet_label", label_present(body, "Media Outlet:")),
        ("deadline_label", label_present(body, "Deadline:")),
        ("query_label", label_present(body, "Query:")),
    ]
}

/// Named digest-family checks, in a fixed order
fn digest_indicators(subject: &str, body: &str, from: &str) -> Vec<(&'static str, bool)> {
    vec![
        ("sender_domain", DIGEST_SENDER.is_match(from)),
        ("subject_marker", DIGEST_SUBJECT.is_match(subject)),
        ("sent_from_line", SENT_FROM_LINE.is_match(body)),
        ("reply_alias", REPLY_ALIAS.is_match(body)),
        ("category_header", body.lines().any(|line| category_header(line).is_some())),
        ("numbered_item", NUMBERED_ITEM.is_match(body)),
        ("request_phrase", REQUEST_PHRASE.is_match(body)),
        ("alert_footer", ALERT_FOOTER.is_match(body)),
    ]
}

fn matched(indicators: &[(&'static str, bool)]) -> Vec<String> {
    indicators
        .iter()
        .filter(|(_, hit)| *hit)
        .map(|(name, _)| name.to_string())
        .collect()
}

/// Classify an email
pub fn detect(subject: &str, body: &str, from: &str) -> SourceDetection {
    let structured = structured_indicators(subject, body, from);
    let structured_hits = matched(&structured);
    if structured_hits.len() >= STRUCTURED_THRESHOLD {
        return SourceDetection {
            source_type: SourceType::Structured,
            confidence: structured_hits.len() as f64 / structured.len() as f64,
            indicators: structured_hits,
        };
    }

    let digest = digest_indicators(subject, body, from);
    let digest_hits = matched(&digest);
    if digest_hits.len() >= DIGEST_THRESHOLD {
        let sent_from_lines = SENT_FROM_LINE.find_iter(body).count();
        let numbered_items = NUMBERED_ITEM.find_iter(body).count();
        let source_type = if sent_from_lines >= 2 || numbered_items >= 2 {
            SourceType::Digest
        } else {
            SourceType::Single
        };

        return SourceDetection {
            source_type,
            confidence: digest_hits.len() as f64 / digest.len() as f64,
            indicators: digest_hits,
        };
    }

    if REPLY_ALIAS.is_match(body) {
        return SourceDetection {
            source_type: SourceType::Single,
            confidence: FALLBACK_CONFIDENCE,
            indicators: vec!["reply_alias_fallback".to_string()],
        };
    }

    SourceDetection {
        source_type: SourceType::Other,
        confidence: 1.0,
        indicators: Vec::new(),
    }
}
