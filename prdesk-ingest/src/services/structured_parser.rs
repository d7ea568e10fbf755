//! Structured multi-query parser
//!
//! The structured service sends numbered blocks with a fixed, ordered label
//! sequence:
//!
//! ```text
//! 1) Summary: ...
//! Category: ...
//! Name: ...
//! Email: ...
//! Muck Rack: ...          (optional, "Profile:" also accepted)
//! Media Outlet: ...
//! Outlet Website: ...     (optional)
//! Deadline: December 17, 2025
//! Deadline Time: 12:00 pm
//! Time Zone: Eastern Standard Time
//! Query: free text to the end of the block
//! ```
//!
//! A block ends at a separator line (`---`, `===`, `***`), the next block
//! header, or the end of the body. Each block is matched against one ordered
//! grammar; a block that does not match becomes a row error and parsing
//! continues with the next block.

use chrono::Datelike;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::deadline::{self, Zone};
use super::extraction::{
    extract_constraints, find_expert_roles, find_questions, is_hard_deadline,
    span_evidence, squash_whitespace, structured_request_type, truncate_chars,
};
use super::ParseContext;
use crate::models::{ExtractedQuery, FieldEvidence, ParseMethod, ParseOutput, QueryCandidate};

/// Confidence of a block that matched the grammar
pub const BASE_CONFIDENCE: f64 = 0.95;

const HEADLINE_MAX_CHARS: usize = 200;

static BLOCK_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(\d+)\)[ \t]*Summary:").expect("Invalid block header regex")
});

static SEPARATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:-{3,}|={3,}|\*{3,})[ \t]*\r?$").expect("Invalid separator regex")
});

static BLOCK_GRAMMAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?s)\A[ \t]*\d+\)[ \t]*Summary:[ \t]*(?P<summary>.+?)",
        r"[ \t]*\r?\n\s*Category:[ \t]*(?P<category>[^\r\n]*)",
        r"\r?\n\s*Name:[ \t]*(?P<name>[^\r\n]*)",
        r"\r?\n\s*Email:[ \t]*(?P<email>[^\r\n]*)",
        r"(?:\r?\n\s*(?:Muck Rack|Profile):[ \t]*(?P<profile>[^\r\n]*))?",
        r"\r?\n\s*Media Outlet:[ \t]*(?P<outlet>[^\r\n]*)",
        r"(?:\r?\n\s*Outlet Website:[ \t]*(?P<website>[^\r\n]*))?",
        r"\r?\n\s*Deadline:[ \t]*(?P<deadline>[^\r\n]*)",
        r"\r?\n\s*Deadline Time:[ \t]*(?P<time>[^\r\n]*)",
        r"\r?\n\s*Time Zone:[ \t]*(?P<tz>[^\r\n]*)",
        r"\r?\n\s*Query:[ \t]*(?P<query>.*?)\s*\z",
    ))
    .expect("Invalid structured block grammar")
});

const REQUIRED_LABELS: &[&str] = &[
    "Category:",
    "Name:",
    "Email:",
    "Media Outlet:",
    "Deadline:",
    "Deadline Time:",
    "Time Zone:",
    "Query:",
];

/// One numbered block and its byte offset in the body
struct Block<'a> {
    number: &'a str,
    text: &'a str,
    offset: usize,
}

fn split_blocks(body: &str) -> Vec<Block<'_>> {
    let headers: Vec<(usize, &str)> = BLOCK_HEADER
        .captures_iter(body)
        .filter_map(|caps| {
            let start = caps.get(0)?.start();
            let number = caps.get(1)?.as_str();
            Some((start, number))
        })
        .collect();

    headers
        .iter()
        .enumerate()
        .map(|(i, &(start, number))| {
            let end = headers.get(i + 1).map_or(body.len(), |&(next, _)| next);
            let mut text = &body[start..end];
            if let Some(sep) = SEPARATOR.find(text) {
                text = &text[..sep.start()];
            }
            Block {
                number,
                text,
                offset: start,
            }
        })
        .collect()
}

/// Parse every numbered block of a structured email
pub fn parse(body: &str, ctx: &ParseContext) -> ParseOutput {
    let blocks = split_blocks(body);
    if blocks.is_empty() {
        return ParseOutput::from_rows(
            Vec::new(),
            vec!["no numbered query blocks found".to_string()],
            BASE_CONFIDENCE,
        );
    }

    let mut candidates = Vec::new();
    let mut row_errors = Vec::new();

    for block in &blocks {
        match parse_block(body, block, ctx) {
            Ok(candidate) => candidates.push(candidate),
            Err(reason) => {
                tracing::warn!(block = block.number, reason = %reason, "Structured block rejected");
                row_errors.push(format!("block {}: {}", block.number, reason));
            }
        }
    }

    tracing::debug!(
        blocks = blocks.len(),
        matched = candidates.len(),
        "Structured parse complete"
    );

    ParseOutput::from_rows(candidates, row_errors, BASE_CONFIDENCE)
}

fn parse_block(body: &str, block: &Block<'_>, ctx: &ParseContext) -> Result<QueryCandidate, String> {
    let caps = BLOCK_GRAMMAR
        .captures(block.text)
        .ok_or_else(|| diagnose(block.text))?;

    let mut evidence = Vec::new();
    let record = |field: &str, value: &str, group: &str, evidence: &mut Vec<FieldEvidence>| {
        if let Some(m) = caps.name(group) {
            evidence.push(span_evidence(
                field,
                value,
                body,
                block.offset + m.start(),
                block.offset + m.end(),
                BASE_CONFIDENCE,
            ));
        }
    };

    let summary = squash_whitespace(group(&caps, "summary").unwrap_or_default());
    if summary.is_empty() {
        return Err("empty Summary".to_string());
    }
    let headline = truncate_chars(&summary, HEADLINE_MAX_CHARS);
    record("headline", &headline, "summary", &mut evidence);

    let query_text = group(&caps, "query").unwrap_or_default().trim().to_string();
    if query_text.is_empty() {
        return Err("empty Query".to_string());
    }
    record("full_text", &query_text, "query", &mut evidence);

    let category = group(&caps, "category").map(str::to_string);
    if let Some(value) = &category {
        record("category", value, "category", &mut evidence);
    }

    let journalist_name = group(&caps, "name").map(str::to_string);
    if let Some(value) = &journalist_name {
        record("journalist_name", value, "name", &mut evidence);
    }

    let journalist_email = group(&caps, "email")
        .filter(|v| v.contains('@'))
        .map(str::to_lowercase);
    if let Some(value) = &journalist_email {
        record("journalist_email", value, "email", &mut evidence);
    }

    let journalist_profile_url = group(&caps, "profile").map(str::to_string);
    if let Some(value) = &journalist_profile_url {
        record("journalist_profile_url", value, "profile", &mut evidence);
    }

    let outlet_name = group(&caps, "outlet").map(str::to_string);
    if let Some(value) = &outlet_name {
        record("outlet_name", value, "outlet", &mut evidence);
    }

    let outlet_website = group(&caps, "website").map(str::to_string);
    if let Some(value) = &outlet_website {
        record("outlet_website", value, "website", &mut evidence);
    }

    // Deadline: date + time + zone name
    let deadline_raw = group(&caps, "deadline");
    let time_raw = group(&caps, "time");
    let tz_raw = group(&caps, "tz");

    let zone = tz_raw
        .and_then(deadline::lookup_zone)
        .unwrap_or(Zone::Iana(ctx.default_tz));
    let fallback_year = zone.local_date(ctx.now).year();
    let deadline_date = deadline_raw.and_then(|raw| deadline::parse_date(raw, fallback_year));
    let deadline_time = time_raw.and_then(deadline::parse_time);
    let deadline_at = deadline_date.and_then(|date| deadline::resolve(date, deadline_time, &zone));

    if let (Some(deadline_match), Some(tz_match)) = (caps.name("deadline"), caps.name("tz")) {
        let value = deadline_at
            .map(|at| at.to_rfc3339())
            .or_else(|| deadline_raw.map(str::to_string))
            .unwrap_or_default();
        if !value.is_empty() {
            let confidence = if deadline_at.is_some() { BASE_CONFIDENCE } else { 0.5 };
            evidence.push(span_evidence(
                "deadline_at",
                value,
                body,
                block.offset + deadline_match.start(),
                block.offset + tz_match.end(),
                confidence,
            ));
        }
    }

    // Derived from the free-text query
    let request_type = structured_request_type(&query_text);
    let roles = find_expert_roles(&query_text);
    let constraints = extract_constraints(&query_text);
    let found_questions = find_questions(&query_text);
    let is_hard = is_hard_deadline(&query_text) || deadline_raw.is_some_and(is_hard_deadline);

    if let Some(m) = caps.name("query") {
        let start = block.offset + m.start();
        let end = block.offset + m.end();
        evidence.push(span_evidence("request_type", request_type.as_str(), body, start, end, 0.7));
        // `query_text` is the trimmed group
        let text_start = start + (m.as_str().len() - m.as_str().trim_start().len());
        for (role, s, e) in &roles {
            evidence.push(span_evidence("expert_roles", role.as_str(), body, text_start + s, text_start + e, 0.6));
        }
        for (question, s, e) in &found_questions {
            evidence.push(span_evidence("questions", question.as_str(), body, text_start + s, text_start + e, 0.6));
        }
    }

    let expert_roles: Vec<String> = roles.into_iter().map(|(role, _, _)| role).collect();
    let questions: Vec<String> = found_questions.into_iter().map(|(q, _, _)| q).collect();

    let tags = category
        .iter()
        .map(|c| c.to_lowercase())
        .collect::<Vec<_>>();

    let query = ExtractedQuery {
        headline,
        summary: Some(summary),
        category,
        request_type,
        full_text: query_text,
        expert_roles,
        constraints,
        questions,
        tags,
        deadline_date,
        deadline_time: time_raw.map(str::to_string),
        deadline_timezone: tz_raw
            .map(str::to_string)
            .or_else(|| Some(ctx.default_tz.name().to_string())),
        deadline_at,
        is_hard_deadline: is_hard,
        broadcast_at: None,
        broadcast_duration_minutes: None,
        journalist_name,
        journalist_title: None,
        journalist_email,
        reply_alias: None,
        journalist_profile_url,
        outlet_name,
        outlet_website,
        confidence: BASE_CONFIDENCE,
        parse_method: ParseMethod::Regex,
    };

    Ok(QueryCandidate { query, evidence })
}

/// Trimmed, non-empty capture group
fn group<'t>(caps: &Captures<'t>, name: &str) -> Option<&'t str> {
    caps.name(name)
        .map(|m| m.as_str().trim())
        .filter(|v| !v.is_empty())
}

/// Explain why a block failed the grammar
fn diagnose(block: &str) -> String {
    for label in REQUIRED_LABELS {
        let present = block
            .lines()
            .any(|line| line.trim_start().starts_with(label));
        if !present {
            return format!("missing '{}' label", label.trim_end_matches(':'));
        }
    }
    "labels out of order".to_string()
}
