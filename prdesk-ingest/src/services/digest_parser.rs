//! Digest multi-query parser
//!
//! Digest emails group short numbered items under one-word category headers:
//!
//! ```text
//! Business
//!
//! 1. Seeking CFOs on 2026 budget planning
//! Looking for finance leaders to comment on hiring freezes.
//! Sent from Forbes (q-7731@reply.tmxmail.com)
//! ```
//!
//! Line scanner in two passes: the first records category header positions,
//! the second walks numbered items. An item takes the category of the
//! nearest header above it ("General" when there is none). An item without
//! a "Sent from" line is a row error.

use chrono::{DateTime, NaiveTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use super::deadline::{self, Zone};
use super::extraction::{
    digest_request_type, extract_constraints, extract_expert_roles, extract_questions,
    is_hard_deadline, parse_sent_from, span_evidence, squash_whitespace,
};
use super::source_detector::category_header;
use super::ParseContext;
use crate::models::{ExtractedQuery, FieldEvidence, ParseMethod, ParseOutput, QueryCandidate};

/// Per-item confidence; the format is looser than the structured one
pub const BASE_CONFIDENCE: f64 = 0.8;

const DEFAULT_CATEGORY: &str = "General";

static NUMBERED_TITLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d{1,3})\.\s+(\S.*?)\s*$").expect("Invalid numbered title regex")
});

static BROADCAST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\b(?:mon|tue|tues|wed|thu|thur|thurs|fri|sat|sun)[a-z]*\.?,?\s+",
        r"(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+",
        r"(?:at\s+|from\s+|@\s*)?(\d{1,2}(?::\d{2})?\s*[ap]\.?\s?m\b\.?)",
        r"(?:\s+(?-i:([A-Z]{2,4}))\b)?",
    ))
    .expect("Invalid broadcast regex")
});

static DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,3})[- ]?(?:minutes?|mins?)\b").expect("Invalid duration regex")
});

static DEADLINE_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:deadline|due|by)\b[^\n]{0,40}?(\d{1,2}(?::\d{2})?\s*[ap]\.?\s?m\b\.?)")
        .expect("Invalid deadline time regex")
});

/// One body line with its byte span (line terminator excluded)
struct Line<'a> {
    text: &'a str,
    start: usize,
    end: usize,
}

fn scan_lines(body: &str) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    let mut offset = 0;
    for raw in body.split_inclusive('\n') {
        let text = raw.trim_end_matches(['\n', '\r']);
        lines.push(Line {
            text,
            start: offset,
            end: offset + text.len(),
        });
        offset += raw.len();
    }
    lines
}

/// Numbered item: title line plus the lines up to the next item or header
struct Item<'a> {
    number: &'a str,
    title: &'a Line<'a>,
    rest: &'a [Line<'a>],
}

/// Parse every numbered item of a digest email
pub fn parse(body: &str, ctx: &ParseContext) -> ParseOutput {
    let lines = scan_lines(body);

    // Pass 1: category headers by position
    let headers: Vec<(usize, &'static str)> = lines
        .iter()
        .filter_map(|line| category_header(line.text).map(|category| (line.start, category)))
        .collect();

    // Pass 2: numbered items
    let mut items = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let Some(caps) = NUMBERED_TITLE.captures(lines[i].text) else {
            i += 1;
            continue;
        };
        let number = caps.get(1).map_or("?", |m| m.as_str());

        let mut j = i + 1;
        while j < lines.len()
            && !NUMBERED_TITLE.is_match(lines[j].text)
            && category_header(lines[j].text).is_none()
        {
            j += 1;
        }

        items.push(Item {
            number,
            title: &lines[i],
            rest: &lines[i + 1..j],
        });
        i = j;
    }

    if items.is_empty() {
        return ParseOutput::from_rows(
            Vec::new(),
            vec!["no numbered items found".to_string()],
            BASE_CONFIDENCE,
        );
    }

    let mut candidates = Vec::new();
    let mut row_errors = Vec::new();

    for item in &items {
        let (category, header_offset) = nearest_header(&headers, item.title.start);
        match parse_item(body, item, category, header_offset, ctx) {
            Ok(candidate) => candidates.push(candidate),
            Err(reason) => {
                tracing::warn!(item = item.number, reason = %reason, "Digest item rejected");
                row_errors.push(format!("item {}: {}", item.number, reason));
            }
        }
    }

    tracing::debug!(
        items = items.len(),
        matched = candidates.len(),
        "Digest parse complete"
    );

    ParseOutput::from_rows(candidates, row_errors, BASE_CONFIDENCE)
}

fn nearest_header(headers: &[(usize, &'static str)], position: usize) -> (&'static str, Option<usize>) {
    headers
        .iter()
        .rev()
        .find(|(offset, _)| *offset < position)
        .map_or((DEFAULT_CATEGORY, None), |&(offset, category)| (category, Some(offset)))
}

fn parse_item(
    body: &str,
    item: &Item<'_>,
    category: &str,
    header_offset: Option<usize>,
    ctx: &ParseContext,
) -> Result<QueryCandidate, String> {
    let title = NUMBERED_TITLE
        .captures(item.title.text)
        .and_then(|caps| caps.get(2).map(|m| (m.as_str(), m.start())))
        .ok_or_else(|| "unreadable title line".to_string())?;

    let mut synopsis_lines: Vec<&Line<'_>> = Vec::new();
    let mut sent_from = None;
    for line in item.rest {
        if let Some(parsed) = parse_sent_from(line.text) {
            sent_from = Some((parsed, line));
            break;
        }
        if !line.text.trim().is_empty() {
            synopsis_lines.push(line);
        }
    }

    let Some(((outlet, alias), sent_line)) = sent_from else {
        return Err("missing 'Sent from' line".to_string());
    };

    let mut evidence: Vec<FieldEvidence> = Vec::new();

    let headline = squash_whitespace(title.0);
    let title_start = item.title.start + title.1;
    evidence.push(span_evidence(
        "headline",
        &headline,
        body,
        title_start,
        item.title.end,
        BASE_CONFIDENCE,
    ));

    let synopsis = squash_whitespace(
        &synopsis_lines
            .iter()
            .map(|line| line.text.trim())
            .collect::<Vec<_>>()
            .join(" "),
    );
    let synopsis_span = synopsis_lines
        .first()
        .zip(synopsis_lines.last())
        .map(|(first, last)| (first.start, last.end));
    if let Some((start, end)) = synopsis_span {
        evidence.push(span_evidence("summary", &synopsis, body, start, end, BASE_CONFIDENCE));
    }

    if let Some(offset) = header_offset {
        let end = offset + body[offset..].find('\n').unwrap_or(body.len() - offset);
        evidence.push(span_evidence("category", category, body, offset, end, BASE_CONFIDENCE));
    }

    evidence.push(span_evidence(
        "outlet_name",
        &outlet,
        body,
        sent_line.start,
        sent_line.end,
        BASE_CONFIDENCE,
    ));
    if let Some(alias) = &alias {
        evidence.push(span_evidence(
            "reply_alias",
            alias,
            body,
            sent_line.start,
            sent_line.end,
            BASE_CONFIDENCE,
        ));
    }

    let type_source = if synopsis.is_empty() { &headline } else { &synopsis };
    let request_type = digest_request_type(type_source);
    if let Some((start, end)) = synopsis_span {
        evidence.push(span_evidence("request_type", request_type.as_str(), body, start, end, 0.6));
    }

    let full_text = if synopsis.is_empty() {
        headline.clone()
    } else {
        format!("{}\n{}", headline, synopsis)
    };
    let text_start = title_start;
    let text_end = synopsis_span.map_or(item.title.end, |(_, end)| end);

    // Broadcast slot first; a deadline time is only looked for without one
    let broadcast = find_broadcast(&full_text, ctx);
    if let Some((at, _)) = &broadcast {
        evidence.push(span_evidence(
            "broadcast_at",
            at.to_rfc3339(),
            body,
            text_start,
            text_end,
            0.7,
        ));
    }
    let broadcast_duration_minutes = DURATION
        .captures(&full_text)
        .and_then(|caps| caps[1].parse::<u32>().ok())
        .filter(|minutes| *minutes > 0);

    let deadline = if broadcast.is_none() {
        find_deadline_time(&full_text, ctx)
    } else {
        None
    };
    if let Some(found) = &deadline {
        evidence.push(span_evidence(
            "deadline_at",
            found.at.to_rfc3339(),
            body,
            text_start,
            text_end,
            0.7,
        ));
    }

    let query = ExtractedQuery {
        headline,
        summary: (!synopsis.is_empty()).then(|| synopsis.clone()),
        category: Some(category.to_string()),
        request_type,
        expert_roles: extract_expert_roles(&full_text),
        constraints: extract_constraints(&full_text),
        questions: extract_questions(&full_text),
        tags: vec![category.to_lowercase()],
        deadline_date: deadline.as_ref().map(|d| d.zone.local_date(d.at)),
        deadline_time: deadline.as_ref().map(|d| d.time_text.clone()),
        deadline_timezone: deadline.as_ref().map(|d| d.zone_text.clone()),
        deadline_at: deadline.as_ref().map(|d| d.at),
        is_hard_deadline: is_hard_deadline(&full_text),
        broadcast_at: broadcast.map(|(at, _)| at),
        broadcast_duration_minutes,
        full_text,
        journalist_name: None,
        journalist_title: None,
        journalist_email: None,
        reply_alias: alias,
        journalist_profile_url: None,
        outlet_name: Some(outlet),
        outlet_website: None,
        confidence: BASE_CONFIDENCE,
        parse_method: ParseMethod::Regex,
    };

    Ok(QueryCandidate { query, evidence })
}

/// Weekday + month + day + time, next occurrence after the context clock
fn find_broadcast(text: &str, ctx: &ParseContext) -> Option<(DateTime<Utc>, Zone)> {
    let caps = BROADCAST.captures(text)?;
    let month = deadline::month_number(&caps[1])?;
    let day: u32 = caps[2].parse().ok()?;
    let time = deadline::parse_time(&caps[3])?;
    let zone = caps
        .get(4)
        .and_then(|m| deadline::lookup_zone(m.as_str()))
        .unwrap_or(Zone::Iana(ctx.default_tz));

    deadline::next_month_day(ctx.now, month, day, Some(time), &zone).map(|at| (at, zone))
}

struct DeadlineTime {
    at: DateTime<Utc>,
    zone: Zone,
    time_text: String,
    zone_text: String,
}

/// Same-day deadline time, rolled to tomorrow when already past
fn find_deadline_time(text: &str, ctx: &ParseContext) -> Option<DeadlineTime> {
    let caps = DEADLINE_TIME.captures(text)?;
    let time_match = caps.get(1)?;
    let time: NaiveTime = deadline::parse_time(time_match.as_str())?;

    let line_end = text[time_match.end()..]
        .find('\n')
        .map_or(text.len(), |idx| time_match.end() + idx);
    let (zone_text, zone) = deadline::find_zone(&text[time_match.end()..line_end])
        .unwrap_or_else(|| (ctx.default_tz.name().to_string(), Zone::Iana(ctx.default_tz)));

    let at = deadline::next_time_of_day(ctx.now, time, &zone)?;
    Some(DeadlineTime {
        at,
        zone,
        time_text: time_match.as_str().trim().to_string(),
        zone_text,
    })
}
