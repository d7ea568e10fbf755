//! Free-form single-query parser
//!
//! One journalist, one request, no fixed layout. The deterministic pass runs
//! independent extractors; each adds a fixed weight to the confidence when
//! it finds its field. A low total may be handed to an LLM backend, whose
//! answer replaces the regex result only when it is more confident.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;

use super::deadline::{self, Zone};
use super::extraction::{
    digest_request_type, extract_constraints, find_expert_roles, find_questions,
    find_reply_alias, is_hard_deadline, located_evidence, parse_sent_from, span_evidence,
    squash_whitespace, text_evidence, truncate_chars,
};
use super::llm_client::{strip_code_fence, ExtractionBackend, LlmError};
use super::ParseContext;
use crate::models::{
    ExtractedQuery, FieldEvidence, ParseMethod, ParseOutput, QueryCandidate, RequestType,
};

const OUTLET_TITLE_WEIGHT: f64 = 0.25;
const SENT_FROM_WEIGHT: f64 = 0.15;
const REPLY_ALIAS_WEIGHT: f64 = 0.15;
const TOPIC_WEIGHT: f64 = 0.2;
const EXPERT_ROLES_WEIGHT: f64 = 0.1;
const QUESTIONS_WEIGHT: f64 = 0.1;
const DEADLINE_WEIGHT: f64 = 0.15;

/// Below this (and without an outlet) the email is not a usable query
pub const MIN_CONFIDENCE: f64 = 0.3;

/// Regex results at or above this never consult the LLM
pub const LLM_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Evidence confidence for a regex span
const SPAN_CONFIDENCE: f64 = 0.85;
/// Evidence confidence for a headline taken from the subject line
const SUBJECT_CONFIDENCE: f64 = 0.5;

const MAX_HEADLINE_CHARS: usize = 200;
const MAX_PROMPT_BODY_CHARS: usize = 8000;

const EXTRACTION_INSTRUCTIONS: &str = "You extract a journalist's media request from an email. \
Respond with one JSON object and nothing else, using these keys: headline, summary, category, \
request_type (one of live, phone, in_person, emailed, quote, background, contact_request, other), \
expert_roles (array of strings), constraints (array of strings), questions (array of strings), \
deadline (ISO 8601 date or date-time), deadline_timezone, is_hard_deadline (boolean), \
journalist_name, journalist_title, journalist_email, outlet_name, outlet_website, reply_alias, \
confidence (number from 0.0 to 1.0). Use null for anything the email does not say.";

static OUTLET_TITLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)(?:^|[\s(])((?:[a-z-]+[ \t]+){0,2}(?:reporter|writer|editor|producer|journalist|correspondent|columnist|contributor|host|freelancer|blogger)s?)",
        r"[ \t]+(?:at|for|with)[ \t]+",
        r"((?:the[ \t]+)?(?-i:[A-Z])[\w&'-]*(?:[ \t]+(?-i:[A-Z&])[\w&'-]*){0,5})",
    ))
    .expect("Invalid outlet title regex")
});

static JOURNALIST_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:I'm|I am|My name is|This is)\s+([A-Z][a-z]+(?:[ \t]+[A-Z][a-z'-]+){1,2})\b")
        .expect("Invalid journalist name regex")
});

static TOPIC_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\b(?:working on|writing|putting together|researching|producing|reporting)\s+(?:a|an)\s+(?:[a-z-]+\s+)?(?:story|piece|article|feature|segment|report|roundup|column|post)\s+(?:about|on|for|exploring|looking at|covering)\s+([^.\n?!]{5,160})",
        r"(?i)\bmy (?:story|piece|article|segment|feature) (?:is )?(?:about|on|explores|covers)\s+([^.\n?!]{5,160})",
        r"(?i)\b(?:story|piece|article|segment) (?:is about|will explore|looks at|explores)\s+([^.\n?!]{5,160})",
        r"(?i)\b(?:reporting on|writing about|covering)\s+([^.\n?!]{5,160})",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("Invalid topic pattern"))
    .collect()
});

static SUBJECT_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:(?:re|fwd?|fw)\s*:\s*|\[[^\]]*\]\s*)*").expect("Invalid subject prefix regex")
});

static DEADLINE_PHRASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:deadline(?:\s+is)?|due(?:\s+by)?|(?:needed|respond|reply|responses?|submit|send)(?:\s+[a-z]+)?\s+by|no later than)\b\s*:?\s*([^\n]{1,80})")
        .expect("Invalid deadline phrase regex")
});

static MONTH_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(\d{1,2})(?:st|nd|rd|th)?\b(?:,?\s+(\d{4}))?")
        .expect("Invalid month-day regex")
});

static WEEKDAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(monday|tuesday|wednesday|thursday|friday|saturday|sunday|mon|tues|tue|wed|thurs|thu|fri)\b")
        .expect("Invalid weekday regex")
});

// Words left in front of a title by the modifier slots
const TITLE_FILLER: &[&str] = &["a", "an", "the", "am", "is", "as", "and", "was", "im"];

/// LLM fallback for one parse
#[derive(Clone, Copy)]
pub struct LlmFallback<'a> {
    pub backend: &'a dyn ExtractionBackend,
    pub timeout: Duration,
}

/// Parse a single-query email
///
/// `llm` is `None` when the caller does not want the LLM pass or no backend
/// is configured. LLM failures are logged and absorbed.
pub async fn parse(
    subject: &str,
    body: &str,
    ctx: &ParseContext,
    llm: Option<LlmFallback<'_>>,
) -> ParseOutput {
    let regex_output = parse_deterministic(subject, body, ctx);

    let Some(llm) = llm else {
        return regex_output;
    };
    if regex_output.confidence >= LLM_CONFIDENCE_THRESHOLD {
        return regex_output;
    }

    match extract_with_llm(subject, body, ctx, llm).await {
        Ok(candidate) if candidate.query.confidence > regex_output.confidence => {
            tracing::debug!(
                backend = llm.backend.name(),
                llm_confidence = candidate.query.confidence,
                regex_confidence = regex_output.confidence,
                "LLM extraction supersedes regex result"
            );
            let confidence = candidate.query.confidence;
            ParseOutput {
                candidates: vec![candidate],
                row_errors: Vec::new(),
                confidence,
                success: true,
                method: ParseMethod::Llm,
            }
        }
        Ok(candidate) => {
            tracing::debug!(
                backend = llm.backend.name(),
                llm_confidence = candidate.query.confidence,
                regex_confidence = regex_output.confidence,
                "LLM extraction not more confident, keeping regex result"
            );
            regex_output
        }
        Err(e) => {
            tracing::warn!(
                backend = llm.backend.name(),
                error = %e,
                "LLM extraction failed, keeping regex result"
            );
            regex_output
        }
    }
}

/// Regex-only pass
pub fn parse_deterministic(subject: &str, body: &str, ctx: &ParseContext) -> ParseOutput {
    let mut query = ExtractedQuery {
        full_text: body.trim().to_string(),
        request_type: digest_request_type(body),
        parse_method: ParseMethod::Regex,
        ..Default::default()
    };
    let mut evidence: Vec<FieldEvidence> = Vec::new();
    let mut confidence = 0.0;

    if let Some(caps) = OUTLET_TITLE.captures(body) {
        let outlet = caps[2].trim_end_matches(['\'', '-']).trim().to_string();
        let title = clean_title(&caps[1]);
        let whole = caps.get(0).map_or(0..0, |m| m.range());

        evidence.push(span_evidence("outlet_name", outlet.clone(), body, whole.start, whole.end, SPAN_CONFIDENCE));
        if let Some(title) = &title {
            evidence.push(span_evidence("journalist_title", title.clone(), body, whole.start, whole.end, SPAN_CONFIDENCE));
        }
        query.outlet_name = Some(outlet);
        query.journalist_title = title;
        confidence += OUTLET_TITLE_WEIGHT;
    }

    if query.outlet_name.is_none() {
        if let Some((outlet, alias, start, end)) = find_sent_from(body) {
            evidence.push(span_evidence("outlet_name", outlet.clone(), body, start, end, SPAN_CONFIDENCE));
            query.outlet_name = Some(outlet);
            query.reply_alias = alias;
            confidence += SENT_FROM_WEIGHT;
        }
    }

    if let Some((alias, start, end)) = find_reply_alias(body) {
        evidence.push(span_evidence("reply_alias", alias.clone(), body, start, end, SPAN_CONFIDENCE));
        query.reply_alias = Some(alias);
        confidence += REPLY_ALIAS_WEIGHT;
    }

    if let Some(caps) = JOURNALIST_NAME.captures(body) {
        if let Some(name) = caps.get(1) {
            evidence.push(span_evidence("journalist_name", name.as_str(), body, name.start(), name.end(), SPAN_CONFIDENCE));
            query.journalist_name = Some(name.as_str().to_string());
        }
    }

    match find_topic(body) {
        Some((topic, start, end)) => {
            let headline = truncate_chars(&capitalize(&topic), MAX_HEADLINE_CHARS);
            evidence.push(span_evidence("headline", headline.clone(), body, start, end, SPAN_CONFIDENCE));
            query.summary = Some(topic);
            query.headline = headline;
            confidence += TOPIC_WEIGHT;
        }
        None => {
            let headline = headline_from_subject(subject, body);
            evidence.push(text_evidence("headline", headline.clone(), subject, SUBJECT_CONFIDENCE));
            query.headline = headline;
        }
    }

    let roles = find_expert_roles(body);
    if !roles.is_empty() {
        for (role, start, end) in &roles {
            evidence.push(span_evidence("expert_roles", role.as_str(), body, *start, *end, SPAN_CONFIDENCE));
        }
        query.expert_roles = roles.into_iter().map(|(role, _, _)| role).collect();
        confidence += EXPERT_ROLES_WEIGHT;
    }

    let questions = find_questions(body);
    if !questions.is_empty() {
        for (question, start, end) in &questions {
            evidence.push(span_evidence("questions", question.as_str(), body, *start, *end, SPAN_CONFIDENCE));
        }
        query.questions = questions.into_iter().map(|(question, _, _)| question).collect();
        confidence += QUESTIONS_WEIGHT;
    }

    query.constraints = extract_constraints(body);
    query.is_hard_deadline = is_hard_deadline(body);

    if let Some(found) = find_deadline(body, ctx) {
        evidence.push(span_evidence("deadline_at", found.at.to_rfc3339(), body, found.start, found.end, SPAN_CONFIDENCE));
        query.deadline_date = Some(found.zone.local_date(found.at));
        query.deadline_time = found.time.map(|t| t.format("%H:%M").to_string());
        query.deadline_timezone = Some(found.zone_name);
        query.deadline_at = Some(found.at);
        confidence += DEADLINE_WEIGHT;
    }

    let confidence: f64 = f64::min(confidence, 1.0);
    query.confidence = confidence;

    if confidence < MIN_CONFIDENCE && query.outlet_name.is_none() {
        return ParseOutput {
            candidates: Vec::new(),
            row_errors: vec![format!(
                "single query: confidence {:.2} below {:.2} and no outlet identified",
                confidence, MIN_CONFIDENCE
            )],
            confidence,
            success: false,
            method: ParseMethod::Regex,
        };
    }

    ParseOutput {
        candidates: vec![QueryCandidate { query, evidence }],
        row_errors: Vec::new(),
        confidence,
        success: true,
        method: ParseMethod::Regex,
    }
}

fn clean_title(raw: &str) -> Option<String> {
    let words: Vec<String> = raw.split_whitespace().map(str::to_lowercase).collect();
    let start = words
        .iter()
        .position(|w| !TITLE_FILLER.contains(&w.replace('\'', "").as_str()))?;
    Some(words[start..].join(" "))
}

fn find_sent_from(body: &str) -> Option<(String, Option<String>, usize, usize)> {
    let mut offset = 0;
    for raw in body.split_inclusive('\n') {
        let line = raw.trim_end_matches(['\n', '\r']);
        if let Some((outlet, alias)) = parse_sent_from(line) {
            // Mail client signatures ("Sent from my iPhone")
            if !outlet.to_lowercase().starts_with("my ") {
                return Some((outlet, alias, offset, offset + line.len()));
            }
        }
        offset += raw.len();
    }
    None
}

/// Earliest story-topic phrase, with the span of the whole phrase
fn find_topic(body: &str) -> Option<(String, usize, usize)> {
    TOPIC_PATTERNS
        .iter()
        .filter_map(|pattern| {
            let caps = pattern.captures(body)?;
            let whole = caps.get(0)?;
            let topic = squash_whitespace(caps.get(1)?.as_str().trim());
            Some((topic, whole.start(), whole.end()))
        })
        .min_by_key(|(_, start, _)| *start)
}

fn headline_from_subject(subject: &str, body: &str) -> String {
    let cleaned = SUBJECT_PREFIX.replace(subject, "");
    let cleaned = squash_whitespace(&cleaned);
    if !cleaned.is_empty() {
        return truncate_chars(&cleaned, MAX_HEADLINE_CHARS);
    }
    let first_line = body.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    truncate_chars(first_line, MAX_HEADLINE_CHARS)
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

struct FoundDeadline {
    at: DateTime<Utc>,
    time: Option<NaiveTime>,
    zone_name: String,
    zone: Zone,
    start: usize,
    end: usize,
}

/// First deadline phrase that resolves to an instant
fn find_deadline(body: &str, ctx: &ParseContext) -> Option<FoundDeadline> {
    for caps in DEADLINE_PHRASE.captures_iter(body) {
        let (Some(whole), Some(fragment)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let text = fragment.as_str();
        let time = deadline::parse_time(text);
        let (zone_name, zone) = deadline::find_zone(text)
            .unwrap_or_else(|| (ctx.default_tz.name().to_string(), Zone::Iana(ctx.default_tz)));

        if let Some(at) = resolve_fragment(text, time, &zone, ctx) {
            return Some(FoundDeadline {
                at,
                time,
                zone_name,
                zone,
                start: whole.start(),
                end: whole.end(),
            });
        }
    }
    None
}

/// Month + day, weekday, today/tomorrow, or a bare time, in that order
fn resolve_fragment(
    text: &str,
    time: Option<NaiveTime>,
    zone: &Zone,
    ctx: &ParseContext,
) -> Option<DateTime<Utc>> {
    if let Some(caps) = MONTH_DAY.captures(text) {
        let month = deadline::month_number(&caps[1])?;
        let day: u32 = caps[2].parse().ok()?;
        return match caps.get(3) {
            Some(year) => NaiveDate::from_ymd_opt(year.as_str().parse().ok()?, month, day)
                .and_then(|date| deadline::resolve(date, time, zone)),
            None => deadline::next_month_day(ctx.now, month, day, time, zone),
        };
    }

    if let Some(caps) = WEEKDAY.captures(text) {
        let weekday = deadline::weekday_from_name(&caps[1])?;
        return deadline::next_weekday(ctx.now, weekday, time, zone);
    }

    let lowered = text.to_lowercase();
    let today = zone.local_date(ctx.now);
    if lowered.contains("tomorrow") {
        return deadline::resolve(today + ChronoDuration::days(1), time, zone);
    }
    if lowered.contains("today") || lowered.contains("tonight") {
        return deadline::resolve(today, time, zone);
    }

    deadline::next_time_of_day(ctx.now, time?, zone)
}

/// JSON object the LLM is asked for
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LlmFields {
    headline: Option<String>,
    summary: Option<String>,
    category: Option<String>,
    request_type: Option<String>,
    expert_roles: Option<Vec<String>>,
    constraints: Option<Vec<String>>,
    questions: Option<Vec<String>>,
    deadline: Option<String>,
    deadline_timezone: Option<String>,
    is_hard_deadline: Option<bool>,
    journalist_name: Option<String>,
    journalist_title: Option<String>,
    journalist_email: Option<String>,
    outlet_name: Option<String>,
    outlet_website: Option<String>,
    reply_alias: Option<String>,
    confidence: Option<f64>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn push_located(
    evidence: &mut Vec<FieldEvidence>,
    field: &str,
    value: Option<&String>,
    body: &str,
    confidence: f64,
) {
    if let Some(value) = value {
        evidence.push(located_evidence(field, value, body, confidence));
    }
}

impl LlmFields {
    /// Candidate from the model's answer; a missing headline is malformed
    ///
    /// A missing confidence counts as 0.0, so such answers never replace a
    /// regex result.
    fn into_candidate(self, body: &str, ctx: &ParseContext) -> Result<QueryCandidate, LlmError> {
        let headline = non_empty(self.headline)
            .ok_or_else(|| LlmError::Malformed("missing headline".to_string()))?;
        let confidence = self.confidence.unwrap_or(0.0).clamp(0.0, 1.0);

        let (zone_name, zone) = non_empty(self.deadline_timezone)
            .and_then(|name| deadline::lookup_zone(&name).map(|zone| (name, zone)))
            .unwrap_or_else(|| (ctx.default_tz.name().to_string(), Zone::Iana(ctx.default_tz)));
        let deadline_text = non_empty(self.deadline);
        let deadline_at = deadline_text
            .as_deref()
            .and_then(|text| parse_llm_deadline(text, &zone, ctx));

        let query = ExtractedQuery {
            headline: truncate_chars(&headline, MAX_HEADLINE_CHARS),
            summary: non_empty(self.summary),
            category: non_empty(self.category),
            request_type: self
                .request_type
                .as_deref()
                .and_then(RequestType::parse)
                .unwrap_or_else(|| digest_request_type(body)),
            full_text: body.trim().to_string(),
            expert_roles: clean_list(self.expert_roles),
            constraints: clean_list(self.constraints),
            questions: clean_list(self.questions),
            tags: Vec::new(),
            deadline_date: deadline_at.map(|at| zone.local_date(at)),
            deadline_time: deadline_text
                .as_deref()
                .and_then(deadline::parse_time)
                .map(|t| t.format("%H:%M").to_string()),
            deadline_timezone: deadline_at.map(|_| zone_name),
            deadline_at,
            is_hard_deadline: self.is_hard_deadline.unwrap_or_else(|| is_hard_deadline(body)),
            broadcast_at: None,
            broadcast_duration_minutes: None,
            journalist_name: non_empty(self.journalist_name),
            journalist_title: non_empty(self.journalist_title),
            journalist_email: non_empty(self.journalist_email).map(|e| e.to_lowercase()),
            journalist_profile_url: None,
            reply_alias: non_empty(self.reply_alias)
                .map(|a| a.to_lowercase())
                .or_else(|| find_reply_alias(body).map(|(alias, _, _)| alias)),
            outlet_name: non_empty(self.outlet_name),
            outlet_website: non_empty(self.outlet_website),
            confidence,
            parse_method: ParseMethod::Llm,
        };

        let mut evidence = Vec::new();
        push_located(&mut evidence, "headline", Some(&query.headline), body, confidence);
        push_located(&mut evidence, "outlet_name", query.outlet_name.as_ref(), body, confidence);
        push_located(&mut evidence, "journalist_name", query.journalist_name.as_ref(), body, confidence);
        push_located(&mut evidence, "journalist_title", query.journalist_title.as_ref(), body, confidence);
        push_located(&mut evidence, "reply_alias", query.reply_alias.as_ref(), body, confidence);
        push_located(&mut evidence, "deadline_at", deadline_text.as_ref(), body, confidence);
        for role in &query.expert_roles {
            evidence.push(located_evidence("expert_roles", role, body, confidence));
        }
        for question in &query.questions {
            evidence.push(located_evidence("questions", question, body, confidence));
        }

        Ok(QueryCandidate { query, evidence })
    }
}

fn clean_list(items: Option<Vec<String>>) -> Vec<String> {
    items
        .unwrap_or_default()
        .into_iter()
        .map(|item| squash_whitespace(&item))
        .filter(|item| !item.is_empty())
        .collect()
}

fn parse_llm_deadline(text: &str, zone: &Zone, ctx: &ParseContext) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(text.trim()) {
        return Some(at.with_timezone(&Utc));
    }
    let date = deadline::parse_date(text, chrono::Datelike::year(&zone.local_date(ctx.now)))?;
    deadline::resolve(date, deadline::parse_time(text), zone)
}

fn build_prompt(subject: &str, body: &str) -> String {
    format!(
        "{}\n\nSubject: {}\n\n{}",
        EXTRACTION_INSTRUCTIONS,
        subject,
        truncate_chars(body, MAX_PROMPT_BODY_CHARS)
    )
}

async fn extract_with_llm(
    subject: &str,
    body: &str,
    ctx: &ParseContext,
    llm: LlmFallback<'_>,
) -> Result<QueryCandidate, LlmError> {
    let prompt = build_prompt(subject, body);
    let completion = tokio::time::timeout(llm.timeout, llm.backend.extract(&prompt))
        .await
        .map_err(|_| LlmError::Timeout(llm.timeout))??;

    let fields: LlmFields = serde_json::from_str(strip_code_fence(&completion))
        .map_err(|e| LlmError::Malformed(e.to_string()))?;
    fields.into_candidate(body, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PITCH: &str = "\
Hi there,

I'm a senior reporter at The Daily Ledger working on a story about remote workers who relocate to small towns.

Looking for relocation experts and economists.

Questions:
- Which towns are seeing the biggest influx?
- How are local housing markets responding?

Deadline: Friday at 3pm ET.

Reply to q-5512@reply.tmxmail.com
";

    const THIN: &str = "Sent from Radio One\nNeed a quick comment on gas prices.\n";

    fn ctx() -> ParseContext {
        // Monday 9:00 EST
        let now = DateTime::parse_from_rfc3339("2025-12-15T14:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        ParseContext::at(now, chrono_tz::America::New_York)
    }

    struct CannedBackend {
        reply: Result<String, String>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl CannedBackend {
        fn replying(reply: Result<&str, &str>) -> Self {
            Self {
                reply: reply.map(str::to_string).map_err(str::to_string),
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ExtractionBackend for CannedBackend {
        fn name(&self) -> &'static str {
            "canned"
        }

        async fn extract(&self, _prompt: &str) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.reply.clone().map_err(LlmError::Malformed)
        }
    }

    fn fallback(backend: &CannedBackend) -> Option<LlmFallback<'_>> {
        Some(LlmFallback {
            backend,
            timeout: Duration::from_millis(200),
        })
    }

    #[test]
    fn test_full_pitch() {
        let output = parse_deterministic("Quick request", PITCH, &ctx());
        assert!(output.success);
        assert!((output.confidence - 0.95).abs() < 1e-9);

        let q = &output.candidates[0].query;
        assert_eq!(q.outlet_name.as_deref(), Some("The Daily Ledger"));
        assert_eq!(q.journalist_title.as_deref(), Some("senior reporter"));
        assert_eq!(q.reply_alias.as_deref(), Some("q-5512@reply.tmxmail.com"));
        assert_eq!(q.headline, "Remote workers who relocate to small towns");
        assert_eq!(q.expert_roles, vec!["relocation expert", "economist"]);
        assert_eq!(q.questions.len(), 2);
        assert_eq!(q.deadline_timezone.as_deref(), Some("ET"));
        assert_eq!(q.deadline_time.as_deref(), Some("15:00"));
        // Friday of the same week, 3pm EST
        assert_eq!(q.deadline_at.unwrap().to_rfc3339(), "2025-12-19T20:00:00+00:00");
        assert_eq!(q.parse_method, ParseMethod::Regex);
    }

    #[test]
    fn test_evidence_excerpts_are_verbatim() {
        let body = "I'm writing a piece about CFO turnover. Looking for CFOs and economists.\n\
Questions:\n- Why are CFOs leaving?\n- What does it cost a company?\nDeadline: Friday\n";
        let output = parse_deterministic("CFO turnover", body, &ctx());
        let candidate = &output.candidates[0];

        assert_eq!(candidate.query.expert_roles, vec!["cfo", "economist"]);
        assert_eq!(candidate.query.questions.len(), 2);
        for evidence in &candidate.evidence {
            if let (Some(start), Some(end)) = (evidence.char_start, evidence.char_end) {
                assert_eq!(evidence.source_excerpt, body[start..end].trim(), "{}", evidence.field_name);
            }
            assert!(body.contains(&evidence.source_excerpt), "{}", evidence.field_name);
        }
        let roles: Vec<&str> = candidate
            .evidence
            .iter()
            .filter(|e| e.field_name == "expert_roles")
            .map(|e| e.source_excerpt.as_str())
            .collect();
        assert_eq!(roles, vec!["CFO", "economists"]);
    }

    #[test]
    fn test_title_after_contraction() {
        let output = parse_deterministic(
            "Retail",
            "Hi, I'm a reporter at Forbes covering holiday retail sales trends.",
            &ctx(),
        );
        let q = &output.candidates[0].query;
        assert_eq!(q.journalist_title.as_deref(), Some("reporter"));
        assert_eq!(q.outlet_name.as_deref(), Some("Forbes"));

        let output = parse_deterministic("Retail", "Freelance writer for Wired here.", &ctx());
        let q = &output.candidates[0].query;
        assert_eq!(q.journalist_title.as_deref(), Some("freelance writer"));
        assert_eq!(q.outlet_name.as_deref(), Some("Wired"));
    }

    #[test]
    fn test_sent_from_outlet_alone_succeeds() {
        let output = parse_deterministic("Gas prices", THIN, &ctx());
        assert!(output.success);
        assert!((output.confidence - 0.15).abs() < 1e-9);
        let q = &output.candidates[0].query;
        assert_eq!(q.outlet_name.as_deref(), Some("Radio One"));
        assert_eq!(q.headline, "Gas prices");
    }

    #[test]
    fn test_low_confidence_without_outlet_fails() {
        let output = parse_deterministic("Hello", "Quick question for you about budgets.", &ctx());
        assert!(!output.success);
        assert!(output.candidates.is_empty());
        assert_eq!(output.row_errors.len(), 1);
        assert!(output.row_errors[0].starts_with("single query:"));
    }

    #[test]
    fn test_subject_prefixes_stripped() {
        assert_eq!(headline_from_subject("Re: Fwd: [TMX] Holiday travel", ""), "Holiday travel");
        assert_eq!(headline_from_subject("Re:", "\n  First line\nSecond"), "First line");
    }

    #[test]
    fn test_deadline_tomorrow_defaults_to_close_of_business() {
        let body = "Sent from Radio One\nResponses needed by tomorrow please.\n";
        let output = parse_deterministic("Gas", body, &ctx());
        let q = &output.candidates[0].query;
        // 2025-12-16 17:00 EST
        assert_eq!(q.deadline_at.unwrap().to_rfc3339(), "2025-12-16T22:00:00+00:00");
        assert_eq!(q.deadline_time, None);
    }

    #[tokio::test]
    async fn test_confident_regex_skips_llm() {
        let backend = CannedBackend::replying(Ok("{}"));
        let output = parse("Quick request", PITCH, &ctx(), fallback(&backend)).await;
        assert_eq!(output.method, ParseMethod::Regex);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_llm_error_degrades_to_regex() {
        let backend = CannedBackend::replying(Err("boom"));
        let output = parse("Gas prices", THIN, &ctx(), fallback(&backend)).await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert!(output.success);
        assert_eq!(output.method, ParseMethod::Regex);
        assert_eq!(output.candidates[0].query.parse_method, ParseMethod::Regex);
    }

    #[tokio::test]
    async fn test_llm_timeout_degrades_to_regex() {
        let backend = CannedBackend {
            delay: Some(Duration::from_secs(5)),
            ..CannedBackend::replying(Ok("{\"headline\":\"x\",\"confidence\":0.9}"))
        };
        let output = parse("Gas prices", THIN, &ctx(), fallback(&backend)).await;
        assert_eq!(output.method, ParseMethod::Regex);
    }

    #[tokio::test]
    async fn test_malformed_json_degrades_to_regex() {
        let backend = CannedBackend::replying(Ok("Sure! Here is the data you asked for."));
        let output = parse("Gas prices", THIN, &ctx(), fallback(&backend)).await;
        assert_eq!(output.method, ParseMethod::Regex);
    }

    #[tokio::test]
    async fn test_confident_llm_supersedes() {
        let reply = "```json\n{\"headline\": \"Gas prices ahead of the holidays\", \"outlet_name\": \"Radio One\", \
\"request_type\": \"phone\", \"expert_roles\": [\"energy analyst\"], \"deadline\": \"2025-12-16T15:00:00-05:00\", \
\"confidence\": 0.82}\n```";
        let backend = CannedBackend::replying(Ok(reply));
        let output = parse("Gas prices", THIN, &ctx(), fallback(&backend)).await;

        assert_eq!(output.method, ParseMethod::Llm);
        assert!((output.confidence - 0.82).abs() < 1e-9);
        let candidate = &output.candidates[0];
        assert_eq!(candidate.query.headline, "Gas prices ahead of the holidays");
        assert_eq!(candidate.query.request_type, RequestType::Phone);
        assert_eq!(candidate.query.parse_method, ParseMethod::Llm);
        assert_eq!(
            candidate.query.deadline_at.unwrap().to_rfc3339(),
            "2025-12-16T20:00:00+00:00"
        );

        let outlet = candidate.evidence.iter().find(|e| e.field_name == "outlet_name").unwrap();
        assert_eq!(outlet.source_excerpt, "Radio One");
        assert_eq!(outlet.char_start, Some(10));
        // Paraphrased values have no excerpt
        let headline = candidate.evidence.iter().find(|e| e.field_name == "headline").unwrap();
        assert!(headline.source_excerpt.is_empty());
        assert!(headline.char_start.is_none());
    }

    #[tokio::test]
    async fn test_less_confident_llm_is_ignored() {
        let backend = CannedBackend::replying(Ok("{\"headline\": \"Gas\", \"confidence\": 0.1}"));
        let output = parse("Gas prices", THIN, &ctx(), fallback(&backend)).await;
        assert_eq!(output.method, ParseMethod::Regex);
        assert_eq!(output.candidates[0].query.headline, "Gas prices");
    }

    #[tokio::test]
    async fn test_no_fallback_requested() {
        let output = parse("Hello", "Quick question for you about budgets.", &ctx(), None).await;
        assert!(!output.success);
        assert_eq!(output.method, ParseMethod::Regex);
    }
}
