//! Field extractors shared by the format parsers
//!
//! Each extractor is a small pure function over text. The parsers compose
//! them and attach [`FieldEvidence`] for every field they fill.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{FieldEvidence, RequestType};

/// Longest excerpt stored as evidence
const MAX_EXCERPT_CHARS: usize = 300;

/// Reply-relay address used by the digest and single-query services
pub static REPLY_ALIAS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[a-z0-9][a-z0-9._%+-]*@reply\.[a-z0-9-]+(?:\.[a-z0-9-]+)*\.[a-z]{2,}\b")
        .expect("Invalid reply alias regex")
});

static EMAIL_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b").expect("Invalid email regex")
});

static SENT_FROM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*sent\s+from\s+(.+?)\s*$").expect("Invalid sent-from regex")
});

static HARD_DEADLINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:hard|firm|strict)\s+deadline\b|\bno\s+extensions?\b")
        .expect("Invalid hard deadline regex")
});

static BULLET_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:[-*•]|\d{1,2}[.)])[ \t]+(.+?)[ \t]*$").expect("Invalid bullet regex")
});

static BULLET_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[-*•]|\d{1,2}[.)])[ \t]*").expect("Invalid bullet prefix regex")
});

static QUESTIONS_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[ \t]*questions?[ \t]*:[ \t]*(.*)$").expect("Invalid questions label regex")
});

static TRYING_TO_ANSWER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:we(?:'re| are) trying to (?:answer|figure out|understand)|we want to know|the question (?:is|we're asking is))\s*:?\s*([^\n]+?[?.])",
    )
    .expect("Invalid trying-to-answer regex")
});

static INTERROGATIVE_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:what|how|why|when|where|which|who|should|can|could|would|is|are|do|does|did|will|have|has)\b")
        .expect("Invalid interrogative regex")
});

static ROLE_NOUN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(dermatologists?|nutritionists?|dietitians?|physicians?|doctors?|psychologists?|psychiatrists?|therapists?|veterinarians?|pediatricians?|economists?|attorneys?|lawyers?|accountants?|CPAs?|financial (?:advisors?|planners?)|realtors?|real estate agents?|recruiters?|professors?|researchers?|founders?|CEOs?|CFOs?|CMOs?|CTOs?|HR (?:leaders?|professionals?)|personal trainers?|chefs?|sommeliers?|engineers?|data scientists?|cybersecurity (?:experts?|professionals?))\b",
    )
    .expect("Invalid role noun regex")
});

static EXPERT_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b([a-z][a-z-]+)\s+(experts?|specialists?|professionals?|advisors?|consultants?|coaches|coach|leaders?|owners?)\b")
        .expect("Invalid expert suffix regex")
});

static CONSTRAINT_TEMPLATES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\bmust (?:be|have|hold|live)\b[^.\n;]{3,80}",
        r"(?i)\b(?:based|located) in [A-Z][^.\n;,]{1,40}",
        r"(?i)\b\d+\+?\s+years?(?: of)? experience\b",
        r"(?i)\bno (?:pitches|attachments|pr firms|agencies|product pitches|ghostwritten responses)\b",
        r"(?i)\b(?:board[- ]certified|licensed|credentialed|accredited)\b[^.\n;,]{0,40}",
        r"(?i)\bonly (?:accepting|considering|interested in)\b[^.\n;]{3,60}",
        r"(?i)\b(?:on the record|not anonymous|name and title required)\b",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("Invalid constraint template"))
    .collect()
});

// Modifiers that precede "expert" without naming a field
const EXPERT_STOPWORDS: &[&str] = &[
    "a", "an", "the", "any", "some", "our", "your", "their", "for", "seeking", "looking",
    "need", "want", "with", "from", "industry", "qualified", "other", "more", "top", "leading",
];

/// Evidence pointing at `text[start..end]`
pub fn span_evidence(
    field_name: &str,
    extracted_value: impl Into<String>,
    text: &str,
    start: usize,
    end: usize,
    confidence: f64,
) -> FieldEvidence {
    FieldEvidence {
        field_name: field_name.to_string(),
        extracted_value: extracted_value.into(),
        source_excerpt: truncate_chars(text.get(start..end).unwrap_or("").trim(), MAX_EXCERPT_CHARS),
        char_start: Some(start),
        char_end: Some(end),
        confidence,
    }
}

/// Evidence without a position in the body (subject line)
pub fn text_evidence(
    field_name: &str,
    extracted_value: impl Into<String>,
    excerpt: &str,
    confidence: f64,
) -> FieldEvidence {
    FieldEvidence {
        field_name: field_name.to_string(),
        extracted_value: extracted_value.into(),
        source_excerpt: truncate_chars(excerpt.trim(), MAX_EXCERPT_CHARS),
        char_start: None,
        char_end: None,
        confidence,
    }
}

/// Evidence for a value produced elsewhere (LLM output)
///
/// Points at the first case-insensitive occurrence of `value` in `text`; when
/// the value does not appear verbatim the excerpt is left empty.
pub fn located_evidence(field_name: &str, value: &str, text: &str, confidence: f64) -> FieldEvidence {
    let needle = value.trim();
    // ASCII lowering keeps byte offsets aligned with `text`
    let found = (!needle.is_empty())
        .then(|| text.to_ascii_lowercase().find(&needle.to_ascii_lowercase()))
        .flatten();
    match found {
        Some(start) => span_evidence(field_name, value, text, start, start + needle.len(), confidence),
        None => FieldEvidence {
            field_name: field_name.to_string(),
            extracted_value: value.to_string(),
            source_excerpt: String::new(),
            char_start: None,
            char_end: None,
            confidence,
        },
    }
}

pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Collapse runs of whitespace to single spaces
pub fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// "Sent from <Outlet> (<alias>)" line
///
/// Outlet and alias may also be separated by "via" or " - ". Returns
/// `(outlet, alias)`.
pub fn parse_sent_from(line: &str) -> Option<(String, Option<String>)> {
    let caps = SENT_FROM.captures(line)?;
    let rest = caps.get(1)?.as_str();

    let alias = REPLY_ALIAS
        .find(rest)
        .or_else(|| EMAIL_ADDRESS.find(rest))
        .map(|m| m.as_str().to_lowercase());

    let outlet_part = match rest.find('(') {
        Some(idx) => &rest[..idx],
        None => rest,
    };
    let outlet_part = split_before_word(outlet_part, " via ");
    let outlet_part = split_before_word(outlet_part, " - ");
    let outlet_part = match alias.as_deref() {
        Some(a) => outlet_part.split(a).next().unwrap_or(outlet_part),
        None => outlet_part,
    };

    let outlet = outlet_part.trim().trim_end_matches([',', ':', '-']).trim();
    if outlet.is_empty() || EMAIL_ADDRESS.is_match(outlet) {
        return None;
    }

    Some((outlet.to_string(), alias))
}

fn split_before_word<'a>(text: &'a str, separator: &str) -> &'a str {
    // ASCII lowering keeps byte offsets valid for slicing `text`
    let lowered = text.to_ascii_lowercase();
    match lowered.find(separator) {
        Some(idx) => &text[..idx],
        None => text,
    }
}

/// First reply-relay alias in `text`, with its byte span
pub fn find_reply_alias(text: &str) -> Option<(String, usize, usize)> {
    REPLY_ALIAS
        .find(text)
        .map(|m| (m.as_str().to_lowercase(), m.start(), m.end()))
}

/// Request type for labeled (structured) queries
///
/// First keyword group that matches wins.
pub fn structured_request_type(text: &str) -> RequestType {
    let lowered = text.to_lowercase();
    if contains_word(&lowered, "live") || contains_word(&lowered, "virtual") {
        RequestType::Live
    } else if contains_word(&lowered, "phone") {
        RequestType::Phone
    } else if lowered.contains("in-person") || lowered.contains("in person") {
        RequestType::InPerson
    } else if contains_word(&lowered, "emailed") || lowered.contains("via email") {
        RequestType::Emailed
    } else if lowered.contains("quote") {
        RequestType::Quote
    } else if contains_word(&lowered, "background") {
        RequestType::Background
    } else {
        RequestType::Quote
    }
}

/// Request type for digest synopses
pub fn digest_request_type(text: &str) -> RequestType {
    let lowered = text.to_lowercase();
    let live = contains_word(&lowered, "live");
    if live && (lowered.contains("interview") || contains_word(&lowered, "virtual")) {
        RequestType::Live
    } else if contains_word(&lowered, "phone") || contains_word(&lowered, "call") {
        RequestType::Phone
    } else if lowered.contains("contact")
        || contains_word(&lowered, "seeking")
        || lowered.contains("looking for")
    {
        RequestType::ContactRequest
    } else if lowered.contains("interview") || lowered.contains("speak with") {
        RequestType::Phone
    } else if lowered.contains("question") || lowered.contains("comment") || lowered.contains("insight") {
        RequestType::Emailed
    } else {
        RequestType::Other
    }
}

fn contains_word(haystack: &str, word: &str) -> bool {
    haystack
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .any(|token| token == word)
}

/// Expert roles named in the text, lower-case singular, first-seen order
pub fn extract_expert_roles(text: &str) -> Vec<String> {
    values(find_expert_roles(text))
}

/// Expert roles with the byte span of the phrase each was read from
pub fn find_expert_roles(text: &str) -> Vec<(String, usize, usize)> {
    let mut roles: Vec<(String, usize, usize)> = Vec::new();

    for m in ROLE_NOUN.find_iter(text) {
        roles.push((singularize(&m.as_str().to_lowercase()), m.start(), m.end()));
    }

    for caps in EXPERT_SUFFIX.captures_iter(text) {
        let modifier = caps[1].to_lowercase();
        if EXPERT_STOPWORDS.contains(&modifier.as_str()) {
            continue;
        }
        let noun = singularize(&caps[2].to_lowercase());
        if let Some(whole) = caps.get(0) {
            roles.push((format!("{} {}", modifier, noun), whole.start(), whole.end()));
        }
    }

    roles.sort_by_key(|(_, start, _)| *start);
    dedupe_spans(roles)
}

fn singularize(word: &str) -> String {
    let mut parts: Vec<&str> = word.split_whitespace().collect();
    let Some(last) = parts.pop() else {
        return String::new();
    };

    let singular = if last.ends_with("ches") || last.ends_with("shes") {
        &last[..last.len() - 2]
    } else if last.ends_with('s') && !last.ends_with("ss") && last.len() > 3 {
        &last[..last.len() - 1]
    } else {
        last
    };

    parts.push(singular);
    parts.join(" ")
}

/// Source constraints ("must be board-certified", "based in Texas")
pub fn extract_constraints(text: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = CONSTRAINT_TEMPLATES
        .iter()
        .flat_map(|template| {
            template
                .find_iter(text)
                .map(|m| (m.start(), squash_whitespace(m.as_str().trim())))
                .collect::<Vec<_>>()
        })
        .collect();

    found.sort_by_key(|(start, _)| *start);
    dedupe_preserving_order(found.into_iter().map(|(_, c)| c))
}

/// Questions the journalist wants answered
///
/// Sources, in order: a "Questions:" section (inline, then the bulleted or
/// question-shaped lines that follow it), bulleted lines that read as
/// questions, and "we are trying to answer ..." sentences.
pub fn extract_questions(text: &str) -> Vec<String> {
    values(find_questions(text))
}

/// Questions with the byte span each was read from
pub fn find_questions(text: &str) -> Vec<(String, usize, usize)> {
    let mut questions: Vec<(String, usize, usize)> = Vec::new();

    if let Some(caps) = QUESTIONS_LABEL.captures(text) {
        if let Some(inline) = caps.get(1) {
            let mut offset = inline.start();
            for piece in inline.as_str().split_inclusive('?') {
                let item = piece.trim();
                if item.len() > 3 {
                    let start = offset + (piece.len() - piece.trim_start().len());
                    questions.push((item.to_string(), start, start + item.len()));
                }
                offset += piece.len();
            }
        }

        let label_end = caps.get(0).map_or(0, |m| m.end());
        let mut offset = label_end;
        // The first piece is the remainder of the label line
        for (index, raw) in text[label_end..].split_inclusive('\n').enumerate() {
            let line_start = offset;
            offset += raw.len();
            if index == 0 {
                continue;
            }

            let line = raw.trim_end_matches(['\n', '\r']);
            let content = line.trim_start();
            if content.is_empty() {
                if questions.is_empty() {
                    continue;
                }
                break;
            }

            let (is_bullet, rest) = match BULLET_PREFIX.find(content) {
                Some(m) => (true, &content[m.end()..]),
                None => (false, content),
            };
            let item = rest.trim();
            if !is_bullet && !is_question_shaped(item) {
                break;
            }
            if !item.is_empty() {
                let start = line_start + (line.len() - rest.trim_start().len());
                questions.push((item.to_string(), start, start + item.len()));
            }
        }
    }

    for caps in BULLET_LINE.captures_iter(text) {
        if let Some(item) = caps.get(1) {
            if is_question_shaped(item.as_str().trim()) {
                questions.push((item.as_str().trim().to_string(), item.start(), item.end()));
            }
        }
    }

    for caps in TRYING_TO_ANSWER.captures_iter(text) {
        if let Some(question) = caps.get(1) {
            questions.push((question.as_str().trim().to_string(), question.start(), question.end()));
        }
    }

    dedupe_spans(questions)
}

fn is_question_shaped(item: &str) -> bool {
    item.ends_with('?') || INTERROGATIVE_START.is_match(item)
}

pub fn is_hard_deadline(text: &str) -> bool {
    HARD_DEADLINE.is_match(text)
}

fn dedupe_preserving_order(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .filter(|item| !item.is_empty() && seen.insert(item.to_lowercase()))
        .collect()
}

/// First occurrence of each value, compared case-insensitively
fn dedupe_spans(items: Vec<(String, usize, usize)>) -> Vec<(String, usize, usize)> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|(value, _, _)| !value.is_empty() && seen.insert(value.to_lowercase()))
        .collect()
}

fn values(items: Vec<(String, usize, usize)>) -> Vec<String> {
    items.into_iter().map(|(value, _, _)| value).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sent_from_variants() {
        assert_eq!(
            parse_sent_from("Sent from Forbes (q-7731@reply.tmxmail.com)"),
            Some(("Forbes".to_string(), Some("q-7731@reply.tmxmail.com".to_string())))
        );
        assert_eq!(
            parse_sent_from("Sent from The Atlantic via q-1@reply.tmxmail.com"),
            Some(("The Atlantic".to_string(), Some("q-1@reply.tmxmail.com".to_string())))
        );
        assert_eq!(
            parse_sent_from("  sent from Wired - q-2@reply.tmxmail.com"),
            Some(("Wired".to_string(), Some("q-2@reply.tmxmail.com".to_string())))
        );
        assert_eq!(
            parse_sent_from("Sent from Local News"),
            Some(("Local News".to_string(), None))
        );
        assert_eq!(parse_sent_from("Query sent from Forbes"), None);
    }

    #[test]
    fn test_structured_request_type_priority() {
        assert_eq!(structured_request_type("Live virtual segment, phone pre-interview"), RequestType::Live);
        assert_eq!(structured_request_type("Quick phone chat"), RequestType::Phone);
        assert_eq!(structured_request_type("In-person at our studio"), RequestType::InPerson);
        assert_eq!(structured_request_type("Answers emailed by Friday"), RequestType::Emailed);
        assert_eq!(structured_request_type("For background only"), RequestType::Background);
        assert_eq!(structured_request_type("Tell me about taxes"), RequestType::Quote);
        // "delivery" must not read as "live"
        assert_eq!(structured_request_type("Food delivery trends"), RequestType::Quote);
    }

    #[test]
    fn test_digest_request_type_rules() {
        assert_eq!(digest_request_type("Live virtual interview on Monday"), RequestType::Live);
        assert_eq!(digest_request_type("Quick call with a CPA"), RequestType::Phone);
        assert_eq!(digest_request_type("Seeking parents of twins"), RequestType::ContactRequest);
        assert_eq!(digest_request_type("Want to speak with a chef"), RequestType::Phone);
        assert_eq!(digest_request_type("Need comment on rate cuts"), RequestType::Emailed);
        assert_eq!(digest_request_type("Holiday gift guide"), RequestType::Other);
    }

    #[test]
    fn test_expert_roles_dedup_and_singular() {
        let roles = extract_expert_roles(
            "Seeking dermatologists and sleep experts. A dermatologist or two sleep experts would be ideal.",
        );
        assert_eq!(roles, vec!["dermatologist".to_string(), "sleep expert".to_string()]);
    }

    #[test]
    fn test_constraints() {
        let constraints = extract_constraints(
            "Must be board-certified. Sources based in Texas only, 10+ years of experience. No pitches.",
        );
        assert!(constraints.iter().any(|c| c.starts_with("Must be board-certified")));
        assert!(constraints.iter().any(|c| c == "based in Texas only"));
        assert!(constraints.iter().any(|c| c == "10+ years of experience"));
        assert!(constraints.iter().any(|c| c == "No pitches"));
    }

    #[test]
    fn test_questions_from_section_and_bullets() {
        let text = "Questions:\n- How often should you replace a mattress?\n- What are signs it's worn out?\n\nOther notes\n* Why do hotels pick firm beds?\n- Must be an expert";
        let questions = extract_questions(text);
        assert_eq!(
            questions,
            vec![
                "How often should you replace a mattress?".to_string(),
                "What are signs it's worn out?".to_string(),
                "Why do hotels pick firm beds?".to_string(),
            ]
        );
    }

    #[test]
    fn test_questions_trying_to_answer() {
        let questions =
            extract_questions("We are trying to answer: is remote work here to stay? Thanks.");
        assert_eq!(questions, vec!["is remote work here to stay?".to_string()]);
    }

    #[test]
    fn test_questions_section_stops_at_other_content() {
        let text = "Questions:\n- Is a 401(k) match worth chasing?\n- How much should a new grad save\nDeadline: Friday\nThanks!";
        let questions = extract_questions(text);
        assert_eq!(
            questions,
            vec![
                "Is a 401(k) match worth chasing?".to_string(),
                "How much should a new grad save".to_string(),
            ]
        );
    }

    #[test]
    fn test_question_spans_are_verbatim() {
        let text = "Hi!\nQuestions: Why now?\n  Should renters wait?\n- What about fees\n\n* Is it a bubble?";
        let found = find_questions(text);
        assert_eq!(found.len(), 4);
        for (question, start, end) in &found {
            assert_eq!(&text[*start..*end], question.as_str());
        }
    }

    #[test]
    fn test_expert_role_spans_cover_source_phrase() {
        let text = "Looking for CFOs and economists, plus sleep experts.";
        let found = find_expert_roles(text);
        let excerpts: Vec<&str> = found.iter().map(|(_, start, end)| &text[*start..*end]).collect();
        assert_eq!(excerpts, vec!["CFOs", "economists", "sleep experts"]);
        assert_eq!(found[0].0, "cfo");
    }

    #[test]
    fn test_located_evidence() {
        let body = "Sent from Radio One\nNeed a quick comment.";
        let found = located_evidence("outlet_name", "radio one", body, 0.8);
        assert_eq!(found.source_excerpt, "Radio One");
        assert_eq!(found.char_start, Some(10));
        assert_eq!(found.char_end, Some(19));

        let missing = located_evidence("headline", "Gas prices this winter", body, 0.8);
        assert!(missing.source_excerpt.is_empty());
        assert_eq!(missing.char_start, None);
        assert_eq!(missing.extracted_value, "Gas prices this winter");
    }

    #[test]
    fn test_hard_deadline() {
        assert!(is_hard_deadline("This is a HARD deadline."));
        assert!(is_hard_deadline("No extensions, sorry"));
        assert!(!is_hard_deadline("Deadline is flexible"));
    }

    #[test]
    fn test_span_evidence_offsets() {
        let text = "Name: Jane Doe";
        let evidence = span_evidence("journalist_name", "Jane Doe", text, 6, 14, 0.95);
        assert_eq!(evidence.source_excerpt, "Jane Doe");
        assert_eq!(evidence.char_start, Some(6));
        assert_eq!(evidence.char_end, Some(14));
    }
}
