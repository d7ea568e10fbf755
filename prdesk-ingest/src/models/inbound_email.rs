//! Inbound webhook payload from the email-to-webhook bridge

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw webhook body
///
/// Every field is optional at the serde layer so that missing required
/// fields surface as a validation error listing all of them, not as the
/// first serde failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboundEmailPayload {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body_text: Option<String>,
    #[serde(default)]
    pub body_html: Option<String>,
    /// RFC 3339 or RFC 2822 timestamp
    #[serde(default)]
    pub received_at: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub folder_id: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub has_attachments: Option<bool>,
    /// Optional shared secret
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

/// Validated email metadata carried by a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEmail {
    pub from: String,
    pub to: Option<String>,
    pub subject: String,
    pub body_text: String,
    pub body_html: Option<String>,
    pub received_at: DateTime<Utc>,
    pub message_id: Option<String>,
    pub folder_id: Option<String>,
    pub thread_id: Option<String>,
    pub has_attachments: bool,
}

/// Missing required webhook fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingFields(pub Vec<&'static str>);

impl std::fmt::Display for MissingFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Missing required fields: {}", self.0.join(", "))
    }
}

impl InboundEmailPayload {
    /// Validate required fields (`from`, `subject`, `body_text`)
    ///
    /// Blank strings count as missing. Unparseable `received_at` falls back to
    /// the current time.
    pub fn validate(&self) -> Result<InboundEmail, MissingFields> {
        let mut missing = Vec::new();

        let from = non_blank(&self.from);
        let subject = non_blank(&self.subject);
        let body_text = non_blank(&self.body_text);

        if from.is_none() {
            missing.push("from");
        }
        if subject.is_none() {
            missing.push("subject");
        }
        if body_text.is_none() {
            missing.push("body_text");
        }

        match (from, subject, body_text) {
            (Some(from), Some(subject), Some(body_text)) => Ok(InboundEmail {
                from,
                to: non_blank(&self.to),
                subject,
                body_text,
                body_html: non_blank(&self.body_html),
                received_at: self
                    .received_at
                    .as_deref()
                    .and_then(parse_timestamp)
                    .unwrap_or_else(Utc::now),
                message_id: non_blank(&self.message_id),
                folder_id: non_blank(&self.folder_id),
                thread_id: non_blank(&self.thread_id),
                has_attachments: self.has_attachments.unwrap_or(false),
            }),
            _ => Err(MissingFields(missing)),
        }
    }

    /// Payload as retained on the job (api_key is never serialized)
    pub fn to_audit_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_rfc2822(value))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_are_all_reported() {
        let payload = InboundEmailPayload {
            subject: Some("  ".to_string()),
            ..Default::default()
        };

        let err = payload.validate().unwrap_err();
        assert_eq!(err.0, vec!["from", "subject", "body_text"]);
        assert_eq!(
            err.to_string(),
            "Missing required fields: from, subject, body_text"
        );
    }

    #[test]
    fn test_valid_payload() {
        let payload = InboundEmailPayload {
            from: Some("alerts@example.com".to_string()),
            subject: Some("Media queries".to_string()),
            body_text: Some("Body".to_string()),
            received_at: Some("2025-12-15T14:30:00Z".to_string()),
            message_id: Some("<m1@example.com>".to_string()),
            has_attachments: Some(true),
            ..Default::default()
        };

        let email = payload.validate().unwrap();
        assert_eq!(email.from, "alerts@example.com");
        assert_eq!(email.received_at.to_rfc3339(), "2025-12-15T14:30:00+00:00");
        assert_eq!(email.message_id.as_deref(), Some("<m1@example.com>"));
        assert!(email.has_attachments);
        assert!(email.to.is_none());
    }

    #[test]
    fn test_rfc2822_received_at() {
        let payload = InboundEmailPayload {
            from: Some("a@b.com".to_string()),
            subject: Some("s".to_string()),
            body_text: Some("b".to_string()),
            received_at: Some("Mon, 15 Dec 2025 09:30:00 -0500".to_string()),
            ..Default::default()
        };

        let email = payload.validate().unwrap();
        assert_eq!(email.received_at.to_rfc3339(), "2025-12-15T14:30:00+00:00");
    }

    #[test]
    fn test_audit_json_drops_api_key() {
        let payload = InboundEmailPayload {
            from: Some("a@b.com".to_string()),
            api_key: Some("secret".to_string()),
            ..Default::default()
        };

        let json = payload.to_audit_json();
        assert!(json.get("api_key").is_none());
        assert_eq!(json["from"], "a@b.com");
    }
}
