//! Email fixtures in the three supported formats

use prdesk_ingest::models::{InboundEmail, InboundEmailPayload};
use serde_json::{json, Value};

/// One numbered structured-alert block
pub fn structured_block(n: u32, summary: &str, outlet: &str, query: &str) -> String {
    format!(
        "{n}) Summary: {summary}\n\
         Category: Health\n\
         Name: Jane Doe\n\
         Email: jane.doe@dailyledger.com\n\
         Muck Rack: https://muckrack.com/janedoe\n\
         Media Outlet: {outlet}\n\
         Deadline: December 17, 2025\n\
         Deadline Time: 12:00 pm\n\
         Time Zone: Eastern Standard Time\n\
         Query: {query}\n"
    )
}

/// Structured alert body from blocks, separated by `---`
pub fn structured_email(blocks: &[String]) -> String {
    let mut body = String::from("Good morning! Here are today's requests.\n\n");
    for block in blocks {
        body.push_str(block);
        body.push_str("\n---\n\n");
    }
    body.push_str("You are receiving this email because you subscribed.\n");
    body
}

/// Two-item digest with a category header
pub fn digest_email() -> String {
    "\
Media queries for Monday

1. Parenting during the holidays
Seeking parents of toddlers to share travel tips.
Sent from Family Circle (q-200@reply.tmxmail.com)

Business

2. Budget season for small firms
Need comment from CFOs on 2026 planning. Deadline 3pm ET.
Sent from Forbes via q-201@reply.tmxmail.com

Manage your alerts | Unsubscribe
"
    .to_string()
}

/// Single-journalist pitch
pub fn pitch_email() -> String {
    "\
Hi there,

I'm a senior reporter at The Daily Ledger working on a story about remote workers who relocate to small towns.

Looking for relocation experts and economists.

Questions:
- Which towns are seeing the biggest influx?
- How are local housing markets responding?

Deadline: Friday at 3pm ET.

Reply to q-5512@reply.tmxmail.com
"
    .to_string()
}

/// Webhook JSON body
pub fn webhook_payload(subject: &str, body: &str, message_id: Option<&str>) -> Value {
    let mut payload = json!({
        "from": "alerts@mediaalerts.example.com",
        "to": "inbox@agency.example.com",
        "subject": subject,
        "body_text": body,
        "received_at": "2025-12-15T14:00:00Z",
        "has_attachments": false,
    });
    if let Some(message_id) = message_id {
        payload["message_id"] = json!(message_id);
    }
    payload
}

/// Validated email plus its audit JSON, for driving the orchestrator directly
pub fn inbound(subject: &str, body: &str, message_id: Option<&str>) -> (InboundEmail, Value) {
    let payload: InboundEmailPayload =
        serde_json::from_value(webhook_payload(subject, body, message_id)).unwrap();
    let email = payload.validate().unwrap();
    (email, payload.to_audit_json())
}
