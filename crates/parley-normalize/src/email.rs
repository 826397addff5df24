// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound email normalization.
//!
//! Accepts the JSON an inbound-mail relay posts: either one message object or
//! an array of them. A message carries `from` (`"Name <addr>"` or
//! `{address, name}`), optional `subject`, a `text`/`body` or `html` body, and
//! optional `attachments[]`. A message may instead carry the RFC 5322 source
//! under `raw`, which is parsed with `mail-parser`.

use mail_parser::{MessageParser, MimeHeaders};
use parley_core::types::{format_timestamp, timestamp_from_unix_secs, CanonicalMessage, MessageType};
use parley_core::ParleyError;
use serde_json::{Map, Value};

use crate::unit::{array_field, classify_mime, id_field, insert_str, str_field, Skip};

const PLATFORM: &str = "email";

/// Column width used when flattening HTML bodies to text.
const HTML_WRAP_WIDTH: usize = 100;

pub(crate) fn validate(payload: &Value) -> Result<(), ParleyError> {
    match payload {
        Value::Array(_) => Ok(()),
        Value::Object(object) => {
            if object.contains_key("from") || object.contains_key("raw") {
                Ok(())
            } else {
                Err(ParleyError::Validation(
                    "email payload must carry `from` or `raw`".into(),
                ))
            }
        }
        _ => Err(ParleyError::Validation(
            "email payload must be an object or an array of objects".into(),
        )),
    }
}

pub(crate) fn extract(payload: &Value) -> Vec<CanonicalMessage> {
    let units: &[Value] = match payload {
        Value::Array(items) => items,
        Value::Object(_) => std::slice::from_ref(payload),
        _ => &[],
    };
    units
        .iter()
        .enumerate()
        .filter_map(|(index, unit)| match to_canonical(unit) {
            Ok(canonical) => Some(canonical),
            Err(skip) => {
                skip.log(PLATFORM, index);
                None
            }
        })
        .collect()
}

/// Fields gathered from either the JSON form or a parsed raw message.
#[derive(Default)]
struct Parts {
    address: Option<String>,
    name: Option<String>,
    to: Option<String>,
    subject: Option<String>,
    body: Option<String>,
    message_id: Option<String>,
    timestamp: Option<String>,
    in_reply_to: Option<String>,
    attachment_url: Option<String>,
    attachment_mime: Option<String>,
    attachment_name: Option<String>,
    attachment_count: usize,
}

fn to_canonical(unit: &Value) -> Result<CanonicalMessage, Skip> {
    if !unit.is_object() {
        return Err(Skip::malformed("email unit is not an object"));
    }
    let parts = match str_field(unit, "raw") {
        Some(raw) => from_raw(raw)?,
        None => from_json(unit),
    };

    let address = parts
        .address
        .ok_or_else(|| Skip::malformed("email without a sender address"))?;
    let content = match (parts.subject.as_deref(), parts.body.as_deref()) {
        (Some(subject), Some(body)) => format!("Subject: {subject}\n\n{body}"),
        (Some(subject), None) => format!("Subject: {subject}"),
        (None, Some(body)) => body.to_string(),
        (None, None) if parts.attachment_count > 0 => String::new(),
        (None, None) => return Err(Skip::malformed("email without subject, body or attachments")),
    };
    if content.trim().is_empty() && parts.attachment_url.is_none() {
        return Err(Skip::malformed("email without content or attachment url"));
    }
    let message_type = match (&parts.attachment_url, &parts.attachment_mime) {
        (Some(_), Some(mime)) => classify_mime(mime),
        (Some(_), None) => MessageType::Document,
        (None, _) => MessageType::Text,
    };

    let mut metadata = Map::new();
    insert_str(&mut metadata, "email_from".into(), Some(address.as_str()));
    insert_str(&mut metadata, "email_to".into(), parts.to.as_deref());
    insert_str(&mut metadata, "email_subject".into(), parts.subject.as_deref());
    insert_str(&mut metadata, "email_message_id".into(), parts.message_id.as_deref());
    insert_str(&mut metadata, "email_in_reply_to".into(), parts.in_reply_to.as_deref());
    insert_str(&mut metadata, "email_attachment_name".into(), parts.attachment_name.as_deref());
    if parts.attachment_count > 0 {
        metadata.insert("email_attachment_count".into(), parts.attachment_count.into());
    }

    Ok(CanonicalMessage {
        origin: address,
        content,
        media_url: parts.attachment_url,
        message_type,
        metadata,
        platform_message_id: parts.message_id,
        sender_name: parts.name,
        timestamp: parts.timestamp,
    })
}

fn from_json(unit: &Value) -> Parts {
    let (address, name) = match unit.get("from") {
        Some(Value::String(from)) => split_mailbox(from),
        Some(from @ Value::Object(_)) => (
            str_field(from, "address")
                .or_else(|| str_field(from, "email"))
                .map(str::to_lowercase),
            str_field(from, "name").map(str::to_string),
        ),
        _ => (None, None),
    };
    let to = match unit.get("to") {
        Some(Value::String(to)) => split_mailbox(to).0,
        Some(Value::Array(items)) => items.first().and_then(|first| match first {
            Value::String(to) => split_mailbox(to).0,
            other => str_field(other, "address").map(str::to_lowercase),
        }),
        Some(to @ Value::Object(_)) => str_field(to, "address").map(str::to_lowercase),
        _ => None,
    };
    let body = str_field(unit, "text")
        .or_else(|| str_field(unit, "body"))
        .map(str::to_string)
        .or_else(|| str_field(unit, "html").and_then(html_to_text));

    let attachments = array_field(unit, "attachments");
    let first = attachments.first();

    Parts {
        address,
        name,
        to,
        subject: str_field(unit, "subject").map(str::to_string),
        body,
        message_id: id_field(unit, "message_id").or_else(|| id_field(unit, "messageId")),
        timestamp: str_field(unit, "date").and_then(parse_date),
        in_reply_to: str_field(unit, "in_reply_to").map(str::to_string),
        attachment_url: first.and_then(|a| str_field(a, "url")).map(str::to_string),
        attachment_mime: first
            .and_then(|a| str_field(a, "content_type").or_else(|| str_field(a, "mime_type")))
            .map(str::to_string),
        attachment_name: first
            .and_then(|a| str_field(a, "filename").or_else(|| str_field(a, "name")))
            .map(str::to_string),
        attachment_count: attachments.len(),
    }
}

fn from_raw(raw: &str) -> Result<Parts, Skip> {
    let message = MessageParser::default()
        .parse(raw.as_bytes())
        .ok_or_else(|| Skip::malformed("unparseable raw email"))?;
    let sender = message.from().and_then(|from| from.first());
    let attachment = message.attachments().next();
    let body = message
        .body_text(0)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .or_else(|| message.body_html(0).and_then(|html| html_to_text(&html)));

    Ok(Parts {
        address: sender.and_then(|s| s.address()).map(str::to_lowercase),
        name: sender.and_then(|s| s.name()).map(str::to_string),
        to: message
            .to()
            .and_then(|to| to.first())
            .and_then(|to| to.address())
            .map(str::to_lowercase),
        subject: message
            .subject()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        body,
        message_id: message.message_id().map(str::to_string),
        timestamp: message
            .date()
            .and_then(|date| timestamp_from_unix_secs(date.to_timestamp())),
        in_reply_to: message.in_reply_to().as_text().map(str::to_string),
        attachment_url: None,
        attachment_mime: attachment
            .and_then(|part| part.content_type())
            .map(|ct| match ct.subtype() {
                Some(sub) => format!("{}/{}", ct.ctype(), sub),
                None => ct.ctype().to_string(),
            }),
        attachment_name: attachment
            .and_then(|part| part.attachment_name())
            .map(str::to_string),
        attachment_count: message.attachment_count(),
    })
}

/// Splits `"Jane Doe <jane@example.com>"` into address and display name.
/// A bare address has no name.
fn split_mailbox(mailbox: &str) -> (Option<String>, Option<String>) {
    let mailbox = mailbox.trim();
    match (mailbox.rfind('<'), mailbox.rfind('>')) {
        (Some(open), Some(close)) if open < close => {
            let address = mailbox[open + 1..close].trim();
            let name = mailbox[..open].trim().trim_matches('"').trim();
            (
                (!address.is_empty()).then(|| address.to_lowercase()),
                (!name.is_empty()).then(|| name.to_string()),
            )
        }
        _ if mailbox.contains('@') => (Some(mailbox.to_lowercase()), None),
        _ => (None, None),
    }
}

fn html_to_text(html: &str) -> Option<String> {
    html2text::from_read(html.as_bytes(), HTML_WRAP_WIDTH)
        .ok()
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn parse_date(date: &str) -> Option<String> {
    chrono::DateTime::parse_from_rfc2822(date)
        .or_else(|_| chrono::DateTime::parse_from_rfc3339(date))
        .ok()
        .map(|at| format_timestamp(at.with_timezone(&chrono::Utc)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_email_prefixes_subject() {
        let payload = json!({
            "from": "Sari Wulandari <Sari@Example.com>",
            "to": "support@shop.example",
            "subject": "Order status",
            "text": "Where is my order?",
            "message_id": "<abc@example.com>",
            "date": "Tue, 14 Nov 2023 22:13:20 +0000"
        });
        validate(&payload).unwrap();
        let messages = extract(&payload);
        assert_eq!(messages.len(), 1);
        let m = &messages[0];
        assert_eq!(m.content, "Subject: Order status\n\nWhere is my order?");
        assert_eq!(m.origin, "sari@example.com");
        assert_eq!(m.sender_name.as_deref(), Some("Sari Wulandari"));
        assert_eq!(m.platform_message_id.as_deref(), Some("<abc@example.com>"));
        assert_eq!(m.timestamp.as_deref(), Some("2023-11-14T22:13:20.000Z"));
        assert_eq!(m.metadata["email_subject"], "Order status");
        assert_eq!(m.metadata["email_to"], "support@shop.example");
    }

    #[test]
    fn object_sender_and_html_body() {
        let payload = json!({
            "from": {"address": "ops@example.com", "name": "Ops"},
            "html": "<p>Invoice <b>attached</b></p>",
            "attachments": [{"url": "https://files.example/inv.pdf", "content_type": "application/pdf", "filename": "inv.pdf"}]
        });
        let m = &extract(&payload)[0];
        assert_eq!(m.origin, "ops@example.com");
        assert!(m.content.contains("Invoice"));
        assert!(m.content.contains("attached"));
        assert_eq!(m.message_type, MessageType::Document);
        assert_eq!(m.media_url.as_deref(), Some("https://files.example/inv.pdf"));
        assert_eq!(m.metadata["email_attachment_count"], 1);
    }

    #[test]
    fn raw_rfc822_source_is_parsed() {
        let raw = "From: Budi <budi@example.com>\r\n\
                   To: support@shop.example\r\n\
                   Subject: Refund\r\n\
                   Message-ID: <raw-1@example.com>\r\n\
                   Date: Tue, 14 Nov 2023 22:13:20 +0000\r\n\
                   Content-Type: text/plain; charset=utf-8\r\n\
                   \r\n\
                   Please refund order 42.\r\n";
        let m = &extract(&json!({"raw": raw}))[0];
        assert_eq!(m.origin, "budi@example.com");
        assert_eq!(m.sender_name.as_deref(), Some("Budi"));
        assert_eq!(m.content, "Subject: Refund\n\nPlease refund order 42.");
        assert_eq!(m.platform_message_id.as_deref(), Some("raw-1@example.com"));
        assert_eq!(m.timestamp.as_deref(), Some("2023-11-14T22:13:20.000Z"));
    }

    #[test]
    fn array_skips_bad_items() {
        let payload = json!([
            {"subject": "no sender", "text": "x"},
            42,
            {"from": "a@example.com", "text": "kept"}
        ]);
        let messages = extract(&payload);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "kept");
    }

    #[test]
    fn attachment_without_url_and_no_text_is_skipped() {
        let payload = json!([
            {"from": "a@example.com", "attachments": [{"filename": "x.pdf"}]},
            {"from": "b@example.com", "subject": "Order", "text": "where is it?"}
        ]);
        let messages = extract(&payload);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].origin, "b@example.com");
    }

    #[test]
    fn mailbox_splitting() {
        assert_eq!(
            split_mailbox("\"Doe, Jane\" <jane@example.com>"),
            (Some("jane@example.com".into()), Some("Doe, Jane".into()))
        );
        assert_eq!(split_mailbox("plain@example.com"), (Some("plain@example.com".into()), None));
        assert_eq!(split_mailbox("not an address"), (None, None));
    }

    #[test]
    fn validation_shapes() {
        assert!(validate(&json!({"from": "a@example.com"})).is_ok());
        assert!(validate(&json!({"raw": "From: a@example.com\r\n\r\nhi"})).is_ok());
        assert!(validate(&json!([])).is_ok());
        assert!(validate(&json!({"subject": "hi"})).is_err());
        assert!(validate(&json!("a@example.com")).is_err());
    }
}
