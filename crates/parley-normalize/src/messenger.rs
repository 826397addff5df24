// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Meta Messenger Platform webhooks, shared by Instagram and Facebook.
//!
//! Both deliver `entry[] -> messaging[]` events; Instagram may instead use
//! `entry[] -> changes[]` with `field == "messages"` and the event under
//! `value`. Echoes of the page's own sends, read and delivery receipts, and
//! reactions are not inbound messages.

use parley_core::types::{timestamp_from_unix_millis, CanonicalMessage, MessageType};
use parley_core::ParleyError;
use serde_json::{Map, Value};

use crate::unit::{array_field, classify_attachment, id_field, insert_str, str_field, Skip};

pub(crate) fn validate(platform: &str, payload: &Value) -> Result<(), ParleyError> {
    let Some(object) = payload.as_object() else {
        return Err(ParleyError::Validation(format!(
            "{platform} payload must be a JSON object"
        )));
    };
    match object.get("entry") {
        Some(Value::Array(_)) => Ok(()),
        Some(_) => Err(ParleyError::Validation(format!(
            "{platform} payload `entry` must be an array"
        ))),
        None => Err(ParleyError::Validation(format!(
            "{platform} payload is missing `entry`"
        ))),
    }
}

pub(crate) fn extract(platform: &str, payload: &Value) -> Vec<CanonicalMessage> {
    let mut out = Vec::new();
    let mut index = 0;
    for entry in array_field(payload, "entry") {
        let units = array_field(entry, "messaging").iter().chain(
            array_field(entry, "changes")
                .iter()
                .filter(|change| str_field(change, "field") == Some("messages"))
                .filter_map(|change| change.get("value")),
        );
        for unit in units {
            match to_canonical(platform, unit) {
                Ok(canonical) => out.push(canonical),
                Err(skip) => skip.log(platform, index),
            }
            index += 1;
        }
    }
    out
}

fn to_canonical(platform: &str, unit: &Value) -> Result<CanonicalMessage, Skip> {
    if !unit.is_object() {
        return Err(Skip::malformed("messaging unit is not an object"));
    }
    if unit.get("read").is_some() {
        return Err(Skip::Ignored("read receipt"));
    }
    if unit.get("delivery").is_some() {
        return Err(Skip::Ignored("delivery receipt"));
    }
    if unit.get("reaction").is_some() {
        return Err(Skip::Ignored("reaction"));
    }

    let sender = unit
        .get("sender")
        .and_then(|s| id_field(s, "id"))
        .ok_or_else(|| Skip::malformed("event without sender id"))?;
    let recipient = unit.get("recipient").and_then(|r| id_field(r, "id"));
    let raw_timestamp = id_field(unit, "timestamp");

    let mut metadata = Map::new();
    let (content, media_url, message_type, message_id) = if let Some(message) = unit.get("message")
    {
        if message.get("is_echo").and_then(Value::as_bool) == Some(true) {
            return Err(Skip::Ignored("echo of an outbound message"));
        }
        if message.get("is_deleted").and_then(Value::as_bool) == Some(true) {
            return Err(Skip::Ignored("deleted message"));
        }
        let text = str_field(message, "text");
        let attachment = array_field(message, "attachments").first();
        let (media_url, message_type) = match attachment {
            Some(attachment) => {
                let kind = str_field(attachment, "type").unwrap_or("file");
                insert_str(
                    &mut metadata,
                    format!("{platform}_attachment_type"),
                    Some(kind),
                );
                let url = attachment
                    .get("payload")
                    .and_then(|p| str_field(p, "url"))
                    .map(str::to_string);
                (url, classify_attachment(kind))
            }
            None => (None, MessageType::Text),
        };
        if let Some(quick_reply) = message.get("quick_reply").and_then(|q| str_field(q, "payload")) {
            insert_str(&mut metadata, format!("{platform}_quick_reply"), Some(quick_reply));
        }
        if let Some(reply_to) = message.get("reply_to").and_then(|r| str_field(r, "mid")) {
            insert_str(&mut metadata, format!("{platform}_reply_to"), Some(reply_to));
        }
        (
            text.unwrap_or_default().to_string(),
            media_url,
            message_type,
            id_field(message, "mid"),
        )
    } else if let Some(postback) = unit.get("postback") {
        let title = str_field(postback, "title")
            .or_else(|| str_field(postback, "payload"))
            .ok_or_else(|| Skip::malformed("postback without title or payload"))?;
        insert_str(
            &mut metadata,
            format!("{platform}_postback_payload"),
            str_field(postback, "payload"),
        );
        (title.to_string(), None, MessageType::Text, id_field(postback, "mid"))
    } else {
        return Err(Skip::Ignored("event without a message"));
    };
    if content.trim().is_empty() && media_url.is_none() {
        return Err(Skip::malformed("message without text or media url"));
    }

    insert_str(&mut metadata, format!("{platform}_sender_id"), Some(sender.as_str()));
    insert_str(&mut metadata, format!("{platform}_recipient_id"), recipient.as_deref());
    insert_str(&mut metadata, format!("{platform}_message_id"), message_id.as_deref());
    insert_str(&mut metadata, format!("{platform}_timestamp"), raw_timestamp.as_deref());

    let timestamp = raw_timestamp
        .as_deref()
        .and_then(|t| t.parse::<i64>().ok())
        .and_then(timestamp_from_unix_millis);

    Ok(CanonicalMessage {
        origin: sender,
        content,
        media_url,
        message_type,
        metadata,
        platform_message_id: message_id,
        sender_name: None,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page(messaging: Value) -> Value {
        json!({"object": "page", "entry": [{"id": "PAGE-1", "time": 1700000000000_i64, "messaging": messaging}]})
    }

    #[test]
    fn facebook_text_message() {
        let payload = page(json!([{
            "sender": {"id": "PSID-1"},
            "recipient": {"id": "PAGE-1"},
            "timestamp": 1700000000000_i64,
            "message": {"mid": "m_1", "text": "is this in stock?"}
        }]));
        validate("facebook", &payload).unwrap();
        let messages = extract("facebook", &payload);
        assert_eq!(messages.len(), 1);
        let m = &messages[0];
        assert_eq!(m.origin, "PSID-1");
        assert_eq!(m.content, "is this in stock?");
        assert_eq!(m.message_type, MessageType::Text);
        assert_eq!(m.platform_message_id.as_deref(), Some("m_1"));
        assert_eq!(m.timestamp.as_deref(), Some("2023-11-14T22:13:20.000Z"));
        assert_eq!(m.metadata["facebook_sender_id"], "PSID-1");
        assert_eq!(m.metadata["facebook_recipient_id"], "PAGE-1");
        assert_eq!(m.metadata["facebook_message_id"], "m_1");
    }

    #[test]
    fn instagram_attachment_is_classified() {
        let payload = json!({"object": "instagram", "entry": [{"id": "IG-1", "messaging": [{
            "sender": {"id": "IGSID-7"},
            "recipient": {"id": "IG-1"},
            "timestamp": 1700000000000_i64,
            "message": {"mid": "ig_1", "attachments": [
                {"type": "image", "payload": {"url": "https://cdn.example/a.jpg"}}
            ]}
        }]}]});
        let m = &extract("instagram", &payload)[0];
        assert_eq!(m.message_type, MessageType::Image);
        assert_eq!(m.media_url.as_deref(), Some("https://cdn.example/a.jpg"));
        assert_eq!(m.content, "");
        assert_eq!(m.metadata["instagram_attachment_type"], "image");
    }

    #[test]
    fn instagram_changes_form_is_walked() {
        let payload = json!({"object": "instagram", "entry": [{"id": "IG-1", "changes": [
            {"field": "comments", "value": {"text": "nice"}},
            {"field": "messages", "value": {
                "sender": {"id": "IGSID-7"},
                "recipient": {"id": "IG-1"},
                "timestamp": "1700000000000",
                "message": {"mid": "ig_2", "text": "hi"}
            }}
        ]}]});
        let messages = extract("instagram", &payload);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "hi");
    }

    #[test]
    fn echoes_and_receipts_are_ignored() {
        let payload = page(json!([
            {"sender": {"id": "PAGE-1"}, "recipient": {"id": "PSID-1"}, "message": {"mid": "m_2", "text": "ours", "is_echo": true}},
            {"sender": {"id": "PSID-1"}, "recipient": {"id": "PAGE-1"}, "read": {"watermark": 1}},
            {"sender": {"id": "PSID-1"}, "recipient": {"id": "PAGE-1"}, "delivery": {"mids": ["m_2"]}}
        ]));
        assert!(extract("facebook", &payload).is_empty());
    }

    #[test]
    fn postback_reads_as_text() {
        let payload = page(json!([{
            "sender": {"id": "PSID-1"},
            "recipient": {"id": "PAGE-1"},
            "postback": {"title": "Get Started", "payload": "GET_STARTED"}
        }]));
        let m = &extract("facebook", &payload)[0];
        assert_eq!(m.content, "Get Started");
        assert_eq!(m.metadata["facebook_postback_payload"], "GET_STARTED");
    }

    #[test]
    fn malformed_unit_does_not_drop_siblings() {
        let payload = page(json!([
            {"recipient": {"id": "PAGE-1"}, "message": {"mid": "m_x", "text": "no sender"}},
            "garbage",
            {"sender": {"id": "PSID-2"}, "message": {"mid": "m_y", "text": "kept"}}
        ]));
        let messages = extract("facebook", &payload);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].origin, "PSID-2");
    }

    #[test]
    fn attachment_without_url_or_text_is_skipped() {
        let payload = page(json!([
            {"sender": {"id": "PSID-1"}, "message": {"mid": "m_loc", "attachments": [
                {"type": "location", "payload": {"coordinates": {"lat": 1.0, "long": 2.0}}}
            ]}},
            {"sender": {"id": "PSID-1"}, "message": {"mid": "m_txt", "text": "hello"}}
        ]));
        let messages = extract("facebook", &payload);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "hello");
    }

    #[test]
    fn attachment_without_url_keeps_its_caption() {
        let payload = page(json!([{
            "sender": {"id": "PSID-1"},
            "message": {"mid": "m_cap", "text": "see pin", "attachments": [{"type": "location"}]}
        }]));
        let messages = extract("facebook", &payload);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].media_url, None);
    }

    #[test]
    fn validation_requires_entry_array() {
        assert!(validate("facebook", &json!({"object": "page"})).is_err());
        assert!(validate("instagram", &json!("text")).is_err());
        assert!(validate("instagram", &json!({"entry": []})).is_ok());
    }
}
