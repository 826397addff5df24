// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp Cloud API webhook normalization.
//!
//! Shape: `entry[] -> changes[] -> value { metadata, contacts[], messages[],
//! statuses[] }`. Delivery receipts arrive as `statuses` and are not inbound
//! messages.

use std::collections::HashMap;

use parley_core::types::{timestamp_from_unix_secs, CanonicalMessage, MessageType};
use parley_core::ParleyError;
use serde_json::{Map, Value};

use crate::unit::{array_field, id_field, insert_str, str_field, Skip};

const PLATFORM: &str = "whatsapp";

pub(crate) fn validate(payload: &Value) -> Result<(), ParleyError> {
    let Some(object) = payload.as_object() else {
        return Err(ParleyError::Validation(
            "whatsapp payload must be a JSON object".into(),
        ));
    };
    match object.get("entry") {
        Some(Value::Array(_)) => Ok(()),
        Some(_) => Err(ParleyError::Validation(
            "whatsapp payload `entry` must be an array".into(),
        )),
        None => Err(ParleyError::Validation(
            "whatsapp payload is missing `entry`".into(),
        )),
    }
}

pub(crate) fn extract(payload: &Value) -> Vec<CanonicalMessage> {
    let mut out = Vec::new();
    let mut index = 0;
    for entry in array_field(payload, "entry") {
        for change in array_field(entry, "changes") {
            let Some(value) = change.get("value").filter(|v| v.is_object()) else {
                Skip::malformed("change without a value object").log(PLATFORM, index);
                index += 1;
                continue;
            };
            let names = contact_names(value);
            let phone_number_id = value
                .get("metadata")
                .and_then(|m| str_field(m, "phone_number_id"));
            for message in array_field(value, "messages") {
                match to_canonical(message, &names, phone_number_id) {
                    Ok(canonical) => out.push(canonical),
                    Err(skip) => skip.log(PLATFORM, index),
                }
                index += 1;
            }
        }
    }
    out
}

/// `wa_id -> profile.name` from the change's `contacts` list.
fn contact_names(value: &Value) -> HashMap<String, String> {
    array_field(value, "contacts")
        .iter()
        .filter_map(|contact| {
            let wa_id = id_field(contact, "wa_id")?;
            let name = str_field(contact.get("profile")?, "name")?;
            Some((wa_id, name.to_string()))
        })
        .collect()
}

fn to_canonical(
    message: &Value,
    names: &HashMap<String, String>,
    phone_number_id: Option<&str>,
) -> Result<CanonicalMessage, Skip> {
    if !message.is_object() {
        return Err(Skip::malformed("message unit is not an object"));
    }
    let from = id_field(message, "from").ok_or_else(|| Skip::malformed("message without `from`"))?;
    let kind = str_field(message, "type").unwrap_or("text").to_ascii_lowercase();

    let mut metadata = Map::new();
    let (content, media_url, message_type) = match kind.as_str() {
        "text" => {
            let body = message
                .get("text")
                .and_then(|t| str_field(t, "body"))
                .ok_or_else(|| Skip::malformed("text message without body"))?;
            (body.to_string(), None, MessageType::Text)
        }
        "button" => {
            let text = message
                .get("button")
                .and_then(|b| str_field(b, "text"))
                .ok_or_else(|| Skip::malformed("button reply without text"))?;
            (text.to_string(), None, MessageType::Text)
        }
        "interactive" => {
            let interactive = message
                .get("interactive")
                .ok_or_else(|| Skip::malformed("interactive message without body"))?;
            let reply = interactive
                .get("button_reply")
                .or_else(|| interactive.get("list_reply"))
                .ok_or_else(|| Skip::malformed("interactive message without a reply"))?;
            let title = str_field(reply, "title")
                .ok_or_else(|| Skip::malformed("interactive reply without title"))?;
            insert_str(&mut metadata, format!("{PLATFORM}_reply_id"), str_field(reply, "id"));
            (title.to_string(), None, MessageType::Text)
        }
        "location" => {
            let location = message
                .get("location")
                .ok_or_else(|| Skip::malformed("location message without location"))?;
            let label = str_field(location, "name").or_else(|| str_field(location, "address"));
            let lat = location.get("latitude").and_then(Value::as_f64);
            let lng = location.get("longitude").and_then(Value::as_f64);
            let content = match (label, lat, lng) {
                (Some(label), _, _) => format!("Shared location: {label}"),
                (None, Some(lat), Some(lng)) => format!("Shared location: {lat},{lng}"),
                _ => return Err(Skip::malformed("location without name or coordinates")),
            };
            if let (Some(lat), Some(lng)) = (lat, lng) {
                metadata.insert(format!("{PLATFORM}_latitude"), lat.into());
                metadata.insert(format!("{PLATFORM}_longitude"), lng.into());
            }
            (content, None, MessageType::Text)
        }
        "image" | "video" | "audio" | "document" | "sticker" => {
            let media = message
                .get(kind.as_str())
                .filter(|m| m.is_object())
                .ok_or_else(|| Skip::malformed(format!("{kind} message without media object")))?;
            let media_ref = str_field(media, "link")
                .or_else(|| str_field(media, "id"))
                .ok_or_else(|| Skip::malformed(format!("{kind} message without media id")))?;
            insert_str(&mut metadata, format!("{PLATFORM}_media_id"), str_field(media, "id"));
            insert_str(&mut metadata, format!("{PLATFORM}_mime_type"), str_field(media, "mime_type"));
            insert_str(&mut metadata, format!("{PLATFORM}_filename"), str_field(media, "filename"));
            let caption = str_field(media, "caption").unwrap_or_default();
            let message_type = match kind.as_str() {
                "image" => MessageType::Image,
                "video" => MessageType::Video,
                "audio" => MessageType::Audio,
                "document" => MessageType::Document,
                _ => MessageType::Sticker,
            };
            (caption.to_string(), Some(media_ref.to_string()), message_type)
        }
        "reaction" => return Err(Skip::Ignored("reaction")),
        "system" | "unsupported" | "unknown" => return Err(Skip::Ignored("unsupported message type")),
        other => return Err(Skip::malformed(format!("unrecognized message type `{other}`"))),
    };
    if content.trim().is_empty() && media_url.is_none() {
        return Err(Skip::malformed("message without content or media"));
    }

    let message_id = id_field(message, "id");
    let raw_timestamp = id_field(message, "timestamp");
    insert_str(&mut metadata, format!("{PLATFORM}_message_id"), message_id.as_deref());
    insert_str(&mut metadata, format!("{PLATFORM}_sender_id"), Some(from.as_str()));
    insert_str(&mut metadata, format!("{PLATFORM}_timestamp"), raw_timestamp.as_deref());
    insert_str(&mut metadata, format!("{PLATFORM}_phone_number_id"), phone_number_id);
    insert_str(&mut metadata, format!("{PLATFORM}_type"), Some(kind.as_str()));
    if let Some(context_id) = message.get("context").and_then(|c| str_field(c, "id")) {
        insert_str(&mut metadata, format!("{PLATFORM}_context_id"), Some(context_id));
    }

    let timestamp = raw_timestamp
        .as_deref()
        .and_then(|t| t.parse::<i64>().ok())
        .and_then(timestamp_from_unix_secs);

    Ok(CanonicalMessage {
        sender_name: names.get(&from).cloned(),
        origin: from,
        content,
        media_url,
        message_type,
        metadata,
        platform_message_id: message_id,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(messages: Value) -> Value {
        json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "WABA-1",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "metadata": {"display_phone_number": "15550001111", "phone_number_id": "PN-1"},
                        "contacts": [{"profile": {"name": "Budi"}, "wa_id": "6281234567890"}],
                        "messages": messages
                    }
                }]
            }]
        })
    }

    #[test]
    fn text_message_normalizes() {
        let payload = envelope(json!([{
            "from": "6281234567890",
            "id": "wamid.HBgM",
            "timestamp": "1700000000",
            "type": "text",
            "text": {"body": "hello"}
        }]));
        validate(&payload).unwrap();
        let messages = extract(&payload);
        assert_eq!(messages.len(), 1);
        let m = &messages[0];
        assert_eq!(m.origin, "6281234567890");
        assert_eq!(m.content, "hello");
        assert_eq!(m.message_type, MessageType::Text);
        assert!(m.media_url.is_none());
        assert_eq!(m.platform_message_id.as_deref(), Some("wamid.HBgM"));
        assert_eq!(m.sender_name.as_deref(), Some("Budi"));
        assert_eq!(m.timestamp.as_deref(), Some("2023-11-14T22:13:20.000Z"));
        assert_eq!(m.metadata["whatsapp_sender_id"], "6281234567890");
        assert_eq!(m.metadata["whatsapp_message_id"], "wamid.HBgM");
        assert_eq!(m.metadata["whatsapp_timestamp"], "1700000000");
        assert_eq!(m.metadata["whatsapp_phone_number_id"], "PN-1");
    }

    #[test]
    fn image_uses_caption_and_media_id() {
        let payload = envelope(json!([{
            "from": "6281234567890",
            "id": "wamid.2",
            "type": "image",
            "image": {"id": "MEDIA-9", "mime_type": "image/jpeg", "caption": "receipt"}
        }]));
        let m = &extract(&payload)[0];
        assert_eq!(m.message_type, MessageType::Image);
        assert_eq!(m.content, "receipt");
        assert_eq!(m.media_url.as_deref(), Some("MEDIA-9"));
        assert_eq!(m.metadata["whatsapp_mime_type"], "image/jpeg");
    }

    #[test]
    fn interactive_reply_reads_as_text() {
        let payload = envelope(json!([{
            "from": "6281234567890",
            "id": "wamid.3",
            "type": "interactive",
            "interactive": {"type": "button_reply", "button_reply": {"id": "opt-1", "title": "Track order"}}
        }]));
        let m = &extract(&payload)[0];
        assert_eq!(m.content, "Track order");
        assert_eq!(m.metadata["whatsapp_reply_id"], "opt-1");
    }

    #[test]
    fn status_callbacks_produce_nothing() {
        let payload = json!({
            "entry": [{"changes": [{"value": {
                "statuses": [{"id": "wamid.1", "status": "delivered", "recipient_id": "628"}]
            }}]}]
        });
        validate(&payload).unwrap();
        assert!(extract(&payload).is_empty());
    }

    #[test]
    fn malformed_unit_is_skipped() {
        let payload = envelope(json!([
            {"id": "wamid.bad", "type": "text", "text": {"body": "no sender"}},
            {"from": "628", "id": "wamid.good", "type": "text", "text": {"body": "ok"}}
        ]));
        let messages = extract(&payload);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "ok");
    }

    #[test]
    fn blank_text_body_is_skipped() {
        let payload = envelope(json!([
            {"from": "628", "id": "wamid.blank", "type": "text", "text": {"body": "   "}},
            {"from": "628", "id": "wamid.real", "type": "text", "text": {"body": "halo"}}
        ]));
        let messages = extract(&payload);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "halo");
    }

    #[test]
    fn numeric_sender_is_accepted() {
        let payload = envelope(json!([
            {"from": 6281234567890_u64, "type": "text", "text": {"body": "hi"}}
        ]));
        assert_eq!(extract(&payload)[0].origin, "6281234567890");
    }

    #[test]
    fn missing_entry_fails_validation() {
        assert!(validate(&json!({"object": "whatsapp_business_account"})).is_err());
        assert!(validate(&json!({"entry": {}})).is_err());
        assert!(validate(&json!([1, 2])).is_err());
    }
}
