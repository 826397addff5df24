// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook payloads shaped like what each platform actually posts.

use serde_json::{json, Value};

/// A WhatsApp Cloud API delivery carrying one text message.
pub fn whatsapp_text(from: &str, message_id: &str, body: &str) -> Value {
    whatsapp_messages(
        from,
        vec![json!({
            "from": from,
            "id": message_id,
            "timestamp": "1700000000",
            "type": "text",
            "text": {"body": body}
        })],
    )
}

/// A WhatsApp delivery carrying one image with a caption.
pub fn whatsapp_image(from: &str, message_id: &str, media_id: &str, caption: &str) -> Value {
    whatsapp_messages(
        from,
        vec![json!({
            "from": from,
            "id": message_id,
            "timestamp": "1700000001",
            "type": "image",
            "image": {"id": media_id, "mime_type": "image/jpeg", "caption": caption}
        })],
    )
}

/// A WhatsApp delivery wrapping arbitrary message units.
pub fn whatsapp_messages(from: &str, messages: Vec<Value>) -> Value {
    json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "WABA-TEST",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {"display_phone_number": "15550001111", "phone_number_id": "PN-TEST"},
                    "contacts": [{"profile": {"name": "Test Customer"}, "wa_id": from}],
                    "messages": messages
                }
            }]
        }]
    })
}

/// A WhatsApp delivery-receipt callback: no inbound messages.
pub fn whatsapp_status(message_id: &str, status: &str) -> Value {
    json!({
        "object": "whatsapp_business_account",
        "entry": [{"id": "WABA-TEST", "changes": [{"field": "messages", "value": {
            "statuses": [{"id": message_id, "status": status, "recipient_id": "6281234567890"}]
        }}]}]
    })
}

/// A Messenger Platform delivery; `object` is `"page"` or `"instagram"`.
pub fn messenger_text(object: &str, sender: &str, mid: &str, text: &str) -> Value {
    json!({
        "object": object,
        "entry": [{
            "id": "PAGE-TEST",
            "time": 1700000000000_i64,
            "messaging": [{
                "sender": {"id": sender},
                "recipient": {"id": "PAGE-TEST"},
                "timestamp": 1700000000000_i64,
                "message": {"mid": mid, "text": text}
            }]
        }]
    })
}

/// An inbound email as posted by a mail relay.
pub fn email(from: &str, subject: &str, body: &str) -> Value {
    json!({
        "from": from,
        "to": "support@shop.example",
        "subject": subject,
        "text": body,
        "message_id": format!("<{}@mail.test>", subject.len() + body.len()),
        "date": "Tue, 14 Nov 2023 22:13:20 +0000"
    })
}
