// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Robustness properties: normalizers never panic on arbitrary JSON, and a
//! well-formed message survives being surrounded by junk units.

use parley_core::types::Platform;
use parley_normalize::{NormalizerRegistry, PlatformNormalizer};
use proptest::prelude::*;
use serde_json::{json, Value};

fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        "[a-z0-9 ]{0,12}".prop_map(Value::String),
    ];
    leaf.prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::hash_map(
                prop_oneof![
                    Just("entry".to_string()),
                    Just("changes".to_string()),
                    Just("value".to_string()),
                    Just("messages".to_string()),
                    Just("messaging".to_string()),
                    Just("message".to_string()),
                    Just("from".to_string()),
                    Just("text".to_string()),
                    Just("type".to_string()),
                    "[a-z]{1,8}",
                ],
                inner,
                0..6,
            )
            .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

proptest! {
    #[test]
    fn arbitrary_payloads_never_panic(payload in arb_json()) {
        for platform in Platform::ALL {
            let normalizer = PlatformNormalizer::for_platform(platform);
            let extracted = normalizer.extract(&payload);
            if normalizer.validate(&payload).is_err() {
                prop_assert!(extracted.is_empty());
            }
            for message in extracted {
                prop_assert!(!message.origin.is_empty());
                prop_assert!(!message.content.trim().is_empty() || message.media_url.is_some());
            }
        }
    }

    #[test]
    fn good_whatsapp_message_survives_junk(junk in prop::collection::vec(arb_json(), 0..5), body in "[a-zA-Z ]{1,40}") {
        let body = body.trim().to_string();
        prop_assume!(!body.is_empty());
        let mut messages = junk;
        messages.push(json!({"from": "6281234567890", "id": "wamid.ok", "type": "text", "text": {"body": body}}));
        let payload = json!({"entry": [{"changes": [{"value": {"messages": messages}}]}]});
        let extracted = PlatformNormalizer::WhatsApp.extract(&payload);
        prop_assert!(extracted.iter().any(|m| m.platform_message_id.as_deref() == Some("wamid.ok") && m.content == body));
    }
}

#[test]
fn registry_dispatches_by_tag() {
    let registry = NormalizerRegistry::with_defaults();
    let normalizer = registry.get("email").unwrap();
    let messages = normalizer.extract(&json!({
        "from": "buyer@example.com",
        "subject": "Order status",
        "text": "Where is my order?"
    }));
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "Subject: Order status\n\nWhere is my order?");
    assert_eq!(normalizer.medium_id(), Platform::Email);
}
