// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Helpers shared by the per-platform walkers: skip bookkeeping, JSON
//! accessors, and attachment classification.

use parley_core::types::MessageType;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Why an inner unit produced no canonical message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Skip {
    /// A well-formed unit that carries no inbound message (receipts, echoes,
    /// reactions).
    Ignored(&'static str),
    /// A unit missing a field it needs.
    Malformed(String),
}

impl Skip {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Skip::Malformed(reason.into())
    }

    /// Logs the skip at a level matching its cause.
    pub(crate) fn log(&self, platform: &str, index: usize) {
        match self {
            Skip::Ignored(reason) => debug!(platform, index, reason, "ignoring message unit"),
            Skip::Malformed(reason) => {
                warn!(platform, index, reason = %reason, "skipping malformed message unit")
            }
        }
    }
}

/// A trimmed, non-empty string field.
pub(crate) fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// A string or integer field rendered as a string. Platforms disagree on
/// whether ids and timestamps are quoted.
pub(crate) fn id_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// The array under `key`, or an empty slice when absent or not an array.
pub(crate) fn array_field<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

pub(crate) fn insert_str(metadata: &mut Map<String, Value>, key: String, value: Option<&str>) {
    if let Some(value) = value {
        metadata.insert(key, Value::String(value.to_string()));
    }
}

/// Maps a platform attachment-type string onto the canonical enumeration.
///
/// Unknown kinds (shares, story mentions, fallbacks) read as text; their URL
/// is still carried as the media URL.
pub fn classify_attachment(kind: &str) -> MessageType {
    match kind.trim().to_ascii_lowercase().as_str() {
        "image" | "photo" | "gif" | "animated_image" => MessageType::Image,
        "video" | "reel" | "ig_reel" => MessageType::Video,
        "audio" | "voice" => MessageType::Audio,
        "file" | "document" => MessageType::Document,
        "sticker" | "like_heart" => MessageType::Sticker,
        _ => MessageType::Text,
    }
}

/// Classifies a MIME type (`image/png`, `application/pdf`).
pub fn classify_mime(mime: &str) -> MessageType {
    let top = mime.split('/').next().unwrap_or("").trim().to_ascii_lowercase();
    match top.as_str() {
        "image" => MessageType::Image,
        "video" => MessageType::Video,
        "audio" => MessageType::Audio,
        _ => MessageType::Document,
    }
}
