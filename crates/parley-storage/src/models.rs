// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities.
//!
//! The canonical types are defined in `parley-core::types` for use across
//! adapter trait boundaries. This module re-exports them and adds the
//! storage-only outbox row plus the column-decoding helpers shared by the
//! query modules.

use std::str::FromStr;

pub use parley_core::types::{Conversation, Message, MessageStatus, WebhookEvent};

/// A row of the durable `queue` table.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub id: i64,
    pub queue_name: String,
    /// JSON text, typically an event envelope.
    pub payload: String,
    /// `pending`, `processing`, `completed` or `failed`.
    pub status: String,
    pub attempts: i64,
    pub max_attempts: i64,
    pub created_at: String,
    pub updated_at: String,
    pub locked_until: Option<String>,
}

/// Decodes a TEXT column holding a strum-serialized enum.
pub(crate) fn enum_column<T: FromStr>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    T::from_str(&raw).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unexpected enum value `{raw}`").into(),
        )
    })
}

/// Decodes a nullable TEXT enum column.
pub(crate) fn optional_enum_column<T: FromStr>(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        None => Ok(None),
        Some(raw) => T::from_str(&raw).map(Some).map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                format!("unexpected enum value `{raw}`").into(),
            )
        }),
    }
}

/// Decodes the INTEGER status ordinal of a message.
pub(crate) fn status_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<MessageStatus> {
    let code: i64 = row.get(idx)?;
    MessageStatus::from_code(code).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Integer,
            Box::new(e),
        )
    })
}
