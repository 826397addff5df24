// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message CRUD operations and status compare-and-set.

use parley_core::types::{LastMessageSummary, MessageInsert, MessageStatus, StatusChange};
use parley_core::ParleyError;
use rusqlite::{params, Connection, OptionalExtension};

use crate::database::Database;
use crate::models::{enum_column, status_column, Message};
use crate::queries::conversations;
use crate::writer;

const COLUMNS: &str = "id, conversation_id, organization_id, sender_type, sender_id, direction,
     message_type, content, media_url, attachments, is_broadcast, is_order, is_ai_generated,
     ai_confidence, status, platform_message_id, metadata, read_at, delivered_at, failed_at,
     failure_reason, created_at, updated_at";

fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        organization_id: row.get(2)?,
        sender_type: enum_column(row, 3)?,
        sender_id: row.get(4)?,
        direction: enum_column(row, 5)?,
        message_type: enum_column(row, 6)?,
        content: row.get(7)?,
        media_url: row.get(8)?,
        attachments: row.get(9)?,
        is_broadcast: row.get(10)?,
        is_order: row.get(11)?,
        is_ai_generated: row.get(12)?,
        ai_confidence: row.get(13)?,
        status: status_column(row, 14)?,
        platform_message_id: row.get(15)?,
        metadata: row.get(16)?,
        read_at: row.get(17)?,
        delivered_at: row.get(18)?,
        failed_at: row.get(19)?,
        failure_reason: row.get(20)?,
        created_at: row.get(21)?,
        updated_at: row.get(22)?,
    })
}

fn select_by_id(conn: &Connection, id: &str) -> rusqlite::Result<Option<Message>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM messages WHERE id = ?1"),
        params![id],
        from_row,
    )
    .optional()
}

fn select_by_platform_id(
    conn: &Connection,
    conversation_id: &str,
    platform_message_id: &str,
) -> rusqlite::Result<Option<Message>> {
    conn.query_row(
        &format!(
            "SELECT {COLUMNS} FROM messages
             WHERE conversation_id = ?1 AND platform_message_id = ?2"
        ),
        params![conversation_id, platform_message_id],
        from_row,
    )
    .optional()
}

fn apply_summary(
    conn: &Connection,
    conversation_id: &str,
    summary: &LastMessageSummary,
) -> rusqlite::Result<()> {
    // last_message_* only moves forward in time.
    conn.execute(
        "UPDATE conversations SET
             last_message_at = ?1,
             last_message_by_id = ?2,
             last_message_by_type = ?3,
             last_message_by_name = ?4,
             last_message_content = ?5,
             last_message_type = ?6,
             last_message_media_url = ?7,
             updated_at = ?1
         WHERE id = ?8 AND (last_message_at IS NULL OR last_message_at <= ?1)",
        params![
            summary.at,
            summary.by_id,
            summary.by_type.to_string(),
            summary.by_name,
            summary.content_preview,
            summary.message_type.to_string(),
            summary.media_url,
            conversation_id,
        ],
    )?;
    conn.execute(
        "UPDATE conversations SET
             last_human_message_at = CASE
                 WHEN ?1 IS NOT NULL AND (last_human_message_at IS NULL OR last_human_message_at < ?1)
                 THEN ?1 ELSE last_human_message_at END,
             last_ai_message_at = CASE
                 WHEN ?2 IS NOT NULL AND (last_ai_message_at IS NULL OR last_ai_message_at < ?2)
                 THEN ?2 ELSE last_ai_message_at END
         WHERE id = ?3",
        params![summary.human_message_at, summary.ai_message_at, conversation_id],
    )?;
    Ok(())
}

enum InsertOutcome {
    MissingConversation,
    Done(MessageInsert),
}

/// Insert a message and update its conversation's denormalized fields in one
/// transaction.
///
/// A message whose `(conversation_id, platform_message_id)` is already stored
/// comes back as [`MessageInsert::Existing`] with nothing written.
pub async fn insert_message(
    db: &Database,
    msg: &Message,
    summary: &LastMessageSummary,
) -> Result<MessageInsert, ParleyError> {
    let msg = msg.clone();
    let summary = summary.clone();
    let lookup = msg.conversation_id.clone();
    let outcome = db
        .connection()
        .call(move |conn| {
            writer::immediate(conn, |tx| {
                if conversations::select_by_id(tx, &msg.conversation_id)?.is_none() {
                    return Ok(InsertOutcome::MissingConversation);
                }
                if let Some(platform_id) = msg.platform_message_id.as_deref() {
                    if let Some(existing) =
                        select_by_platform_id(tx, &msg.conversation_id, platform_id)?
                    {
                        return Ok(InsertOutcome::Done(MessageInsert::Existing(existing)));
                    }
                }

                tx.execute(
                    "INSERT INTO messages (id, conversation_id, organization_id, sender_type,
                        sender_id, direction, message_type, content, media_url, attachments,
                        is_broadcast, is_order, is_ai_generated, ai_confidence, status,
                        platform_message_id, metadata, read_at, delivered_at, failed_at,
                        failure_reason, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                        ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)",
                    params![
                        msg.id,
                        msg.conversation_id,
                        msg.organization_id,
                        msg.sender_type.to_string(),
                        msg.sender_id,
                        msg.direction.to_string(),
                        msg.message_type.to_string(),
                        msg.content,
                        msg.media_url,
                        msg.attachments,
                        msg.is_broadcast,
                        msg.is_order,
                        msg.is_ai_generated,
                        msg.ai_confidence,
                        msg.status.code(),
                        msg.platform_message_id,
                        msg.metadata,
                        msg.read_at,
                        msg.delivered_at,
                        msg.failed_at,
                        msg.failure_reason,
                        msg.created_at,
                        msg.updated_at,
                    ],
                )?;
                apply_summary(tx, &msg.conversation_id, &summary)?;

                let stored = select_by_id(tx, &msg.id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
                Ok(InsertOutcome::Done(MessageInsert::Created(stored)))
            })
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    match outcome {
        InsertOutcome::MissingConversation => Err(ParleyError::not_found("conversation", lookup)),
        InsertOutcome::Done(insert) => Ok(insert),
    }
}

/// Get a message by ID.
pub async fn get_message(db: &Database, id: &str) -> Result<Option<Message>, ParleyError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| select_by_id(conn, &id))
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get messages for a conversation in chronological order.
pub async fn get_messages_for_conversation(
    db: &Database,
    conversation_id: &str,
    limit: Option<i64>,
) -> Result<Vec<Message>, ParleyError> {
    let conversation_id = conversation_id.to_string();
    // SQLite treats a negative LIMIT as unbounded.
    let limit = limit.unwrap_or(-1);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM messages WHERE conversation_id = ?1
                 ORDER BY created_at ASC, rowid ASC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![conversation_id, limit], from_row)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Apply `change` only if the message's status is still `expected`.
///
/// Timestamp columns are only ever filled, never cleared.
pub async fn compare_and_set_status(
    db: &Database,
    id: &str,
    expected: MessageStatus,
    change: &StatusChange,
) -> Result<bool, ParleyError> {
    let id = id.to_string();
    let change = change.clone();
    db.connection()
        .call(move |conn| {
            let updated = conn.execute(
                "UPDATE messages SET
                     status = ?1,
                     delivered_at = COALESCE(delivered_at, ?2),
                     read_at = COALESCE(read_at, ?3),
                     failed_at = COALESCE(failed_at, ?4),
                     failure_reason = COALESCE(?5, failure_reason),
                     updated_at = ?6
                 WHERE id = ?7 AND status = ?8",
                params![
                    change.status.code(),
                    change.delivered_at,
                    change.read_at,
                    change.failed_at,
                    change.failure_reason,
                    change.updated_at,
                    id,
                    expected.code(),
                ],
            )?;
            Ok(updated == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
