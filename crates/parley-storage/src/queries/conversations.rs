// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation persistence and the one-active-per-key invariant.
//!
//! The partial unique index `idx_conversations_active_key` is the arbiter:
//! inserts use `ON CONFLICT DO NOTHING`, and a zero-row insert means another
//! writer already holds the active slot for the key.

use parley_core::types::{
    now_timestamp, Conversation, ConversationInsert, ConversationKey, ConversationPriority,
    ConversationStatus,
};
use parley_core::ParleyError;
use rusqlite::{params, Connection, OptionalExtension};

use crate::database::Database;
use crate::models::{enum_column, optional_enum_column};
use crate::writer;

const COLUMNS: &str = "id, organization_id, user_id, contact_id, medium_id, is_active, is_archived,
     is_deleted, status, priority, ai_enabled, ai_config, metadata, last_message_at,
     last_message_by_id, last_message_by_type, last_message_by_name, last_message_content,
     last_message_type, last_message_media_url, last_human_message_at, last_ai_message_at,
     created_at, updated_at";

fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        user_id: row.get(2)?,
        contact_id: row.get(3)?,
        medium_id: row.get(4)?,
        is_active: row.get(5)?,
        is_archived: row.get(6)?,
        is_deleted: row.get(7)?,
        status: enum_column(row, 8)?,
        priority: enum_column(row, 9)?,
        ai_enabled: row.get(10)?,
        ai_config: row.get(11)?,
        metadata: row.get(12)?,
        last_message_at: row.get(13)?,
        last_message_by_id: row.get(14)?,
        last_message_by_type: optional_enum_column(row, 15)?,
        last_message_by_name: row.get(16)?,
        last_message_content: row.get(17)?,
        last_message_type: optional_enum_column(row, 18)?,
        last_message_media_url: row.get(19)?,
        last_human_message_at: row.get(20)?,
        last_ai_message_at: row.get(21)?,
        created_at: row.get(22)?,
        updated_at: row.get(23)?,
    })
}

pub(crate) fn select_by_id(conn: &Connection, id: &str) -> rusqlite::Result<Option<Conversation>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM conversations WHERE id = ?1"),
        params![id],
        from_row,
    )
    .optional()
}

fn select_active(conn: &Connection, key: &ConversationKey) -> rusqlite::Result<Option<Conversation>> {
    conn.query_row(
        &format!(
            "SELECT {COLUMNS} FROM conversations
             WHERE organization_id = ?1 AND user_id = ?2 AND contact_id = ?3 AND medium_id = ?4
               AND is_active = 1"
        ),
        params![key.organization_id, key.user_id, key.contact_id, key.medium_id],
        from_row,
    )
    .optional()
}

fn deactivate_siblings(conn: &Connection, conversation: &Conversation) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE conversations SET is_active = 0, updated_at = ?1
         WHERE organization_id = ?2 AND user_id = ?3 AND contact_id = ?4 AND medium_id = ?5
           AND id != ?6 AND is_active = 1",
        params![
            now_timestamp(),
            conversation.organization_id,
            conversation.user_id,
            conversation.contact_id,
            conversation.medium_id,
            conversation.id,
        ],
    )
}

/// The active conversation for `key`, if any.
pub async fn find_active(
    db: &Database,
    key: &ConversationKey,
) -> Result<Option<Conversation>, ParleyError> {
    let key = key.clone();
    db.connection()
        .call(move |conn| select_active(conn, &key))
        .await
        .map_err(crate::database::map_tr_err)
}

/// Insert `conversation` as the active row for its key unless one exists.
pub async fn insert_active(
    db: &Database,
    conversation: &Conversation,
) -> Result<ConversationInsert, ParleyError> {
    let c = conversation.clone();
    db.connection()
        .call(move |conn| {
            writer::immediate(conn, |tx| {
                let inserted = tx.execute(
                    "INSERT INTO conversations (id, organization_id, user_id, contact_id, medium_id,
                        is_active, is_archived, is_deleted, status, priority, ai_enabled, ai_config,
                        metadata, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, 1, 0, 0, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                     ON CONFLICT DO NOTHING",
                    params![
                        c.id,
                        c.organization_id,
                        c.user_id,
                        c.contact_id,
                        c.medium_id,
                        c.status.to_string(),
                        c.priority.to_string(),
                        c.ai_enabled,
                        c.ai_config,
                        c.metadata,
                        c.created_at,
                        c.updated_at,
                    ],
                )?;
                if inserted == 0 {
                    return Ok(ConversationInsert::Conflict);
                }
                deactivate_siblings(tx, &c)?;
                let stored = select_by_id(tx, &c.id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
                Ok(ConversationInsert::Inserted(stored))
            })
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a conversation by ID.
pub async fn get(db: &Database, id: &str) -> Result<Option<Conversation>, ParleyError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| select_by_id(conn, &id))
        .await
        .map_err(crate::database::map_tr_err)
}

/// Make `id` the active conversation for its key. Siblings are deactivated
/// in the same transaction. Deleted conversations cannot be reactivated.
pub async fn activate(db: &Database, id: &str) -> Result<Conversation, ParleyError> {
    let id = id.to_string();
    let lookup = id.clone();
    let activated = db
        .connection()
        .call(move |conn| {
            writer::immediate(conn, |tx| {
                let Some(current) = select_by_id(tx, &id)? else {
                    return Ok(None);
                };
                if current.is_deleted {
                    return Ok(None);
                }
                deactivate_siblings(tx, &current)?;
                tx.execute(
                    "UPDATE conversations SET is_active = 1, is_archived = 0, updated_at = ?1
                     WHERE id = ?2",
                    params![now_timestamp(), id],
                )?;
                select_by_id(tx, &id)
            })
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    activated.ok_or_else(|| ParleyError::not_found("conversation", lookup))
}

async fn update_one(
    db: &Database,
    id: &str,
    assignments: &'static str,
    value: Option<String>,
) -> Result<Conversation, ParleyError> {
    let id = id.to_string();
    let lookup = id.clone();
    let updated = db
        .connection()
        .call(move |conn| {
            let sql = format!("UPDATE conversations SET {assignments}, updated_at = ?2 WHERE id = ?1");
            let now = now_timestamp();
            match value {
                Some(value) => conn.execute(&sql, params![id, now, value])?,
                None => conn.execute(&sql, params![id, now])?,
            };
            select_by_id(conn, &id)
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    updated.ok_or_else(|| ParleyError::not_found("conversation", lookup))
}

pub async fn set_status(
    db: &Database,
    id: &str,
    status: ConversationStatus,
) -> Result<Conversation, ParleyError> {
    update_one(db, id, "status = ?3", Some(status.to_string())).await
}

pub async fn set_priority(
    db: &Database,
    id: &str,
    priority: ConversationPriority,
) -> Result<Conversation, ParleyError> {
    update_one(db, id, "priority = ?3", Some(priority.to_string())).await
}

/// Archive and deactivate.
pub async fn archive(db: &Database, id: &str) -> Result<Conversation, ParleyError> {
    update_one(db, id, "is_archived = 1, is_active = 0", None).await
}

/// Soft-delete and deactivate. Rows are never removed.
pub async fn soft_delete(db: &Database, id: &str) -> Result<Conversation, ParleyError> {
    update_one(db, id, "is_deleted = 1, is_active = 0", None).await
}

/// Active, non-deleted conversations of an organization, most recent first.
pub async fn list_active(
    db: &Database,
    organization_id: &str,
) -> Result<Vec<Conversation>, ParleyError> {
    let organization_id = organization_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM conversations
                 WHERE organization_id = ?1 AND is_active = 1 AND is_deleted = 0
                 ORDER BY COALESCE(last_message_at, created_at) DESC"
            ))?;
            let rows = stmt.query_map(params![organization_id], from_row)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Every conversation row for `key`, active or not.
pub async fn count_for_key(db: &Database, key: &ConversationKey) -> Result<i64, ParleyError> {
    let key = key.clone();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM conversations
                 WHERE organization_id = ?1 AND user_id = ?2 AND contact_id = ?3 AND medium_id = ?4",
                params![key.organization_id, key.user_id, key.contact_id, key.medium_id],
                |row| row.get(0),
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}
