// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook event persistence and status transitions.

use parley_core::types::{now_timestamp, WebhookStatus};
use parley_core::ParleyError;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::models::{enum_column, WebhookEvent};

const COLUMNS: &str = "id, organization_id, medium_id, platform, payload, status, error_message,
     retry_count, processed_at, created_at, updated_at";

fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<WebhookEvent> {
    Ok(WebhookEvent {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        medium_id: row.get(2)?,
        platform: row.get(3)?,
        payload: row.get(4)?,
        status: enum_column(row, 5)?,
        error_message: row.get(6)?,
        retry_count: row.get(7)?,
        processed_at: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn select_by_id(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<WebhookEvent>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM webhook_events WHERE id = ?1"),
        params![id],
        from_row,
    )
    .optional()
}

/// Insert a freshly received event.
pub async fn insert_webhook_event(db: &Database, event: &WebhookEvent) -> Result<(), ParleyError> {
    let event = event.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO webhook_events (id, organization_id, medium_id, platform, payload,
                    status, error_message, retry_count, processed_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    event.id,
                    event.organization_id,
                    event.medium_id,
                    event.platform,
                    event.payload,
                    event.status.to_string(),
                    event.error_message,
                    event.retry_count,
                    event.processed_at,
                    event.created_at,
                    event.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get an event by ID.
pub async fn get_webhook_event(
    db: &Database,
    id: &str,
) -> Result<Option<WebhookEvent>, ParleyError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| select_by_id(conn, &id))
        .await
        .map_err(crate::database::map_tr_err)
}

/// Moves a `pending` event to `processed`. Any other status is returned as is.
pub async fn mark_processed(db: &Database, id: &str) -> Result<WebhookEvent, ParleyError> {
    let id = id.to_string();
    let lookup = id.clone();
    let event = db
        .connection()
        .call(move |conn| {
            let now = now_timestamp();
            conn.execute(
                "UPDATE webhook_events
                 SET status = 'processed', processed_at = ?1, error_message = NULL, updated_at = ?1
                 WHERE id = ?2 AND status = 'pending'",
                params![now, id],
            )?;
            select_by_id(conn, &id)
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    event.ok_or_else(|| ParleyError::not_found("webhook event", lookup))
}

/// Moves a `pending` event to `failed` with `error`, leaving `retry_count`.
pub async fn mark_failed(db: &Database, id: &str, error: &str) -> Result<WebhookEvent, ParleyError> {
    let id = id.to_string();
    let lookup = id.clone();
    let error = error.to_string();
    let event = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE webhook_events
                 SET status = 'failed', error_message = ?1, updated_at = ?2
                 WHERE id = ?3 AND status = 'pending'",
                params![error, now_timestamp(), id],
            )?;
            select_by_id(conn, &id)
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    event.ok_or_else(|| ParleyError::not_found("webhook event", lookup))
}

/// Records one failed attempt on a `pending` event.
///
/// The count is incremented and `error` stored in a single statement. The
/// event becomes `failed` once the new count reaches `max_retries`.
pub async fn record_retry(
    db: &Database,
    id: &str,
    error: &str,
    max_retries: i64,
) -> Result<WebhookEvent, ParleyError> {
    let id = id.to_string();
    let lookup = id.clone();
    let error = error.to_string();
    let event = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE webhook_events
                 SET retry_count = retry_count + 1,
                     error_message = ?1,
                     status = CASE WHEN retry_count + 1 >= ?2 THEN 'failed' ELSE 'pending' END,
                     updated_at = ?3
                 WHERE id = ?4 AND status = 'pending'",
                params![error, max_retries, now_timestamp(), id],
            )?;
            select_by_id(conn, &id)
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    event.ok_or_else(|| ParleyError::not_found("webhook event", lookup))
}

/// Oldest `pending` events first.
pub async fn list_pending(db: &Database, limit: i64) -> Result<Vec<WebhookEvent>, ParleyError> {
    let status = WebhookStatus::Pending.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM webhook_events
                 WHERE status = ?1
                 ORDER BY created_at ASC, rowid ASC
                 LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![status, limit], from_row)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Event counts per status, for operator tooling.
pub async fn count_by_status(db: &Database) -> Result<Vec<(WebhookStatus, i64)>, ParleyError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT status, COUNT(*) FROM webhook_events GROUP BY status ORDER BY status",
            )?;
            let rows = stmt.query_map([], |row| Ok((enum_column::<WebhookStatus>(row, 0)?, row.get::<_, i64>(1)?)))?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}
