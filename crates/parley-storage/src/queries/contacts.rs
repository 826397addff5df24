// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Medium registration and contact get-or-create.

use parley_core::types::{now_timestamp, ContactRef, Platform};
use parley_core::ParleyError;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::models::enum_column;

/// A registered business channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Medium {
    pub id: String,
    pub organization_id: String,
    pub user_id: String,
    pub platform: Platform,
}

/// Register (or re-point) a medium to its owning organization and user.
pub async fn register_medium(
    db: &Database,
    medium_id: &str,
    organization_id: &str,
    user_id: &str,
    platform: Platform,
) -> Result<(), ParleyError> {
    let medium_id = medium_id.to_string();
    let organization_id = organization_id.to_string();
    let user_id = user_id.to_string();
    let platform = platform.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO mediums (id, organization_id, user_id, platform, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                     organization_id = excluded.organization_id,
                     user_id = excluded.user_id,
                     platform = excluded.platform,
                     updated_at = excluded.updated_at",
                params![medium_id, organization_id, user_id, platform, now_timestamp()],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a medium by ID.
pub async fn get_medium(db: &Database, medium_id: &str) -> Result<Option<Medium>, ParleyError> {
    let medium_id = medium_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, organization_id, user_id, platform FROM mediums WHERE id = ?1",
                params![medium_id],
                |row| {
                    Ok(Medium {
                        id: row.get(0)?,
                        organization_id: row.get(1)?,
                        user_id: row.get(2)?,
                        platform: enum_column(row, 3)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Resolve a platform sender to a contact row under a registered medium.
///
/// The contact is created on first sight. A later non-empty `display_name`
/// replaces the stored one; an absent name keeps it. Fails with `NotFound`
/// when the medium is not registered to `organization_id`.
pub async fn resolve_contact(
    db: &Database,
    organization_id: &str,
    medium_id: &str,
    identifier: &str,
    display_name: Option<&str>,
) -> Result<ContactRef, ParleyError> {
    let organization_id = organization_id.to_string();
    let medium_id = medium_id.to_string();
    let lookup = medium_id.clone();
    let identifier = identifier.to_string();
    let display_name = display_name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);

    let resolved = db
        .connection()
        .call(move |conn| {
            let user_id: Option<String> = conn
                .query_row(
                    "SELECT user_id FROM mediums WHERE id = ?1 AND organization_id = ?2",
                    params![medium_id, organization_id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(user_id) = user_id else {
                return Ok(None);
            };

            let now = now_timestamp();
            conn.execute(
                "INSERT INTO contacts (id, organization_id, medium_id, identifier, display_name,
                    created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(organization_id, medium_id, identifier) DO UPDATE SET
                     display_name = COALESCE(excluded.display_name, contacts.display_name),
                     updated_at = excluded.updated_at",
                params![
                    uuid::Uuid::new_v4().to_string(),
                    organization_id,
                    medium_id,
                    identifier,
                    display_name,
                    now,
                ],
            )?;
            let (contact_id, stored_name): (String, Option<String>) = conn.query_row(
                "SELECT id, display_name FROM contacts
                 WHERE organization_id = ?1 AND medium_id = ?2 AND identifier = ?3",
                params![organization_id, medium_id, identifier],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok(Some(ContactRef {
                user_id,
                contact_id,
                display_name: stored_name,
            }))
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    resolved.ok_or_else(|| ParleyError::not_found("medium", lookup))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_db() -> Database {
        let db = Database::open_in_memory().await.unwrap();
        register_medium(&db, "wa-1", "org-1", "user-1", Platform::WhatsApp)
            .await
            .unwrap();
        db
    }

    #[tokio::test]
    async fn resolve_creates_then_reuses_contact() {
        let db = setup_db().await;
        let first = resolve_contact(&db, "org-1", "wa-1", "6281234567890", Some("Budi"))
            .await
            .unwrap();
        assert_eq!(first.user_id, "user-1");
        assert_eq!(first.display_name.as_deref(), Some("Budi"));

        let second = resolve_contact(&db, "org-1", "wa-1", "6281234567890", None)
            .await
            .unwrap();
        assert_eq!(second.contact_id, first.contact_id);
        assert_eq!(second.display_name.as_deref(), Some("Budi"));
    }

    #[tokio::test]
    async fn newer_display_name_wins() {
        let db = setup_db().await;
        resolve_contact(&db, "org-1", "wa-1", "628", Some("Old"))
            .await
            .unwrap();
        let updated = resolve_contact(&db, "org-1", "wa-1", "628", Some("New"))
            .await
            .unwrap();
        assert_eq!(updated.display_name.as_deref(), Some("New"));
    }

    #[tokio::test]
    async fn different_identifiers_get_different_contacts() {
        let db = setup_db().await;
        let a = resolve_contact(&db, "org-1", "wa-1", "111", None).await.unwrap();
        let b = resolve_contact(&db, "org-1", "wa-1", "222", None).await.unwrap();
        assert_ne!(a.contact_id, b.contact_id);
    }

    #[tokio::test]
    async fn unregistered_medium_is_not_found() {
        let db = setup_db().await;
        let err = resolve_contact(&db, "org-1", "ig-404", "someone", None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        // Registered, but to another organization.
        let err = resolve_contact(&db, "org-2", "wa-1", "someone", None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn re_registering_medium_moves_owner() {
        let db = setup_db().await;
        register_medium(&db, "wa-1", "org-1", "user-2", Platform::WhatsApp)
            .await
            .unwrap();
        let medium = get_medium(&db, "wa-1").await.unwrap().unwrap();
        assert_eq!(medium.user_id, "user-2");
        assert_eq!(medium.platform, Platform::WhatsApp);
    }
}
