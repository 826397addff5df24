// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contact directory trait: maps a platform sender to the business user that
//! owns the medium and to a contact row.

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::types::{ContactRef, Platform};

#[async_trait]
pub trait ContactDirectory: Send + Sync {
    /// Binds a medium (a connected channel account) to its owning user.
    async fn register_medium(
        &self,
        medium_id: &str,
        organization_id: &str,
        user_id: &str,
        platform: Platform,
    ) -> Result<(), ParleyError>;

    /// Finds or creates the contact for `origin` on `medium_id`.
    ///
    /// Returns [`ParleyError::NotFound`] when the medium is not registered for
    /// the organization.
    async fn resolve_contact(
        &self,
        organization_id: &str,
        medium_id: &str,
        origin: &str,
        display_name: Option<&str>,
    ) -> Result<ContactRef, ParleyError>;
}
