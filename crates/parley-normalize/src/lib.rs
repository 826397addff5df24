// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Platform webhook normalizers for the Parley messaging pipeline.
//!
//! Each supported platform turns its raw webhook JSON into zero or more
//! [`CanonicalMessage`]s. One malformed inner unit never discards its
//! siblings: it is logged and skipped.

mod email;
mod messenger;
pub mod registry;
mod unit;
mod whatsapp;

use parley_core::types::{CanonicalMessage, Platform};
use parley_core::ParleyError;
use serde_json::Value;

pub use registry::NormalizerRegistry;
pub use unit::{classify_attachment, classify_mime};

/// A per-platform normalizer. Stateless; the variants are the closed set of
/// platforms this crate understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformNormalizer {
    WhatsApp,
    Instagram,
    Facebook,
    Email,
}

impl PlatformNormalizer {
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::WhatsApp => Self::WhatsApp,
            Platform::Instagram => Self::Instagram,
            Platform::Facebook => Self::Facebook,
            Platform::Email => Self::Email,
        }
    }

    /// The platform identity this normalizer reports for its messages.
    pub fn medium_id(&self) -> Platform {
        match self {
            Self::WhatsApp => Platform::WhatsApp,
            Self::Instagram => Platform::Instagram,
            Self::Facebook => Platform::Facebook,
            Self::Email => Platform::Email,
        }
    }

    /// Structural check of the outer envelope. Inner units are checked
    /// individually during [`extract`](Self::extract).
    pub fn validate(&self, payload: &Value) -> Result<(), ParleyError> {
        match self {
            Self::WhatsApp => whatsapp::validate(payload),
            Self::Instagram => messenger::validate("instagram", payload),
            Self::Facebook => messenger::validate("facebook", payload),
            Self::Email => email::validate(payload),
        }
    }

    /// Every inbound message in `payload`. Invalid envelopes yield nothing.
    pub fn extract(&self, payload: &Value) -> Vec<CanonicalMessage> {
        if self.validate(payload).is_err() {
            return Vec::new();
        }
        match self {
            Self::WhatsApp => whatsapp::extract(payload),
            Self::Instagram => messenger::extract("instagram", payload),
            Self::Facebook => messenger::extract("facebook", payload),
            Self::Email => email::extract(payload),
        }
    }

    /// [`validate`](Self::validate) then [`extract`](Self::extract), so
    /// callers can tell a rejected envelope from one with no messages.
    pub fn normalize(&self, payload: &Value) -> Result<Vec<CanonicalMessage>, ParleyError> {
        self.validate(payload)?;
        Ok(self.extract(payload))
    }
}
