// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Parley messaging pipeline.

use thiserror::Error;

/// The primary error type used across all Parley adapter traits and pipeline stages.
#[derive(Debug, Error)]
pub enum ParleyError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Structurally invalid input: a malformed webhook envelope, an unknown
    /// status code, an illegal field value.
    #[error("validation error: {0}")]
    Validation(String),

    /// No normalizer is registered for the given platform tag.
    #[error("unknown platform `{0}`")]
    UnknownPlatform(String),

    /// The referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Event publication failed at the transport.
    #[error("publish to `{topic}` failed: {message}")]
    Publish {
        topic: String,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ParleyError {
    /// Shorthand for a [`ParleyError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Shorthand for a [`ParleyError::Storage`] carrying only a message.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            source: message.into().into(),
        }
    }

    /// Whether a retry of the failed operation may succeed.
    ///
    /// Transient infrastructure failures are retryable. Validation errors,
    /// unknown platforms and missing entities are permanent.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. } | Self::Publish { .. } | Self::Timeout { .. }
        )
    }

    /// Whether this is a [`ParleyError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(ParleyError::storage("disk full").is_retryable());
        assert!(
            ParleyError::Timeout {
                duration: std::time::Duration::from_secs(5)
            }
            .is_retryable()
        );
        assert!(
            ParleyError::Publish {
                topic: "message-created".into(),
                message: "closed".into(),
                source: None,
            }
            .is_retryable()
        );
    }

    #[test]
    fn permanent_errors_are_not_retryable() {
        assert!(!ParleyError::Validation("missing entry".into()).is_retryable());
        assert!(!ParleyError::UnknownPlatform("telegram".into()).is_retryable());
        assert!(!ParleyError::not_found("message", "m-1").is_retryable());
        assert!(!ParleyError::Config("bad".into()).is_retryable());
    }

    #[test]
    fn not_found_renders_entity_and_id() {
        let err = ParleyError::not_found("conversation", "c-42");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "conversation not found: c-42");
    }
}
