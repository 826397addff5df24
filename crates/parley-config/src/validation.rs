// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as non-empty paths, positive timeouts, and known platform tags.

use std::collections::HashSet;
use std::str::FromStr;

use parley_core::Platform;

use crate::diagnostic::ConfigError;
use crate::model::ParleyConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &ParleyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.agent.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "agent.log_level `{}` must be one of {}",
                config.agent.log_level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.intake.max_retries < 1 {
        errors.push(ConfigError::Validation {
            message: format!(
                "intake.max_retries must be at least 1, got {}",
                config.intake.max_retries
            ),
        });
    }

    if config.intake.process_timeout_ms == 0 {
        errors.push(ConfigError::Validation {
            message: "intake.process_timeout_ms must be greater than 0".to_string(),
        });
    }

    if config.intake.retry_batch_size < 1 {
        errors.push(ConfigError::Validation {
            message: format!(
                "intake.retry_batch_size must be at least 1, got {}",
                config.intake.retry_batch_size
            ),
        });
    }

    if config.publisher.publish_timeout_ms == 0 {
        errors.push(ConfigError::Validation {
            message: "publisher.publish_timeout_ms must be greater than 0".to_string(),
        });
    }

    if config.publisher.broadcast_capacity == 0 {
        errors.push(ConfigError::Validation {
            message: "publisher.broadcast_capacity must be greater than 0".to_string(),
        });
    }

    if config.publisher.dedup_window == 0 {
        errors.push(ConfigError::Validation {
            message: "publisher.dedup_window must be greater than 0".to_string(),
        });
    }

    let mut seen = HashSet::new();
    for tag in &config.platforms.enabled {
        if Platform::from_str(tag).is_err() {
            let known: Vec<String> = Platform::ALL.iter().map(|p| p.to_string()).collect();
            let known: Vec<&str> = known.iter().map(String::as_str).collect();
            errors.push(ConfigError::unknown_platform(tag, &known));
        } else if !seen.insert(tag.as_str()) {
            errors.push(ConfigError::Validation {
                message: format!("duplicate platform `{tag}` in platforms.enabled"),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
