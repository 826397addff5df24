// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lookup of normalizers by the platform tag a webhook arrives with.

use std::collections::HashMap;
use std::str::FromStr;

use parley_core::types::Platform;
use parley_core::ParleyError;

use crate::PlatformNormalizer;

/// Maps platform tags (`"whatsapp"`, `"email"`, ...) to normalizers.
#[derive(Debug, Clone, Default)]
pub struct NormalizerRegistry {
    normalizers: HashMap<String, PlatformNormalizer>,
}

impl NormalizerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every supported platform.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for platform in Platform::ALL {
            registry.register(PlatformNormalizer::for_platform(platform));
        }
        registry
    }

    /// A registry limited to the configured platform tags.
    pub fn from_enabled(tags: &[String]) -> Result<Self, ParleyError> {
        let mut registry = Self::new();
        for tag in tags {
            let platform = Platform::from_str(tag.trim())
                .map_err(|_| ParleyError::UnknownPlatform(tag.clone()))?;
            registry.register(PlatformNormalizer::for_platform(platform));
        }
        Ok(registry)
    }

    /// Registers `normalizer` under its platform tag, replacing any previous
    /// entry.
    pub fn register(&mut self, normalizer: PlatformNormalizer) {
        self.normalizers
            .insert(normalizer.medium_id().to_string(), normalizer);
    }

    /// The normalizer for `tag`. Tags are matched exactly.
    pub fn get(&self, tag: &str) -> Option<PlatformNormalizer> {
        self.normalizers.get(tag).copied()
    }

    /// Registered tags in sorted order.
    pub fn platforms(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.normalizers.keys().cloned().collect();
        tags.sort();
        tags
    }
}
