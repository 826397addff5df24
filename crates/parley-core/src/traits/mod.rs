// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! Adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod directory;
pub mod publisher;
pub mod storage;

pub use adapter::PluginAdapter;
pub use directory::ContactDirectory;
pub use publisher::EventPublisher;
pub use storage::StorageAdapter;
