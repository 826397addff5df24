// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded seen-set over event ids.

use std::collections::{HashSet, VecDeque};

/// Remembers the last `window` event ids and reports repeats.
///
/// Eviction is FIFO: once full, the oldest id is forgotten first. A duplicate
/// arriving after its original has been evicted is not detected.
#[derive(Debug)]
pub struct Deduplicator {
    window: usize,
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl Deduplicator {
    /// A deduplicator holding at most `window` ids (minimum 1).
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            order: VecDeque::with_capacity(window),
            seen: HashSet::with_capacity(window),
        }
    }

    /// Records `event_id`. Returns `true` the first time an id is seen and
    /// `false` for a repeat within the window.
    pub fn first_seen(&mut self, event_id: &str) -> bool {
        if self.seen.contains(event_id) {
            return false;
        }
        if self.order.len() == self.window {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back(event_id.to_string());
        self.seen.insert(event_id.to_string());
        true
    }

    pub fn contains(&self, event_id: &str) -> bool {
        self.seen.contains(event_id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
