//! Internal distribution state.
//! Supports the fair selection policy's per-tier round-robin cursors.

use std::collections::HashMap;

use crate::types::TierClass;

/// Round-robin cursor per tier class. The cursor indexes into whatever
/// eligible list the policy builds for that tier on a given tick; it is
/// wrapped into range before use, so stale values are harmless.
#[derive(Debug, Default)]
pub struct DistributionState {
    cursors: HashMap<TierClass, usize>,
}

impl DistributionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cursor(&self, class: TierClass) -> usize {
        self.cursors.get(&class).copied().unwrap_or(0)
    }

    pub fn set_cursor(&mut self, class: TierClass, value: usize) {
        self.cursors.insert(class, value);
    }
}
