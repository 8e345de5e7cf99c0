// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Zelkova Contributors

//! Weak-valued watch registry.
//!
//! Maps `(kind, resolved-path)` to the live observers armed for that
//! key. Entries are weak: once the last user handle on an observer is
//! dropped, the registry forgets it on the next touch and `len()` no
//! longer counts it.

use crate::backend::WatchKind;
use crate::observer::NodeWatch;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

pub(crate) type WatchKey = (WatchKind, String);

#[derive(Default)]
pub struct WatchRegistry {
    map: Mutex<HashMap<WatchKey, Vec<Weak<dyn NodeWatch>>>>,
}

impl WatchRegistry {
    pub(crate) fn new() -> Self {
        WatchRegistry::default()
    }

    /// Register an observer under a key. Returns true when the key had
    /// no live observers before, i.e. a primitive watch must be armed.
    pub(crate) fn add(&self, key: &WatchKey, watch: &Arc<dyn NodeWatch>) -> bool {
        let mut map = self.map.lock();
        let entry = map.entry(key.clone()).or_default();
        entry.retain(|w| w.strong_count() > 0);
        let newly = entry.is_empty();
        entry.push(Arc::downgrade(watch));
        newly
    }

    /// Currently-live observers for a key; the entry stays put.
    pub(crate) fn watches(&self, key: &WatchKey) -> Vec<Arc<dyn NodeWatch>> {
        let mut map = self.map.lock();
        match map.get_mut(key) {
            Some(entry) => {
                let live: Vec<_> = entry.iter().filter_map(Weak::upgrade).collect();
                entry.retain(|w| w.strong_count() > 0);
                if entry.is_empty() {
                    map.remove(key);
                }
                live
            }
            None => Vec::new(),
        }
    }

    /// Atomically remove a key, yielding its live observers.
    pub(crate) fn pop(&self, key: &WatchKey) -> Vec<Arc<dyn NodeWatch>> {
        let removed = self.map.lock().remove(key);
        removed
            .into_iter()
            .flatten()
            .filter_map(|w| w.upgrade())
            .collect()
    }

    /// Atomically swap out the whole map, yielding every live observer.
    /// Used on full session loss.
    pub(crate) fn clear(&self) -> Vec<Arc<dyn NodeWatch>> {
        let old = std::mem::take(&mut *self.map.lock());
        old.into_values()
            .flatten()
            .filter_map(|w| w.upgrade())
            .collect()
    }

    /// Count of live observers across all keys.
    pub fn len(&self) -> usize {
        let mut map = self.map.lock();
        map.retain(|_, entry| {
            entry.retain(|w| w.strong_count() > 0);
            !entry.is_empty()
        });
        map.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
