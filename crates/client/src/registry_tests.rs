// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Zelkova Contributors

use super::*;
use crate::observer::WatchPayload;
use std::any::Any;

struct DummyWatch {
    path: String,
}

impl NodeWatch for DummyWatch {
    fn kind(&self) -> WatchKind {
        WatchKind::Data
    }

    fn original_path(&self) -> String {
        self.path.clone()
    }

    fn resolved_path(&self) -> String {
        self.path.clone()
    }

    fn rehome(&self, _resolved: String) {}

    fn differs(&self, _payload: &WatchPayload) -> bool {
        false
    }

    fn apply(&self, _payload: WatchPayload) {}

    fn mark_deleted(&self) {}

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

fn dummy(path: &str) -> Arc<dyn NodeWatch> {
    Arc::new(DummyWatch {
        path: path.to_string(),
    })
}

fn key(path: &str) -> WatchKey {
    (WatchKind::Data, path.to_string())
}

#[test]
fn add_reports_new_keys() {
    let registry = WatchRegistry::new();
    let a = dummy("/a");
    let b = dummy("/a");
    assert!(registry.add(&key("/a"), &a));
    assert!(!registry.add(&key("/a"), &b));
    assert!(registry.add(&key("/b"), &a));
}

#[test]
fn len_counts_only_live_watches() {
    let registry = WatchRegistry::new();
    let a = dummy("/a");
    let b = dummy("/b");
    registry.add(&key("/a"), &a);
    registry.add(&key("/b"), &b);
    assert_eq!(registry.len(), 2);

    drop(b);
    assert_eq!(registry.len(), 1);
    drop(a);
    assert_eq!(registry.len(), 0);
    assert!(registry.is_empty());
}

#[test]
fn dropped_watch_key_becomes_new_again() {
    let registry = WatchRegistry::new();
    let a = dummy("/a");
    registry.add(&key("/a"), &a);
    drop(a);
    let b = dummy("/a");
    assert!(registry.add(&key("/a"), &b));
}

#[test]
fn pop_removes_and_yields() {
    let registry = WatchRegistry::new();
    let a = dummy("/a");
    let b = dummy("/a");
    registry.add(&key("/a"), &a);
    registry.add(&key("/a"), &b);

    let popped = registry.pop(&key("/a"));
    assert_eq!(popped.len(), 2);
    assert_eq!(registry.len(), 0);
    assert!(registry.pop(&key("/a")).is_empty());
}

#[test]
fn watches_leaves_the_entry_in_place() {
    let registry = WatchRegistry::new();
    let a = dummy("/a");
    registry.add(&key("/a"), &a);
    assert_eq!(registry.watches(&key("/a")).len(), 1);
    assert_eq!(registry.watches(&key("/a")).len(), 1);
    assert!(registry.watches(&key("/b")).is_empty());
}

#[test]
fn clear_swaps_out_everything() {
    let registry = WatchRegistry::new();
    let a = dummy("/a");
    let b = dummy("/b");
    registry.add(&key("/a"), &a);
    registry.add(&key("/b"), &b);

    let all = registry.clear();
    assert_eq!(all.len(), 2);
    assert_eq!(registry.len(), 0);
}
