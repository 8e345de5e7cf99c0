// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Zelkova Contributors

//! Live observers over resolved paths.
//!
//! [`Children`] presents a node's current child list; [`Properties`]
//! presents its decoded property mapping, dereferencing property links
//! transitively. Both hold a cached snapshot, deliver callbacks on
//! change, and survive session loss (the session layer re-arms them).
//!
//! Callbacks come in two arities: value callbacks receive the new
//! snapshot on every live update; deletion callbacks take no argument
//! and fire only when the watched node is gone for good. Either kind may
//! return [`CancelWatch`] to unsubscribe itself.

use crate::backend::WatchKind;
use crate::session::SessionCore;
use parking_lot::Mutex;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};
use zelkova_core::{props, PropertyMap, TreeError};

/// Sentinel returned by a callback to unsubscribe itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelWatch;

type ChildrenCallback = Box<dyn FnMut(&[String]) -> Result<(), CancelWatch> + Send>;
type PropsCallback = Box<dyn FnMut(&PropertyMap) -> Result<(), CancelWatch> + Send>;
type DeleteCallback = Box<dyn FnMut() -> Result<(), CancelWatch> + Send>;

/// A primitive-watch firing, as read back by the session layer.
#[derive(Debug, Clone)]
pub(crate) enum WatchPayload {
    Children(Vec<String>),
    Data(Vec<u8>),
}

/// Registry-facing face of an observer.
pub(crate) trait NodeWatch: Send + Sync {
    fn kind(&self) -> WatchKind;
    fn original_path(&self) -> String;
    fn resolved_path(&self) -> String;
    /// Point the observer at a new resolution of its original path.
    fn rehome(&self, resolved: String);
    fn differs(&self, payload: &WatchPayload) -> bool;
    fn apply(&self, payload: WatchPayload);
    /// Terminal: the original path no longer resolves.
    fn mark_deleted(&self);
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Run callbacks against a snapshot, keeping the survivors.
///
/// Callbacks registered from inside a callback land in `slot` while the
/// batch runs and are merged afterwards.
fn run_callbacks<T: ?Sized>(
    slot: &Mutex<Vec<Box<dyn FnMut(&T) -> Result<(), CancelWatch> + Send>>>,
    snapshot: &T,
    what: &str,
) {
    let batch = std::mem::take(&mut *slot.lock());
    let mut kept = Vec::with_capacity(batch.len());
    for mut cb in batch {
        match cb(snapshot) {
            Ok(()) => kept.push(cb),
            Err(CancelWatch) => debug!(observer = %what, "watch cancelled by callback"),
        }
    }
    let mut guard = slot.lock();
    let added = std::mem::take(&mut *guard);
    *guard = kept;
    guard.extend(added);
}

fn run_delete_callbacks(slot: &Mutex<Vec<DeleteCallback>>, what: &str) {
    let batch = std::mem::take(&mut *slot.lock());
    let mut kept = Vec::with_capacity(batch.len());
    for mut cb in batch {
        match cb() {
            Ok(()) => kept.push(cb),
            Err(CancelWatch) => debug!(observer = %what, "watch cancelled by callback"),
        }
    }
    let mut guard = slot.lock();
    let added = std::mem::take(&mut *guard);
    *guard = kept;
    guard.extend(added);
}

// ---------------------------------------------------------------------------
// Children

pub(crate) struct ChildrenInner {
    /// Keeps the session (and its dispatcher) alive for the observer's
    /// lifetime.
    _core: Arc<SessionCore>,
    original: String,
    resolved: Mutex<String>,
    data: Mutex<Vec<String>>,
    deleted: AtomicBool,
    callbacks: Mutex<Vec<ChildrenCallback>>,
    delete_callbacks: Mutex<Vec<DeleteCallback>>,
    dispatch: Mutex<()>,
}

impl ChildrenInner {
    fn fire_values(&self) {
        let _serialize = self.dispatch.lock();
        let snapshot = self.data.lock().clone();
        run_callbacks(&self.callbacks, snapshot.as_slice(), &self.original);
    }

    fn fire_deleted(&self) {
        let _serialize = self.dispatch.lock();
        run_delete_callbacks(&self.delete_callbacks, &self.original);
    }
}

impl NodeWatch for ChildrenInner {
    fn kind(&self) -> WatchKind {
        WatchKind::Children
    }

    fn original_path(&self) -> String {
        self.original.clone()
    }

    fn resolved_path(&self) -> String {
        self.resolved.lock().clone()
    }

    fn rehome(&self, resolved: String) {
        *self.resolved.lock() = resolved;
    }

    fn differs(&self, payload: &WatchPayload) -> bool {
        match payload {
            WatchPayload::Children(names) => *self.data.lock() != *names,
            WatchPayload::Data(_) => false,
        }
    }

    fn apply(&self, payload: WatchPayload) {
        if let WatchPayload::Children(names) = payload {
            *self.data.lock() = names;
            self.fire_values();
        }
    }

    fn mark_deleted(&self) {
        self.deleted.store(true, Ordering::SeqCst);
        self.data.lock().clear();
        self.fire_deleted();
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Live child-name list at a resolved path.
#[derive(Clone)]
pub struct Children {
    pub(crate) inner: Arc<ChildrenInner>,
}

impl Children {
    pub(crate) fn build(core: Arc<SessionCore>, original: &str) -> Result<Children, TreeError> {
        let rpath = core.resolve(original)?;
        let inner = Arc::new(ChildrenInner {
            _core: core.clone(),
            original: original.to_string(),
            resolved: Mutex::new(rpath.clone()),
            data: Mutex::new(Vec::new()),
            deleted: AtomicBool::new(false),
            callbacks: Mutex::new(Vec::new()),
            delete_callbacks: Mutex::new(Vec::new()),
            dispatch: Mutex::new(()),
        });
        let watch: Arc<dyn NodeWatch> = inner.clone();
        let newly = core
            .registry
            .add(&(WatchKind::Children, rpath.clone()), &watch);
        let names = core.backend()?.get_children(&rpath, newly)?;
        *inner.data.lock() = names;
        Ok(Children { inner })
    }

    /// The path this observer was created with.
    pub fn path(&self) -> String {
        self.inner.original_path()
    }

    /// The resolution the observer is currently armed at.
    pub fn resolved_path(&self) -> String {
        self.inner.resolved_path()
    }

    pub fn current(&self) -> Vec<String> {
        self.inner.data.lock().clone()
    }

    pub fn is_deleted(&self) -> bool {
        self.inner.deleted.load(Ordering::SeqCst)
    }

    /// Register a value callback. It is invoked immediately and
    /// synchronously with the current snapshot; returning `CancelWatch`
    /// from that first call skips registration.
    pub fn subscribe(
        &self,
        mut f: impl FnMut(&[String]) -> Result<(), CancelWatch> + Send + 'static,
    ) {
        let _serialize = self.inner.dispatch.lock();
        let snapshot = self.inner.data.lock().clone();
        if f(&snapshot).is_err() {
            debug!(observer = %self.inner.original, "watch cancelled by callback");
            return;
        }
        self.inner.callbacks.lock().push(Box::new(f));
    }

    /// Register a deletion callback, fired with no argument when the
    /// watched node is removed and its path no longer resolves.
    pub fn on_delete(&self, f: impl FnMut() -> Result<(), CancelWatch> + Send + 'static) {
        self.inner.delete_callbacks.lock().push(Box::new(f));
    }
}

// ---------------------------------------------------------------------------
// Properties

pub(crate) struct PropertiesInner {
    me: Weak<PropertiesInner>,
    core: Arc<SessionCore>,
    original: String,
    resolved: Mutex<String>,
    raw: Mutex<Vec<u8>>,
    data: Mutex<PropertyMap>,
    deleted: AtomicBool,
    firing: AtomicBool,
    callbacks: Mutex<Vec<PropsCallback>>,
    delete_callbacks: Mutex<Vec<DeleteCallback>>,
    /// Resolved link target -> child observer watching it.
    links: Mutex<HashMap<String, Properties>>,
    dispatch: Mutex<()>,
}

impl PropertiesInner {
    fn fire_values(&self) {
        // Guards against mutually-linked observers notifying in circles.
        if self.firing.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let _serialize = self.dispatch.lock();
            let snapshot = self.data.lock().clone();
            run_callbacks(&self.callbacks, &snapshot, &self.original);
        }
        self.firing.store(false, Ordering::SeqCst);
    }

    fn fire_deleted(&self) {
        let _serialize = self.dispatch.lock();
        run_delete_callbacks(&self.delete_callbacks, &self.original);
    }

    /// Store raw payload and decoded mapping without firing callbacks.
    fn prime(&self, raw: Vec<u8>) {
        let map = props::decode(&self.resolved_path(), &raw);
        *self.raw.lock() = raw;
        *self.data.lock() = map.clone();
        self.relink(&map);
    }

    fn apply_raw(&self, raw: Vec<u8>) {
        self.prime(raw);
        self.fire_values();
    }

    /// Re-apply current raw data; link targets may have moved.
    fn reapply(&self) {
        let raw = self.raw.lock().clone();
        self.apply_raw(raw);
    }

    /// Make a property-link target absolute relative to this node.
    fn absolute_target(&self, target: &str) -> String {
        if target.starts_with('/') {
            target.to_string()
        } else {
            let resolved = self.resolved_path();
            if resolved == "/" {
                format!("/{target}")
            } else {
                format!("{resolved}/{target}")
            }
        }
    }

    /// Find or build an observer for a resolved link target, reusing a
    /// live one from the registry so linked cycles tie back instead of
    /// recursing.
    fn obtain_link_observer(&self, rpath: &str) -> Result<Properties, TreeError> {
        if let Some(existing) = self.links.lock().get(rpath) {
            return Ok(existing.clone());
        }
        for watch in self
            .core
            .registry
            .watches(&(WatchKind::Data, rpath.to_string()))
        {
            if let Ok(inner) = watch.as_any().downcast::<PropertiesInner>() {
                return Ok(Properties { inner });
            }
        }
        Properties::build(self.core.clone(), rpath)
    }

    /// Check that every property link in `map` can be dereferenced to a
    /// live observer. Called before any write reaches the store.
    fn validate_links(&self, map: &PropertyMap) -> Result<(), TreeError> {
        for (key, value) in map.iter().filter(|(k, _)| props::is_prop_link(k)) {
            let raw = value
                .as_str()
                .ok_or_else(|| TreeError::bad_link(key, &props::render_value(value), "link value is not a string"))?;
            let (target, _field) = props::parse_prop_link(raw)
                .ok_or_else(|| TreeError::bad_link(key, raw, "expected 'path [field]'"))?;
            let abs = self.absolute_target(target);
            let rpath = self
                .core
                .resolve(&abs)
                .map_err(|e| TreeError::bad_link(key, raw, e))?;
            self.obtain_link_observer(&rpath)
                .map_err(|e| TreeError::bad_link(key, raw, e))?;
        }
        Ok(())
    }

    /// Rebuild the dependency map for the links in `map`: acquire child
    /// observers for new targets, release those no longer referenced.
    fn relink(&self, map: &PropertyMap) {
        let mut old = std::mem::take(&mut *self.links.lock());
        let mut new_links: HashMap<String, Properties> = HashMap::new();
        let mut fresh: Vec<Properties> = Vec::new();
        for (key, value) in map.iter().filter(|(k, _)| props::is_prop_link(k)) {
            let Some(raw) = value.as_str() else {
                warn!(key = %key, path = %self.original, "link value is not a string");
                continue;
            };
            let Some((target, _field)) = props::parse_prop_link(raw) else {
                warn!(key = %key, path = %self.original, "malformed link value");
                continue;
            };
            let abs = self.absolute_target(target);
            let rpath = match self.core.resolve(&abs) {
                Ok(p) => p,
                Err(e) => {
                    warn!(key = %key, path = %self.original, "dangling link: {e}");
                    continue;
                }
            };
            if new_links.contains_key(&rpath) {
                continue;
            }
            if let Some(existing) = old.remove(&rpath) {
                new_links.insert(rpath, existing);
                continue;
            }
            match self.obtain_link_observer(&rpath) {
                Ok(child) => {
                    fresh.push(child.clone());
                    new_links.insert(rpath, child);
                }
                Err(e) => warn!(key = %key, path = %self.original, "can't watch link: {e}"),
            }
        }
        // Whatever is left in `old` is released; its notification
        // callbacks cancel themselves on next fire. New children are
        // wired only after the map is in place so their callbacks see
        // themselves referenced.
        *self.links.lock() = new_links;
        for child in fresh {
            self.watch_link(&child);
        }
    }

    /// Subscribe this observer to a child link target: a live change
    /// re-fires our callbacks (the effective view changed even though
    /// our raw data did not); a deletion re-applies our data to rebuild
    /// the link graph.
    fn watch_link(&self, child: &Properties) {
        let me = self.me.clone();
        let target = child.inner.resolved_path();
        child.subscribe_silent(move |_| match me.upgrade() {
            Some(parent) if parent.links.lock().contains_key(&target) => {
                parent.fire_values();
                Ok(())
            }
            _ => Err(CancelWatch),
        });
        let me = self.me.clone();
        let target = child.inner.resolved_path();
        child
            .inner
            .delete_callbacks
            .lock()
            .push(Box::new(move || match me.upgrade() {
                Some(parent) if parent.links.lock().contains_key(&target) => {
                    parent.reapply();
                    Ok(())
                }
                _ => Err(CancelWatch),
            }));
    }

    /// Keyed lookup threading the visited set through link hops.
    fn get_with_visited(&self, key: &str, visited: &mut Vec<String>) -> Result<Value, TreeError> {
        if let Some(value) = self.data.lock().get(key) {
            return Ok(value.clone());
        }
        let link_key = format!("{key}{}", props::PROP_LINK_SUFFIX);
        let raw = match self.data.lock().get(&link_key) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                return Err(TreeError::bad_link(
                    &link_key,
                    &props::render_value(other),
                    "link value is not a string",
                ))
            }
            None => {
                return Err(TreeError::NoProperty {
                    path: self.resolved_path(),
                    key: key.to_string(),
                })
            }
        };
        self.deref_link(&link_key, &raw, key, visited)
            .map_err(|e| match e {
                already @ TreeError::BadPropertyLink { .. } => already,
                other => TreeError::bad_link(&link_key, &raw, other),
            })
    }

    fn deref_link(
        &self,
        link_key: &str,
        raw: &str,
        default_field: &str,
        visited: &mut Vec<String>,
    ) -> Result<Value, TreeError> {
        let (target, field) = props::parse_prop_link(raw)
            .ok_or_else(|| TreeError::bad_link(link_key, raw, "expected 'path [field]'"))?;
        let abs = self.absolute_target(target);
        let rpath = self.core.resolve(&abs)?;
        if visited.contains(&rpath) {
            visited.push(rpath);
            return Err(TreeError::LinkLoop(visited.clone()));
        }
        visited.push(rpath.clone());
        let child = self.obtain_link_observer(&rpath)?;
        child
            .inner
            .get_with_visited(field.unwrap_or(default_field), visited)
    }

    /// Validate links against `new_map`, write the encoded payload, and
    /// apply it locally. Callbacks fire when the data watch comes back.
    fn write(&self, new_map: PropertyMap) -> Result<(), TreeError> {
        self.validate_links(&new_map)?;
        let raw = props::encode(&new_map);
        let rpath = self.resolved_path();
        self.core.set(&rpath, &raw)?;
        *self.raw.lock() = raw;
        *self.data.lock() = new_map.clone();
        self.relink(&new_map);
        Ok(())
    }
}

impl NodeWatch for PropertiesInner {
    fn kind(&self) -> WatchKind {
        WatchKind::Data
    }

    fn original_path(&self) -> String {
        self.original.clone()
    }

    fn resolved_path(&self) -> String {
        self.resolved.lock().clone()
    }

    fn rehome(&self, resolved: String) {
        *self.resolved.lock() = resolved;
    }

    fn differs(&self, payload: &WatchPayload) -> bool {
        match payload {
            WatchPayload::Data(raw) => *self.raw.lock() != *raw,
            WatchPayload::Children(_) => false,
        }
    }

    fn apply(&self, payload: WatchPayload) {
        if let WatchPayload::Data(raw) = payload {
            self.apply_raw(raw);
        }
    }

    fn mark_deleted(&self) {
        self.deleted.store(true, Ordering::SeqCst);
        self.data.lock().clear();
        self.raw.lock().clear();
        self.links.lock().clear();
        self.fire_deleted();
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Live decoded property mapping at a resolved path.
#[derive(Clone)]
pub struct Properties {
    pub(crate) inner: Arc<PropertiesInner>,
}

impl Properties {
    pub(crate) fn build(core: Arc<SessionCore>, original: &str) -> Result<Properties, TreeError> {
        let rpath = core.resolve(original)?;
        let inner = Arc::new_cyclic(|me| PropertiesInner {
            me: me.clone(),
            core: core.clone(),
            original: original.to_string(),
            resolved: Mutex::new(rpath.clone()),
            raw: Mutex::new(Vec::new()),
            data: Mutex::new(PropertyMap::new()),
            deleted: AtomicBool::new(false),
            firing: AtomicBool::new(false),
            callbacks: Mutex::new(Vec::new()),
            delete_callbacks: Mutex::new(Vec::new()),
            links: Mutex::new(HashMap::new()),
            dispatch: Mutex::new(()),
        });
        let watch: Arc<dyn NodeWatch> = inner.clone();
        let newly = core.registry.add(&(WatchKind::Data, rpath.clone()), &watch);
        let (raw, _meta) = core.backend()?.get(&rpath, newly)?;
        inner.prime(raw);
        Ok(Properties { inner })
    }

    /// The path this observer was created with.
    pub fn path(&self) -> String {
        self.inner.original_path()
    }

    /// The resolution the observer is currently armed at.
    pub fn resolved_path(&self) -> String {
        self.inner.resolved_path()
    }

    pub fn is_deleted(&self) -> bool {
        self.inner.deleted.load(Ordering::SeqCst)
    }

    /// Snapshot of the decoded mapping, links included under their
    /// suffixed keys.
    pub fn snapshot(&self) -> PropertyMap {
        self.inner.data.lock().clone()
    }

    /// Literal membership test; linked lookups are not followed.
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.data.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.data.lock().is_empty()
    }

    /// Keyed lookup. A literal key wins; otherwise `key =>` is
    /// dereferenced transitively, with loops detected along the way.
    pub fn get(&self, key: &str) -> Result<Value, TreeError> {
        let mut visited = vec![self.inner.resolved_path()];
        self.inner.get_with_visited(key, &mut visited)
    }

    /// Keys of the mapping: property-link keys have their ` =>` suffix
    /// stripped; node-link keys appear verbatim.
    pub fn keys(&self) -> Vec<String> {
        self.inner
            .data
            .lock()
            .keys()
            .map(|k| match k.strip_suffix(props::PROP_LINK_SUFFIX) {
                Some(base) => base.to_string(),
                None => k.clone(),
            })
            .collect()
    }

    /// Replace the whole mapping.
    pub fn set(&self, map: PropertyMap) -> Result<(), TreeError> {
        self.inner.write(map)
    }

    /// Merge `updates` over a copy of the current snapshot and write the
    /// result.
    pub fn update(&self, updates: PropertyMap) -> Result<(), TreeError> {
        let mut merged = self.snapshot();
        for (key, value) in updates {
            merged.insert(key, value);
        }
        self.inner.write(merged)
    }

    /// Write a single key.
    pub fn insert(&self, key: &str, value: Value) -> Result<(), TreeError> {
        let mut updates = PropertyMap::new();
        updates.insert(key.to_string(), value);
        self.update(updates)
    }

    /// Register a value callback. It is invoked immediately and
    /// synchronously with the current snapshot; returning `CancelWatch`
    /// from that first call skips registration.
    pub fn subscribe(
        &self,
        mut f: impl FnMut(&PropertyMap) -> Result<(), CancelWatch> + Send + 'static,
    ) {
        let _serialize = self.inner.dispatch.lock();
        let snapshot = self.inner.data.lock().clone();
        if f(&snapshot).is_err() {
            debug!(observer = %self.inner.original, "watch cancelled by callback");
            return;
        }
        self.inner.callbacks.lock().push(Box::new(f));
    }

    /// Register a value callback without the immediate first call.
    fn subscribe_silent(
        &self,
        f: impl FnMut(&PropertyMap) -> Result<(), CancelWatch> + Send + 'static,
    ) {
        self.inner.callbacks.lock().push(Box::new(f));
    }

    /// Register a deletion callback, fired with no argument when the
    /// watched node is removed and its path no longer resolves.
    pub fn on_delete(&self, f: impl FnMut() -> Result<(), CancelWatch> + Send + 'static) {
        self.inner.delete_callbacks.lock().push(Box::new(f));
    }
}

#[cfg(test)]
#[path = "observer_tests.rs"]
mod tests;
