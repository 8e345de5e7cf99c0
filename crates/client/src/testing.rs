// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Zelkova Contributors

//! In-memory coordination service.
//!
//! A [`MemoryService`] is a complete stand-in for the real thing: a
//! shared tree with one-shot watches, per-session ephemerals, ACL
//! versions, and test controls to expire or suspend sessions. The
//! process-wide hub maps connection strings to services so code under
//! test (and the CLI, via `mem:` connection strings) runs unchanged
//! against it.

use crate::backend::{
    Backend, Connector, EventSender, KeeperState, NodeMeta, ServiceEvent, WatchKind,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use zelkova_core::{acl, path, Acl, TreeError};

type SessionId = u64;

struct MemNode {
    data: Vec<u8>,
    acls: Vec<Acl>,
    aversion: i32,
    /// Owning session for ephemeral nodes.
    owner: Option<SessionId>,
    children: BTreeMap<String, MemNode>,
    data_watches: Vec<SessionId>,
    child_watches: Vec<SessionId>,
}

impl MemNode {
    fn new(data: Vec<u8>, acls: Vec<Acl>, owner: Option<SessionId>) -> Self {
        MemNode {
            data,
            acls,
            aversion: 0,
            owner,
            children: BTreeMap::new(),
            data_watches: Vec::new(),
            child_watches: Vec::new(),
        }
    }
}

struct SessionRec {
    events: EventSender,
    alive: bool,
    suspended: bool,
}

struct ServiceInner {
    root: MemNode,
    sessions: HashMap<SessionId, SessionRec>,
    next_session: SessionId,
}

/// Notify the given sessions of a one-shot watch firing.
fn notify(inner: &ServiceInner, watchers: &[SessionId], kind: WatchKind, path: &str, deleted: bool) {
    for sid in watchers {
        if let Some(rec) = inner.sessions.get(sid) {
            if rec.alive {
                let _ = rec.events.send(ServiceEvent::Watch {
                    kind,
                    path: path.to_string(),
                    deleted,
                });
            }
        }
    }
}

fn strip_watches(node: &mut MemNode, sid: SessionId) {
    node.data_watches.retain(|s| *s != sid);
    node.child_watches.retain(|s| *s != sid);
    for child in node.children.values_mut() {
        strip_watches(child, sid);
    }
}

fn collect_ephemerals(node: &MemNode, at: &str, sid: SessionId, out: &mut Vec<String>) {
    for (name, child) in &node.children {
        let child_path = path::join(at, name);
        if child.owner == Some(sid) {
            out.push(child_path.clone());
        }
        collect_ephemerals(child, &child_path, sid, out);
    }
}

impl ServiceInner {
    fn check(&self, sid: SessionId) -> Result<(), TreeError> {
        match self.sessions.get(&sid) {
            Some(rec) if !rec.alive => Err(TreeError::SessionExpired),
            Some(rec) if rec.suspended => Err(TreeError::ConnectionLoss),
            Some(_) => Ok(()),
            None => Err(TreeError::SessionExpired),
        }
    }

    fn node(&self, p: &str) -> Result<&MemNode, TreeError> {
        let mut node = &self.root;
        for segment in p.split('/').filter(|s| !s.is_empty()) {
            node = node
                .children
                .get(segment)
                .ok_or_else(|| TreeError::NoNode(p.to_string()))?;
        }
        Ok(node)
    }

    fn node_mut(&mut self, p: &str) -> Result<&mut MemNode, TreeError> {
        let mut node = &mut self.root;
        for segment in p.split('/').filter(|s| !s.is_empty()) {
            node = node
                .children
                .get_mut(segment)
                .ok_or_else(|| TreeError::NoNode(p.to_string()))?;
        }
        Ok(node)
    }

    /// Remove a node unconditionally, firing deletion watches. Used for
    /// ephemeral cleanup; ordinary deletes go through `op_delete`.
    fn remove_node(&mut self, p: &str) {
        let (base, name) = path::split(p);
        let removed = match self.node_mut(base) {
            Ok(parent) => parent.children.remove(name),
            Err(_) => None,
        };
        let Some(removed) = removed else { return };
        notify(self, &removed.data_watches, WatchKind::Data, p, true);
        notify(self, &removed.child_watches, WatchKind::Children, p, true);
        let parent_watchers = match self.node_mut(base) {
            Ok(parent) => std::mem::take(&mut parent.child_watches),
            Err(_) => Vec::new(),
        };
        notify(self, &parent_watchers, WatchKind::Children, base, false);
    }

    /// Tear a session down: drop its watches, delete its ephemerals
    /// (deepest first), and mark it dead.
    fn end_session(&mut self, sid: SessionId, state: Option<KeeperState>) {
        strip_watches(&mut self.root, sid);
        let mut ephemerals = Vec::new();
        collect_ephemerals(&self.root, "/", sid, &mut ephemerals);
        ephemerals.sort_by_key(|p| std::cmp::Reverse(p.matches('/').count()));
        for p in &ephemerals {
            self.remove_node(p);
        }
        if let Some(rec) = self.sessions.get_mut(&sid) {
            rec.alive = false;
            if let Some(state) = state {
                let _ = rec.events.send(ServiceEvent::State(state));
            }
        }
    }
}

/// A shared in-memory tree plus its sessions.
pub struct MemoryService {
    inner: Mutex<ServiceInner>,
}

impl MemoryService {
    /// A fresh service carrying the service-internal `/zookeeper`
    /// subtree, like the real thing.
    pub fn new() -> Arc<MemoryService> {
        let service = Arc::new(MemoryService {
            inner: Mutex::new(ServiceInner {
                root: MemNode::new(Vec::new(), acl::open_acl_unsafe(), None),
                sessions: HashMap::new(),
                next_session: 0,
            }),
        });
        service.seed("/zookeeper", b"");
        service.seed("/zookeeper/quota", b"");
        service
    }

    /// Seed a node (and any missing ancestors) without firing watches.
    /// Fixture setup only.
    pub fn seed(&self, p: &str, data: &[u8]) {
        let mut inner = self.inner.lock();
        let mut node = &mut inner.root;
        for segment in p.split('/').filter(|s| !s.is_empty()) {
            node = node
                .children
                .entry(segment.to_string())
                .or_insert_with(|| MemNode::new(Vec::new(), acl::open_acl_unsafe(), None));
        }
        node.data = data.to_vec();
    }

    /// Open a new session delivering its events on `events`.
    pub fn connect(self: &Arc<Self>, events: EventSender) -> Arc<MemoryHandle> {
        let mut inner = self.inner.lock();
        let sid = inner.next_session;
        inner.next_session += 1;
        inner.sessions.insert(
            sid,
            SessionRec {
                events,
                alive: true,
                suspended: false,
            },
        );
        Arc::new(MemoryHandle {
            service: self.clone(),
            session: sid,
        })
    }

    /// Alive session ids, oldest first.
    pub fn sessions(&self) -> Vec<u64> {
        let inner = self.inner.lock();
        let mut ids: Vec<u64> = inner
            .sessions
            .iter()
            .filter(|(_, rec)| rec.alive)
            .map(|(sid, _)| *sid)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Expire one session: its ephemerals and watches are dropped and it
    /// is told the session is lost.
    pub fn expire_session(&self, sid: u64) {
        self.inner.lock().end_session(sid, Some(KeeperState::Lost));
    }

    /// Expire every alive session.
    pub fn expire_all(&self) {
        for sid in self.sessions() {
            self.expire_session(sid);
        }
    }

    /// Simulate a transient disconnect: operations fail with
    /// `ConnectionLoss` until `reconnect`.
    pub fn disconnect(&self, sid: u64) {
        let mut inner = self.inner.lock();
        if let Some(rec) = inner.sessions.get_mut(&sid) {
            rec.suspended = true;
            let _ = rec.events.send(ServiceEvent::State(KeeperState::Suspended));
        }
    }

    /// End a transient disconnect.
    pub fn reconnect(&self, sid: u64) {
        let mut inner = self.inner.lock();
        if let Some(rec) = inner.sessions.get_mut(&sid) {
            rec.suspended = false;
            let _ = rec.events.send(ServiceEvent::State(KeeperState::Connected));
        }
    }

    fn op_exists(&self, sid: SessionId, p: &str) -> Result<bool, TreeError> {
        let inner = self.inner.lock();
        inner.check(sid)?;
        Ok(inner.node(p).is_ok())
    }

    fn op_create(
        &self,
        sid: SessionId,
        p: &str,
        data: &[u8],
        acls: &[Acl],
        ephemeral: bool,
    ) -> Result<(), TreeError> {
        path::validate(p)?;
        if p == "/" {
            return Err(TreeError::NodeExists(p.to_string()));
        }
        let mut inner = self.inner.lock();
        inner.check(sid)?;
        let (base, name) = path::split(p);
        let watchers;
        {
            let parent = inner.node_mut(base)?;
            if parent.children.contains_key(name) {
                return Err(TreeError::NodeExists(p.to_string()));
            }
            parent.children.insert(
                name.to_string(),
                MemNode::new(data.to_vec(), acls.to_vec(), ephemeral.then_some(sid)),
            );
            watchers = std::mem::take(&mut parent.child_watches);
        }
        notify(&inner, &watchers, WatchKind::Children, base, false);
        Ok(())
    }

    fn op_delete(&self, sid: SessionId, p: &str) -> Result<(), TreeError> {
        path::validate(p)?;
        if p == "/" {
            return Err(TreeError::BadArguments(p.to_string()));
        }
        let mut inner = self.inner.lock();
        inner.check(sid)?;
        if !inner.node(p)?.children.is_empty() {
            return Err(TreeError::NotEmpty(p.to_string()));
        }
        inner.remove_node(p);
        Ok(())
    }

    fn op_get(
        &self,
        sid: SessionId,
        p: &str,
        watch: bool,
    ) -> Result<(Vec<u8>, NodeMeta), TreeError> {
        let mut inner = self.inner.lock();
        inner.check(sid)?;
        let node = inner.node_mut(p)?;
        if watch {
            node.data_watches.push(sid);
        }
        Ok((
            node.data.clone(),
            NodeMeta {
                ephemeral: node.owner.is_some(),
            },
        ))
    }

    fn op_set(&self, sid: SessionId, p: &str, data: &[u8]) -> Result<(), TreeError> {
        let mut inner = self.inner.lock();
        inner.check(sid)?;
        let watchers;
        {
            let node = inner.node_mut(p)?;
            node.data = data.to_vec();
            watchers = std::mem::take(&mut node.data_watches);
        }
        notify(&inner, &watchers, WatchKind::Data, p, false);
        Ok(())
    }

    fn op_get_children(
        &self,
        sid: SessionId,
        p: &str,
        watch: bool,
    ) -> Result<Vec<String>, TreeError> {
        let mut inner = self.inner.lock();
        inner.check(sid)?;
        let node = inner.node_mut(p)?;
        if watch {
            node.child_watches.push(sid);
        }
        Ok(node.children.keys().cloned().collect())
    }

    fn op_get_acls(&self, sid: SessionId, p: &str) -> Result<(Vec<Acl>, i32), TreeError> {
        let inner = self.inner.lock();
        inner.check(sid)?;
        let node = inner.node(p)?;
        Ok((node.acls.clone(), node.aversion))
    }

    fn op_set_acls(
        &self,
        sid: SessionId,
        p: &str,
        acls: &[Acl],
        version: i32,
    ) -> Result<(), TreeError> {
        let mut inner = self.inner.lock();
        inner.check(sid)?;
        let node = inner.node_mut(p)?;
        if node.aversion != version {
            return Err(TreeError::BadVersion(p.to_string()));
        }
        node.aversion += 1;
        node.acls = acls.to_vec();
        Ok(())
    }

    fn op_close(&self, sid: SessionId) {
        self.inner.lock().end_session(sid, None);
    }
}

/// One session's handle on a [`MemoryService`].
pub struct MemoryHandle {
    service: Arc<MemoryService>,
    session: SessionId,
}

impl MemoryHandle {
    pub fn session_id(&self) -> u64 {
        self.session
    }
}

impl Backend for MemoryHandle {
    fn exists(&self, path: &str) -> Result<bool, TreeError> {
        self.service.op_exists(self.session, path)
    }

    fn create(
        &self,
        path: &str,
        data: &[u8],
        acls: &[Acl],
        ephemeral: bool,
    ) -> Result<(), TreeError> {
        self.service
            .op_create(self.session, path, data, acls, ephemeral)
    }

    fn delete(&self, path: &str) -> Result<(), TreeError> {
        self.service.op_delete(self.session, path)
    }

    fn get(&self, path: &str, watch: bool) -> Result<(Vec<u8>, NodeMeta), TreeError> {
        self.service.op_get(self.session, path, watch)
    }

    fn set(&self, path: &str, data: &[u8]) -> Result<(), TreeError> {
        self.service.op_set(self.session, path, data)
    }

    fn get_children(&self, path: &str, watch: bool) -> Result<Vec<String>, TreeError> {
        self.service.op_get_children(self.session, path, watch)
    }

    fn get_acls(&self, path: &str) -> Result<(Vec<Acl>, i32), TreeError> {
        self.service.op_get_acls(self.session, path)
    }

    fn set_acls(&self, path: &str, acls: &[Acl], version: i32) -> Result<(), TreeError> {
        self.service.op_set_acls(self.session, path, acls, version)
    }

    fn close(&self) {
        self.service.op_close(self.session);
    }
}

/// Connector bound to one concrete service.
pub struct MemoryConnector {
    pub service: Arc<MemoryService>,
}

impl Connector for MemoryConnector {
    fn connect(
        &self,
        _conn: &str,
        _timeout: Duration,
        events: EventSender,
    ) -> Result<Arc<dyn Backend>, TreeError> {
        Ok(self.service.connect(events))
    }
}

/// Connector resolving connection strings through the process-wide hub.
/// `mem:<name>` strings auto-create a service; anything else must have
/// been registered with [`register_connection`].
pub struct HubConnector;

impl Connector for HubConnector {
    fn connect(
        &self,
        conn: &str,
        _timeout: Duration,
        events: EventSender,
    ) -> Result<Arc<dyn Backend>, TreeError> {
        let service = match lookup_connection(conn) {
            Some(service) => service,
            None if conn.starts_with("mem:") => register_connection(conn),
            None => return Err(TreeError::FailedConnect(conn.to_string())),
        };
        Ok(service.connect(events))
    }
}

fn hub() -> &'static Mutex<HashMap<String, Arc<MemoryService>>> {
    static HUB: OnceLock<Mutex<HashMap<String, Arc<MemoryService>>>> = OnceLock::new();
    HUB.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Create (or fetch) the service a connection string resolves to.
pub fn register_connection(conn: &str) -> Arc<MemoryService> {
    hub()
        .lock()
        .entry(conn.to_string())
        .or_insert_with(MemoryService::new)
        .clone()
}

pub fn lookup_connection(conn: &str) -> Option<Arc<MemoryService>> {
    hub().lock().get(conn).cloned()
}

/// Forget a registered connection string (test isolation).
pub fn drop_connection(conn: &str) {
    hub().lock().remove(conn);
}

/// Seed the conventional demo tree used throughout the docs and tests.
pub fn populate_demo(service: &MemoryService) {
    service.seed(
        "/fooservice",
        br#"{"database":"/databases/foomain","favorite_color":"red","threads":1}"#,
    );
    service.seed("/fooservice/providers", b"");
}

#[cfg(test)]
#[path = "testing_tests.rs"]
mod tests;
