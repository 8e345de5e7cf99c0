// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Zelkova Contributors

//! The resilient session layer.
//!
//! A [`Session`] owns one low-level connection at a time and hides its
//! lifecycle: on a transient disconnect operations fail fast and the
//! armed watches stay put; on a full session loss a new session is
//! established, every remembered ephemeral node is re-created, and every
//! live observer is re-armed — re-resolving its original path, since a
//! link rewrite may have moved it.
//!
//! The one-shot primitive watches are adapted to continuous observers:
//! each firing triggers the corresponding primitive read with a fresh
//! watch (one round trip retrieves and re-arms), and the value is
//! broadcast to every observer registered under that key.

use crate::backend::{Backend, Connector, EventSender, KeeperState, ServiceEvent, WatchKind};
use crate::observer::{Children, NodeWatch, Properties, WatchPayload};
use crate::registry::WatchRegistry;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use zelkova_core::{path, props, Acl, PropertyMap, TreeError};

/// Connection options.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    timeout: Duration,
    wait: bool,
    retry_interval: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        ConnectOptions {
            timeout: Duration::from_secs(10),
            wait: false,
            retry_interval: Duration::from_secs(1),
        }
    }
}

impl ConnectOptions {
    pub fn new() -> Self {
        ConnectOptions::default()
    }

    /// Session timeout requested from the service (default 10s).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retry the initial connection forever instead of failing.
    pub fn wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    /// Pause between connection attempts (default 1s).
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }
}

#[derive(Clone)]
struct Ephemeral {
    data: Vec<u8>,
    acls: Vec<Acl>,
}

/// Fields guarded by the session's single state lock.
struct SessionState {
    backend: Arc<dyn Backend>,
    keeper: KeeperState,
    /// Remembered ephemerals, re-created on session loss.
    ephemerals: HashMap<String, Ephemeral>,
}

type StateCallback = Box<dyn FnMut(KeeperState) + Send>;
type RegisterHook = Box<dyn FnMut(&mut crate::register::RegisteringServer) + Send>;

pub(crate) struct SessionCore {
    connector: Box<dyn Connector>,
    conn: String,
    options: ConnectOptions,
    events_tx: EventSender,
    state: Mutex<SessionState>,
    pub(crate) registry: WatchRegistry,
    state_callbacks: Mutex<Vec<StateCallback>>,
    pub(crate) register_hooks: Mutex<Vec<RegisterHook>>,
    closed: AtomicBool,
}

/// A high-level session with a coordination service.
pub struct Session {
    pub(crate) core: Arc<SessionCore>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

impl Session {
    /// Connect using the process-wide connection hub (`mem:` connection
    /// strings resolve to in-memory services; see [`crate::testing`]).
    pub fn connect(conn: &str, options: ConnectOptions) -> Result<Session, TreeError> {
        Session::connect_with(Box::new(crate::testing::HubConnector), conn, options)
    }

    /// Connect through a caller-supplied low-level connector.
    pub fn connect_with(
        connector: Box<dyn Connector>,
        conn: &str,
        options: ConnectOptions,
    ) -> Result<Session, TreeError> {
        let (tx, rx) = channel();
        let backend = if options.wait {
            loop {
                match connector.connect(conn, options.timeout, tx.clone()) {
                    Ok(backend) => break backend,
                    Err(e) => {
                        error!(conn = %conn, "can't connect to ZooKeeper: {e}");
                        std::thread::sleep(options.retry_interval);
                    }
                }
            }
        } else {
            connector
                .connect(conn, options.timeout, tx.clone())
                .map_err(|e| {
                    error!(conn = %conn, "can't connect to ZooKeeper: {e}");
                    TreeError::FailedConnect(conn.to_string())
                })?
        };
        info!(conn = %conn, "connected");

        let core = Arc::new(SessionCore {
            connector,
            conn: conn.to_string(),
            options,
            events_tx: tx,
            state: Mutex::new(SessionState {
                backend,
                keeper: KeeperState::Connected,
                ephemerals: HashMap::new(),
            }),
            registry: WatchRegistry::new(),
            state_callbacks: Mutex::new(Vec::new()),
            register_hooks: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        let weak = Arc::downgrade(&core);
        std::thread::spawn(move || dispatch_loop(weak, rx));
        Ok(Session { core })
    }

    /// Current client-side view of the session state.
    pub fn state(&self) -> KeeperState {
        self.core.state.lock().keeper
    }

    /// Subscribe to session state transitions.
    pub fn on_state_change(&self, f: impl FnMut(KeeperState) + Send + 'static) {
        self.core.state_callbacks.lock().push(Box::new(f));
    }

    /// Resolve a textual path to its canonical existing path.
    pub fn resolve(&self, path: &str) -> Result<String, TreeError> {
        self.core.resolve(path)
    }

    /// Does the path resolve to an existing node?
    pub fn exists(&self, path: &str) -> Result<bool, TreeError> {
        match self.core.resolve(path) {
            Ok(_) => Ok(true),
            Err(TreeError::NoNode(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Raw payload bytes at a resolved path.
    pub fn get(&self, path: &str) -> Result<Vec<u8>, TreeError> {
        let rpath = self.core.resolve(path)?;
        Ok(self.core.backend()?.get(&rpath, false)?.0)
    }

    /// Child names at a resolved path, in lexical order.
    pub fn get_children(&self, path: &str) -> Result<Vec<String>, TreeError> {
        let rpath = self.core.resolve(path)?;
        self.core.backend()?.get_children(&rpath, false)
    }

    /// Decoded property mapping snapshot at a resolved path.
    pub fn get_properties(&self, path: &str) -> Result<PropertyMap, TreeError> {
        let rpath = self.core.resolve(path)?;
        self.core.get_properties_raw(&rpath)
    }

    /// ACL list and ACL version at a resolved path.
    pub fn get_acls(&self, path: &str) -> Result<(Vec<Acl>, i32), TreeError> {
        let rpath = self.core.resolve(path)?;
        self.core.backend()?.get_acls(&rpath)
    }

    /// Create a node. The parent path is resolved; ephemeral creations
    /// are remembered for restoration after session loss.
    pub fn create(
        &self,
        path: &str,
        data: &[u8],
        acls: &[Acl],
        ephemeral: bool,
    ) -> Result<(), TreeError> {
        self.core.create(path, data, acls, ephemeral)
    }

    /// Write a node's payload.
    pub fn set(&self, path: &str, data: &[u8]) -> Result<(), TreeError> {
        let rpath = self.core.resolve(path)?;
        self.core.set(&rpath, data)
    }

    /// Replace a node's ACL at the given ACL version.
    pub fn set_acls(&self, path: &str, acls: &[Acl], version: i32) -> Result<(), TreeError> {
        let rpath = self.core.resolve(path)?;
        self.core.backend()?.set_acls(&rpath, acls, version)?;
        let mut state = self.core.state.lock();
        if let Some(eph) = state.ephemerals.get_mut(&rpath) {
            eph.acls = acls.to_vec();
        }
        Ok(())
    }

    /// Delete a node.
    pub fn delete(&self, path: &str) -> Result<(), TreeError> {
        let rpath = self.core.resolve(path)?;
        self.core.backend()?.delete(&rpath)?;
        self.core.state.lock().ephemerals.remove(&rpath);
        Ok(())
    }

    /// Live child-list observer at a resolved path.
    pub fn children(&self, path: &str) -> Result<Children, TreeError> {
        Children::build(self.core.clone(), path)
    }

    /// Live property-mapping observer at a resolved path.
    pub fn properties(&self, path: &str) -> Result<Properties, TreeError> {
        Properties::build(self.core.clone(), path)
    }

    /// Count of live observers held by the watch registry.
    pub fn watch_count(&self) -> usize {
        self.core.registry.len()
    }

    /// Wait until the dispatcher has drained every event delivered so
    /// far. Handy in tests; harmless elsewhere.
    pub fn sync(&self) {
        let (tx, rx) = channel();
        if self.core.events_tx.send(ServiceEvent::Flush(tx)).is_ok() {
            let _ = rx.recv_timeout(Duration::from_secs(10));
        }
    }

    /// Idempotent teardown. Further operations fail with `Closed`.
    pub fn close(&self) {
        if self.core.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.core.state.lock().backend.close();
        let _ = self.core.events_tx.send(ServiceEvent::Shutdown);
    }
}

impl SessionCore {
    pub(crate) fn backend(&self) -> Result<Arc<dyn Backend>, TreeError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TreeError::Closed);
        }
        Ok(self.state.lock().backend.clone())
    }

    pub(crate) fn exists_raw(&self, path: &str) -> Result<bool, TreeError> {
        self.backend()?.exists(path)
    }

    pub(crate) fn get_properties_raw(&self, rpath: &str) -> Result<PropertyMap, TreeError> {
        let (raw, _meta) = self.backend()?.get(rpath, false)?;
        Ok(props::decode(rpath, &raw))
    }

    pub(crate) fn is_ephemeral(&self, rpath: &str) -> Result<bool, TreeError> {
        Ok(self.backend()?.get(rpath, false)?.1.ephemeral)
    }

    pub(crate) fn create(
        &self,
        input: &str,
        data: &[u8],
        acls: &[Acl],
        ephemeral: bool,
    ) -> Result<(), TreeError> {
        path::validate(input)?;
        let (base, name) = path::split(input);
        let rbase = self.resolve(base)?;
        let rpath = path::join(&rbase, name);
        self.backend()?.create(&rpath, data, acls, ephemeral)?;
        if ephemeral {
            self.state.lock().ephemerals.insert(
                rpath,
                Ephemeral {
                    data: data.to_vec(),
                    acls: acls.to_vec(),
                },
            );
        }
        Ok(())
    }

    /// Write raw payload at an already-resolved path, keeping the
    /// remembered ephemeral data current.
    pub(crate) fn set(&self, rpath: &str, data: &[u8]) -> Result<(), TreeError> {
        self.backend()?.set(rpath, data)?;
        let mut state = self.state.lock();
        if let Some(eph) = state.ephemerals.get_mut(rpath) {
            eph.data = data.to_vec();
        }
        Ok(())
    }

    fn notify_state(&self, state: KeeperState) {
        let batch = std::mem::take(&mut *self.state_callbacks.lock());
        let mut kept = Vec::with_capacity(batch.len());
        for mut cb in batch {
            cb(state);
            kept.push(cb);
        }
        let mut guard = self.state_callbacks.lock();
        let added = std::mem::take(&mut *guard);
        *guard = kept;
        guard.extend(added);
    }

    fn handle_state(&self, new: KeeperState) {
        match new {
            KeeperState::Connected => {
                info!(conn = %self.conn, "connected");
                self.state.lock().keeper = KeeperState::Connected;
                self.notify_state(KeeperState::Connected);
            }
            KeeperState::Suspended => {
                warn!(conn = %self.conn, "connection suspended");
                self.state.lock().keeper = KeeperState::Suspended;
                self.notify_state(KeeperState::Suspended);
            }
            KeeperState::Lost => {
                warn!(conn = %self.conn, "session lost");
                self.state.lock().keeper = KeeperState::Lost;
                self.notify_state(KeeperState::Lost);
                self.reconnect();
            }
        }
    }

    /// Establish a new session after loss, then restore ephemerals and
    /// re-arm watches — in that order.
    fn reconnect(&self) {
        let backend = loop {
            if self.closed.load(Ordering::SeqCst) {
                return;
            }
            match self
                .connector
                .connect(&self.conn, self.options.timeout, self.events_tx.clone())
            {
                Ok(backend) => break backend,
                Err(e) => {
                    error!(conn = %self.conn, "can't connect to ZooKeeper: {e}");
                    std::thread::sleep(self.options.retry_interval);
                }
            }
        };
        {
            let mut state = self.state.lock();
            state.backend = backend;
            state.keeper = KeeperState::Connected;
        }
        info!(conn = %self.conn, "session re-established");
        self.restore_ephemerals();
        self.rearm_watches();
        self.notify_state(KeeperState::Connected);
    }

    /// Best-effort re-creation of every remembered ephemeral node.
    fn restore_ephemerals(&self) {
        let mut entries: Vec<(String, Ephemeral)> = {
            let state = self.state.lock();
            state
                .ephemerals
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        for (path, eph) in entries {
            let result = self
                .backend()
                .and_then(|b| b.create(&path, &eph.data, &eph.acls, true));
            match result {
                Ok(()) => debug!(path = %path, "restored ephemeral node"),
                Err(e) => error!(path = %path, "failed to restore ephemeral node: {e}"),
            }
        }
    }

    /// Re-resolve, re-register, and re-arm every live observer. Each
    /// observer whose snapshot differs from the post-reconnect value is
    /// notified once.
    fn rearm_watches(&self) {
        for watch in self.registry.clear() {
            self.rearm(watch, true);
        }
    }

    fn rearm(&self, watch: Arc<dyn NodeWatch>, only_if_changed: bool) {
        let original = watch.original_path();
        match self.resolve(&original) {
            Ok(rpath) => {
                watch.rehome(rpath.clone());
                let key = (watch.kind(), rpath.clone());
                let newly = self.registry.add(&key, &watch);
                match self.read_payload(watch.kind(), &rpath, newly) {
                    Ok(payload) => {
                        if !only_if_changed || watch.differs(&payload) {
                            watch.apply(payload);
                        }
                    }
                    Err(TreeError::NoNode(_)) => watch.mark_deleted(),
                    Err(e) => {
                        // Left registered; the next recovery pass picks
                        // it back up.
                        error!(path = %rpath, "orphaned watch, re-arming failed: {e}");
                    }
                }
            }
            Err(TreeError::NoNode(_)) => watch.mark_deleted(),
            Err(e) => error!(path = %original, "orphaned watch, re-resolve failed: {e}"),
        }
    }

    fn read_payload(
        &self,
        kind: WatchKind,
        rpath: &str,
        watch: bool,
    ) -> Result<WatchPayload, TreeError> {
        let backend = self.backend()?;
        match kind {
            WatchKind::Children => Ok(WatchPayload::Children(
                backend.get_children(rpath, watch)?,
            )),
            WatchKind::Data => Ok(WatchPayload::Data(backend.get(rpath, watch)?.0)),
        }
    }

    fn handle_watch(&self, kind: WatchKind, path: &str, deleted: bool) {
        let key = (kind, path.to_string());
        if deleted {
            for watch in self.registry.pop(&key) {
                self.rearm(watch, false);
            }
            return;
        }
        let observers = self.registry.watches(&key);
        if observers.is_empty() {
            // Everyone dropped their handle; let the primitive watch lapse.
            return;
        }
        match self.read_payload(kind, path, true) {
            Ok(payload) => {
                for watch in observers {
                    watch.apply(payload.clone());
                }
            }
            Err(TreeError::NoNode(_)) => {
                for watch in self.registry.pop(&key) {
                    self.rearm(watch, false);
                }
            }
            Err(e @ (TreeError::ConnectionLoss | TreeError::SessionExpired)) => {
                // Watch-arming race with a dying session; recovery will
                // re-arm the observers, so only note the gap.
                error!(path = %path, "watch re-arm raced session loss: {e}");
            }
            Err(e) => error!(path = %path, "watch refresh failed: {e}"),
        }
    }
}

fn dispatch_loop(core: Weak<SessionCore>, rx: Receiver<ServiceEvent>) {
    while let Ok(event) = rx.recv() {
        let Some(core) = core.upgrade() else { break };
        match event {
            ServiceEvent::Shutdown => break,
            ServiceEvent::Flush(tx) => {
                let _ = tx.send(());
            }
            ServiceEvent::State(state) => core.handle_state(state),
            ServiceEvent::Watch {
                kind,
                path,
                deleted,
            } => core.handle_watch(kind, &path, deleted),
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
