// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Zelkova Contributors

//! The low-level coordination-service interface.
//!
//! A [`Backend`] is one session's handle on the service: primitive tree
//! operations plus one-shot watch arming. Watch firings and session
//! state changes arrive on the event channel handed to
//! [`Connector::connect`]; the session layer turns those one-shot
//! notifications into continuous observers.

use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;
use zelkova_core::{Acl, TreeError};

/// Client-side view of the underlying session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeeperState {
    Connected,
    /// Transient disconnect; the session may yet come back.
    Suspended,
    /// The session is gone; a new one must be established.
    Lost,
}

/// The two primitive watch flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchKind {
    Children,
    Data,
}

/// Per-node metadata returned alongside reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeMeta {
    pub ephemeral: bool,
}

/// Events delivered by a backend on its session's channel.
///
/// `Flush` and `Shutdown` are session-internal plumbing: a flush marker
/// round-trips the dispatcher (see `Session::sync`) and shutdown ends it.
#[derive(Debug)]
pub enum ServiceEvent {
    State(KeeperState),
    Watch {
        kind: WatchKind,
        path: String,
        deleted: bool,
    },
    Flush(Sender<()>),
    Shutdown,
}

pub type EventSender = Sender<ServiceEvent>;

/// Primitive tree operations for one session.
///
/// Reads taking `watch: true` arm a one-shot watch that fires at most
/// once into the session's event channel. All paths are canonical.
pub trait Backend: Send + Sync {
    fn exists(&self, path: &str) -> Result<bool, TreeError>;

    fn create(
        &self,
        path: &str,
        data: &[u8],
        acls: &[Acl],
        ephemeral: bool,
    ) -> Result<(), TreeError>;

    fn delete(&self, path: &str) -> Result<(), TreeError>;

    fn get(&self, path: &str, watch: bool) -> Result<(Vec<u8>, NodeMeta), TreeError>;

    fn set(&self, path: &str, data: &[u8]) -> Result<(), TreeError>;

    fn get_children(&self, path: &str, watch: bool) -> Result<Vec<String>, TreeError>;

    fn get_acls(&self, path: &str) -> Result<(Vec<Acl>, i32), TreeError>;

    fn set_acls(&self, path: &str, acls: &[Acl], version: i32) -> Result<(), TreeError>;

    fn close(&self);
}

/// Establishes sessions. Called once initially and again after every
/// session loss; each successful call is a brand-new session delivering
/// its events on `events`.
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        conn: &str,
        timeout: Duration,
        events: EventSender,
    ) -> Result<Arc<dyn Backend>, TreeError>;
}
