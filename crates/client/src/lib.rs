// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Zelkova Contributors

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! zelkova-client: a resilient high-level client for hierarchical
//! coordination services.
//!
//! The [`Session`] survives disconnects and full session losses by
//! re-creating its ephemeral registrations and re-arming every live
//! observer. Paths may pass through node links (`name ->`) and property
//! lookups through property links (`name =>`). Whole subtrees can be
//! reconciled against an indented text definition, exported back to it,
//! or walked.
//!
//! The wire-level client is out of scope: anything implementing
//! [`backend::Backend`]/[`backend::Connector`] with one-shot watches and
//! a monotonic session lifecycle plugs in. [`testing`] ships a complete
//! in-memory service used by the test suite and by `mem:` connection
//! strings.

pub mod backend;
pub mod observer;
pub mod register;
pub mod registry;
mod resolver;
pub mod session;
pub mod testing;
pub mod tree;

pub use backend::{Backend, Connector, KeeperState, NodeMeta, ServiceEvent, WatchKind};
pub use observer::{CancelWatch, Children, Properties};
pub use register::{RegisteringServer, ServerAddress};
pub use session::{ConnectOptions, Session};
pub use tree::{DeleteOptions, ImportError, ImportOptions, TreeWalk, Trim, WalkEntry};
pub use zelkova_core::{acl, path, props, Acl, PropertyMap, TreeError};
