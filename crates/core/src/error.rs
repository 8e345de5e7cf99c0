// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Zelkova Contributors

//! Error types shared across the Zelkova crates.

use thiserror::Error;

/// Errors surfaced by tree operations, path resolution, and the session
/// layer.
///
/// The first five variants mirror the coordination service's own failure
/// modes; the rest belong to the high-level client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("no node: {0}")]
    NoNode(String),

    #[error("node already exists: {0}")]
    NodeExists(String),

    #[error("bad version: {0}")]
    BadVersion(String),

    #[error("node has children: {0}")]
    NotEmpty(String),

    #[error("bad path: {0}")]
    BadArguments(String),

    #[error("connection lost")]
    ConnectionLoss,

    #[error("session expired")]
    SessionExpired,

    #[error("can't connect to ZooKeeper at '{0}'")]
    FailedConnect(String),

    #[error("no property {key:?} at {path}")]
    NoProperty { path: String, key: String },

    #[error("link loop: {0:?}")]
    LinkLoop(Vec<String>),

    #[error("bad property link {key:?} = {value:?}: {reason}")]
    BadPropertyLink {
        key: String,
        value: String,
        reason: String,
    },

    #[error("session is closed")]
    Closed,
}

impl TreeError {
    /// Wrap an error raised while dereferencing a property link so the
    /// failure names the link key and its raw value.
    pub fn bad_link(key: &str, value: &str, reason: impl std::fmt::Display) -> Self {
        TreeError::BadPropertyLink {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}
