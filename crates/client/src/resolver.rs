// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Zelkova Contributors

//! Symbolic path resolution.
//!
//! A textual path resolves to a canonical existing path by collapsing
//! `.`/`..` segments and following node links (`name ->` properties on
//! the parent) wherever a literal segment is missing. The visited chain
//! is threaded through link hops so cycles fail instead of spinning.

use crate::session::SessionCore;
use serde_json::Value;
use tracing::debug;
use zelkova_core::{path, props, TreeError};

impl SessionCore {
    /// Resolve a textual path to the canonical existing path it names.
    ///
    /// Any `NoNode` raised along the way surfaces as `NoNode` of the
    /// original input; link cycles fail with the full chain.
    pub(crate) fn resolve(&self, path: &str) -> Result<String, TreeError> {
        self.resolve_seen(path, &mut Vec::new())
            .map_err(|e| match e {
                TreeError::NoNode(_) => TreeError::NoNode(path.to_string()),
                other => other,
            })
    }

    pub(crate) fn resolve_seen(
        &self,
        input: &str,
        seen: &mut Vec<String>,
    ) -> Result<String, TreeError> {
        if !input.starts_with('/') {
            return Err(TreeError::NoNode(input.to_string()));
        }
        let p = path::normalize(input);
        if self.exists_raw(&p)? {
            return Ok(p);
        }
        if seen.contains(&p) {
            seen.push(p);
            return Err(TreeError::LinkLoop(seen.clone()));
        }
        if p == "/" {
            return Err(TreeError::NoNode(input.to_string()));
        }
        let (base, name) = path::split(&p);
        let rbase = self.resolve_seen(base, seen)?;
        let candidate = path::join(&rbase, name);
        if self.exists_raw(&candidate)? {
            return Ok(candidate);
        }
        let properties = self.get_properties_raw(&rbase)?;
        let link_key = format!("{name}{}", props::NODE_LINK_SUFFIX);
        match properties.get(&link_key) {
            Some(Value::String(target)) => {
                let target = if target.starts_with('/') {
                    target.clone()
                } else {
                    format!("{rbase}/{target}")
                };
                debug!(from = %p, to = %target, "following node link");
                seen.push(p);
                self.resolve_seen(&target, seen)
            }
            Some(other) => Err(TreeError::bad_link(
                &link_key,
                &props::render_value(other),
                "link value is not a string",
            )),
            None => Err(TreeError::NoNode(p)),
        }
    }
}
