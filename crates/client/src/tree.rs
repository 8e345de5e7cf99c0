// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Zelkova Contributors

//! Declarative tree import/export and traversal.
//!
//! `import_tree` reconciles a parsed tree definition against the live
//! service: missing nodes are created, drifted payloads written back,
//! ACLs aligned, and extras optionally trimmed. Dry-run mode reports the
//! would-be changes instead. `export_tree` emits the textual form back,
//! stable enough to round-trip.

use crate::session::Session;
use serde_json::Value;
use thiserror::Error;
use zelkova_core::dsl::TreeNode;
use zelkova_core::{acl, path, props, Acl, ParseError, PropertyMap, TreeError};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// What to do with live children absent from the definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Trim {
    /// Recursively delete them (ephemeral nodes are never deleted and
    /// spare their ancestors).
    Prune,
    /// Report them as `extra path not trimmed`.
    #[default]
    Warn,
    /// Leave them alone silently.
    Ignore,
}

/// Options for [`Session::import_tree`].
#[derive(Debug, Clone)]
pub struct ImportOptions {
    base: String,
    trim: Trim,
    acls: Vec<Acl>,
    dry_run: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        ImportOptions {
            base: "/".to_string(),
            trim: Trim::Warn,
            acls: acl::open_acl_unsafe(),
            dry_run: false,
        }
    }
}

impl ImportOptions {
    pub fn new() -> Self {
        ImportOptions::default()
    }

    /// Base path the definition applies under (default `/`).
    pub fn base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    pub fn trim(mut self, trim: Trim) -> Self {
        self.trim = trim;
        self
    }

    /// ACL for created nodes and ACL reconciliation (default open).
    pub fn acls(mut self, acls: Vec<Acl>) -> Self {
        self.acls = acls;
        self
    }

    /// Report changes instead of applying them.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Options for [`Session::delete_recursive`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteOptions {
    dry_run: bool,
    force: bool,
    ignore_if_ephemeral: bool,
}

impl DeleteOptions {
    pub fn new() -> Self {
        DeleteOptions::default()
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Delete ephemeral nodes too.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Return silently when the target itself is ephemeral.
    pub fn ignore_if_ephemeral(mut self, ignore: bool) -> Self {
        self.ignore_if_ephemeral = ignore;
        self
    }
}

/// One step of a depth-first traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    pub path: String,
    pub children: Vec<String>,
}

/// Depth-first pre-order traversal in lexical child order. Nodes that
/// vanish mid-walk are skipped.
pub struct TreeWalk<'a> {
    session: &'a Session,
    stack: Vec<String>,
    include_ephemeral: bool,
}

impl Iterator for TreeWalk<'_> {
    type Item = WalkEntry;

    fn next(&mut self) -> Option<WalkEntry> {
        loop {
            let path = self.stack.pop()?;
            if !self.include_ephemeral
                && self.session.core.is_ephemeral(&path).unwrap_or(false)
            {
                continue;
            }
            let backend = match self.session.core.backend() {
                Ok(b) => b,
                Err(_) => return None,
            };
            let children = match backend.get_children(&path, false) {
                Ok(children) => children,
                Err(_) => continue,
            };
            for name in children.iter().rev() {
                self.stack.push(path::join(&path, name));
            }
            return Some(WalkEntry { path, children });
        }
    }
}

impl Session {
    /// Reconcile a tree definition against the live tree.
    ///
    /// Returns report lines: the dry-run diff vocabulary, trim notices,
    /// and skipped-ephemeral messages.
    pub fn import_tree(&self, text: &str, options: ImportOptions) -> Result<Vec<String>, ImportError> {
        let root = zelkova_core::parse_tree(text)?;
        let base = self.core.resolve(&options.base)?;
        let mut out = Vec::new();
        self.import_children(&root, &base, true, &options, &mut out)?;
        Ok(out)
    }

    fn import_children(
        &self,
        dsl: &TreeNode,
        cpath: &str,
        exists: bool,
        options: &ImportOptions,
        out: &mut Vec<String>,
    ) -> Result<(), TreeError> {
        let live: Vec<String> = if exists {
            self.core.backend()?.get_children(cpath, false)?
        } else {
            Vec::new()
        };

        for name in &live {
            if cpath == "/" && name == "zookeeper" {
                continue;
            }
            if dsl.child(name).is_none() {
                let extra = path::join(cpath, name);
                match options.trim {
                    Trim::Prune => {
                        self.trim_subtree(&extra, options.dry_run, out)?;
                    }
                    Trim::Warn => out.push(format!("extra path not trimmed: {extra}")),
                    Trim::Ignore => {}
                }
            }
        }

        let mut children: Vec<&TreeNode> = dsl.children.iter().collect();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        for child in children {
            let child_path = path::join(cpath, &child.name);
            let child_exists = exists && live.iter().any(|n| *n == child.name);
            if child_exists {
                self.reconcile_node(child, &child_path, options, out)?;
            } else if options.dry_run {
                out.push(format!("add {child_path}"));
            } else {
                self.core.create(
                    &child_path,
                    &props::encode(&child.properties),
                    &options.acls,
                    false,
                )?;
            }
            self.import_children(child, &child_path, child_exists || !options.dry_run, options, out)?;
        }
        Ok(())
    }

    /// Align one existing node's payload and ACL with the definition.
    fn reconcile_node(
        &self,
        dsl: &TreeNode,
        cpath: &str,
        options: &ImportOptions,
        out: &mut Vec<String>,
    ) -> Result<(), TreeError> {
        let live = self.core.get_properties_raw(cpath)?;
        if options.dry_run {
            diff_properties(&live, &dsl.properties, cpath, out);
            return Ok(());
        }
        if live != dsl.properties {
            self.core.set(cpath, &props::encode(&dsl.properties))?;
        }
        let (acls, version) = self.core.backend()?.get_acls(cpath)?;
        if !acl::same_acls(&acls, &options.acls) {
            self.core.backend()?.set_acls(cpath, &options.acls, version)?;
        }
        Ok(())
    }

    /// Recursively delete an extra subtree, sparing ephemerals and
    /// their ancestors. Returns whether the subtree is fully gone.
    fn trim_subtree(
        &self,
        cpath: &str,
        dry_run: bool,
        out: &mut Vec<String>,
    ) -> Result<bool, TreeError> {
        let children = self.core.backend()?.get_children(cpath, false)?;
        let mut clean = true;
        for name in children {
            clean &= self.trim_subtree(&path::join(cpath, &name), dry_run, out)?;
        }
        if self.core.is_ephemeral(cpath)? {
            out.push(format!("not deleting ephemeral node: {cpath}"));
            return Ok(false);
        }
        if !clean {
            return Ok(false);
        }
        if dry_run {
            out.push(format!("would delete: {cpath}"));
        } else {
            self.core.backend()?.delete(cpath)?;
        }
        Ok(true)
    }

    /// Export a subtree to its textual form.
    ///
    /// `name` overrides the root node's label. At the root, the
    /// service-internal `zookeeper` subtree is left out. Ephemeral nodes
    /// are included only on request.
    pub fn export_tree(
        &self,
        path: &str,
        include_ephemeral: bool,
        name: Option<&str>,
    ) -> Result<String, TreeError> {
        let rpath = self.core.resolve(path)?;
        let mut out = String::new();
        if rpath == "/" {
            for child in self.core.backend()?.get_children("/", false)? {
                if child == "zookeeper" {
                    continue;
                }
                self.export_node(&path::join("/", &child), None, 0, include_ephemeral, &mut out)?;
            }
        } else {
            self.export_node(&rpath, name, 0, include_ephemeral, &mut out)?;
        }
        Ok(out)
    }

    fn export_node(
        &self,
        cpath: &str,
        name_override: Option<&str>,
        depth: usize,
        include_ephemeral: bool,
        out: &mut String,
    ) -> Result<(), TreeError> {
        let (raw, meta) = self.core.backend()?.get(cpath, false)?;
        if meta.ephemeral && !include_ephemeral {
            return Ok(());
        }
        let mut properties = props::decode(cpath, &raw);

        let label = name_override.unwrap_or_else(|| path::name(cpath));
        let indent = "  ".repeat(depth);
        let type_suffix = match properties.get("type").cloned() {
            Some(Value::String(t)) => {
                properties.remove("type");
                format!(" : {t}")
            }
            _ => String::new(),
        };
        out.push_str(&format!("{indent}/{label}{type_suffix}\n"));

        let pindent = "  ".repeat(depth + 1);
        for (key, value) in properties.iter().filter(|(k, _)| !props::is_link(k)) {
            out.push_str(&format!("{pindent}{key} = {}\n", props::render_value(value)));
        }
        for (key, value) in properties.iter().filter(|(k, _)| props::is_link(k)) {
            let target = match value {
                Value::String(s) => s.clone(),
                other => props::render_value(other),
            };
            let base = props::base_name(key);
            if props::is_node_link(key) {
                out.push_str(&format!("{pindent}{base} -> {target}\n"));
            } else {
                out.push_str(&format!("{pindent}{base} => {target}\n"));
            }
        }

        for child in self.core.backend()?.get_children(cpath, false)? {
            self.export_node(
                &path::join(cpath, &child),
                None,
                depth + 1,
                include_ephemeral,
                out,
            )?;
        }
        Ok(())
    }

    /// Delete a subtree, children first.
    ///
    /// Without `force`, an ephemeral descendant is spared with a message
    /// and keeps its whole ancestor chain alive.
    pub fn delete_recursive(
        &self,
        path: &str,
        options: DeleteOptions,
    ) -> Result<Vec<String>, TreeError> {
        let rpath = self.core.resolve(path)?;
        if options.ignore_if_ephemeral && !options.force && self.core.is_ephemeral(&rpath)? {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        self.delete_rec(&rpath, &options, &mut out)?;
        Ok(out)
    }

    fn delete_rec(
        &self,
        cpath: &str,
        options: &DeleteOptions,
        out: &mut Vec<String>,
    ) -> Result<bool, TreeError> {
        let children = self.core.backend()?.get_children(cpath, false)?;
        let mut clean = true;
        for name in children {
            clean &= self.delete_rec(&path::join(cpath, &name), options, out)?;
        }
        if !options.force && self.core.is_ephemeral(cpath)? {
            out.push(format!("not deleting ephemeral node: {cpath}"));
            return Ok(false);
        }
        if !clean {
            return Ok(false);
        }
        if options.dry_run {
            out.push(format!("would delete: {cpath}"));
        } else {
            self.delete(cpath)?;
        }
        Ok(true)
    }

    /// Depth-first path traversal under `path`.
    pub fn walk(&self, path: &str, include_ephemeral: bool) -> Result<TreeWalk<'_>, TreeError> {
        let rpath = self.core.resolve(path)?;
        Ok(TreeWalk {
            session: self,
            stack: vec![rpath],
            include_ephemeral,
        })
    }

    /// Write a node link: `ln("/databases/main", "/svc/db")` makes
    /// `/svc/db` resolve to `/databases/main`. A `source` ending in `/`
    /// borrows the target's base name.
    pub fn ln(&self, target: &str, source: &str) -> Result<(), TreeError> {
        let mut source = source.to_string();
        if source.ends_with('/') {
            source.push_str(path::name(&path::normalize(target)));
        }
        let normalized = path::normalize(&source);
        let (base, name) = path::split(&normalized);
        if name.is_empty() {
            return Err(TreeError::BadArguments(source));
        }
        let rbase = self.core.resolve(base)?;
        let mut properties = self.core.get_properties_raw(&rbase)?;
        properties.insert(
            format!("{name}{}", props::NODE_LINK_SUFFIX),
            Value::String(target.to_string()),
        );
        self.core.set(&rbase, &props::encode(&properties))
    }
}

/// Emit the diff vocabulary for one node, keys in lexical order.
fn diff_properties(live: &PropertyMap, want: &PropertyMap, cpath: &str, out: &mut Vec<String>) {
    let mut keys: Vec<&String> = live.keys().chain(want.keys()).collect();
    keys.sort();
    keys.dedup();

    for key in keys {
        let link = props::is_link(key);
        let base = props::base_name(key);
        match (live.get(key), want.get(key)) {
            (Some(old), Some(new)) if old != new => {
                if link {
                    out.push(format!(
                        "{cpath} {base} link change from {} to {}",
                        link_text(old),
                        link_text(new)
                    ));
                } else {
                    out.push(format!(
                        "{cpath} {base} change from {} to {}",
                        props::render_value(old),
                        props::render_value(new)
                    ));
                }
            }
            (Some(old), None) => {
                if link {
                    out.push(format!("{cpath} remove link {key} {}", link_text(old)));
                } else {
                    out.push(format!(
                        "{cpath} remove property {key} = {}",
                        props::render_value(old)
                    ));
                }
            }
            (None, Some(new)) => {
                if link {
                    out.push(format!("{cpath} add link {key} {}", link_text(new)));
                } else {
                    out.push(format!(
                        "{cpath} add property {key} = {}",
                        props::render_value(new)
                    ));
                }
            }
            _ => {}
        }
    }
}

/// Links render their raw string value; anything else falls back to the
/// value rendering.
fn link_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => props::render_value(other),
    }
}

#[cfg(test)]
#[path = "tree_tests.rs"]
mod tests;
