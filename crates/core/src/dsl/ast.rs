// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Zelkova Contributors

//! Parsed tree nodes.

use crate::props::PropertyMap;

/// One node of a parsed tree definition.
///
/// Links are kept in `properties` under their suffixed keys (`x ->`,
/// `x =>`), exactly as they are stored on the wire. The parser's result
/// is a virtual root node with an empty name holding the top-level nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeNode {
    pub name: String,
    pub properties: PropertyMap,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn new(name: impl Into<String>) -> Self {
        TreeNode {
            name: name.into(),
            ..TreeNode::default()
        }
    }

    /// Look up a direct child by name.
    pub fn child(&self, name: &str) -> Option<&TreeNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Child names in lexical order.
    pub fn child_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.children.iter().map(|c| c.name.as_str()).collect();
        names.sort_unstable();
        names
    }
}
