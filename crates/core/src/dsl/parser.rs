// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Zelkova Contributors

//! Indent-sensitive parser for tree definitions.

use super::ast::TreeNode;
use super::literal::parse_literal;
use crate::props;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("line {line}: tabs may not be used for indentation")]
    TabIndent { line: usize },

    #[error("line {line}: expected a node or property line, got {text:?}")]
    Unrecognized { line: usize, text: String },

    #[error("line {line}: bad node name {name:?}")]
    BadNodeName { line: usize, name: String },

    #[error("line {line}: bad property name {name:?}")]
    BadPropertyName { line: usize, name: String },

    #[error("line {line}: property {name:?} at top level")]
    PropertyAtRoot { line: usize, name: String },

    #[error("line {line}: duplicate node {name:?}")]
    DuplicateNode { line: usize, name: String },

    #[error("line {line}: duplicate property {name:?}")]
    DuplicateProperty { line: usize, name: String },

    #[error("line {line}: bad value for {name:?}: {message}")]
    BadValue {
        line: usize,
        name: String,
        message: String,
    },

    #[error("line {line}: bad link {name:?}: {message}")]
    BadLink {
        line: usize,
        name: String,
        message: String,
    },
}

/// Parse a tree definition into a virtual root node.
///
/// The returned node has an empty name; top-level node lines become its
/// children. Property lines may only appear beneath a node line.
pub fn parse_tree(text: &str) -> Result<TreeNode, ParseError> {
    let mut stack: Vec<(i64, TreeNode)> = vec![(-1, TreeNode::new(""))];

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let without_comment = strip_comment(raw);
        let content = without_comment.trim();
        if content.is_empty() {
            continue;
        }
        let leading = &without_comment[..without_comment.len() - without_comment.trim_start().len()];
        if leading.contains('\t') {
            return Err(ParseError::TabIndent { line });
        }
        let indent = leading.len() as i64;

        while stack.last().map(|(i, _)| *i).unwrap_or(-1) >= indent {
            fold(&mut stack);
        }

        if let Some(rest) = content.strip_prefix('/') {
            let (name, node_type) = match rest.split_once(" : ") {
                Some((n, t)) => (n.trim(), Some(t.trim())),
                None => (rest.trim(), None),
            };
            if name.is_empty() || name.contains('/') || name.contains(char::is_whitespace) {
                return Err(ParseError::BadNodeName {
                    line,
                    name: name.to_string(),
                });
            }
            if parent_has_child(&stack, name) {
                return Err(ParseError::DuplicateNode {
                    line,
                    name: name.to_string(),
                });
            }
            let mut node = TreeNode::new(name);
            if let Some(t) = node_type {
                node.properties
                    .insert("type".to_string(), Value::String(t.to_string()));
            }
            stack.push((indent, node));
        } else {
            let (key, value) = parse_property(content, line)?;
            if stack.len() == 1 {
                return Err(ParseError::PropertyAtRoot {
                    line,
                    name: props::base_name(&key).to_string(),
                });
            }
            if let Some((_, node)) = stack.last_mut() {
                if node.properties.contains_key(&key) {
                    return Err(ParseError::DuplicateProperty {
                        line,
                        name: key.clone(),
                    });
                }
                node.properties.insert(key, value);
            }
        }
    }

    while stack.len() > 1 {
        fold(&mut stack);
    }
    match stack.pop() {
        Some((_, root)) => Ok(root),
        None => Ok(TreeNode::new("")),
    }
}

/// Pop the top node into its parent's child list.
fn fold(stack: &mut Vec<(i64, TreeNode)>) {
    if stack.len() < 2 {
        return;
    }
    if let Some((_, child)) = stack.pop() {
        if let Some((_, parent)) = stack.last_mut() {
            parent.children.push(child);
        }
    }
}

fn parent_has_child(stack: &[(i64, TreeNode)], name: &str) -> bool {
    stack
        .last()
        .map(|(_, parent)| parent.child(name).is_some())
        .unwrap_or(false)
}

/// Split one property line into its stored key and value.
///
/// `a = 1` stores key `a`; `a -> /x` stores key `a ->`; `a => /x f`
/// stores key `a =>`. The earliest operator wins, so literal values
/// containing `->` are not mistaken for links.
fn parse_property(content: &str, line: usize) -> Result<(String, Value), ParseError> {
    enum Op {
        NodeLink(usize),
        PropLink(usize),
        Assign(usize),
    }

    let arrow = content.find("->");
    let eq = content.find('=');
    let op = match (arrow, eq) {
        (Some(a), Some(e)) if a < e => Some(Op::NodeLink(a)),
        (Some(a), None) => Some(Op::NodeLink(a)),
        (_, Some(e)) if content[e..].starts_with("=>") => Some(Op::PropLink(e)),
        (_, Some(e)) => Some(Op::Assign(e)),
        (None, None) => None,
    };
    let Some(op) = op else {
        return Err(ParseError::Unrecognized {
            line,
            text: content.to_string(),
        });
    };
    let (name, key_suffix, rest) = match op {
        Op::NodeLink(i) => (&content[..i], props::NODE_LINK_SUFFIX, &content[i + 2..]),
        Op::PropLink(i) => (&content[..i], props::PROP_LINK_SUFFIX, &content[i + 2..]),
        Op::Assign(i) => (&content[..i], "", &content[i + 1..]),
    };

    let name = name.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err(ParseError::BadPropertyName {
            line,
            name: name.to_string(),
        });
    }
    let rest = rest.trim();

    match key_suffix {
        props::NODE_LINK_SUFFIX => {
            if rest.is_empty() || rest.contains(char::is_whitespace) {
                return Err(ParseError::BadLink {
                    line,
                    name: name.to_string(),
                    message: format!("bad target {rest:?}"),
                });
            }
            Ok((
                format!("{name}{key_suffix}"),
                Value::String(rest.to_string()),
            ))
        }
        props::PROP_LINK_SUFFIX => {
            if props::parse_prop_link(rest).is_none() {
                return Err(ParseError::BadLink {
                    line,
                    name: name.to_string(),
                    message: format!("expected 'path [field]', got {rest:?}"),
                });
            }
            Ok((
                format!("{name}{key_suffix}"),
                Value::String(rest.to_string()),
            ))
        }
        _ => {
            let value = parse_literal(rest).map_err(|message| ParseError::BadValue {
                line,
                name: name.to_string(),
                message,
            })?;
            Ok((name.to_string(), value))
        }
    }
}

/// Drop a `#` comment, honoring single and double quotes so literal
/// values may contain `#`.
fn strip_comment(line: &str) -> &str {
    let mut in_single = false;
    let mut in_double = false;
    let mut escaped = false;
    for (i, ch) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_single || in_double => escaped = true,
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '#' if !in_single && !in_double => return &line[..i],
            _ => {}
        }
    }
    line
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
