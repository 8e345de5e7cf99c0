// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Zelkova Contributors

//! Canonical-path helpers.
//!
//! A canonical path is absolute, `/`-separated, with no empty, `.` or `..`
//! segments. Only the resolver deals in the relaxed form; everything that
//! reaches a backend goes through [`validate`].

use crate::error::TreeError;

/// Check that `path` is canonical.
///
/// Rejects relative paths, empty segments (including a trailing `/`), and
/// `.`/`..` segments.
pub fn validate(path: &str) -> Result<(), TreeError> {
    if !path.starts_with('/') {
        return Err(TreeError::BadArguments(path.to_string()));
    }
    if path == "/" {
        return Ok(());
    }
    for segment in path[1..].split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(TreeError::BadArguments(path.to_string()));
        }
    }
    Ok(())
}

/// Collapse `.` and `<name>/..` segments and strip any trailing slash.
///
/// A `..` with nothing to pop is kept literally; [`validate`] rejects it
/// later. The result is always absolute; `/` normalizes to itself.
pub fn normalize(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match out.last() {
                Some(last) if *last != ".." => {
                    out.pop();
                }
                _ => out.push(".."),
            },
            name => out.push(name),
        }
    }
    if out.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", out.join("/"))
    }
}

/// Split a canonical path into `(base, name)`.
///
/// `/a/b` splits to `("/a", "b")` and `/a` to `("/", "a")`. The root has
/// no name and splits to `("/", "")`.
pub fn split(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(0) => ("/", &path[1..]),
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("/", path),
    }
}

/// The final segment of a canonical path (empty for the root).
pub fn name(path: &str) -> &str {
    split(path).1
}

/// Join a base path and a child name.
pub fn join(base: &str, name: &str) -> String {
    if base == "/" {
        format!("/{name}")
    } else {
        format!("{base}/{name}")
    }
}

#[cfg(test)]
#[path = "path_tests.rs"]
mod tests;
