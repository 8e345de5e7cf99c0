// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Zelkova Contributors

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! zelkova-core: path, payload, ACL, and tree-language primitives for the
//! Zelkova coordination-service client.

pub mod acl;
pub mod dsl;
pub mod error;
pub mod path;
pub mod props;

pub use acl::{perms, world_acl, Acl};
pub use dsl::{parse_tree, ParseError, TreeNode};
pub use error::TreeError;
pub use props::{PropertyMap, NODE_LINK_SUFFIX, PROP_LINK_SUFFIX};
