// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Zelkova Contributors

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Command-line wrappers around tree export and import.

pub mod export;
pub mod import;

use tracing_subscriber::EnvFilter;

/// Log to stderr, `warn` unless overridden through the environment.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
}
