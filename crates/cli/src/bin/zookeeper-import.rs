// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Zelkova Contributors

use clap::Parser;
use zelkova_cli::import::{main as import_main, ImportArgs};

fn main() -> anyhow::Result<()> {
    zelkova_cli::init_tracing();
    import_main(ImportArgs::parse())
}
